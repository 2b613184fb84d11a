//! Slice value ABI (§3 "Slice Value", §6 "Slice ABI").
//!
//! `CCSlice` is a 32-byte POD the emitted C and the lowering pipeline agree
//! on: pointer, logical length, a 64-bit id packing ownership flags into its
//! low 3 bits and a provenance tag into the rest, and the length available
//! from `ptr` to the end of the original allocation. The flag bits are part
//! of the emitted-C ABI and must not be renumbered.

use bitflags::bitflags;

bitflags! {
    /// Low 3 bits of a slice's id field.
    pub struct SliceFlags: u64 {
        const UNIQUE      = 0b001;
        const TRANSFERABLE = 0b010;
        const SUBSLICE    = 0b100;
    }
}

const FLAG_BITS: u32 = 3;
const FLAG_MASK: u64 = (1 << FLAG_BITS) - 1;

/// A slice id: low 3 bits are `SliceFlags`, the rest is an opaque
/// provenance tag distinguishing the originating allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceId(pub u64);

impl SliceId {
    pub fn new(provenance: u64, flags: SliceFlags) -> Self {
        SliceId((provenance << FLAG_BITS) | flags.bits())
    }

    pub fn flags(self) -> SliceFlags {
        SliceFlags::from_bits_truncate(self.0 & FLAG_MASK)
    }

    pub fn provenance(self) -> u64 {
        self.0 >> FLAG_BITS
    }

    pub fn with_flags(self, flags: SliceFlags) -> Self {
        SliceId((self.provenance() << FLAG_BITS) | flags.bits())
    }

    pub fn is_move_only(self) -> bool {
        self.flags().contains(SliceFlags::TRANSFERABLE)
    }

    pub fn is_unique(self) -> bool {
        self.flags().contains(SliceFlags::UNIQUE)
    }
}

/// A slice value as the runtime represents it: `{ ptr, len, id, alen }`.
/// The pipeline never dereferences `ptr`; it only reasons about the flags
/// and lengths when deciding whether a move is legal.
#[derive(Debug, Clone, Copy)]
pub struct SliceValue {
    pub ptr: u64,
    pub len: u64,
    pub id: SliceId,
    /// Length available from `ptr` to the end of the original allocation.
    pub alen: u64,
}

impl SliceValue {
    pub fn new_unique(ptr: u64, len: u64, provenance: u64) -> Self {
        SliceValue {
            ptr,
            len,
            id: SliceId::new(provenance, SliceFlags::UNIQUE | SliceFlags::TRANSFERABLE),
            alen: len,
        }
    }

    /// Take a subslice `[offset, offset+len)`. Clears UNIQUE, sets SUBSLICE,
    /// and clamps `alen` to what remains after `offset` (§3).
    pub fn subslice(&self, offset: u64, len: u64) -> SliceValue {
        let flags = (self.id.flags() - SliceFlags::UNIQUE) | SliceFlags::SUBSLICE;
        SliceValue {
            ptr: self.ptr + offset,
            len,
            id: self.id.with_flags(flags),
            alen: self.alen.saturating_sub(offset),
        }
    }
}

/// Slice equality is structural on (ptr, len) bytes, not on id/provenance.
impl PartialEq for SliceValue {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.len == other.len
    }
}
impl Eq for SliceValue {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subslice_clears_unique_and_sets_subslice() {
        let s = SliceValue::new_unique(0x1000, 16, 42);
        let sub = s.subslice(4, 8);
        assert!(!sub.id.flags().contains(SliceFlags::UNIQUE));
        assert!(sub.id.flags().contains(SliceFlags::SUBSLICE));
        assert_eq!(sub.alen, 12);
        assert_eq!(sub.ptr, 0x1004);
    }

    #[test]
    fn equality_is_structural_on_ptr_and_len() {
        let a = SliceValue::new_unique(0x1000, 16, 1);
        let b = SliceValue::new_unique(0x1000, 16, 99);
        assert_eq!(a, b);
    }

    #[test]
    fn move_only_requires_transferable_flag() {
        let id = SliceId::new(7, SliceFlags::UNIQUE | SliceFlags::TRANSFERABLE);
        assert!(id.is_move_only());
        let id2 = SliceId::new(7, SliceFlags::UNIQUE);
        assert!(!id2.is_move_only());
    }
}
