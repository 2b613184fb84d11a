//! Variable → declared type map, plus the generic instantiations (`Vec_T`,
//! `Map_K_V`, `Optional_T`) the UFCS container dispatch rule needs (§3,
//! component C). One instance per translation unit; cleared between files.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instantiation {
    pub container_kind: ContainerKind,
    pub mangled_name: String,
    pub type1: String,
    pub type2: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Vec,
    Map,
    Optional,
}

#[derive(Default)]
pub struct TypeRegistry {
    vars: HashMap<String, String>,
    vecs: Vec<Instantiation>,
    maps: Vec<Instantiation>,
    optionals: Vec<Instantiation>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn declare_var(&mut self, name: impl Into<String>, ty: impl Into<String>) {
        self.vars.insert(name.into(), ty.into());
    }

    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn instantiate_vec(&mut self, type1: impl Into<String>) -> &str {
        let type1 = type1.into();
        let mangled = format!("Vec_{type1}");
        if !self.vecs.iter().any(|i| i.mangled_name == mangled) {
            self.vecs.push(Instantiation {
                container_kind: ContainerKind::Vec,
                mangled_name: mangled.clone(),
                type1,
                type2: None,
            });
        }
        &self.vecs.iter().find(|i| i.mangled_name == mangled).unwrap().mangled_name
    }

    pub fn instantiate_map(&mut self, key: impl Into<String>, value: impl Into<String>) -> &str {
        let (key, value) = (key.into(), value.into());
        let mangled = format!("Map_{key}_{value}");
        if !self.maps.iter().any(|i| i.mangled_name == mangled) {
            self.maps.push(Instantiation {
                container_kind: ContainerKind::Map,
                mangled_name: mangled.clone(),
                type1: key,
                type2: Some(value),
            });
        }
        &self.maps.iter().find(|i| i.mangled_name == mangled).unwrap().mangled_name
    }

    /// Whether `recv`'s declared type is a `Vec_*` or `Map_*` instantiation,
    /// returning its mangled type name for the UFCS container dispatch rule.
    pub fn container_type_of(&self, recv: &str) -> Option<&str> {
        let ty = self.type_of(recv)?;
        if ty.starts_with("Vec_") || ty.starts_with("Map_") {
            Some(ty)
        } else {
            None
        }
    }

    pub fn vec_instantiations(&self) -> &[Instantiation] {
        &self.vecs
    }

    pub fn map_instantiations(&self) -> &[Instantiation] {
        &self.maps
    }

    pub fn optional_instantiations(&self) -> &[Instantiation] {
        &self.optionals
    }

    pub fn clear(&mut self) {
        self.vars.clear();
        self.vecs.clear();
        self.maps.clear();
        self.optionals.clear();
    }
}
