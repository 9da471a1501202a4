// src/adders/mod.rs

//! # Built-in Add-ons
//!
//! The catalog shipped with the binary. Each add-on module exposes a
//! `definition()` and, when it has a verification matrix, a `tests()`.

pub mod drizzle;
pub mod vitest;

use crate::core::adder::AdderDefinition;
use crate::testing::definition::TestDefinition;

/// Every built-in add-on, sorted by id.
pub fn catalog() -> Vec<AdderDefinition> {
    vec![drizzle::definition(), vitest::definition()]
}

/// The verification matrix of the add-on named `name` (id or alias).
pub fn test_definition(name: &str) -> Option<TestDefinition> {
    let adder = catalog().into_iter().find(|adder| adder.is_named(name))?;
    match adder.id {
        "drizzle" => Some(drizzle::tests()),
        "vitest" => Some(vitest::tests()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dependency_graph;

    #[test]
    fn test_catalog_is_consistent() {
        let catalog = catalog();
        let ids: Vec<&str> = catalog.iter().map(|adder| adder.id).collect();
        assert_eq!(ids, vec!["drizzle", "vitest"]);
        for adder in &catalog {
            assert!(adder.options.check().is_ok(), "{}", adder.id);
            assert!(test_definition(adder.id).is_some(), "{}", adder.id);
        }
        assert!(test_definition("unknown").is_none());
        assert!(dependency_graph::resolve_order(&catalog, &ids).is_ok());
    }
}
