// src/core/dependency_graph.rs

//! Orders requested add-ons so that every add-on comes after the ones it
//! depends on. Dependencies that were not requested are pulled in from the
//! catalog. The graph is rebuilt on every call; nothing is cached.

use crate::core::adder::AdderDefinition;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Add-ons that depend on each other in a loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Dependency cycle between add-ons: {}", .members.join(" -> "))]
pub struct CycleError {
    /// Ids on the cycle, in dependency order, starting from the smallest id.
    pub members: Vec<String>,
}

/// Errors raised while ordering add-ons.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A requested add-on or a declared dependency is not in the catalog.
    #[error("Unknown add-on '{name}'{}.", required_by_suffix(.required_by))]
    UnknownAdder {
        /// The unknown id.
        name: String,
        /// The add-on declaring the dependency, if it was not requested directly.
        required_by: Option<String>,
    },
    /// The dependencies form a cycle.
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    required_by
        .as_ref()
        .map(|r| format!(" (required by '{r}')"))
        .unwrap_or_default()
}

/// Finds an add-on by id or alias.
pub fn find<'a>(catalog: &'a [AdderDefinition], name: &str) -> Option<&'a AdderDefinition> {
    catalog.iter().find(|adder| adder.is_named(name))
}

/// Resolves `requested` (ids or aliases) into an application order.
///
/// Among add-ons whose dependencies are all placed, the one requested first
/// goes first; pulled-in dependencies rank after every requested add-on, in
/// discovery order.
pub fn resolve_order<'a, S: AsRef<str>>(
    catalog: &'a [AdderDefinition],
    requested: &[S],
) -> Result<Vec<&'a AdderDefinition>, GraphError> {
    // --- 1. Resolve names, keeping the first occurrence ---
    let mut rank: HashMap<&'a str, usize> = HashMap::new();
    let mut nodes: Vec<&'a AdderDefinition> = Vec::new();
    for name in requested {
        let adder = find(catalog, name.as_ref()).ok_or_else(|| GraphError::UnknownAdder {
            name: name.as_ref().to_string(),
            required_by: None,
        })?;
        if !rank.contains_key(adder.id) {
            rank.insert(adder.id, nodes.len());
            nodes.push(adder);
        }
    }

    // --- 2. Pull in undeclared dependencies ---
    let mut cursor = 0;
    while let Some(adder) = nodes.get(cursor).copied() {
        for dependency in &adder.depends_on {
            let found = find(catalog, dependency).ok_or_else(|| GraphError::UnknownAdder {
                name: dependency.to_string(),
                required_by: Some(adder.id.to_string()),
            })?;
            if !rank.contains_key(found.id) {
                log::debug!("Pulling in '{}' (required by '{}')", found.id, adder.id);
                rank.insert(found.id, nodes.len());
                nodes.push(found);
            }
        }
        cursor += 1;
    }

    // --- 3. Kahn's algorithm, ready set ordered by rank ---
    let by_id: HashMap<&str, &'a AdderDefinition> = nodes.iter().map(|a| (a.id, *a)).collect();
    let dependencies_of = |adder: &AdderDefinition| -> BTreeSet<&'a str> {
        adder
            .depends_on
            .iter()
            .filter_map(|d| find(catalog, d).map(|found| found.id))
            .collect()
    };

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
    for adder in &nodes {
        let deps = dependencies_of(adder);
        in_degree.insert(adder.id, deps.len());
        for dep in deps {
            reverse.entry(dep).or_default().push(adder.id);
        }
    }

    let mut ready: BTreeSet<(usize, &str)> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .filter_map(|(id, _)| Some((*rank.get(id)?, *id)))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some((_, id)) = ready.pop_first() {
        if let Some(adder) = by_id.get(id) {
            order.push(*adder);
        }
        for dependent in reverse.get(id).into_iter().flatten() {
            let Some(degree) = in_degree.get_mut(dependent) else {
                continue;
            };
            *degree -= 1;
            if *degree == 0
                && let Some(r) = rank.get(dependent)
            {
                ready.insert((*r, *dependent));
            }
        }
    }

    // --- 4. Anything left is on (or behind) a cycle ---
    if order.len() < nodes.len() {
        let remaining: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(id, _)| *id)
            .collect();
        let members = find_cycle(&remaining, |id| {
            by_id
                .get(id)
                .map(|adder| dependencies_of(adder).into_iter().collect())
                .unwrap_or_default()
        });
        return Err(CycleError { members }.into());
    }

    Ok(order)
}

/// Walks dependency edges from the smallest remaining id until a node repeats.
/// Every remaining node has an unplaced dependency, so the walk always closes.
fn find_cycle<'a>(remaining: &BTreeSet<&'a str>, dependencies: impl Fn(&str) -> Vec<&'a str>) -> Vec<String> {
    let Some(start) = remaining.first().copied() else {
        return Vec::new();
    };
    let mut path: Vec<&str> = vec![start];
    let mut current = start;
    loop {
        let Some(next) = dependencies(current)
            .into_iter()
            .find(|d| remaining.contains(d))
        else {
            return path.iter().map(|s| s.to_string()).collect();
        };
        if let Some(position) = path.iter().position(|p| *p == next) {
            let mut cycle: Vec<String> = path
                .get(position..)
                .unwrap_or_default()
                .iter()
                .map(|s| s.to_string())
                .collect();
            // Rotate so the report is stable regardless of the starting node.
            if let Some(min) = cycle.iter().enumerate().min_by(|a, b| a.1.cmp(b.1)).map(|(i, _)| i) {
                cycle.rotate_left(min);
            }
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn adder(id: &'static str, deps: &[&'static str]) -> AdderDefinition {
        AdderDefinition {
            depends_on: deps.to_vec(),
            ..AdderDefinition::new(id, id, "")
        }
    }

    fn ids(order: &[&AdderDefinition]) -> Vec<&'static str> {
        order.iter().map(|a| a.id).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let catalog = vec![adder("a", &["b"]), adder("b", &[]), adder("c", &[])];
        assert_eq!(ids(&resolve_order(&catalog, &["c", "a", "b"]).unwrap()), vec!["c", "b", "a"]);
        assert_eq!(ids(&resolve_order(&catalog, &["a", "c"]).unwrap()), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_request_order_breaks_ties() {
        let catalog = vec![adder("x", &[]), adder("y", &[]), adder("z", &[])];
        assert_eq!(ids(&resolve_order(&catalog, &["z", "x", "y", "x"]).unwrap()), vec!["z", "x", "y"]);
    }

    #[test]
    fn test_aliases_are_accepted() {
        let mut tailwind = adder("tailwindcss", &[]);
        tailwind.alias = Some("tailwind");
        let catalog = vec![tailwind, adder("forms", &["tailwind"])];
        assert_eq!(ids(&resolve_order(&catalog, &["forms"]).unwrap()), vec!["tailwindcss", "forms"]);
    }

    #[test]
    fn test_cycles_are_reported() {
        let catalog = vec![adder("a", &["b"]), adder("b", &["c"]), adder("c", &["a"]), adder("d", &["a"])];
        let err = resolve_order(&catalog, &["d"]).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle(CycleError {
                members: vec!["a".into(), "b".into(), "c".into()]
            })
        );
        assert_eq!(err.to_string(), "Dependency cycle between add-ons: a -> b -> c");

        let selfish = vec![adder("s", &["s"])];
        assert!(matches!(resolve_order(&selfish, &["s"]), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_unknown_adders() {
        let catalog = vec![adder("a", &["ghost"])];
        assert_eq!(
            resolve_order(&catalog, &["nope"]).unwrap_err().to_string(),
            "Unknown add-on 'nope'."
        );
        assert_eq!(
            resolve_order(&catalog, &["a"]).unwrap_err(),
            GraphError::UnknownAdder {
                name: "ghost".into(),
                required_by: Some("a".into())
            }
        );
    }
}
