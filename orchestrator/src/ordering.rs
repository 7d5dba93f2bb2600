//! Construction ordering and constructor-level cycle detection.
//!
//! Only constructor arguments are edges here. Wiring references may form
//! cycles (TroveManager and BorrowerOperations point at each other); those are
//! resolved by running wiring after every module exists, not by this sort.

use std::collections::BTreeMap;

use crate::errors::DeployError;
use crate::registry::ModuleDescriptor;
use crate::types::{ModuleId, TableKind};

/// Modules whose constructor dependencies are all satisfied by earlier levels.
///
/// Modules inside one level do not depend on each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub modules: Vec<ModuleId>,
}

/// Compute construction levels using Kahn's algorithm.
///
/// Within a level modules keep their table order, so the result is
/// deterministic for a given table.
pub fn construction_levels(
    kind: TableKind,
    descriptors: &[ModuleDescriptor],
) -> Result<Vec<Level>, DeployError> {
    let position: BTreeMap<ModuleId, usize> = descriptors
        .iter()
        .enumerate()
        .map(|(index, d)| (d.id, index))
        .collect();

    let mut in_degree = vec![0usize; descriptors.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];

    for (index, descriptor) in descriptors.iter().enumerate() {
        let mut seen = Vec::new();
        for dependency in descriptor.constructor_dependencies() {
            let Some(&dep_index) = position.get(&dependency) else {
                return Err(DeployError::UnknownConstructorDependency {
                    module: descriptor.id,
                    dependency,
                    table: kind,
                });
            };
            // the same module passed twice is still one edge
            if seen.contains(&dep_index) {
                continue;
            }
            seen.push(dep_index);
            in_degree[index] += 1;
            dependents[dep_index].push(index);
        }
    }

    let mut levels = Vec::new();
    let mut current: Vec<usize> = (0..descriptors.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut processed = 0;

    while !current.is_empty() {
        current.sort_unstable();
        processed += current.len();

        let mut next = Vec::new();
        for &index in &current {
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }

        levels.push(Level {
            modules: current.iter().map(|&i| descriptors[i].id).collect(),
        });
        current = next;
    }

    if processed != descriptors.len() {
        // leftovers also include modules that merely depend on a cycle
        let blocked: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
        let involved = descriptors
            .iter()
            .enumerate()
            .filter(|(i, _)| blocked[*i] && on_cycle(*i, &dependents, &blocked))
            .map(|(_, d)| d.id)
            .collect();
        return Err(DeployError::CyclicConstructorDependency { involved });
    }

    Ok(levels)
}

/// Whether `start` reaches itself through blocked modules.
fn on_cycle(start: usize, dependents: &[Vec<usize>], blocked: &[bool]) -> bool {
    let mut visited = vec![false; dependents.len()];
    let mut stack = dependents[start].clone();
    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if !blocked[node] || visited[node] {
            continue;
        }
        visited[node] = true;
        stack.extend(&dependents[node]);
    }
    false
}

/// Flattened construction order.
pub fn construction_order(
    kind: TableKind,
    descriptors: &[ModuleDescriptor],
) -> Result<Vec<ModuleId>, DeployError> {
    Ok(construction_levels(kind, descriptors)?
        .into_iter()
        .flat_map(|level| level.modules)
        .collect())
}
