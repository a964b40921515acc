//! Step dependency graph validation.

use super::{StepId, WorkflowDomainError, WorkflowStep};
use std::collections::{HashMap, HashSet, VecDeque};

/// Validates a step graph: unique ids, known dependencies, and no cycles.
///
/// Cycle detection is Kahn's algorithm: repeatedly remove steps without
/// unprocessed dependencies; anything left over sits on a cycle.
pub(crate) fn validate_step_graph(steps: &[WorkflowStep]) -> Result<(), WorkflowDomainError> {
    let mut known: HashSet<&StepId> = HashSet::with_capacity(steps.len());
    for step in steps {
        if !known.insert(step.id()) {
            return Err(WorkflowDomainError::DuplicateStepId(step.id().clone()));
        }
    }

    let mut in_degree: HashMap<&StepId, usize> = HashMap::with_capacity(steps.len());
    let mut dependents: HashMap<&StepId, Vec<&StepId>> = HashMap::new();
    for step in steps {
        in_degree.entry(step.id()).or_insert(0);
        for dependency in step.depends_on() {
            if !known.contains(dependency) {
                return Err(WorkflowDomainError::UnknownDependency {
                    step: step.id().clone(),
                    dependency: dependency.clone(),
                });
            }
            *in_degree.entry(step.id()).or_insert(0) += 1;
            dependents.entry(dependency).or_default().push(step.id());
        }
    }

    let mut queue: VecDeque<&StepId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut processed = 0;
    while let Some(id) = queue.pop_front() {
        processed += 1;
        for dependent in dependents.get(id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if processed < steps.len() {
        let on_cycle = in_degree
            .iter()
            .find(|(_, degree)| **degree > 0)
            .map(|(id, _)| (*id).clone());
        if let Some(id) = on_cycle {
            return Err(WorkflowDomainError::DependencyCycle(id));
        }
    }
    Ok(())
}
