//! Assembles compiled steps into a dependency graph: rejects duplicate
//! ids, resolves `depends_on` edges, detects cycles via DFS, and
//! computes a deterministic topological order. The Kahn's-algorithm
//! shape, the lexicographic-ready-queue tie-break and the cycle-bail
//! path are carried over from the teacher's package-publish scheduler,
//! generalized from package names to step ids and from a flat
//! dependency list to the full `depends_on` edge set.

use std::collections::{BTreeMap, BTreeSet};

use preflight_types::{Error, ErrorKind, StepId};

use crate::step::Step;

/// A built, validated dependency graph over a set of compiled steps.
/// `order()` gives the deterministic topological order every later
/// stage (plan, apply, report assembly) iterates in.
pub struct StepGraph {
    steps: BTreeMap<StepId, Box<dyn Step>>,
    order: Vec<StepId>,
}

impl StepGraph {
    /// Builds a graph from the given steps, failing fast on the first
    /// structural problem: duplicate id, unknown dependency, or cycle.
    pub fn build(steps: Vec<Box<dyn Step>>) -> Result<Self, Error> {
        let mut by_id: BTreeMap<StepId, Box<dyn Step>> = BTreeMap::new();
        for step in steps {
            let id = step.id().clone();
            if by_id.contains_key(&id) {
                return Err(Error::new(ErrorKind::DuplicateStep)
                    .with_step_id(id)
                    .with_message("duplicate step id"));
            }
            by_id.insert(id, step);
        }

        for (id, step) in &by_id {
            for dep in step.depends_on() {
                if !by_id.contains_key(dep) {
                    return Err(Error::new(ErrorKind::UnknownDependency)
                        .with_step_id(id.clone())
                        .with_message(format!("depends on unknown step `{dep}`")));
                }
            }
        }

        if let Some(cycle) = find_cycle(&by_id) {
            let path = cycle
                .iter()
                .map(StepId::as_str)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(Error::new(ErrorKind::DependencyCycle)
                .with_message(format!("dependency cycle detected: [{path}]")));
        }

        let order = topo_sort(&by_id)?;

        Ok(Self { steps: by_id, order })
    }

    pub fn order(&self) -> &[StepId] {
        &self.order
    }

    pub fn get(&self, id: &StepId) -> Option<&dyn Step> {
        self.steps.get(id).map(|b| b.as_ref())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All ids (transitively) depending on `root`, computed by walking
    /// `depends_on` edges forward. Used by the scheduler to skip a
    /// failed step's descendants.
    pub fn descendants_of(&self, root: &StepId) -> BTreeSet<StepId> {
        let mut dependents_of: BTreeMap<&StepId, Vec<&StepId>> = BTreeMap::new();
        for (id, step) in &self.steps {
            for dep in step.depends_on() {
                dependents_of.entry(dep).or_default().push(id);
            }
        }

        let mut result = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if let Some(children) = dependents_of.get(current) {
                for child in children {
                    if result.insert((*child).clone()) {
                        stack.push(child);
                    }
                }
            }
        }
        result
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

fn find_cycle(by_id: &BTreeMap<StepId, Box<dyn Step>>) -> Option<Vec<StepId>> {
    let mut marks: BTreeMap<StepId, Mark> = by_id.keys().cloned().map(|id| (id, Mark::Unvisited)).collect();
    let mut stack: Vec<StepId> = Vec::new();

    for start in by_id.keys() {
        if marks[start] == Mark::Unvisited {
            if let Some(cycle) = visit(start, by_id, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    id: &StepId,
    by_id: &BTreeMap<StepId, Box<dyn Step>>,
    marks: &mut BTreeMap<StepId, Mark>,
    stack: &mut Vec<StepId>,
) -> Option<Vec<StepId>> {
    marks.insert(id.clone(), Mark::InProgress);
    stack.push(id.clone());

    for dep in by_id[id].depends_on() {
        match marks.get(dep).copied() {
            Some(Mark::InProgress) => {
                let start = stack.iter().position(|s| s == dep).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            Some(Mark::Unvisited) => {
                if let Some(cycle) = visit(dep, by_id, marks, stack) {
                    return Some(cycle);
                }
            }
            _ => {}
        }
    }

    stack.pop();
    marks.insert(id.clone(), Mark::Done);
    None
}

fn topo_sort(by_id: &BTreeMap<StepId, Box<dyn Step>>) -> Result<Vec<StepId>, Error> {
    let mut indegree: BTreeMap<StepId, usize> = BTreeMap::new();
    let mut dependents_of: BTreeMap<StepId, Vec<StepId>> = BTreeMap::new();

    for (id, step) in by_id {
        indegree.entry(id.clone()).or_insert(0);
        for dep in step.depends_on() {
            *indegree.entry(id.clone()).or_insert(0) += 1;
            dependents_of.entry(dep.clone()).or_default().push(id.clone());
        }
    }

    let mut ready: BTreeSet<StepId> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| id.clone())
        .collect();

    let mut out = Vec::with_capacity(by_id.len());
    while let Some(id) = ready.iter().next().cloned() {
        ready.remove(&id);
        out.push(id.clone());

        if let Some(children) = dependents_of.get(&id) {
            for child in children {
                let degree = indegree.get_mut(child).expect("known step");
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    ready.insert(child.clone());
                }
            }
        }
    }

    if out.len() != by_id.len() {
        return Err(Error::new(ErrorKind::DependencyCycle)
            .with_message("dependency cycle detected during topological sort"));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExplainContext;
    use preflight_types::{Diff, Explanation, StepStatus};

    struct FakeStep {
        id: StepId,
        deps: Vec<StepId>,
    }

    impl Step for FakeStep {
        fn id(&self) -> &StepId {
            &self.id
        }
        fn depends_on(&self) -> &[StepId] {
            &self.deps
        }
        fn check(&self, _ctx: &crate::context::RunContext<'_>) -> preflight_types::Result<StepStatus> {
            Ok(StepStatus::Satisfied)
        }
        fn plan(&self, _ctx: &crate::context::RunContext<'_>) -> preflight_types::Result<Diff> {
            Ok(Diff::none("test", self.id.as_str()))
        }
        fn apply(&self, _ctx: &crate::context::RunContext<'_>) -> preflight_types::Result<()> {
            Ok(())
        }
        fn explain(&self, _ctx: &ExplainContext) -> Explanation {
            Explanation::default()
        }
    }

    fn step(id: &str, deps: &[&str]) -> Box<dyn Step> {
        Box::new(FakeStep {
            id: StepId::new(id).unwrap(),
            deps: deps.iter().map(|d| StepId::new(*d).unwrap()).collect(),
        })
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let graph = StepGraph::build(vec![
            step("brew:formula:rust", &[]),
            step("cargo:crate:ripgrep", &["brew:formula:rust"]),
        ])
        .unwrap();
        let order = graph.order();
        let rust_idx = order.iter().position(|i| i.as_str() == "brew:formula:rust").unwrap();
        let cargo_idx = order
            .iter()
            .position(|i| i.as_str() == "cargo:crate:ripgrep")
            .unwrap();
        assert!(rust_idx < cargo_idx);
    }

    #[test]
    fn unrelated_steps_are_ordered_lexicographically() {
        let graph = StepGraph::build(vec![step("brew:formula:zzz", &[]), step("brew:formula:aaa", &[])]).unwrap();
        assert_eq!(graph.order()[0].as_str(), "brew:formula:aaa");
        assert_eq!(graph.order()[1].as_str(), "brew:formula:zzz");
    }

    #[test]
    fn duplicate_step_id_is_rejected() {
        let result = StepGraph::build(vec![step("brew:formula:a", &[]), step("brew:formula:a", &[])]);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DuplicateStep);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let result = StepGraph::build(vec![step("brew:formula:a", &["brew:formula:ghost"])]);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnknownDependency);
    }

    #[test]
    fn cycle_is_detected() {
        let result = StepGraph::build(vec![step("a:k:a", &["a:k:b"]), step("a:k:b", &["a:k:a"])]);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DependencyCycle);
    }

    #[test]
    fn descendants_of_includes_transitive_dependents() {
        let graph = StepGraph::build(vec![
            step("a:k:a", &[]),
            step("a:k:b", &["a:k:a"]),
            step("a:k:c", &["a:k:b"]),
        ])
        .unwrap();
        let descendants = graph.descendants_of(&StepId::new("a:k:a").unwrap());
        assert!(descendants.contains(&StepId::new("a:k:b").unwrap()));
        assert!(descendants.contains(&StepId::new("a:k:c").unwrap()));
    }
}
