//! Enable/disable dependency graph between fields.
//!
//! Every form may name a governing field through `dependency` and say how it
//! reacts through `dependencyType`. The graph is built once per resolution and
//! evaluated in topological order (Kahn), so a field's state is always
//! computed after its governor's.

use std::collections::{HashMap, VecDeque};

use crate::uijson::{DependencyType, UiEntry, UiJson};
use crate::value::FieldValue;

/// Structural problem found while building the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphIssue {
    /// `field` depends on `governor`, which the document does not define.
    UnknownGovernor { field: String, governor: String },
    /// Fields that depend on each other in a loop.
    Cycle { fields: Vec<String> },
}

/// Directed graph governor -> dependent field.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Evaluation order: every field after its governor.
    order: Vec<String>,
    /// Resolvable governor of each dependent field.
    governors: HashMap<String, (String, DependencyType)>,
}

impl DependencyGraph {
    /// Build the graph for a document, reporting unknown governors and cycles.
    pub fn build(ui: &UiJson) -> (Self, Vec<GraphIssue>) {
        let mut issues = Vec::new();
        let mut governors = HashMap::new();
        let names: Vec<&str> = ui.names().collect();

        for (name, entry) in ui.iter() {
            let UiEntry::Form(form) = entry else { continue };
            let Some(governor) = form.dependency.as_deref().filter(|g| !g.is_empty()) else {
                continue;
            };
            if !ui.contains(governor) {
                issues.push(GraphIssue::UnknownGovernor {
                    field: name.to_string(),
                    governor: governor.to_string(),
                });
                continue;
            }
            let kind = form.dependency_type.unwrap_or(DependencyType::Enabled);
            governors.insert(name.to_string(), (governor.to_string(), kind));
        }

        // Kahn's algorithm; each node has at most one incoming edge.
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut in_degree: HashMap<&str, usize> = names.iter().map(|n| (*n, 0)).collect();
        for name in &names {
            if let Some((governor, _)) = governors.get(*name) {
                children.entry(governor.as_str()).or_default().push(*name);
                *in_degree.entry(*name).or_default() += 1;
            }
        }

        let mut queue: VecDeque<&str> = names
            .iter()
            .copied()
            .filter(|n| in_degree.get(n).copied().unwrap_or(0) == 0)
            .collect();
        let mut order = Vec::with_capacity(names.len());
        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            for child in children.get(node).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(child) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }

        if order.len() < names.len() {
            let stuck: Vec<String> = names
                .iter()
                .filter(|n| !order.iter().any(|o| o == *n))
                .map(|n| n.to_string())
                .collect();
            for name in &stuck {
                governors.remove(name);
            }
            order.extend(stuck.iter().cloned());
            issues.push(GraphIssue::Cycle { fields: stuck });
        }

        (Self { order, governors }, issues)
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn governor_of(&self, field: &str) -> Option<&(String, DependencyType)> {
        self.governors.get(field)
    }

    /// Evaluate which fields are active for the current values of `ui`.
    pub fn resolve(&self, ui: &UiJson) -> EnabledState {
        let mut active: HashMap<String, bool> = HashMap::with_capacity(self.order.len());
        let mut on: HashMap<String, bool> = HashMap::with_capacity(self.order.len());

        for name in &self.order {
            let Some(entry) = ui.get(name) else { continue };

            let governed = match self.governors.get(name) {
                Some((governor, DependencyType::Enabled)) => on.get(governor).copied().unwrap_or(true),
                Some((governor, DependencyType::Disabled)) => !on.get(governor).copied().unwrap_or(true),
                _ => true,
            };

            let is_active = match entry {
                UiEntry::Form(form) => governed && (!form.is_optional() || form.is_enabled()),
                UiEntry::Plain(_) => true,
            };

            let is_on = is_active
                && match entry.own_value() {
                    FieldValue::Bool(b) => b,
                    FieldValue::Null => false,
                    _ => true,
                };

            active.insert(name.clone(), is_active);
            on.insert(name.clone(), is_on);
        }

        EnabledState { active, on }
    }
}

/// Active/inactive state of every field after resolution.
#[derive(Debug, Clone, Default)]
pub struct EnabledState {
    active: HashMap<String, bool>,
    on: HashMap<String, bool>,
}

impl EnabledState {
    /// Whether the field takes part in the run. Unknown fields count as active.
    pub fn is_active(&self, field: &str) -> bool {
        self.active.get(field).copied().unwrap_or(true)
    }

    /// Whether the field, as a governor, switches its dependents on.
    pub fn is_on(&self, field: &str) -> bool {
        self.on.get(field).copied().unwrap_or(false)
    }

    /// Effective value of a field: `Null` when inactive.
    pub fn effective_value(&self, ui: &UiJson, field: &str) -> FieldValue {
        if !self.is_active(field) {
            return FieldValue::Null;
        }
        ui.value_of(field)
    }
}
