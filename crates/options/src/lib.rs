//! Typed, validated options for geophysical forward and inversion runs.
//!
//! Runs are described by UI-description files. This crate loads them, resolves
//! the enable/disable dependencies between fields, validates the result
//! against the built-in schema of each survey kind and produces an immutable
//! [`InversionOptions`]. It also expands parameter sweeps into batches of
//! concrete UI-description files, and validates the companion workflows
//! (sensitivity cutoff, homogeneous inversion, plate simulation).

pub mod catalog;
pub mod dependency;
pub mod groups;
pub mod options;
pub mod survey;
pub mod sweep;
pub mod uijson;
pub mod validation;
pub mod value;
pub mod workflows;

pub use catalog::{EntityCatalog, EntityInfo, EntityKind, MemoryCatalog, UncheckedCatalog};
pub use options::{template, InversionOptions, OptionsBuilder, RunMode};
pub use survey::SurveyKind;
pub use sweep::{SweepError, SweepFile};
pub use uijson::{UiJson, UiJsonError};
pub use validation::{Constraint, ValidationErrors, Violation};
pub use value::{DataRef, FieldValue};
pub use workflows::{workflow_template, WorkflowBuilder, WorkflowKind, WorkflowOptions};

#[cfg(test)]
mod _tests_groups;
#[cfg(test)]
mod _tests_options;
#[cfg(test)]
mod _tests_uijson;
#[cfg(test)]
mod _tests_workflows;
