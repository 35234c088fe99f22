//! Violations, the aggregated validation error, and typed field reads.

use std::collections::BTreeMap;
use std::fmt;

use crate::dependency::EnabledState;
use crate::uijson::{UiEntry, UiJson};
use crate::value::{DataRef, FieldValue, Uncertainty, ValueOrRef};

// ============================================================================
// Violations
// ============================================================================

/// The rule a field broke.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Constraint {
    #[error("value {value} is outside [{}, {}]", fmt_bound(.min), fmt_bound(.max))]
    OutOfRange {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    #[error("'{value}' is not one of {choices:?}")]
    NotInChoices { value: String, choices: Vec<String> },

    #[error("a value is required")]
    Required,

    #[error("expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("uncertainty must be non-negative, found {0}")]
    NegativeUncertainty(f64),

    #[error("at least one channel required")]
    NoActiveChannel,

    #[error("at least one component must be selected for a forward simulation")]
    NoActiveComponent,

    #[error("rotated meshes are not supported (rotation {0} degrees)")]
    RotatedMesh(f64),

    #[error("provide either a topography or an active model, not both")]
    ActiveCellsConflict,

    #[error("must provide either topography or active model")]
    ActiveCellsMissing,

    #[error("referenced entity {0} not found in the workspace")]
    MissingReference(DataRef),

    #[error("entity {id} is a {found}, expected {expected}")]
    WrongEntity {
        id: DataRef,
        expected: &'static str,
        found: &'static str,
    },

    #[error("depends on unknown field '{0}'")]
    UnknownDependency(String),

    #[error("dependency cycle through {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("{0}")]
    Rule(String),
}

fn fmt_bound(bound: &Option<f64>) -> String {
    match bound {
        Some(b) => b.to_string(),
        None => String::from("-"),
    }
}

/// One broken constraint on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub field: String,
    pub constraint: Constraint,
}

impl Violation {
    pub fn new(field: &str, constraint: Constraint) -> Self {
        Self {
            field: field.to_string(),
            constraint,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

/// Every violation found while building one options object.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", render(.violations))]
pub struct ValidationErrors {
    pub violations: Vec<Violation>,
}

fn render(violations: &[Violation]) -> String {
    let mut out = format!("{} validation error(s)", violations.len());
    for v in violations {
        out.push_str("\n  - ");
        out.push_str(&v.to_string());
    }
    out
}

impl ValidationErrors {
    /// Names of the offending fields, deduplicated, in report order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for v in &self.violations {
            if !out.contains(&v.field.as_str()) {
                out.push(&v.field);
            }
        }
        out
    }

    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    pub fn has(&self, constraint: &Constraint) -> bool {
        self.violations.iter().any(|v| &v.constraint == constraint)
    }
}

/// Collects violations across the validation pass.
#[derive(Debug, Default)]
pub struct Report {
    violations: Vec<Violation>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, constraint: Constraint) {
        self.violations.push(Violation::new(field, constraint));
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.violations.is_empty() {
            Ok(value)
        } else {
            Err(ValidationErrors {
                violations: self.violations,
            })
        }
    }
}

// ============================================================================
// Raw Parameters
// ============================================================================

/// Flat field -> effective value map produced by the populate phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawParams {
    values: BTreeMap<String, FieldValue>,
}

impl RawParams {
    /// Effective values of every entry of `ui` under `state`.
    pub fn from_ui(ui: &UiJson, state: &EnabledState) -> Self {
        let values = ui
            .names()
            .map(|name| (name.to_string(), state.effective_value(ui, name)))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: &str, value: FieldValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ============================================================================
// Metadata Checks
// ============================================================================

/// Check bounds and choice lists of every active form against its value.
pub fn check_metadata(ui: &UiJson, raw: &RawParams, report: &mut Report) {
    for (name, entry) in ui.iter() {
        let UiEntry::Form(form) = entry else { continue };
        let Some(value) = raw.get(name) else { continue };

        if let Some(x) = value.as_f64() {
            let below = form.min.is_some_and(|min| x < min);
            let above = form.max.is_some_and(|max| x > max);
            if below || above || x.is_nan() {
                report.push(
                    name,
                    Constraint::OutOfRange {
                        value: x,
                        min: form.min,
                        max: form.max,
                    },
                );
            }
        }

        if let (Some(choices), FieldValue::Text(text)) = (&form.choice_list, value) {
            if !choices.iter().any(|c| c == text) {
                report.push(
                    name,
                    Constraint::NotInChoices {
                        value: text.clone(),
                        choices: choices.clone(),
                    },
                );
            }
        }
    }
}

// ============================================================================
// Typed Reads
// ============================================================================

/// Typed access to [`RawParams`] that records type errors as violations.
pub struct FieldReader<'a> {
    raw: &'a RawParams,
    report: &'a mut Report,
}

impl<'a> FieldReader<'a> {
    pub fn new(raw: &'a RawParams, report: &'a mut Report) -> Self {
        Self { raw, report }
    }

    pub fn report(&mut self) -> &mut Report {
        self.report
    }

    fn value(&self, name: &str) -> &FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        self.raw.get(name).unwrap_or(&NULL)
    }

    /// Whether the field has no effective value.
    pub fn is_null(&self, name: &str) -> bool {
        self.value(name).is_null()
    }

    fn wrong_type(&mut self, name: &str, expected: &'static str, found: &FieldValue) {
        self.report.push(
            name,
            Constraint::WrongType {
                expected,
                found: found.type_name(),
            },
        );
    }

    pub fn opt_f64(&mut self, name: &str) -> Option<f64> {
        let value = self.value(name).clone();
        match value {
            FieldValue::Null => None,
            v => match v.as_f64() {
                Some(x) => Some(x),
                None => {
                    self.wrong_type(name, "number", &v);
                    None
                }
            },
        }
    }

    /// Required number; `fallback` stands in after a violation is recorded.
    pub fn f64(&mut self, name: &str, fallback: f64) -> f64 {
        match self.value(name) {
            FieldValue::Null => {
                self.report.push(name, Constraint::Required);
                fallback
            }
            _ => self.opt_f64(name).unwrap_or(fallback),
        }
    }

    /// Integer; floats count only when they carry no fraction.
    pub fn opt_i64(&mut self, name: &str) -> Option<i64> {
        let value = self.value(name).clone();
        match value {
            FieldValue::Null => None,
            v => match v.as_i64() {
                Some(i) => Some(i),
                None => {
                    self.wrong_type(name, "integer", &v);
                    None
                }
            },
        }
    }

    pub fn opt_usize(&mut self, name: &str) -> Option<usize> {
        let value = self.value(name).clone();
        match value {
            FieldValue::Null => None,
            v => match v.as_i64() {
                Some(i) if i >= 0 => Some(i as usize),
                _ => {
                    self.wrong_type(name, "non-negative integer", &v);
                    None
                }
            },
        }
    }

    pub fn usize(&mut self, name: &str, fallback: usize) -> usize {
        match self.value(name) {
            FieldValue::Null => {
                self.report.push(name, Constraint::Required);
                fallback
            }
            _ => self.opt_usize(name).unwrap_or(fallback),
        }
    }

    /// Boolean with a default for missing values.
    pub fn bool(&mut self, name: &str, default: bool) -> bool {
        let value = self.value(name).clone();
        match value {
            FieldValue::Null => default,
            FieldValue::Bool(b) => b,
            v => {
                self.wrong_type(name, "bool", &v);
                default
            }
        }
    }

    pub fn opt_text(&mut self, name: &str) -> Option<String> {
        let value = self.value(name).clone();
        match value {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s),
            v => {
                self.wrong_type(name, "text", &v);
                None
            }
        }
    }

    pub fn text(&mut self, name: &str, default: &str) -> String {
        self.opt_text(name).unwrap_or_else(|| default.to_string())
    }

    pub fn opt_ref(&mut self, name: &str) -> Option<DataRef> {
        let value = self.value(name).clone();
        match value {
            FieldValue::Null => None,
            FieldValue::Ref(r) => Some(r),
            v => {
                self.wrong_type(name, "reference", &v);
                None
            }
        }
    }

    /// Required reference; [`DataRef::NIL`] stands in after a violation.
    pub fn required_ref(&mut self, name: &str) -> DataRef {
        if self.value(name).is_null() {
            self.report.push(name, Constraint::Required);
            return DataRef::NIL;
        }
        self.opt_ref(name).unwrap_or(DataRef::NIL)
    }

    pub fn opt_value_or_ref(&mut self, name: &str) -> Option<ValueOrRef> {
        let value = self.value(name).clone();
        match value {
            FieldValue::Null => None,
            v => match ValueOrRef::from_field(&v) {
                Some(x) => Some(x),
                None => {
                    self.wrong_type(name, "number or reference", &v);
                    None
                }
            },
        }
    }

    pub fn value_or_ref(&mut self, name: &str, fallback: f64) -> ValueOrRef {
        if self.value(name).is_null() {
            self.report.push(name, Constraint::Required);
            return ValueOrRef::Value(fallback);
        }
        self.opt_value_or_ref(name)
            .unwrap_or(ValueOrRef::Value(fallback))
    }

    pub fn opt_uncertainty(&mut self, name: &str) -> Option<Uncertainty> {
        let value = self.value(name).clone();
        match value {
            FieldValue::Null => None,
            v => match Uncertainty::from_field(&v) {
                Some(Uncertainty::Constant(x)) if x < 0.0 || x.is_nan() => {
                    self.report.push(name, Constraint::NegativeUncertainty(x));
                    None
                }
                Some(u) => Some(u),
                None => {
                    self.wrong_type(name, "number or reference", &v);
                    None
                }
            },
        }
    }
}
