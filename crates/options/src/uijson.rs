//! UI-description files.
//!
//! A UI-description file is a JSON object keyed by field name. Each entry is
//! either a *form* (an object carrying the field's value together with its
//! widget metadata: label, bounds, choices, enabled flags, dependencies) or a
//! *plain* value such as `"inversion_type": "gravity"`.
//!
//! Loading is a pure parse: legacy key spellings are folded onto their
//! current names, deprecated keys are dropped, and entry order is kept so a
//! file written back out reads the same way as the one that came in.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::value::FieldValue;

/// Legacy key spellings and the field they now map to.
pub const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("coolingFactor", "cooling_factor"),
    ("coolingRate", "cooling_rate"),
    ("prctile", "percentile"),
    ("coolEpsFact", "epsilon_cooling_factor"),
];

/// Keys that older files may still carry but that no longer mean anything.
pub const DEPRECATED_KEYS: &[&str] = &[
    "z_from_topo",
    "receivers_radar_drape",
    "receivers_offset_z",
    "gps_receivers_offset",
    "output_tile_files",
    "chunk_by_rows",
    "inversion_style",
    "ga_group",
    "coolEps_q",
];

/// Map a key to its current name.
pub fn canonical_name(key: &str) -> &str {
    LEGACY_ALIASES
        .iter()
        .find(|(old, _)| *old == key)
        .map(|(_, new)| *new)
        .unwrap_or(key)
}

// ============================================================================
// Forms
// ============================================================================

/// How a field reacts to the state of the field it depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    /// Active only while the governor is active.
    Enabled,
    /// Active only while the governor is inactive.
    Disabled,
    /// Visibility only.
    Show,
    /// Visibility only.
    Hide,
    #[serde(other)]
    Other,
}

/// One form entry: a value plus the metadata the UI and validators consult.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// `None` when the key is absent; an explicit `null` is `Some(Null)`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub value: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_type: Option<DependencyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_value: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub property: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    /// UI-only keys carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A key that is present, even as `null`, deserializes to `Some`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<FieldValue>, D::Error> {
    FieldValue::deserialize(deserializer).map(Some)
}

impl UiForm {
    pub fn new(value: impl Into<FieldValue>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn main(mut self) -> Self {
        self.main = Some(true);
        self
    }

    /// Mark the form optional, with the given initial checkbox state.
    pub fn optional(mut self, enabled: bool) -> Self {
        self.optional = Some(true);
        self.enabled = Some(enabled);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn bounds(self, min: f64, max: f64) -> Self {
        self.min(min).max(max)
    }

    pub fn choices(mut self, choices: &[&str]) -> Self {
        self.choice_list = Some(choices.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn depends_on(mut self, governor: &str, kind: DependencyType) -> Self {
        self.dependency = Some(governor.to_string());
        self.dependency_type = Some(kind);
        self
    }

    /// A constant that may instead point at a data channel under `parent`.
    pub fn value_or_data(mut self, parent: &str) -> Self {
        self.is_value = Some(true);
        self.property = Some(FieldValue::Null);
        self.parent = Some(parent.to_string());
        self.association = Some(Value::from(vec!["Vertex", "Cell"]));
        self.data_type = Some(Value::from("Float"));
        self
    }

    /// A reference to a data channel under `parent`.
    pub fn data(mut self, parent: &str, association: &str, data_type: &str) -> Self {
        self.parent = Some(parent.to_string());
        self.association = Some(Value::from(association));
        self.data_type = Some(Value::from(data_type));
        self
    }

    pub fn tooltip(mut self, tooltip: &str) -> Self {
        self.tooltip = Some(tooltip.to_string());
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Value of the form ignoring any dependency.
    pub fn own_value(&self) -> FieldValue {
        if self.is_optional() && !self.is_enabled() {
            return FieldValue::Null;
        }
        if self.is_value == Some(false) {
            return self.property.clone().unwrap_or_default();
        }
        self.value.clone().unwrap_or_default()
    }

    /// Store a value, flipping `isValue` and the optional checkbox to match.
    pub fn set_value(&mut self, value: FieldValue) {
        let present = !value.is_null();
        if self.is_value.is_some() {
            match value {
                FieldValue::Ref(r) => {
                    self.is_value = Some(false);
                    self.property = Some(FieldValue::Ref(r));
                }
                other => {
                    self.is_value = Some(true);
                    self.value = Some(other);
                }
            }
        } else {
            self.value = Some(value);
        }
        if self.is_optional() {
            self.enabled = Some(present);
        }
    }

    /// Lay the keys specified in `file` over this form.
    fn overlaid(&self, file: &UiForm) -> UiForm {
        fn overlay<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if src.is_some() {
                *dst = src.clone();
            }
        }

        let mut out = self.clone();
        overlay(&mut out.value, &file.value);
        overlay(&mut out.group, &file.group);
        overlay(&mut out.main, &file.main);
        overlay(&mut out.label, &file.label);
        overlay(&mut out.optional, &file.optional);
        overlay(&mut out.enabled, &file.enabled);
        overlay(&mut out.visible, &file.visible);
        overlay(&mut out.dependency, &file.dependency);
        overlay(&mut out.dependency_type, &file.dependency_type);
        // Bounds and choices from the file may narrow the schema, never widen it.
        out.min = match (self.min, file.min) {
            (Some(lo), Some(f)) => Some(lo.max(f)),
            (lo, f) => lo.or(f),
        };
        out.max = match (self.max, file.max) {
            (Some(hi), Some(f)) => Some(hi.min(f)),
            (hi, f) => hi.or(f),
        };
        overlay(&mut out.precision, &file.precision);
        out.choice_list = match (&self.choice_list, &file.choice_list) {
            (Some(schema), Some(given)) => {
                let kept: Vec<String> = given
                    .iter()
                    .filter(|c| schema.contains(c))
                    .cloned()
                    .collect();
                Some(if kept.is_empty() { schema.clone() } else { kept })
            }
            (schema, given) => schema.clone().or_else(|| given.clone()),
        };
        overlay(&mut out.association, &file.association);
        overlay(&mut out.data_type, &file.data_type);
        overlay(&mut out.parent, &file.parent);
        overlay(&mut out.is_value, &file.is_value);
        overlay(&mut out.property, &file.property);
        overlay(&mut out.tooltip, &file.tooltip);
        for (k, v) in &file.extra {
            out.extra.insert(k.clone(), v.clone());
        }
        out
    }
}

// ============================================================================
// Entries
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum UiEntry {
    Form(UiForm),
    Plain(Value),
}

impl UiEntry {
    /// Value of the entry ignoring dependencies.
    pub fn own_value(&self) -> FieldValue {
        match self {
            UiEntry::Form(form) => form.own_value(),
            UiEntry::Plain(value) => FieldValue::from_json(value),
        }
    }

    fn is_form_object(value: &Value) -> bool {
        match value {
            Value::Object(map) => map.contains_key("value") || map.contains_key("label"),
            _ => false,
        }
    }
}

// ============================================================================
// UI Description
// ============================================================================

/// An ordered UI-description document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UiJson {
    entries: Vec<(String, UiEntry)>,
}

impl UiJson {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, UiJsonError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| UiJsonError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse from a JSON string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, UiJsonError> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, UiJsonError> {
        let Value::Object(map) = value else {
            return Err(UiJsonError::NotAnObject);
        };

        let mut ui = UiJson::new();
        for (key, raw) in map {
            if DEPRECATED_KEYS.contains(&key.as_str()) {
                debug!("dropping deprecated key '{}'", key);
                continue;
            }
            let name = canonical_name(&key).to_string();
            if name != key {
                debug!("renaming legacy key '{}' to '{}'", key, name);
            }
            let entry = if UiEntry::is_form_object(&raw) {
                let form: UiForm = serde_json::from_value(raw).map_err(|source| {
                    UiJsonError::InvalidForm {
                        field: name.clone(),
                        source,
                    }
                })?;
                UiEntry::Form(form)
            } else {
                UiEntry::Plain(raw)
            };
            ui.insert(&name, entry);
        }
        Ok(ui)
    }

    pub fn to_value(&self) -> Result<Value, UiJsonError> {
        let mut map = Map::new();
        for (name, entry) in &self.entries {
            let value = match entry {
                UiEntry::Form(form) => serde_json::to_value(form)?,
                UiEntry::Plain(value) => value.clone(),
            };
            map.insert(name.clone(), value);
        }
        Ok(Value::Object(map))
    }

    pub fn to_string_pretty(&self) -> Result<String, UiJsonError> {
        Ok(serde_json::to_string_pretty(&self.to_value()?)?)
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), UiJsonError> {
        let path = path.as_ref();
        let text = self.to_string_pretty()?;
        fs::write(path, text).map_err(|source| UiJsonError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&UiEntry> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut UiEntry> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
    }

    pub fn form(&self, name: &str) -> Option<&UiForm> {
        match self.get(name) {
            Some(UiEntry::Form(form)) => Some(form),
            _ => None,
        }
    }

    pub fn form_mut(&mut self, name: &str) -> Option<&mut UiForm> {
        match self.get_mut(name) {
            Some(UiEntry::Form(form)) => Some(form),
            _ => None,
        }
    }

    /// Entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &UiEntry)> {
        self.entries.iter().map(|(n, e)| (n.as_str(), e))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Insert or replace in place.
    pub fn insert(&mut self, name: &str, entry: UiEntry) {
        match self.get_mut(name) {
            Some(existing) => *existing = entry,
            None => self.entries.push((name.to_string(), entry)),
        }
    }

    pub fn insert_form(&mut self, name: &str, form: UiForm) {
        self.insert(name, UiEntry::Form(form));
    }

    pub fn insert_plain(&mut self, name: &str, value: impl Into<Value>) {
        self.insert(name, UiEntry::Plain(value.into()));
    }

    pub fn remove(&mut self, name: &str) -> Option<UiEntry> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// Value of an entry ignoring dependencies; `Null` when absent.
    pub fn value_of(&self, name: &str) -> FieldValue {
        self.get(name).map(UiEntry::own_value).unwrap_or_default()
    }

    /// Set the value of an existing entry. Returns `false` for unknown names.
    pub fn set_value(&mut self, name: &str, value: FieldValue) -> bool {
        match self.get_mut(name) {
            Some(UiEntry::Form(form)) => {
                form.set_value(value);
                true
            }
            Some(UiEntry::Plain(plain)) => {
                *plain = value.to_json();
                true
            }
            None => false,
        }
    }

    pub fn inversion_type(&self) -> Option<String> {
        self.value_of("inversion_type").as_str().map(str::to_string)
    }

    pub fn forward_only(&self) -> bool {
        self.value_of("forward_only").as_bool().unwrap_or(false)
    }

    pub fn title(&self) -> Option<String> {
        self.value_of("title").as_str().map(str::to_string)
    }

    /// Path of the external store the file points at.
    pub fn geoh5(&self) -> Option<PathBuf> {
        self.value_of("geoh5").as_str().map(PathBuf::from)
    }

    /// Lay `file` over this document, which acts as the schema.
    ///
    /// Schema order is kept. Keys unknown to the schema are ignored; schema
    /// entries missing from the file keep their defaults.
    pub fn merged(&self, file: &UiJson) -> UiJson {
        let mut out = self.clone();
        for (name, file_entry) in file.iter() {
            let Some(schema_entry) = out.get_mut(name) else {
                debug!("ignoring field '{}' unknown to the schema", name);
                continue;
            };
            let merged = match (&*schema_entry, file_entry) {
                (UiEntry::Form(schema), UiEntry::Form(over)) => UiEntry::Form(schema.overlaid(over)),
                (UiEntry::Form(schema), UiEntry::Plain(value)) => {
                    let mut form = schema.clone();
                    form.set_value(FieldValue::from_json(value));
                    UiEntry::Form(form)
                }
                (UiEntry::Plain(_), UiEntry::Form(over)) => UiEntry::Plain(over.own_value().to_json()),
                (UiEntry::Plain(_), UiEntry::Plain(value)) => UiEntry::Plain(value.clone()),
            };
            *schema_entry = merged;
        }
        out
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UiJsonError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("a UI description must be a JSON object")]
    NotAnObject,

    #[error("invalid form for '{field}': {source}")]
    InvalidForm {
        field: String,
        source: serde_json::Error,
    },
}
