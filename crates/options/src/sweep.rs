//! Parameter sweeps over UI-description files.
//!
//! A sweep file is TOML with a `[sweep]` section naming a base UI-description
//! file and an ordered list of ranges:
//!
//! ```toml
//! [sweep]
//! base = "gravity.ui.json"
//! output_dir = "runs"
//!
//! [[sweep.ranges]]
//! field = "chi_factor"
//! start = 0.5
//! end = 2.0
//! n = 4
//!
//! [[sweep.ranges]]
//! field = "max_global_iterations"
//! values = [20, 50]
//! ```
//!
//! Expansion is the Cartesian product of the ranges, first range outermost,
//! values ascending within each range.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dependency::DependencyGraph;
use crate::uijson::{UiEntry, UiJson, UiJsonError};
use crate::value::FieldValue;

/// File written next to the runs, mapping run name to swept values.
pub const LOOKUP_FILE: &str = "lookup.json";

/// Upper bound on the values of one range and on the runs of one sweep.
pub const MAX_RUNS: usize = 100_000;

// ============================================================================
// Sweep Files
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFile {
    pub sweep: SweepSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSection {
    /// Base UI-description file.
    pub base: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Worker threads when the runs are executed (None = physical cores).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    #[serde(default)]
    pub ranges: Vec<SweepRange>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("sweep")
}

/// One swept field, given as exactly one of `start/end/n`, `min/max/step`
/// or `values`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SweepRange {
    pub field: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

impl SweepRange {
    /// Inclusive linear spacing of `n` values.
    pub fn linspace(field: &str, start: f64, end: f64, n: usize) -> Self {
        Self {
            field: field.to_string(),
            start: Some(start),
            end: Some(end),
            n: Some(n),
            ..Default::default()
        }
    }

    pub fn stepped(field: &str, min: f64, max: f64, step: f64) -> Self {
        Self {
            field: field.to_string(),
            min: Some(min),
            max: Some(max),
            step: Some(step),
            ..Default::default()
        }
    }

    pub fn list(field: &str, values: Vec<Value>) -> Self {
        Self {
            field: field.to_string(),
            values: Some(values),
            ..Default::default()
        }
    }

    fn invalid(&self, reason: &str) -> SweepError {
        SweepError::InvalidRange {
            field: self.field.clone(),
            reason: reason.to_string(),
        }
    }

    fn too_many(&self) -> SweepError {
        self.invalid(&format!("more than {} values", MAX_RUNS))
    }

    /// Values of the range, ascending and without duplicates.
    pub fn values(&self) -> Result<Vec<FieldValue>, SweepError> {
        let linear = (self.start, self.end, self.n);
        let stepped = (self.min, self.max, self.step);
        let forms = [
            linear != (None, None, None),
            stepped != (None, None, None),
            self.values.is_some(),
        ];
        if forms.iter().filter(|f| **f).count() != 1 {
            return Err(self.invalid("give exactly one of start/end/n, min/max/step or values"));
        }

        let mut out: Vec<FieldValue> = match (linear, stepped, &self.values) {
            ((Some(start), Some(end), Some(n)), _, _) => match n {
                _ if !start.is_finite() || !end.is_finite() => {
                    return Err(self.invalid("start and end must be finite"))
                }
                0 => return Err(self.invalid("n must be at least 1")),
                n if n > MAX_RUNS => return Err(self.too_many()),
                1 => vec![FieldValue::Float(start)],
                _ => {
                    let delta = (end - start) / (n - 1) as f64;
                    (0..n)
                        .map(|i| FieldValue::Float(start + delta * i as f64))
                        .collect()
                }
            },
            (_, (Some(min), Some(max), Some(step)), _) => {
                if !min.is_finite() || !max.is_finite() {
                    return Err(self.invalid("min and max must be finite"));
                }
                if !step.is_finite() || step <= 0.0 {
                    return Err(self.invalid("step must be positive"));
                }
                if max < min {
                    return Err(self.invalid("max is below min"));
                }
                let span = ((max - min) / step + 1e-9).floor();
                if !span.is_finite() || span >= MAX_RUNS as f64 {
                    return Err(self.too_many());
                }
                let count = span as usize + 1;
                (0..count)
                    .map(|i| FieldValue::Float(min + step * i as f64))
                    .collect()
            }
            (_, _, Some(values)) => {
                if values.is_empty() {
                    return Err(self.invalid("values is empty"));
                }
                if values.len() > MAX_RUNS {
                    return Err(self.too_many());
                }
                values.iter().map(FieldValue::from_json).collect()
            }
            _ => return Err(self.invalid("incomplete range")),
        };

        out.sort_by(|a, b| a.total_cmp(b));
        out.dedup();
        Ok(out)
    }
}

impl SweepFile {
    /// Parse a sweep file; text without a `[sweep]` section is rejected.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, SweepError> {
        let table: toml::Table = content.parse()?;
        if !table.contains_key("sweep") {
            return Err(SweepError::NotSweepFile);
        }
        Ok(toml::Value::Table(table).try_into()?)
    }

    /// Load a sweep file; relative paths resolve against its directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SweepError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut file = Self::from_str(&content)?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        if file.sweep.base.is_relative() {
            file.sweep.base = dir.join(&file.sweep.base);
        }
        if file.sweep.output_dir.is_relative() {
            file.sweep.output_dir = dir.join(&file.sweep.output_dir);
        }
        Ok(file)
    }

    pub fn to_toml(&self) -> Result<String, SweepError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), SweepError> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Stem used to name the runs: the base file name without `.ui.json`.
    pub fn stem(&self) -> String {
        run_stem(&self.sweep.base)
    }

    /// Load the base file and expand every range.
    pub fn expand(&self) -> Result<Vec<ExpandedRun>, SweepError> {
        let base = UiJson::from_file(&self.sweep.base)?;
        expand(&base, &self.stem(), &self.sweep.ranges)
    }
}

/// File name of `path` without its `.ui.json` or `.json` suffix.
pub fn run_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".ui.json")
        .or_else(|| name.strip_suffix(".json"))
        .unwrap_or(&name);
    if stem.is_empty() {
        String::from("run")
    } else {
        stem.to_string()
    }
}

// ============================================================================
// Expansion
// ============================================================================

/// One concrete configuration produced by a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedRun {
    pub index: usize,
    /// `<stem>_<index:04>`
    pub name: String,
    /// Swept field values, in range order.
    pub params: Vec<(String, FieldValue)>,
    pub ui: UiJson,
}

/// Keep integer fields integral when every swept value allows it.
fn coerce(values: Vec<FieldValue>, current: &FieldValue) -> Vec<FieldValue> {
    if !matches!(current, FieldValue::Int(_)) {
        return values;
    }
    let integral = values.iter().all(|v| match v {
        FieldValue::Float(f) => f.fract() == 0.0,
        FieldValue::Int(_) => true,
        _ => false,
    });
    if !integral {
        return values;
    }
    let mut out: Vec<FieldValue> = values
        .into_iter()
        .map(|v| match v {
            FieldValue::Float(f) => FieldValue::Int(f as i64),
            other => other,
        })
        .collect();
    out.dedup();
    out
}

/// Cartesian product of `ranges` applied to `base`.
pub fn expand(
    base: &UiJson,
    stem: &str,
    ranges: &[SweepRange],
) -> Result<Vec<ExpandedRun>, SweepError> {
    if ranges.is_empty() {
        return Ok(vec![ExpandedRun {
            index: 0,
            name: format!("{}_{:04}", stem, 0),
            params: Vec::new(),
            ui: base.clone(),
        }]);
    }

    let mut axes: Vec<(&str, Vec<FieldValue>)> = Vec::with_capacity(ranges.len());
    for range in ranges {
        if !base.contains(&range.field) {
            return Err(SweepError::UnknownField(range.field.clone()));
        }
        let values = coerce(range.values()?, &base.value_of(&range.field));
        debug!("sweeping '{}' over {} value(s)", range.field, values.len());
        axes.push((range.field.as_str(), values));
    }

    let total = axes
        .iter()
        .try_fold(1usize, |acc, (_, v)| acc.checked_mul(v.len()))
        .filter(|&n| n <= MAX_RUNS)
        .ok_or(SweepError::TooManyRuns(MAX_RUNS))?;
    let mut runs = Vec::with_capacity(total);
    let mut cursor = vec![0usize; axes.len()];

    for index in 0..total {
        let params: Vec<(String, FieldValue)> = axes
            .iter()
            .zip(&cursor)
            .map(|((field, values), &i)| (field.to_string(), values[i].clone()))
            .collect();

        let mut ui = base.clone();
        for (field, value) in &params {
            ui.set_value(field, value.clone());
        }
        runs.push(ExpandedRun {
            index,
            name: format!("{}_{:04}", stem, index),
            params,
            ui,
        });

        // Odometer step, last range fastest.
        for axis in (0..axes.len()).rev() {
            cursor[axis] += 1;
            if cursor[axis] < axes[axis].1.len() {
                break;
            }
            cursor[axis] = 0;
        }
    }

    Ok(runs)
}

/// Sweep template of a UI description: one single-valued range per active
/// numeric field.
pub fn template_from(ui: &UiJson, base: &Path) -> SweepFile {
    let (graph, _) = DependencyGraph::build(ui);
    let state = graph.resolve(ui);

    let ranges = ui
        .iter()
        .filter(|(_, entry)| matches!(entry, UiEntry::Form(_)))
        .filter_map(|(name, _)| {
            let value = state.effective_value(ui, name).as_f64()?;
            Some(SweepRange::linspace(name, value, value, 1))
        })
        .collect();

    SweepFile {
        sweep: SweepSection {
            base: base.to_path_buf(),
            output_dir: default_output_dir(),
            threads: None,
            ranges,
        },
    }
}

/// Write one `<name>.ui.json` per run plus the lookup table.
pub fn write_runs(runs: &[ExpandedRun], dir: &Path) -> Result<Vec<PathBuf>, SweepError> {
    fs::create_dir_all(dir)?;

    let mut paths = Vec::with_capacity(runs.len());
    let mut lookup = Map::new();
    for run in runs {
        let path = dir.join(format!("{}.ui.json", run.name));
        run.ui.write_file(&path)?;
        paths.push(path);

        let params: Map<String, Value> = run
            .params
            .iter()
            .map(|(field, value)| (field.clone(), value.to_json()))
            .collect();
        lookup.insert(run.name.clone(), Value::Object(params));
    }

    let lookup_path = dir.join(LOOKUP_FILE);
    fs::write(&lookup_path, serde_json::to_string_pretty(&Value::Object(lookup))?)?;
    info!("wrote {} run file(s) to {}", runs.len(), dir.display());
    Ok(paths)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlRead(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    UiJson(#[from] UiJsonError),

    #[error("not a sweep file (missing [sweep] section)")]
    NotSweepFile,

    #[error("field '{0}' is not defined in the base file")]
    UnknownField(String),

    #[error("invalid range for '{field}': {reason}")]
    InvalidRange { field: String, reason: String },

    #[error("sweep expands to more than {0} runs")]
    TooManyRuns(usize),
}
