//! Composite option groups shared across survey kinds.
//!
//! A group knows how to contribute its forms to a template, read itself from
//! the populated parameters, check its own cross-field rules, and write itself
//! back into a UI description. Bounds and choice lists live in the form
//! metadata and are checked generically before any group is read.

use crate::survey::{Dimensionality, SurveySpec};
use crate::uijson::{DependencyType, UiForm, UiJson};
use crate::validation::{Constraint, FieldReader, Report};
use crate::value::{DataRef, FieldValue, ValueOrRef};

/// What a group needs to know about the run it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct GroupContext {
    pub spec: &'static SurveySpec,
    pub forward_only: bool,
}

impl GroupContext {
    pub fn dimensionality(&self) -> Dimensionality {
        self.spec.dimensionality
    }
}

pub trait OptionGroup: Sized {
    /// Add this group's forms, with defaults and metadata, to a template.
    fn template(ui: &mut UiJson, ctx: &GroupContext);

    /// Read the group from populated parameters.
    fn read(reader: &mut FieldReader<'_>, ctx: &GroupContext) -> Self;

    /// Cross-field rules of the group.
    fn check(&self, _report: &mut Report) {}

    /// Write the group's values back into a UI description.
    fn write(&self, ui: &mut UiJson);
}

fn put(ui: &mut UiJson, name: &str, value: impl Into<FieldValue>) {
    ui.set_value(name, value.into());
}

// ============================================================================
// Active Cells
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActiveCellsOptions {
    pub topography_object: Option<DataRef>,
    /// Elevation channel on the topography object, or a constant elevation.
    pub topography: Option<ValueOrRef>,
    pub active_model: Option<DataRef>,
}

/// How the active-cells mask is derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActiveCellsSource {
    Topography {
        object: DataRef,
        elevation: Option<ValueOrRef>,
    },
    ActiveModel(DataRef),
}

impl ActiveCellsOptions {
    pub fn source(&self) -> Option<ActiveCellsSource> {
        match (self.topography_object, self.active_model) {
            (Some(object), None) => Some(ActiveCellsSource::Topography {
                object,
                elevation: self.topography,
            }),
            (None, Some(model)) => Some(ActiveCellsSource::ActiveModel(model)),
            _ => None,
        }
    }
}

impl OptionGroup for ActiveCellsOptions {
    fn template(ui: &mut UiJson, _ctx: &GroupContext) {
        ui.insert_form(
            "topography_object",
            UiForm::new(FieldValue::Null)
                .main()
                .group("Topography")
                .label("Topography")
                .optional(true),
        );
        ui.insert_form(
            "topography",
            UiForm::new(FieldValue::Null)
                .main()
                .group("Topography")
                .label("Elevation channel")
                .data("topography_object", "Vertex", "Float")
                .optional(false)
                .depends_on("topography_object", DependencyType::Enabled),
        );
        ui.insert_form(
            "active_model",
            UiForm::new(FieldValue::Null)
                .main()
                .group("Topography")
                .label("Active model")
                .data("mesh", "Cell", "Boolean"),
        );
    }

    fn read(reader: &mut FieldReader<'_>, _ctx: &GroupContext) -> Self {
        Self {
            topography_object: reader.opt_ref("topography_object"),
            topography: reader.opt_value_or_ref("topography"),
            active_model: reader.opt_ref("active_model"),
        }
    }

    fn check(&self, report: &mut Report) {
        match (self.topography_object, self.active_model) {
            (None, None) => report.push("active_model", Constraint::ActiveCellsMissing),
            (Some(_), Some(_)) => report.push("active_model", Constraint::ActiveCellsConflict),
            _ => {}
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "topography_object", self.topography_object);
        put(ui, "topography", self.topography);
        put(ui, "active_model", self.active_model);
    }
}

// ============================================================================
// Compute
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverType {
    #[default]
    Pardiso,
    Mumps,
}

impl SolverType {
    pub const CHOICES: [&'static str; 2] = ["Pardiso", "Mumps"];

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverType::Pardiso => "Pardiso",
            SolverType::Mumps => "Mumps",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Pardiso" => Some(SolverType::Pardiso),
            "Mumps" => Some(SolverType::Mumps),
            _ => None,
        }
    }
}

/// Resources handed to the external library. Nothing here schedules work.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeOptions {
    pub parallelized: bool,
    /// Host core count when unset and parallelized; 1 when not parallelized.
    pub n_cpu: usize,
    pub n_threads: Option<usize>,
    pub n_workers: Option<usize>,
    pub distributed_workers: Option<String>,
    pub max_chunk_size: usize,
    pub max_ram: Option<f64>,
    pub tile_spatial: usize,
    pub solver: SolverType,
    pub performance_report: bool,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            parallelized: true,
            n_cpu: num_cpus::get(),
            n_threads: None,
            n_workers: Some(1),
            distributed_workers: None,
            max_chunk_size: 128,
            max_ram: None,
            tile_spatial: 1,
            solver: SolverType::Pardiso,
            performance_report: false,
        }
    }
}

impl OptionGroup for ComputeOptions {
    fn template(ui: &mut UiJson, _ctx: &GroupContext) {
        ui.insert_form(
            "parallelized",
            UiForm::new(true).group("Compute").label("Use parallelization"),
        );
        ui.insert_form(
            "n_cpu",
            UiForm::new(FieldValue::Null)
                .group("Compute")
                .label("Number of CPUs")
                .min(1.0)
                .optional(false)
                .depends_on("parallelized", DependencyType::Enabled),
        );
        ui.insert_form(
            "n_threads",
            UiForm::new(FieldValue::Null)
                .group("Compute")
                .label("Number of threads")
                .min(1.0)
                .optional(false),
        );
        ui.insert_form(
            "n_workers",
            UiForm::new(1_i64)
                .group("Compute")
                .label("Number of workers")
                .min(1.0)
                .optional(true),
        );
        ui.insert_form(
            "distributed_workers",
            UiForm::new(FieldValue::Null)
                .group("Compute")
                .label("Distributed workers")
                .tooltip("Comma separated list of host:port addresses")
                .optional(false),
        );
        ui.insert_form(
            "max_chunk_size",
            UiForm::new(128_i64)
                .group("Compute")
                .label("Maximum chunk size (Mb)")
                .min(0.0),
        );
        ui.insert_form(
            "max_ram",
            UiForm::new(FieldValue::Null)
                .group("Compute")
                .label("Maximum RAM (Gb)")
                .min(0.0)
                .optional(false),
        );
        ui.insert_form(
            "tile_spatial",
            UiForm::new(1_i64)
                .group("Compute")
                .label("Number of tiles")
                .bounds(1.0, 1000.0),
        );
        ui.insert_form(
            "solver_type",
            UiForm::new("Pardiso")
                .group("Compute")
                .label("Direct solver")
                .choices(&SolverType::CHOICES),
        );
        ui.insert_form(
            "performance_report",
            UiForm::new(false).group("Compute").label("Write performance report"),
        );
    }

    fn read(reader: &mut FieldReader<'_>, _ctx: &GroupContext) -> Self {
        let parallelized = reader.bool("parallelized", true);
        let n_cpu = if parallelized {
            reader.opt_usize("n_cpu").unwrap_or_else(num_cpus::get)
        } else {
            1
        };
        let solver = reader
            .opt_text("solver_type")
            .and_then(|s| SolverType::parse(&s))
            .unwrap_or_default();

        Self {
            parallelized,
            n_cpu,
            n_threads: reader.opt_usize("n_threads"),
            n_workers: reader.opt_usize("n_workers"),
            distributed_workers: reader.opt_text("distributed_workers"),
            max_chunk_size: reader.usize("max_chunk_size", 128),
            max_ram: reader.opt_f64("max_ram"),
            tile_spatial: reader.usize("tile_spatial", 1),
            solver,
            performance_report: reader.bool("performance_report", false),
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "parallelized", self.parallelized);
        if self.parallelized {
            put(ui, "n_cpu", self.n_cpu);
        }
        put(ui, "n_threads", self.n_threads);
        put(ui, "n_workers", self.n_workers);
        put(ui, "distributed_workers", self.distributed_workers.clone());
        put(ui, "max_chunk_size", self.max_chunk_size);
        put(ui, "max_ram", self.max_ram);
        put(ui, "tile_spatial", self.tile_spatial);
        put(ui, "solver_type", self.solver.as_str());
        put(ui, "performance_report", self.performance_report);
    }
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelType {
    #[default]
    Conductivity,
    Resistivity,
}

impl ModelType {
    pub const CHOICES: [&'static str; 2] = ["Conductivity (S/m)", "Resistivity (Ohm-m)"];

    pub fn as_str(&self) -> &'static str {
        Self::CHOICES[*self as usize]
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Conductivity (S/m)" => Some(ModelType::Conductivity),
            "Resistivity (Ohm-m)" => Some(ModelType::Resistivity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelOptions {
    /// Model simulated in forward mode; first iterate of an inversion.
    /// Joint inversions take it from their sub-runs.
    pub starting_model: Option<ValueOrRef>,
    pub reference_model: Option<ValueOrRef>,
    pub lower_bound: Option<ValueOrRef>,
    pub upper_bound: Option<ValueOrRef>,
    /// Only for conductivity surveys.
    pub model_type: Option<ModelType>,
}

impl OptionGroup for ModelOptions {
    fn template(ui: &mut UiJson, ctx: &GroupContext) {
        let spec = ctx.spec;
        let units = if spec.model_units.is_empty() {
            String::new()
        } else {
            format!(" ({})", spec.model_units)
        };

        if !spec.kind.is_joint() {
            let label = if ctx.forward_only {
                format!("{} model{}", capitalize(spec.physical_property), units)
            } else {
                format!("Initial {}{}", spec.physical_property, units)
            };
            ui.insert_form(
                "starting_model",
                UiForm::new(spec.default_model)
                    .main()
                    .group("Mesh and models")
                    .label(&label)
                    .value_or_data("mesh"),
            );
        }

        if spec.kind.has_model_type() {
            ui.insert_form(
                "model_type",
                UiForm::new(ModelType::default().as_str())
                    .main()
                    .group("Mesh and models")
                    .label("Model units")
                    .choices(&ModelType::CHOICES),
            );
        }

        if ctx.forward_only {
            return;
        }

        if !spec.kind.is_joint() {
            ui.insert_form(
                "reference_model",
                UiForm::new(spec.default_model)
                    .main()
                    .group("Mesh and models")
                    .label(&format!("Reference {}{}", spec.physical_property, units))
                    .value_or_data("mesh")
                    .optional(false),
            );
        }

        let lower = match spec.default_lower_bound {
            Some(v) => UiForm::new(v).value_or_data("mesh").optional(true),
            None => UiForm::new(FieldValue::Null).value_or_data("mesh").optional(false),
        };
        ui.insert_form(
            "lower_bound",
            lower.main().group("Mesh and models").label(&format!("Lower bound{}", units)),
        );
        ui.insert_form(
            "upper_bound",
            UiForm::new(FieldValue::Null)
                .main()
                .group("Mesh and models")
                .label(&format!("Upper bound{}", units))
                .value_or_data("mesh")
                .optional(false),
        );
    }

    fn read(reader: &mut FieldReader<'_>, ctx: &GroupContext) -> Self {
        let starting_model = if ctx.spec.kind.is_joint() {
            None
        } else {
            Some(reader.value_or_ref("starting_model", ctx.spec.default_model))
        };
        let model_type = if ctx.spec.kind.has_model_type() {
            Some(
                reader
                    .opt_text("model_type")
                    .and_then(|s| ModelType::parse(&s))
                    .unwrap_or_default(),
            )
        } else {
            None
        };

        Self {
            starting_model,
            reference_model: reader.opt_value_or_ref("reference_model"),
            lower_bound: reader.opt_value_or_ref("lower_bound"),
            upper_bound: reader.opt_value_or_ref("upper_bound"),
            model_type,
        }
    }

    fn check(&self, report: &mut Report) {
        let lower = self.lower_bound.and_then(|v| v.constant());
        let upper = self.upper_bound.and_then(|v| v.constant());
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo > hi {
                report.push(
                    "lower_bound",
                    Constraint::Rule(format!("lower bound {} exceeds upper bound {}", lo, hi)),
                );
            }
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "starting_model", self.starting_model);
        put(ui, "reference_model", self.reference_model);
        put(ui, "lower_bound", self.lower_bound);
        put(ui, "upper_bound", self.upper_bound);
        if let Some(model_type) = self.model_type {
            put(ui, "model_type", model_type.as_str());
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Regularization
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RegularizationOptions {
    /// Smallness weight; only meaningful with a reference model.
    pub alpha_s: Option<ValueOrRef>,
    pub length_scale_x: ValueOrRef,
    pub length_scale_y: Option<ValueOrRef>,
    pub length_scale_z: ValueOrRef,
    pub gradient_rotation: Option<DataRef>,
}

impl Default for RegularizationOptions {
    fn default() -> Self {
        Self {
            alpha_s: Some(ValueOrRef::Value(1.0)),
            length_scale_x: ValueOrRef::Value(1.0),
            length_scale_y: Some(ValueOrRef::Value(1.0)),
            length_scale_z: ValueOrRef::Value(1.0),
            gradient_rotation: None,
        }
    }
}

impl OptionGroup for RegularizationOptions {
    fn template(ui: &mut UiJson, ctx: &GroupContext) {
        let weight = |label: &str| {
            UiForm::new(1.0)
                .group("Regularization")
                .label(label)
                .min(0.0)
                .value_or_data("mesh")
        };
        let alpha_s = weight("Reference weight");
        let alpha_s = if ctx.spec.kind.is_joint() {
            alpha_s
        } else {
            alpha_s.depends_on("reference_model", DependencyType::Enabled)
        };
        ui.insert_form("alpha_s", alpha_s);
        ui.insert_form("length_scale_x", weight("X-smoothness weight"));
        if ctx.dimensionality().has_y() {
            ui.insert_form("length_scale_y", weight("Y-smoothness weight"));
        }
        ui.insert_form("length_scale_z", weight("Z-smoothness weight"));
        ui.insert_form(
            "gradient_rotation",
            UiForm::new(FieldValue::Null)
                .group("Regularization")
                .label("Gradient rotation")
                .data("mesh", "Cell", "Float")
                .optional(false),
        );
    }

    fn read(reader: &mut FieldReader<'_>, ctx: &GroupContext) -> Self {
        let length_scale_y = if ctx.dimensionality().has_y() {
            Some(reader.value_or_ref("length_scale_y", 1.0))
        } else {
            None
        };
        Self {
            alpha_s: reader.opt_value_or_ref("alpha_s"),
            length_scale_x: reader.value_or_ref("length_scale_x", 1.0),
            length_scale_y,
            length_scale_z: reader.value_or_ref("length_scale_z", 1.0),
            gradient_rotation: reader.opt_ref("gradient_rotation"),
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "alpha_s", self.alpha_s);
        put(ui, "length_scale_x", self.length_scale_x);
        if let Some(y) = self.length_scale_y {
            put(ui, "length_scale_y", y);
        }
        put(ui, "length_scale_z", self.length_scale_z);
        put(ui, "gradient_rotation", self.gradient_rotation);
    }
}

// ============================================================================
// IRLS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradientType {
    #[default]
    Total,
    Components,
}

impl GradientType {
    pub const CHOICES: [&'static str; 2] = ["total", "components"];

    pub fn as_str(&self) -> &'static str {
        Self::CHOICES[*self as usize]
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "total" => Some(GradientType::Total),
            "components" => Some(GradientType::Components),
            _ => None,
        }
    }
}

/// Sparse-norm directives for the iteratively reweighted least squares stage.
#[derive(Debug, Clone, PartialEq)]
pub struct IrlsOptions {
    pub s_norm: Option<ValueOrRef>,
    pub x_norm: ValueOrRef,
    pub y_norm: Option<ValueOrRef>,
    pub z_norm: ValueOrRef,
    pub gradient_type: GradientType,
    pub max_irls_iterations: usize,
    pub starting_chi_factor: f64,
    pub beta_tol: f64,
    pub percentile: f64,
    pub epsilon_cooling_factor: f64,
}

impl Default for IrlsOptions {
    fn default() -> Self {
        Self {
            s_norm: Some(ValueOrRef::Value(0.0)),
            x_norm: ValueOrRef::Value(2.0),
            y_norm: Some(ValueOrRef::Value(2.0)),
            z_norm: ValueOrRef::Value(2.0),
            gradient_type: GradientType::Total,
            max_irls_iterations: 25,
            starting_chi_factor: 1.0,
            beta_tol: 0.5,
            percentile: 95.0,
            epsilon_cooling_factor: 1.2,
        }
    }
}

impl OptionGroup for IrlsOptions {
    fn template(ui: &mut UiJson, ctx: &GroupContext) {
        let d = Self::default();
        let norm = |value: f64, label: &str| {
            UiForm::new(value)
                .group("Sparse/blocky model")
                .label(label)
                .bounds(0.0, 2.0)
                .value_or_data("mesh")
        };
        let s_norm = norm(0.0, "Smallness norm");
        let s_norm = if ctx.spec.kind.is_joint() {
            s_norm
        } else {
            s_norm.depends_on("reference_model", DependencyType::Enabled)
        };
        ui.insert_form("s_norm", s_norm);
        ui.insert_form("x_norm", norm(2.0, "X-smoothness norm"));
        if ctx.dimensionality().has_y() {
            ui.insert_form("y_norm", norm(2.0, "Y-smoothness norm"));
        }
        ui.insert_form("z_norm", norm(2.0, "Z-smoothness norm"));
        ui.insert_form(
            "gradient_type",
            UiForm::new(d.gradient_type.as_str())
                .group("Sparse/blocky model")
                .label("Gradient type")
                .choices(&GradientType::CHOICES),
        );
        ui.insert_form(
            "max_irls_iterations",
            UiForm::new(d.max_irls_iterations)
                .group("Sparse/blocky model")
                .label("Maximum IRLS iterations")
                .min(0.0),
        );
        ui.insert_form(
            "starting_chi_factor",
            UiForm::new(d.starting_chi_factor)
                .group("Sparse/blocky model")
                .label("IRLS start chi factor")
                .bounds(0.1, 20.0),
        );
        ui.insert_form(
            "beta_tol",
            UiForm::new(d.beta_tol)
                .group("Sparse/blocky model")
                .label("Beta re-adjustment tolerance")
                .min(1e-4),
        );
        ui.insert_form(
            "percentile",
            UiForm::new(d.percentile)
                .group("Sparse/blocky model")
                .label("Percentile")
                .bounds(5.0, 100.0),
        );
        ui.insert_form(
            "epsilon_cooling_factor",
            UiForm::new(d.epsilon_cooling_factor)
                .group("Sparse/blocky model")
                .label("Epsilon cooling factor"),
        );
    }

    fn read(reader: &mut FieldReader<'_>, ctx: &GroupContext) -> Self {
        let d = Self::default();
        let y_norm = if ctx.dimensionality().has_y() {
            Some(reader.value_or_ref("y_norm", 2.0))
        } else {
            None
        };
        let gradient_type = reader
            .opt_text("gradient_type")
            .and_then(|s| GradientType::parse(&s))
            .unwrap_or_default();

        Self {
            s_norm: reader.opt_value_or_ref("s_norm"),
            x_norm: reader.value_or_ref("x_norm", 2.0),
            y_norm,
            z_norm: reader.value_or_ref("z_norm", 2.0),
            gradient_type,
            max_irls_iterations: reader.usize("max_irls_iterations", d.max_irls_iterations),
            starting_chi_factor: reader.f64("starting_chi_factor", d.starting_chi_factor),
            beta_tol: reader.f64("beta_tol", d.beta_tol),
            percentile: reader.f64("percentile", d.percentile),
            epsilon_cooling_factor: reader.f64("epsilon_cooling_factor", d.epsilon_cooling_factor),
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "s_norm", self.s_norm);
        put(ui, "x_norm", self.x_norm);
        if let Some(y) = self.y_norm {
            put(ui, "y_norm", y);
        }
        put(ui, "z_norm", self.z_norm);
        put(ui, "gradient_type", self.gradient_type.as_str());
        put(ui, "max_irls_iterations", self.max_irls_iterations);
        put(ui, "starting_chi_factor", self.starting_chi_factor);
        put(ui, "beta_tol", self.beta_tol);
        put(ui, "percentile", self.percentile);
        put(ui, "epsilon_cooling_factor", self.epsilon_cooling_factor);
    }
}

// ============================================================================
// Beta Cooling
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CoolingScheduleOptions {
    /// Target misfit as a multiple of the number of data.
    pub chi_factor: f64,
    pub cooling_factor: f64,
    pub cooling_rate: usize,
    pub initial_beta: Option<f64>,
    pub initial_beta_ratio: Option<f64>,
    pub auto_scale_misfits: bool,
    pub beta_search: bool,
}

impl Default for CoolingScheduleOptions {
    fn default() -> Self {
        Self {
            chi_factor: 1.0,
            cooling_factor: 2.0,
            cooling_rate: 1,
            initial_beta: None,
            initial_beta_ratio: Some(10.0),
            auto_scale_misfits: true,
            beta_search: false,
        }
    }
}

impl OptionGroup for CoolingScheduleOptions {
    fn template(ui: &mut UiJson, _ctx: &GroupContext) {
        let d = Self::default();
        ui.insert_form(
            "chi_factor",
            UiForm::new(d.chi_factor)
                .group("Cooling schedule/target")
                .label("Chi factor")
                .bounds(0.1, 20.0),
        );
        ui.insert_form(
            "cooling_factor",
            UiForm::new(d.cooling_factor)
                .group("Cooling schedule/target")
                .label("Beta cooling factor")
                .bounds(1.1, 100.0),
        );
        ui.insert_form(
            "cooling_rate",
            UiForm::new(d.cooling_rate)
                .group("Cooling schedule/target")
                .label("Iterations per beta")
                .bounds(1.0, 10.0),
        );
        ui.insert_form(
            "initial_beta_ratio",
            UiForm::new(10.0)
                .group("Cooling schedule/target")
                .label("Initial beta ratio")
                .min(0.0)
                .optional(true),
        );
        ui.insert_form(
            "initial_beta",
            UiForm::new(FieldValue::Null)
                .group("Cooling schedule/target")
                .label("Initial beta")
                .min(0.0)
                .optional(false)
                .depends_on("initial_beta_ratio", DependencyType::Disabled),
        );
        ui.insert_form(
            "auto_scale_misfits",
            UiForm::new(d.auto_scale_misfits)
                .group("Cooling schedule/target")
                .label("Auto-scale misfits"),
        );
        ui.insert_form(
            "beta_search",
            UiForm::new(d.beta_search)
                .group("Cooling schedule/target")
                .label("Beta search"),
        );
    }

    fn read(reader: &mut FieldReader<'_>, _ctx: &GroupContext) -> Self {
        let d = Self::default();
        Self {
            chi_factor: reader.f64("chi_factor", d.chi_factor),
            cooling_factor: reader.f64("cooling_factor", d.cooling_factor),
            cooling_rate: reader.usize("cooling_rate", d.cooling_rate),
            initial_beta: reader.opt_f64("initial_beta"),
            initial_beta_ratio: reader.opt_f64("initial_beta_ratio"),
            auto_scale_misfits: reader.bool("auto_scale_misfits", d.auto_scale_misfits),
            beta_search: reader.bool("beta_search", d.beta_search),
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "chi_factor", self.chi_factor);
        put(ui, "cooling_factor", self.cooling_factor);
        put(ui, "cooling_rate", self.cooling_rate);
        put(ui, "initial_beta_ratio", self.initial_beta_ratio);
        put(ui, "initial_beta", self.initial_beta);
        put(ui, "auto_scale_misfits", self.auto_scale_misfits);
        put(ui, "beta_search", self.beta_search);
    }
}

// ============================================================================
// Optimization
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOptions {
    pub max_global_iterations: usize,
    pub max_line_search_iterations: usize,
    pub max_cg_iterations: usize,
    pub tol_cg: f64,
    pub f_min_change: f64,
}

impl Default for OptimizationOptions {
    fn default() -> Self {
        Self {
            max_global_iterations: 50,
            max_line_search_iterations: 20,
            max_cg_iterations: 30,
            tol_cg: 1e-4,
            f_min_change: 1e-2,
        }
    }
}

impl OptionGroup for OptimizationOptions {
    fn template(ui: &mut UiJson, _ctx: &GroupContext) {
        let d = Self::default();
        let form = |value: FieldValue, label: &str, min: f64| {
            UiForm::new(value).group("Optimization").label(label).min(min)
        };
        ui.insert_form(
            "max_global_iterations",
            form(d.max_global_iterations.into(), "Maximum number of iterations", 1.0),
        );
        ui.insert_form(
            "max_line_search_iterations",
            form(d.max_line_search_iterations.into(), "Maximum number of line searches", 1.0),
        );
        ui.insert_form(
            "max_cg_iterations",
            form(d.max_cg_iterations.into(), "Maximum CG iterations", 0.0),
        );
        ui.insert_form("tol_cg", form(d.tol_cg.into(), "Conjugate gradient tolerance", 0.0));
        ui.insert_form(
            "f_min_change",
            form(d.f_min_change.into(), "Minimum change in objective function", 1e-6),
        );
    }

    fn read(reader: &mut FieldReader<'_>, _ctx: &GroupContext) -> Self {
        let d = Self::default();
        Self {
            max_global_iterations: reader.usize("max_global_iterations", d.max_global_iterations),
            max_line_search_iterations: reader
                .usize("max_line_search_iterations", d.max_line_search_iterations),
            max_cg_iterations: reader.usize("max_cg_iterations", d.max_cg_iterations),
            tol_cg: reader.f64("tol_cg", d.tol_cg),
            f_min_change: reader.f64("f_min_change", d.f_min_change),
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "max_global_iterations", self.max_global_iterations);
        put(ui, "max_line_search_iterations", self.max_line_search_iterations);
        put(ui, "max_cg_iterations", self.max_cg_iterations);
        put(ui, "tol_cg", self.tol_cg);
        put(ui, "f_min_change", self.f_min_change);
    }
}

// ============================================================================
// Sensitivity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensitivityStorage {
    #[default]
    Ram,
    Disk,
}

impl SensitivityStorage {
    pub const CHOICES: [&'static str; 2] = ["ram", "disk"];

    pub fn as_str(&self) -> &'static str {
        Self::CHOICES[*self as usize]
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ram" => Some(SensitivityStorage::Ram),
            "disk" => Some(SensitivityStorage::Disk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityOptions {
    pub store_sensitivities: SensitivityStorage,
    pub save_sensitivities: bool,
    /// Percentile below which sensitivity weights are clipped.
    pub sens_wts_threshold: f64,
    pub every_iteration_bool: bool,
}

impl Default for SensitivityOptions {
    fn default() -> Self {
        Self {
            store_sensitivities: SensitivityStorage::Ram,
            save_sensitivities: false,
            sens_wts_threshold: 1.0,
            every_iteration_bool: true,
        }
    }
}

impl OptionGroup for SensitivityOptions {
    fn template(ui: &mut UiJson, _ctx: &GroupContext) {
        let d = Self::default();
        ui.insert_form(
            "store_sensitivities",
            UiForm::new(d.store_sensitivities.as_str())
                .group("Sensitivity")
                .label("Storage device")
                .choices(&SensitivityStorage::CHOICES),
        );
        ui.insert_form(
            "save_sensitivities",
            UiForm::new(d.save_sensitivities)
                .group("Sensitivity")
                .label("Save sensitivities"),
        );
        ui.insert_form(
            "sens_wts_threshold",
            UiForm::new(d.sens_wts_threshold)
                .group("Sensitivity")
                .label("Threshold (%)")
                .bounds(0.0, 100.0),
        );
        ui.insert_form(
            "every_iteration_bool",
            UiForm::new(d.every_iteration_bool)
                .group("Sensitivity")
                .label("Every iteration"),
        );
    }

    fn read(reader: &mut FieldReader<'_>, _ctx: &GroupContext) -> Self {
        let d = Self::default();
        let store_sensitivities = reader
            .opt_text("store_sensitivities")
            .and_then(|s| SensitivityStorage::parse(&s))
            .unwrap_or_default();
        Self {
            store_sensitivities,
            save_sensitivities: reader.bool("save_sensitivities", d.save_sensitivities),
            sens_wts_threshold: reader.f64("sens_wts_threshold", d.sens_wts_threshold),
            every_iteration_bool: reader.bool("every_iteration_bool", d.every_iteration_bool),
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "store_sensitivities", self.store_sensitivities.as_str());
        put(ui, "save_sensitivities", self.save_sensitivities);
        put(ui, "sens_wts_threshold", self.sens_wts_threshold);
        put(ui, "every_iteration_bool", self.every_iteration_bool);
    }
}

// ============================================================================
// Line Selection and Drape Model
// ============================================================================

/// Survey line simulated by a 2D run.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSelection {
    /// Referenced data on the survey cells that labels each line.
    pub line_object: DataRef,
    pub line_id: i64,
}

impl OptionGroup for LineSelection {
    fn template(ui: &mut UiJson, _ctx: &GroupContext) {
        ui.insert_form(
            "line_object",
            UiForm::new(FieldValue::Null)
                .main()
                .group("Line selection")
                .label("Line field")
                .data("data_object", "Cell", "Referenced"),
        );
        ui.insert_form(
            "line_id",
            UiForm::new(1_i64).main().group("Line selection").label("Line number"),
        );
    }

    fn read(reader: &mut FieldReader<'_>, _ctx: &GroupContext) -> Self {
        let line_id = reader.opt_i64("line_id").unwrap_or(1);
        Self {
            line_object: reader.required_ref("line_object"),
            line_id,
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "line_object", self.line_object);
        put(ui, "line_id", self.line_id);
    }
}

/// Geometry of the drape model built under each 2D line or 1D sounding.
#[derive(Debug, Clone, PartialEq)]
pub struct DrapeModelOptions {
    pub u_cell_size: f64,
    pub v_cell_size: f64,
    pub depth_core: f64,
    pub horizontal_padding: f64,
    pub vertical_padding: f64,
    pub expansion_factor: f64,
}

impl DrapeModelOptions {
    pub fn for_dimensionality(dimensionality: Dimensionality) -> Self {
        match dimensionality {
            Dimensionality::OneD => Self {
                u_cell_size: 10.0,
                v_cell_size: 10.0,
                depth_core: 100.0,
                horizontal_padding: 0.0,
                vertical_padding: 100.0,
                expansion_factor: 1.1,
            },
            _ => Self {
                u_cell_size: 25.0,
                v_cell_size: 25.0,
                depth_core: 100.0,
                horizontal_padding: 100.0,
                vertical_padding: 100.0,
                expansion_factor: 1.1,
            },
        }
    }

    const FIELDS: [&'static str; 6] = [
        "u_cell_size",
        "v_cell_size",
        "depth_core",
        "horizontal_padding",
        "vertical_padding",
        "expansion_factor",
    ];

    fn values(&self) -> [f64; 6] {
        [
            self.u_cell_size,
            self.v_cell_size,
            self.depth_core,
            self.horizontal_padding,
            self.vertical_padding,
            self.expansion_factor,
        ]
    }
}

impl OptionGroup for DrapeModelOptions {
    fn template(ui: &mut UiJson, ctx: &GroupContext) {
        let d = Self::for_dimensionality(ctx.dimensionality());
        let labels = [
            "Horizontal cell size",
            "Vertical cell size",
            "Depth of core",
            "Horizontal padding",
            "Vertical padding",
            "Expansion factor",
        ];
        for ((name, label), value) in Self::FIELDS.iter().zip(labels).zip(d.values()) {
            let min = if *name == "expansion_factor" { 1.0 } else { 0.0 };
            ui.insert_form(
                name,
                UiForm::new(value).group("Drape model").label(label).min(min),
            );
        }
    }

    fn read(reader: &mut FieldReader<'_>, ctx: &GroupContext) -> Self {
        let d = Self::for_dimensionality(ctx.dimensionality());
        Self {
            u_cell_size: reader.f64("u_cell_size", d.u_cell_size),
            v_cell_size: reader.f64("v_cell_size", d.v_cell_size),
            depth_core: reader.f64("depth_core", d.depth_core),
            horizontal_padding: reader.f64("horizontal_padding", d.horizontal_padding),
            vertical_padding: reader.f64("vertical_padding", d.vertical_padding),
            expansion_factor: reader.f64("expansion_factor", d.expansion_factor),
        }
    }

    fn write(&self, ui: &mut UiJson) {
        for (name, value) in Self::FIELDS.iter().zip(self.values()) {
            put(ui, name, value);
        }
    }
}

/// Intermediate file handling for batch 2D runs.
#[derive(Debug, Clone, PartialEq)]
pub struct FileControlOptions {
    pub files_only: bool,
    pub cleanup: bool,
}

impl Default for FileControlOptions {
    fn default() -> Self {
        Self {
            files_only: false,
            cleanup: true,
        }
    }
}

impl OptionGroup for FileControlOptions {
    fn template(ui: &mut UiJson, _ctx: &GroupContext) {
        ui.insert_form(
            "files_only",
            UiForm::new(false).group("File control").label("Only write input files"),
        );
        ui.insert_form(
            "cleanup",
            UiForm::new(true).group("File control").label("Clean directory"),
        );
    }

    fn read(reader: &mut FieldReader<'_>, _ctx: &GroupContext) -> Self {
        Self {
            files_only: reader.bool("files_only", false),
            cleanup: reader.bool("cleanup", true),
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "files_only", self.files_only);
        put(ui, "cleanup", self.cleanup);
    }
}

// ============================================================================
// Inducing Field
// ============================================================================

/// Earth's field for magnetic surveys.
#[derive(Debug, Clone, PartialEq)]
pub struct InducingField {
    /// nT
    pub strength: ValueOrRef,
    /// Degrees from horizontal, positive down.
    pub inclination: ValueOrRef,
    /// Degrees clockwise from north.
    pub declination: ValueOrRef,
}

impl Default for InducingField {
    fn default() -> Self {
        Self {
            strength: ValueOrRef::Value(50000.0),
            inclination: ValueOrRef::Value(90.0),
            declination: ValueOrRef::Value(0.0),
        }
    }
}

impl OptionGroup for InducingField {
    fn template(ui: &mut UiJson, _ctx: &GroupContext) {
        let form = |value: f64, label: &str, min: f64, max: f64| {
            UiForm::new(value)
                .main()
                .group("Inducing field")
                .label(label)
                .bounds(min, max)
                .value_or_data("data_object")
        };
        ui.insert_form(
            "inducing_field_strength",
            form(50000.0, "Strength (nT)", 0.1, 1e5),
        );
        ui.insert_form(
            "inducing_field_inclination",
            form(90.0, "Inclination (deg)", -90.0, 90.0),
        );
        ui.insert_form(
            "inducing_field_declination",
            form(0.0, "Declination (deg)", -180.0, 180.0),
        );
    }

    fn read(reader: &mut FieldReader<'_>, _ctx: &GroupContext) -> Self {
        Self {
            strength: reader.value_or_ref("inducing_field_strength", 50000.0),
            inclination: reader.value_or_ref("inducing_field_inclination", 90.0),
            declination: reader.value_or_ref("inducing_field_declination", 0.0),
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "inducing_field_strength", self.strength);
        put(ui, "inducing_field_inclination", self.inclination);
        put(ui, "inducing_field_declination", self.declination);
    }
}

// ============================================================================
// Joint Groups
// ============================================================================

/// One earlier run taking part in a joint inversion.
#[derive(Debug, Clone, PartialEq)]
pub struct JointMember {
    pub group: DataRef,
    /// Weight of this run's data misfit.
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossGradientWeights {
    pub a_b: f64,
    pub a_c: Option<f64>,
    pub b_c: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointGroups {
    /// Two or three members, in `a`, `b`, `c` order.
    pub members: Vec<JointMember>,
    pub cross_gradient: Option<CrossGradientWeights>,
    /// Reference geology for petrophysically guided runs.
    pub petrophysical_model: Option<DataRef>,
}

impl JointGroups {
    const LETTERS: [&'static str; 3] = ["a", "b", "c"];
}

impl OptionGroup for JointGroups {
    fn template(ui: &mut UiJson, ctx: &GroupContext) {
        for letter in Self::LETTERS {
            let group = format!("group_{}", letter);
            let label = format!("Group {}", letter.to_uppercase());
            let mut form = UiForm::new(FieldValue::Null).main().group("Joint").label(&label);
            if letter == "c" {
                form = form.optional(false);
            }
            ui.insert_form(&group, form);

            let mut multiplier = UiForm::new(1.0)
                .main()
                .group("Joint")
                .label(&format!("{} multiplier", label))
                .min(0.0);
            if letter == "c" {
                multiplier = multiplier.depends_on("group_c", DependencyType::Enabled);
            }
            ui.insert_form(&format!("{}_multiplier", group), multiplier);
        }

        if ctx.spec.kind == crate::survey::SurveyKind::JointCrossGradient {
            for pair in ["a_b", "a_c", "b_c"] {
                let label = format!(
                    "Cross gradient weight {}",
                    pair.replace('_', "-").to_uppercase()
                );
                let mut form = UiForm::new(1.0)
                    .main()
                    .group("Joint")
                    .label(&label)
                    .min(0.0);
                if pair != "a_b" {
                    form = form.depends_on("group_c", DependencyType::Enabled);
                }
                ui.insert_form(&format!("cross_gradient_weight_{}", pair), form);
            }
        }

        if ctx.spec.kind == crate::survey::SurveyKind::JointPetrophysics {
            ui.insert_form(
                "petrophysical_model",
                UiForm::new(FieldValue::Null)
                    .main()
                    .group("Joint")
                    .label("Reference geology")
                    .data("mesh", "Cell", "Referenced"),
            );
        }
    }

    fn read(reader: &mut FieldReader<'_>, ctx: &GroupContext) -> Self {
        let mut members = vec![
            JointMember {
                group: reader.required_ref("group_a"),
                multiplier: reader.f64("group_a_multiplier", 1.0),
            },
            JointMember {
                group: reader.required_ref("group_b"),
                multiplier: reader.f64("group_b_multiplier", 1.0),
            },
        ];
        if let Some(group) = reader.opt_ref("group_c") {
            members.push(JointMember {
                group,
                multiplier: reader.f64("group_c_multiplier", 1.0),
            });
        }

        let cross_gradient = if ctx.spec.kind == crate::survey::SurveyKind::JointCrossGradient {
            Some(CrossGradientWeights {
                a_b: reader.f64("cross_gradient_weight_a_b", 1.0),
                a_c: reader.opt_f64("cross_gradient_weight_a_c"),
                b_c: reader.opt_f64("cross_gradient_weight_b_c"),
            })
        } else {
            None
        };

        let petrophysical_model = if ctx.spec.kind == crate::survey::SurveyKind::JointPetrophysics {
            Some(reader.required_ref("petrophysical_model"))
        } else {
            None
        };

        Self {
            members,
            cross_gradient,
            petrophysical_model,
        }
    }

    fn check(&self, report: &mut Report) {
        for (i, a) in self.members.iter().enumerate() {
            if a.group == DataRef::NIL {
                continue;
            }
            if self.members[..i].iter().any(|b| b.group == a.group) {
                report.push(
                    &format!("group_{}", Self::LETTERS[i]),
                    Constraint::Rule(String::from("the same group is used twice")),
                );
            }
        }
    }

    fn write(&self, ui: &mut UiJson) {
        for (letter, member) in Self::LETTERS.iter().zip(&self.members) {
            put(ui, &format!("group_{}", letter), member.group);
            put(ui, &format!("group_{}_multiplier", letter), member.multiplier);
        }
        if self.members.len() < 3 {
            put(ui, "group_c", FieldValue::Null);
        }
        if let Some(weights) = &self.cross_gradient {
            put(ui, "cross_gradient_weight_a_b", weights.a_b);
            if let Some(w) = weights.a_c {
                put(ui, "cross_gradient_weight_a_c", w);
            }
            if let Some(w) = weights.b_c {
                put(ui, "cross_gradient_weight_b_c", w);
            }
        }
        put(ui, "petrophysical_model", self.petrophysical_model);
    }
}
