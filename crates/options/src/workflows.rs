//! Companion workflows configured through UI-description files.
//!
//! These runs share the loader, the dependency graph and the validators with
//! the survey inversions, but carry their own fields:
//!
//! - a sensitivity cutoff mask for depth-of-investigation studies,
//! - a homogeneous inversion for the mean property of geological units,
//! - a synthetic plate simulation forward modelled through an earlier run.

use std::fmt;
use std::path::PathBuf;

use log::{debug, warn};

use crate::catalog::{Association, EntityCatalog, EntityInfo, EntityKind};
use crate::options::{
    effective_params, ReferenceCheck, DEFAULT_CONDA_ENVIRONMENT, DEFAULT_RUN_COMMAND,
};
use crate::survey::SurveyKind;
use crate::uijson::{UiForm, UiJson};
use crate::validation::{Constraint, FieldReader, Report, ValidationErrors};
use crate::value::{DataRef, FieldValue};

pub const SENSITIVITY_CUTOFF_COMMAND: &str =
    "simpeg_drivers.depth_of_investigation.sensitivity_cutoff.driver";
pub const PLATE_SIMULATION_COMMAND: &str = "simpeg_drivers.plate_simulation.driver";

pub const DEFAULT_MASK_NAME: &str = "Sensitivity Cutoff";

/// Survey kinds a plate simulation can forward model.
pub const PLATE_SIMULATION_KINDS: [SurveyKind; 7] = [
    SurveyKind::Gravity,
    SurveyKind::MagneticVector,
    SurveyKind::DirectCurrent3d,
    SurveyKind::Fdem,
    SurveyKind::Tdem,
    SurveyKind::Magnetotellurics,
    SurveyKind::Tipper,
];

// ============================================================================
// Workflow Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowKind {
    SensitivityCutoff,
    Homogeneous,
    PlateSimulation,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 3] = [
        WorkflowKind::SensitivityCutoff,
        WorkflowKind::Homogeneous,
        WorkflowKind::PlateSimulation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WorkflowKind::SensitivityCutoff => "sensitivity cutoff",
            WorkflowKind::Homogeneous => "homogeneous",
            WorkflowKind::PlateSimulation => "plate simulation",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            WorkflowKind::SensitivityCutoff => "Depth of Investigation: Sensitivity Cutoff",
            WorkflowKind::Homogeneous => "Homogeneous Inversion",
            WorkflowKind::PlateSimulation => "Plate Simulation",
        }
    }

    pub fn run_command(&self) -> &'static str {
        match self {
            WorkflowKind::SensitivityCutoff => SENSITIVITY_CUTOFF_COMMAND,
            WorkflowKind::Homogeneous => DEFAULT_RUN_COMMAND,
            WorkflowKind::PlateSimulation => PLATE_SIMULATION_COMMAND,
        }
    }

    /// Look up a workflow by name; underscores count as spaces.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase().replace('_', " ");
        Self::ALL.into_iter().find(|k| k.name() == wanted)
    }

    /// Recognise a workflow file by `inversion_type = "homogeneous"` or by the
    /// run command of a dedicated workflow.
    pub fn detect(ui: &UiJson) -> Option<Self> {
        let homogeneous = ui
            .inversion_type()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("homogeneous"));
        if homogeneous {
            return Some(WorkflowKind::Homogeneous);
        }
        let command = ui.value_of("run_command");
        let command = command.as_str()?.trim();
        Self::ALL
            .into_iter()
            .filter(|k| *k != WorkflowKind::Homogeneous)
            .find(|k| k.run_command() == command)
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Built-in UI-description template of a workflow.
pub fn workflow_template(kind: WorkflowKind) -> UiJson {
    let mut ui = UiJson::new();
    ui.insert_plain("version", env!("CARGO_PKG_VERSION"));
    ui.insert_plain("title", kind.title());
    if kind == WorkflowKind::Homogeneous {
        ui.insert_plain("inversion_type", "homogeneous");
        ui.insert_plain("physical_property", "SI");
    }
    ui.insert_plain("geoh5", "");
    ui.insert_plain("run_command", kind.run_command());
    ui.insert_plain("conda_environment", DEFAULT_CONDA_ENVIRONMENT);

    match kind {
        WorkflowKind::SensitivityCutoff => SensitivityCutoffOptions::template(&mut ui),
        WorkflowKind::Homogeneous => HomogeneousOptions::template(&mut ui),
        WorkflowKind::PlateSimulation => PlateSimulationOptions::template(&mut ui),
    }
    ui
}

fn put(ui: &mut UiJson, name: &str, value: impl Into<FieldValue>) {
    ui.set_value(name, value.into());
}

fn positive(report: &mut Report, fields: &[(&str, f64)]) {
    for (name, value) in fields {
        if value.is_nan() || *value <= 0.0 {
            report.push(name, Constraint::Rule(String::from("must be positive")));
        }
    }
}

// ============================================================================
// Sensitivity Cutoff
// ============================================================================

/// How the cutoff is applied to the saved sensitivities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CutoffMethod {
    /// Drop cells below the given percentile.
    #[default]
    Percentile,
    /// Drop cells below a percentage of the largest sensitivity.
    Percent,
    /// As `Percent`, on `log10(s + 1)`.
    LogPercent,
}

impl CutoffMethod {
    pub const NAMES: [&'static str; 3] = ["percentile", "percent", "log_percent"];

    pub fn as_str(&self) -> &'static str {
        match self {
            CutoffMethod::Percentile => "percentile",
            CutoffMethod::Percent => "percent",
            CutoffMethod::LogPercent => "log_percent",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "percentile" => Some(CutoffMethod::Percentile),
            "percent" => Some(CutoffMethod::Percent),
            "log_percent" => Some(CutoffMethod::LogPercent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityCutoffOptions {
    /// Octree mesh holding the saved sensitivities.
    pub mesh: DataRef,
    pub sensitivity_model: DataRef,
    pub sensitivity_cutoff: f64,
    pub cutoff_method: CutoffMethod,
    /// Base name of the mask and scaled sensitivities written back.
    pub mask_name: String,
}

impl SensitivityCutoffOptions {
    fn template(ui: &mut UiJson) {
        ui.insert_form(
            "mesh",
            UiForm::new(FieldValue::Null).main().group("Sensitivity").label("Mesh"),
        );
        ui.insert_form(
            "sensitivity_model",
            UiForm::new(FieldValue::Null)
                .main()
                .group("Sensitivity")
                .label("Sensitivity")
                .data("mesh", "Cell", "Float"),
        );
        ui.insert_form(
            "sensitivity_cutoff",
            UiForm::new(0.1)
                .main()
                .group("Sensitivity")
                .label("Cutoff")
                .bounds(0.0, 100.0)
                .tooltip("Percentage below which cells are considered unresolved"),
        );
        ui.insert_form(
            "cutoff_method",
            UiForm::new(CutoffMethod::default().as_str())
                .main()
                .group("Sensitivity")
                .label("Cutoff method")
                .choices(&CutoffMethod::NAMES),
        );
        ui.insert_form(
            "mask_name",
            UiForm::new(DEFAULT_MASK_NAME).group("Sensitivity").label("Mask name"),
        );
    }

    fn read(reader: &mut FieldReader<'_>) -> Self {
        Self {
            mesh: reader.required_ref("mesh"),
            sensitivity_model: reader.required_ref("sensitivity_model"),
            sensitivity_cutoff: reader.f64("sensitivity_cutoff", 0.1),
            cutoff_method: reader
                .opt_text("cutoff_method")
                .and_then(|s| CutoffMethod::parse(&s))
                .unwrap_or_default(),
            mask_name: reader
                .opt_text("mask_name")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MASK_NAME.to_string()),
        }
    }

    fn references(&self, refs: &mut ReferenceCheck<'_>) {
        refs.expect("mesh", self.mesh, "octree mesh", |k| {
            matches!(k, EntityKind::Octree { .. })
        });
        let model = refs.expect("sensitivity_model", self.sensitivity_model, "float data", |k| {
            matches!(k, EntityKind::FloatData { .. })
        });
        if let Some(EntityInfo {
            parent: Some(parent),
            ..
        }) = model
        {
            if parent != self.mesh && self.mesh != DataRef::NIL {
                refs.push(
                    "sensitivity_model",
                    Constraint::Rule(String::from("sensitivities must be stored on the mesh")),
                );
            }
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "mesh", self.mesh);
        put(ui, "sensitivity_model", self.sensitivity_model);
        put(ui, "sensitivity_cutoff", self.sensitivity_cutoff);
        put(ui, "cutoff_method", self.cutoff_method.as_str());
        put(ui, "mask_name", self.mask_name.as_str());
    }
}

// ============================================================================
// Homogeneous Inversion
// ============================================================================

/// Inversion for one property value per geological unit, reusing the survey
/// setup of an earlier run.
#[derive(Debug, Clone, PartialEq)]
pub struct HomogeneousOptions {
    /// Output group of the run whose survey and misfit are reused.
    pub inversion_group: DataRef,
    pub mesh: DataRef,
    /// Unit labels on the mesh cells.
    pub geo_model: DataRef,
    pub physical_property: String,
    pub out_group: Option<DataRef>,
}

impl HomogeneousOptions {
    fn template(ui: &mut UiJson) {
        ui.insert_form(
            "inversion_group",
            UiForm::new(FieldValue::Null)
                .main()
                .group("Inversion")
                .label("Inversion group"),
        );
        ui.insert_form(
            "mesh",
            UiForm::new(FieldValue::Null).main().group("Mesh and models").label("Mesh"),
        );
        ui.insert_form(
            "geo_model",
            UiForm::new(FieldValue::Null)
                .main()
                .group("Mesh and models")
                .label("Geological model")
                .data("mesh", "Cell", "Referenced"),
        );
        ui.insert_form(
            "out_group",
            UiForm::new(FieldValue::Null)
                .group("Output")
                .label("Output group")
                .optional(false),
        );
    }

    fn read(reader: &mut FieldReader<'_>) -> Self {
        Self {
            inversion_group: reader.required_ref("inversion_group"),
            mesh: reader.required_ref("mesh"),
            geo_model: reader.required_ref("geo_model"),
            physical_property: reader.text("physical_property", "SI"),
            out_group: reader.opt_ref("out_group"),
        }
    }

    fn references(&self, refs: &mut ReferenceCheck<'_>) {
        let group = refs.expect("inversion_group", self.inversion_group, "run group", |k| {
            matches!(k, EntityKind::RunGroup { .. })
        });
        if let Some(EntityKind::RunGroup {
            inversion_type: Some(name),
            ..
        }) = group.map(|info| info.kind)
        {
            let single = SurveyKind::from_inversion_type(&name).is_some_and(|k| !k.is_joint());
            if !single {
                refs.push(
                    "inversion_group",
                    Constraint::Rule(format!(
                        "a homogeneous inversion needs a single-survey run, found '{}'",
                        name
                    )),
                );
            }
        }

        refs.expect("mesh", self.mesh, "mesh", EntityKind::is_mesh);
        let geo = refs.expect("geo_model", self.geo_model, "referenced data", |k| {
            matches!(k, EntityKind::ReferencedData { .. })
        });
        if let Some(EntityKind::ReferencedData { association, .. }) = geo.map(|info| info.kind) {
            if association != Association::Cell {
                refs.push(
                    "geo_model",
                    Constraint::Rule(String::from(
                        "Geological model must be associated with cells.",
                    )),
                );
            }
        }

        if let Some(id) = self.out_group {
            refs.lookup("out_group", id);
        }
    }

    fn write(&self, ui: &mut UiJson) {
        put(ui, "inversion_group", self.inversion_group);
        put(ui, "mesh", self.mesh);
        put(ui, "geo_model", self.geo_model);
        put(ui, "physical_property", self.physical_property.as_str());
        put(ui, "out_group", self.out_group);
    }
}

// ============================================================================
// Plate Simulation
// ============================================================================

/// Octree built around the survey, the topography and the plates.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateMeshOptions {
    pub u_cell_size: f64,
    pub v_cell_size: f64,
    pub w_cell_size: f64,
    pub padding_distance: f64,
    pub depth_core: f64,
    pub max_distance: f64,
    pub minimum_level: usize,
    pub diagonal_balance: bool,
}

impl Default for PlateMeshOptions {
    fn default() -> Self {
        Self {
            u_cell_size: 25.0,
            v_cell_size: 25.0,
            w_cell_size: 25.0,
            padding_distance: 1500.0,
            depth_core: 500.0,
            max_distance: 200.0,
            minimum_level: 8,
            diagonal_balance: false,
        }
    }
}

/// Surface the plate elevation is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceSurface {
    #[default]
    Topography,
    Overburden,
}

impl ReferenceSurface {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceSurface::Topography => "topography",
            ReferenceSurface::Overburden => "overburden",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "topography" => Some(ReferenceSurface::Topography),
            "overburden" => Some(ReferenceSurface::Overburden),
            _ => None,
        }
    }
}

/// Statistic of the reference surface a relative elevation is added to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceType {
    #[default]
    Mean,
    Min,
    Max,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Mean => "mean",
            ReferenceType::Min => "min",
            ReferenceType::Max => "max",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "mean" => Some(ReferenceType::Mean),
            "min" => Some(ReferenceType::Min),
            "max" => Some(ReferenceType::Max),
            _ => None,
        }
    }
}

/// One anomalous plate, optionally repeated `number` times `spacing` apart.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateOptions {
    pub name: String,
    /// Property value given to the plate.
    pub plate: f64,
    pub width: f64,
    pub strike_length: f64,
    pub dip_length: f64,
    /// Degrees from horizontal.
    pub dip: f64,
    /// Degrees from north.
    pub dip_direction: f64,
    pub number: usize,
    pub spacing: f64,
    /// Easting and northing relative to the survey centre, elevation
    /// relative to the reference surface.
    pub relative_locations: bool,
    pub easting: f64,
    pub northing: f64,
    pub elevation: f64,
    pub reference_surface: ReferenceSurface,
    pub reference_type: ReferenceType,
}

impl PlateOptions {
    /// Half the vertical extent of the plate.
    pub fn half_height(&self) -> f64 {
        0.5 * self.dip_length * self.dip.to_radians().sin()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverburdenOptions {
    pub thickness: f64,
    pub overburden: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlateModelOptions {
    pub background: f64,
    pub overburden_model: OverburdenOptions,
    pub plate_model: PlateOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlateSimulationOptions {
    pub mesh: PlateMeshOptions,
    pub model: PlateModelOptions,
    /// Run group whose survey and forward options are simulated.
    pub simulation: DataRef,
    pub out_group: Option<DataRef>,
}

impl PlateSimulationOptions {
    fn template(ui: &mut UiJson) {
        let mesh = PlateMeshOptions::default();
        for (name, label, value) in [
            ("u_cell_size", "Easting cell size", mesh.u_cell_size),
            ("v_cell_size", "Northing cell size", mesh.v_cell_size),
            ("w_cell_size", "Vertical cell size", mesh.w_cell_size),
            ("padding_distance", "Padding distance", mesh.padding_distance),
            ("depth_core", "Depth of core", mesh.depth_core),
            ("max_distance", "Maximum distance", mesh.max_distance),
        ] {
            ui.insert_form(name, UiForm::new(value).group("Mesh").label(label).min(0.0));
        }
        ui.insert_form(
            "minimum_level",
            UiForm::new(mesh.minimum_level).group("Mesh").label("Minimum level").min(1.0),
        );
        ui.insert_form(
            "diagonal_balance",
            UiForm::new(mesh.diagonal_balance).group("Mesh").label("Diagonal balance"),
        );

        ui.insert_form("background", UiForm::new(1000.0).main().group("Model").label("Background"));
        ui.insert_form("overburden", UiForm::new(50.0).main().group("Model").label("Overburden"));
        ui.insert_form(
            "thickness",
            UiForm::new(50.0).main().group("Model").label("Overburden thickness").min(0.0),
        );

        ui.insert_form("plate_name", UiForm::new("Plate").group("Plate").label("Name"));
        ui.insert_form("plate", UiForm::new(1.0).main().group("Plate").label("Plate value"));
        for (name, label, value) in [
            ("width", "Width", 10.0),
            ("strike_length", "Strike length", 1000.0),
            ("dip_length", "Dip length", 500.0),
        ] {
            ui.insert_form(name, UiForm::new(value).main().group("Plate").label(label).min(0.0));
        }
        ui.insert_form("dip", UiForm::new(90.0).group("Plate").label("Dip").bounds(0.0, 90.0));
        ui.insert_form(
            "dip_direction",
            UiForm::new(90.0).group("Plate").label("Dip direction").bounds(0.0, 360.0),
        );
        ui.insert_form("number", UiForm::new(1_i64).group("Plate").label("Number").min(1.0));
        ui.insert_form("spacing", UiForm::new(0.0).group("Plate").label("Spacing").min(0.0));
        ui.insert_form(
            "relative_locations",
            UiForm::new(false).group("Location").label("Relative locations"),
        );
        ui.insert_form("easting", UiForm::new(0.0).group("Location").label("Easting"));
        ui.insert_form("northing", UiForm::new(0.0).group("Location").label("Northing"));
        ui.insert_form("elevation", UiForm::new(-100.0).group("Location").label("Elevation"));
        ui.insert_form(
            "reference_surface",
            UiForm::new(ReferenceSurface::default().as_str())
                .group("Location")
                .label("Reference surface")
                .choices(&["topography", "overburden"]),
        );
        ui.insert_form(
            "reference_type",
            UiForm::new(ReferenceType::default().as_str())
                .group("Location")
                .label("Reference type")
                .choices(&["mean", "min", "max"]),
        );

        ui.insert_form(
            "simulation",
            UiForm::new(FieldValue::Null)
                .main()
                .group("Simulation")
                .label("Simulation"),
        );
        ui.insert_form(
            "out_group",
            UiForm::new(FieldValue::Null)
                .group("Output")
                .label("Output group")
                .optional(false),
        );
    }

    fn read(reader: &mut FieldReader<'_>) -> Self {
        let d = PlateMeshOptions::default();
        let mesh = PlateMeshOptions {
            u_cell_size: reader.f64("u_cell_size", d.u_cell_size),
            v_cell_size: reader.f64("v_cell_size", d.v_cell_size),
            w_cell_size: reader.f64("w_cell_size", d.w_cell_size),
            padding_distance: reader.f64("padding_distance", d.padding_distance),
            depth_core: reader.f64("depth_core", d.depth_core),
            max_distance: reader.f64("max_distance", d.max_distance),
            minimum_level: reader.usize("minimum_level", d.minimum_level),
            diagonal_balance: reader.bool("diagonal_balance", d.diagonal_balance),
        };

        let number = reader.usize("number", 1);
        // A single plate has nothing to be spaced from.
        let spacing = if number == 1 { 0.0 } else { reader.f64("spacing", 0.0) };
        let plate_model = PlateOptions {
            name: reader.text("plate_name", "Plate"),
            plate: reader.f64("plate", 1.0),
            width: reader.f64("width", 10.0),
            strike_length: reader.f64("strike_length", 1000.0),
            dip_length: reader.f64("dip_length", 500.0),
            dip: reader.f64("dip", 90.0),
            dip_direction: reader.f64("dip_direction", 90.0),
            number,
            spacing,
            relative_locations: reader.bool("relative_locations", false),
            easting: reader.f64("easting", 0.0),
            northing: reader.f64("northing", 0.0),
            elevation: reader.f64("elevation", -100.0),
            reference_surface: reader
                .opt_text("reference_surface")
                .and_then(|s| ReferenceSurface::parse(&s))
                .unwrap_or_default(),
            reference_type: reader
                .opt_text("reference_type")
                .and_then(|s| ReferenceType::parse(&s))
                .unwrap_or_default(),
        };

        let model = PlateModelOptions {
            background: reader.f64("background", 1000.0),
            overburden_model: OverburdenOptions {
                thickness: reader.f64("thickness", 50.0),
                overburden: reader.f64("overburden", 50.0),
            },
            plate_model,
        };

        Self {
            mesh,
            model,
            simulation: reader.required_ref("simulation"),
            out_group: reader.opt_ref("out_group"),
        }
    }

    fn check(&self, report: &mut Report) {
        let mesh = &self.mesh;
        let plate = &self.model.plate_model;
        positive(
            report,
            &[
                ("u_cell_size", mesh.u_cell_size),
                ("v_cell_size", mesh.v_cell_size),
                ("w_cell_size", mesh.w_cell_size),
                ("width", plate.width),
                ("strike_length", plate.strike_length),
                ("dip_length", plate.dip_length),
            ],
        );
        if plate.number > 1 && (plate.spacing.is_nan() || plate.spacing <= 0.0) {
            report.push(
                "spacing",
                Constraint::Rule(String::from("several plates need a positive spacing")),
            );
        }
    }

    fn references(&self, refs: &mut ReferenceCheck<'_>) {
        let group = refs.expect("simulation", self.simulation, "run group", |k| {
            matches!(k, EntityKind::RunGroup { .. })
        });
        if let Some(EntityKind::RunGroup {
            inversion_type: Some(name),
            ..
        }) = group.map(|info| info.kind)
        {
            let supported = SurveyKind::from_inversion_type(&name)
                .is_some_and(|k| PLATE_SIMULATION_KINDS.contains(&k));
            if !supported {
                refs.push(
                    "simulation",
                    Constraint::Rule(format!("plate simulation does not support '{}' runs", name)),
                );
            }
        }
        if let Some(id) = self.out_group {
            refs.lookup("out_group", id);
        }
    }

    fn write(&self, ui: &mut UiJson) {
        let mesh = &self.mesh;
        put(ui, "u_cell_size", mesh.u_cell_size);
        put(ui, "v_cell_size", mesh.v_cell_size);
        put(ui, "w_cell_size", mesh.w_cell_size);
        put(ui, "padding_distance", mesh.padding_distance);
        put(ui, "depth_core", mesh.depth_core);
        put(ui, "max_distance", mesh.max_distance);
        put(ui, "minimum_level", mesh.minimum_level);
        put(ui, "diagonal_balance", mesh.diagonal_balance);

        let model = &self.model;
        put(ui, "background", model.background);
        put(ui, "overburden", model.overburden_model.overburden);
        put(ui, "thickness", model.overburden_model.thickness);

        let plate = &model.plate_model;
        put(ui, "plate_name", plate.name.as_str());
        put(ui, "plate", plate.plate);
        put(ui, "width", plate.width);
        put(ui, "strike_length", plate.strike_length);
        put(ui, "dip_length", plate.dip_length);
        put(ui, "dip", plate.dip);
        put(ui, "dip_direction", plate.dip_direction);
        put(ui, "number", plate.number);
        put(ui, "spacing", plate.spacing);
        put(ui, "relative_locations", plate.relative_locations);
        put(ui, "easting", plate.easting);
        put(ui, "northing", plate.northing);
        put(ui, "elevation", plate.elevation);
        put(ui, "reference_surface", plate.reference_surface.as_str());
        put(ui, "reference_type", plate.reference_type.as_str());

        put(ui, "simulation", self.simulation);
        put(ui, "out_group", self.out_group);
    }
}

// ============================================================================
// Workflow Options
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowParams {
    SensitivityCutoff(SensitivityCutoffOptions),
    Homogeneous(HomogeneousOptions),
    PlateSimulation(Box<PlateSimulationOptions>),
}

/// Validated configuration of one workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOptions {
    pub kind: WorkflowKind,
    pub title: String,
    pub version: String,
    pub geoh5: Option<PathBuf>,
    pub run_command: String,
    pub conda_environment: Option<String>,
    pub params: WorkflowParams,
}

impl WorkflowOptions {
    pub fn to_ui_json(&self) -> UiJson {
        let mut ui = workflow_template(self.kind);
        put(&mut ui, "title", self.title.as_str());
        put(&mut ui, "version", self.version.as_str());
        put(
            &mut ui,
            "geoh5",
            self.geoh5.as_ref().map(|p| p.to_string_lossy().into_owned()),
        );
        put(&mut ui, "run_command", self.run_command.as_str());
        put(&mut ui, "conda_environment", self.conda_environment.clone());
        match &self.params {
            WorkflowParams::SensitivityCutoff(p) => p.write(&mut ui),
            WorkflowParams::Homogeneous(p) => p.write(&mut ui),
            WorkflowParams::PlateSimulation(p) => p.write(&mut ui),
        }
        ui
    }
}

/// Builds [`WorkflowOptions`] the way [`crate::OptionsBuilder`] builds
/// survey options: template, then file, then overrides, then validation.
#[derive(Debug, Clone)]
pub struct WorkflowBuilder<'a> {
    kind: WorkflowKind,
    file: Option<&'a UiJson>,
    overrides: Vec<(String, FieldValue)>,
}

impl<'a> WorkflowBuilder<'a> {
    pub fn new(kind: WorkflowKind) -> Self {
        Self {
            kind,
            file: None,
            overrides: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: &'a UiJson) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_override(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.overrides.push((name.to_string(), value.into()));
        self
    }

    pub fn populate(&self) -> UiJson {
        let schema = workflow_template(self.kind);
        let mut ui = match self.file {
            Some(file) => schema.merged(file),
            None => schema,
        };
        for (name, value) in &self.overrides {
            if !ui.set_value(name, value.clone()) {
                warn!("ignoring override of unknown field '{}'", name);
            }
        }
        if self.kind == WorkflowKind::Homogeneous {
            ui.set_value("inversion_type", "homogeneous".into());
        }
        ui
    }

    pub fn build(&self, catalog: &dyn EntityCatalog) -> Result<WorkflowOptions, ValidationErrors> {
        let ui = self.populate();
        let mut report = Report::new();
        let raw = effective_params(&ui, &mut report);

        let options = {
            let mut reader = FieldReader::new(&raw, &mut report);
            let params = match self.kind {
                WorkflowKind::SensitivityCutoff => {
                    WorkflowParams::SensitivityCutoff(SensitivityCutoffOptions::read(&mut reader))
                }
                WorkflowKind::Homogeneous => {
                    WorkflowParams::Homogeneous(HomogeneousOptions::read(&mut reader))
                }
                WorkflowKind::PlateSimulation => {
                    let params = PlateSimulationOptions::read(&mut reader);
                    WorkflowParams::PlateSimulation(Box::new(params))
                }
            };
            WorkflowOptions {
                kind: self.kind,
                title: reader.text("title", self.kind.title()),
                version: reader.text("version", env!("CARGO_PKG_VERSION")),
                geoh5: reader.opt_text("geoh5").map(PathBuf::from),
                run_command: reader.text("run_command", self.kind.run_command()),
                conda_environment: reader.opt_text("conda_environment"),
                params,
            }
        };

        if let WorkflowParams::PlateSimulation(p) = &options.params {
            p.check(&mut report);
        }

        if catalog.is_checked() {
            let mut refs = ReferenceCheck {
                catalog,
                report: &mut report,
            };
            match &options.params {
                WorkflowParams::SensitivityCutoff(p) => p.references(&mut refs),
                WorkflowParams::Homogeneous(p) => p.references(&mut refs),
                WorkflowParams::PlateSimulation(p) => p.references(&mut refs),
            }
        }

        if !report.is_empty() {
            debug!("{} rejected with {} violation(s)", self.kind, report.len());
        }
        report.into_result(options)
    }
}
