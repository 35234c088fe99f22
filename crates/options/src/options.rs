//! Built-in templates and the two-phase options builder.
//!
//! Phase one populates: the kind's template, the loaded file and any explicit
//! overrides are merged, the dependency graph is resolved, and every field is
//! reduced to its effective value. Phase two validates: metadata bounds and
//! choices, typed reads, group rules, survey rules and reference checks each
//! add to one report, so a caller sees every problem at once.

use std::path::PathBuf;

use log::{debug, warn};
use serde_json::Value;

use crate::catalog::{Association, EntityCatalog, EntityInfo, EntityKind};
use crate::dependency::{DependencyGraph, GraphIssue};
use crate::groups::{
    ActiveCellsOptions, ComputeOptions, CoolingScheduleOptions, DrapeModelOptions,
    FileControlOptions, GroupContext, InducingField, IrlsOptions, JointGroups, LineSelection,
    ModelOptions, OptimizationOptions, OptionGroup, RegularizationOptions, SensitivityOptions,
};
use crate::survey::{ChannelLayout, Dimensionality, SurveyKind};
use crate::uijson::{DependencyType, UiForm, UiJson};
use crate::validation::{check_metadata, Constraint, FieldReader, RawParams, Report, ValidationErrors};
use crate::value::{DataRef, FieldValue, Uncertainty, ValueOrRef};

/// Module run by the external library unless a file says otherwise.
pub const DEFAULT_RUN_COMMAND: &str = "simpeg_drivers.driver";
pub const DEFAULT_CONDA_ENVIRONMENT: &str = "simpeg_drivers";

pub const TDEM_DATA_UNITS: [&str; 3] = ["dB/dt (T/s)", "B (T)", "H (A/m)"];

// ============================================================================
// Templates
// ============================================================================

/// Built-in UI-description template of a survey kind.
///
/// Inversion-only kinds ignore `forward_only`. Templates carry no
/// references, so they become runnable once the data object, channels and
/// mesh are filled in.
pub fn template(kind: SurveyKind, forward_only: bool) -> UiJson {
    let forward_only = forward_only && kind.has_forward();
    let spec = kind.spec();
    let ctx = GroupContext { spec, forward_only };
    let mut ui = UiJson::new();

    ui.insert_plain("version", env!("CARGO_PKG_VERSION"));
    ui.insert_plain("title", kind.title(forward_only));
    ui.insert_plain("inversion_type", kind.inversion_type());
    ui.insert_plain("forward_only", forward_only);
    if !spec.physical_property.is_empty() {
        ui.insert_plain("physical_property", spec.physical_property);
    }
    ui.insert_plain("geoh5", "");
    ui.insert_plain("run_command", DEFAULT_RUN_COMMAND);
    ui.insert_plain("conda_environment", DEFAULT_CONDA_ENVIRONMENT);

    if !kind.is_joint() {
        ui.insert_form(
            "data_object",
            UiForm::new(FieldValue::Null)
                .main()
                .group("Survey")
                .label("Object"),
        );
        if matches!(kind, SurveyKind::Tdem | SurveyKind::Tdem1d) {
            ui.insert_form(
                "data_units",
                UiForm::new(TDEM_DATA_UNITS[0])
                    .main()
                    .group("Survey")
                    .label("Data units")
                    .choices(&TDEM_DATA_UNITS),
            );
        }
    }

    if kind.is_magnetic() {
        InducingField::template(&mut ui, &ctx);
    }

    if forward_only {
        insert_component_toggles(&mut ui, kind);
    } else {
        insert_channels(&mut ui, kind);
    }

    if ctx.dimensionality().uses_line_selection() {
        LineSelection::template(&mut ui, &ctx);
    }

    let mesh = UiForm::new(FieldValue::Null)
        .main()
        .group("Mesh and models")
        .label("Mesh");
    let mesh_required = kind == SurveyKind::JointPetrophysics
        || (!kind.is_joint() && spec.dimensionality == Dimensionality::ThreeD);
    ui.insert_form("mesh", if mesh_required { mesh } else { mesh.optional(false) });

    if ctx.dimensionality().uses_drape_model() {
        DrapeModelOptions::template(&mut ui, &ctx);
    }

    ActiveCellsOptions::template(&mut ui, &ctx);
    ModelOptions::template(&mut ui, &ctx);

    if kind.is_joint() {
        JointGroups::template(&mut ui, &ctx);
    }

    if !forward_only {
        RegularizationOptions::template(&mut ui, &ctx);
        IrlsOptions::template(&mut ui, &ctx);
        CoolingScheduleOptions::template(&mut ui, &ctx);
        OptimizationOptions::template(&mut ui, &ctx);
        SensitivityOptions::template(&mut ui, &ctx);
    }

    if spec.dimensionality == Dimensionality::Pseudo3d {
        FileControlOptions::template(&mut ui, &ctx);
    }

    ComputeOptions::template(&mut ui, &ctx);

    ui.insert_form(
        "out_group",
        UiForm::new(FieldValue::Null)
            .group("Output")
            .label("Output group")
            .optional(false),
    );
    ui.insert_form(
        "generate_sweep",
        UiForm::new(false)
            .group("Output")
            .label("Generate sweep file")
            .tooltip("Write a sweep template next to the file instead of running"),
    );

    ui
}

fn insert_component_toggles(ui: &mut UiJson, kind: SurveyKind) {
    let spec = kind.spec();
    for component in spec.components {
        ui.insert_form(
            &format!("{}_channel_bool", component),
            UiForm::new(spec.forward_defaults.contains(component))
                .main()
                .group("Components")
                .label(component),
        );
    }
}

fn insert_channels(ui: &mut UiJson, kind: SurveyKind) {
    let spec = kind.spec();
    for component in spec.components {
        let channel = format!("{}_channel", component);
        let mut form = UiForm::new(FieldValue::Null)
            .main()
            .group("Data")
            .label(component)
            .data("data_object", "Vertex", "Float")
            .optional(false);
        if spec.layout == ChannelLayout::PropertyGroup {
            form.extra
                .insert(String::from("dataGroupType"), Value::from("Multi-element"));
        }
        ui.insert_form(&channel, form);

        ui.insert_form(
            &format!("{}_uncertainty", component),
            UiForm::new(spec.default_uncertainty)
                .main()
                .group("Data")
                .label("Uncertainty")
                .value_or_data("data_object")
                .depends_on(&channel, DependencyType::Enabled),
        );
    }
}

// ============================================================================
// Options
// ============================================================================

/// One observed data channel and its uncertainty.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChannel {
    pub component: String,
    /// A single data channel, or a property group for multi-channel layouts.
    pub data: DataRef,
    pub uncertainty: Uncertainty,
}

/// Directives that only an inversion carries.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionDirectives {
    pub channels: Vec<DataChannel>,
    pub regularization: RegularizationOptions,
    pub irls: IrlsOptions,
    pub cooling: CoolingScheduleOptions,
    pub optimization: OptimizationOptions,
    pub sensitivity: SensitivityOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    /// Simulate the selected components.
    Forward { components: Vec<String> },
    Inversion(Box<InversionDirectives>),
}

/// Survey-specific groups; each is present only for kinds that use it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurveyOptions {
    pub inducing_field: Option<InducingField>,
    pub line: Option<LineSelection>,
    pub drape: Option<DrapeModelOptions>,
    pub file_control: Option<FileControlOptions>,
    pub data_units: Option<String>,
    pub joint: Option<JointGroups>,
}

/// Validated, immutable configuration of one forward or inversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionOptions {
    pub kind: SurveyKind,
    pub forward_only: bool,
    pub title: String,
    pub version: String,
    /// Store the run reads from and writes to.
    pub geoh5: Option<PathBuf>,
    pub run_command: String,
    pub conda_environment: Option<String>,
    pub data_object: Option<DataRef>,
    pub mesh: Option<DataRef>,
    pub active_cells: ActiveCellsOptions,
    pub models: ModelOptions,
    pub survey: SurveyOptions,
    pub mode: RunMode,
    pub compute: ComputeOptions,
    pub out_group: Option<DataRef>,
    pub generate_sweep: bool,
}

impl InversionOptions {
    pub fn directives(&self) -> Option<&InversionDirectives> {
        match &self.mode {
            RunMode::Inversion(directives) => Some(directives),
            RunMode::Forward { .. } => None,
        }
    }

    /// Components that take part in the run.
    pub fn active_components(&self) -> Vec<&str> {
        match &self.mode {
            RunMode::Forward { components } => components.iter().map(String::as_str).collect(),
            RunMode::Inversion(d) => d.channels.iter().map(|c| c.component.as_str()).collect(),
        }
    }

    /// Write the options back into the kind's template.
    pub fn to_ui_json(&self) -> UiJson {
        let mut ui = template(self.kind, self.forward_only);
        let put = |ui: &mut UiJson, name: &str, value: FieldValue| {
            ui.set_value(name, value);
        };

        put(&mut ui, "title", self.title.as_str().into());
        put(&mut ui, "version", self.version.as_str().into());
        put(
            &mut ui,
            "geoh5",
            self.geoh5
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .into(),
        );
        put(&mut ui, "run_command", self.run_command.as_str().into());
        put(&mut ui, "conda_environment", self.conda_environment.clone().into());
        put(&mut ui, "data_object", self.data_object.into());
        put(&mut ui, "mesh", self.mesh.into());
        put(&mut ui, "data_units", self.survey.data_units.clone().into());

        match &self.mode {
            RunMode::Forward { components } => {
                for component in self.kind.spec().components {
                    let selected = components.iter().any(|c| c == component);
                    put(&mut ui, &format!("{}_channel_bool", component), selected.into());
                }
            }
            RunMode::Inversion(d) => {
                for component in self.kind.spec().components {
                    let channel = d.channels.iter().find(|c| c.component == *component);
                    put(
                        &mut ui,
                        &format!("{}_channel", component),
                        channel.map(|c| c.data).into(),
                    );
                    if let Some(c) = channel {
                        put(&mut ui, &format!("{}_uncertainty", component), c.uncertainty.into());
                    }
                }
                d.regularization.write(&mut ui);
                d.irls.write(&mut ui);
                d.cooling.write(&mut ui);
                d.optimization.write(&mut ui);
                d.sensitivity.write(&mut ui);
            }
        }

        self.active_cells.write(&mut ui);
        self.models.write(&mut ui);
        self.compute.write(&mut ui);
        if let Some(field) = &self.survey.inducing_field {
            field.write(&mut ui);
        }
        if let Some(line) = &self.survey.line {
            line.write(&mut ui);
        }
        if let Some(drape) = &self.survey.drape {
            drape.write(&mut ui);
        }
        if let Some(files) = &self.survey.file_control {
            files.write(&mut ui);
        }
        if let Some(joint) = &self.survey.joint {
            joint.write(&mut ui);
        }

        put(&mut ui, "out_group", self.out_group.into());
        put(&mut ui, "generate_sweep", self.generate_sweep.into());
        ui
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds [`InversionOptions`] from a template, a file and overrides.
#[derive(Debug, Clone)]
pub struct OptionsBuilder<'a> {
    kind: SurveyKind,
    forward_only: bool,
    file: Option<&'a UiJson>,
    overrides: Vec<(String, FieldValue)>,
}

impl<'a> OptionsBuilder<'a> {
    pub fn new(kind: SurveyKind, forward_only: bool) -> Self {
        Self {
            kind,
            forward_only: forward_only && kind.has_forward(),
            file: None,
            overrides: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: &'a UiJson) -> Self {
        self.file = Some(file);
        self
    }

    /// Applied after the file, in call order.
    pub fn with_override(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.overrides.push((name.to_string(), value.into()));
        self
    }

    /// Phase one without validation: the merged document.
    pub fn populate(&self) -> UiJson {
        let schema = template(self.kind, self.forward_only);
        let mut ui = match self.file {
            Some(file) => schema.merged(file),
            None => schema,
        };

        for (name, value) in &self.overrides {
            if ui.set_value(name, value.clone()) {
                debug!("override {} = {}", name, value);
            } else {
                warn!("ignoring override of unknown field '{}'", name);
            }
        }

        ui.set_value("inversion_type", self.kind.inversion_type().into());
        ui.set_value("forward_only", self.forward_only.into());
        ui
    }

    pub fn build(&self, catalog: &dyn EntityCatalog) -> Result<InversionOptions, ValidationErrors> {
        let ui = self.populate();
        let mut report = Report::new();
        let raw = effective_params(&ui, &mut report);

        let ctx = GroupContext {
            spec: self.kind.spec(),
            forward_only: self.forward_only,
        };
        let options = {
            let mut reader = FieldReader::new(&raw, &mut report);
            read_options(&mut reader, &ctx)
        };

        check_groups(&options, &mut report);
        check_survey_rules(&options, &mut report);
        if catalog.is_checked() {
            check_references(&options, catalog, &mut report);
        }

        if !report.is_empty() {
            debug!(
                "{} options rejected with {} violation(s)",
                self.kind,
                report.len()
            );
        }
        report.into_result(options)
    }
}

/// Resolve the dependency graph of `ui` and reduce it to effective values,
/// reporting graph issues and metadata violations on the way.
pub(crate) fn effective_params(ui: &UiJson, report: &mut Report) -> RawParams {
    let (graph, issues) = DependencyGraph::build(ui);
    for issue in issues {
        match issue {
            GraphIssue::UnknownGovernor { field, governor } => {
                report.push(&field, Constraint::UnknownDependency(governor));
            }
            GraphIssue::Cycle { fields } => {
                let first = fields.first().cloned().unwrap_or_default();
                report.push(&first, Constraint::DependencyCycle(fields));
            }
        }
    }

    let state = graph.resolve(ui);
    let raw = RawParams::from_ui(ui, &state);
    check_metadata(ui, &raw, report);
    raw
}

fn read_options(reader: &mut FieldReader<'_>, ctx: &GroupContext) -> InversionOptions {
    let spec = ctx.spec;
    let kind = spec.kind;
    let dimensionality = ctx.dimensionality();

    let data_object = if kind.is_joint() {
        None
    } else {
        Some(reader.required_ref("data_object"))
    };

    let mode = if ctx.forward_only {
        let components = spec
            .components
            .iter()
            .filter(|c| reader.bool(&format!("{}_channel_bool", c), false))
            .map(|c| c.to_string())
            .collect();
        RunMode::Forward { components }
    } else {
        let mut channels = Vec::new();
        for component in spec.components {
            let Some(data) = reader.opt_ref(&format!("{}_channel", component)) else {
                continue;
            };
            let name = format!("{}_uncertainty", component);
            let fallback = Uncertainty::Constant(spec.default_uncertainty);
            let uncertainty = if reader.is_null(&name) {
                reader.report().push(&name, Constraint::Required);
                fallback
            } else {
                reader.opt_uncertainty(&name).unwrap_or(fallback)
            };
            channels.push(DataChannel {
                component: component.to_string(),
                data,
                uncertainty,
            });
        }
        RunMode::Inversion(Box::new(InversionDirectives {
            channels,
            regularization: RegularizationOptions::read(reader, ctx),
            irls: IrlsOptions::read(reader, ctx),
            cooling: CoolingScheduleOptions::read(reader, ctx),
            optimization: OptimizationOptions::read(reader, ctx),
            sensitivity: SensitivityOptions::read(reader, ctx),
        }))
    };

    let survey = SurveyOptions {
        inducing_field: kind.is_magnetic().then(|| InducingField::read(reader, ctx)),
        line: dimensionality
            .uses_line_selection()
            .then(|| LineSelection::read(reader, ctx)),
        drape: dimensionality
            .uses_drape_model()
            .then(|| DrapeModelOptions::read(reader, ctx)),
        file_control: (dimensionality == Dimensionality::Pseudo3d)
            .then(|| FileControlOptions::read(reader, ctx)),
        data_units: matches!(kind, SurveyKind::Tdem | SurveyKind::Tdem1d)
            .then(|| reader.text("data_units", TDEM_DATA_UNITS[0])),
        joint: kind.is_joint().then(|| JointGroups::read(reader, ctx)),
    };

    let mesh_required = kind == SurveyKind::JointPetrophysics
        || (!kind.is_joint() && dimensionality == Dimensionality::ThreeD);
    let mesh = if mesh_required {
        Some(reader.required_ref("mesh"))
    } else {
        reader.opt_ref("mesh")
    };

    InversionOptions {
        kind,
        forward_only: ctx.forward_only,
        title: reader.text("title", kind.title(ctx.forward_only)),
        version: reader.text("version", env!("CARGO_PKG_VERSION")),
        geoh5: reader.opt_text("geoh5").map(PathBuf::from),
        run_command: reader.text("run_command", DEFAULT_RUN_COMMAND),
        conda_environment: reader.opt_text("conda_environment"),
        data_object,
        mesh,
        active_cells: ActiveCellsOptions::read(reader, ctx),
        models: ModelOptions::read(reader, ctx),
        survey,
        mode,
        compute: ComputeOptions::read(reader, ctx),
        out_group: reader.opt_ref("out_group"),
        generate_sweep: reader.bool("generate_sweep", false),
    }
}

fn check_groups(options: &InversionOptions, report: &mut Report) {
    options.active_cells.check(report);
    options.models.check(report);
    options.compute.check(report);
    if let Some(d) = options.directives() {
        d.regularization.check(report);
        d.irls.check(report);
        d.cooling.check(report);
        d.optimization.check(report);
        d.sensitivity.check(report);
    }
    if let Some(joint) = &options.survey.joint {
        joint.check(report);
    }
}

fn check_survey_rules(options: &InversionOptions, report: &mut Report) {
    if options.kind.is_joint() {
        return;
    }
    match &options.mode {
        RunMode::Forward { components } if components.is_empty() => {
            report.push("components", Constraint::NoActiveComponent);
        }
        RunMode::Inversion(d) if d.channels.is_empty() => {
            report.push("channels", Constraint::NoActiveChannel);
        }
        _ => {}
    }
}

// ============================================================================
// Reference Checks
// ============================================================================

pub(crate) struct ReferenceCheck<'c> {
    pub(crate) catalog: &'c dyn EntityCatalog,
    pub(crate) report: &'c mut Report,
}

impl ReferenceCheck<'_> {
    /// Look up a reference, reporting it when the catalog does not know it.
    /// The nil reference stands for a value already reported as missing.
    pub(crate) fn lookup(&mut self, field: &str, id: DataRef) -> Option<EntityInfo> {
        if id == DataRef::NIL {
            return None;
        }
        let found = self.catalog.entity(&id);
        if found.is_none() {
            self.report.push(field, Constraint::MissingReference(id));
        }
        found
    }

    pub(crate) fn expect(
        &mut self,
        field: &str,
        id: DataRef,
        expected: &'static str,
        accepts: impl Fn(&EntityKind) -> bool,
    ) -> Option<EntityInfo> {
        let info = self.lookup(field, id)?;
        if !accepts(&info.kind) {
            self.report.push(
                field,
                Constraint::WrongEntity {
                    id,
                    expected,
                    found: info.kind.describe(),
                },
            );
            return None;
        }
        Some(info)
    }

    fn model(&mut self, field: &str, value: Option<ValueOrRef>) {
        if let Some(id) = value.and_then(|v| v.reference()) {
            self.expect(field, id, "data", EntityKind::is_data);
        }
    }

    pub(crate) fn push(&mut self, field: &str, constraint: Constraint) {
        self.report.push(field, constraint);
    }
}

fn check_references(options: &InversionOptions, catalog: &dyn EntityCatalog, report: &mut Report) {
    let mut refs = ReferenceCheck { catalog, report };
    let kind = options.kind;

    if let Some(id) = options.data_object {
        refs.expect("data_object", id, "survey object", EntityKind::is_object);
    }

    if let Some(id) = options.mesh {
        if let Some(info) = refs.expect("mesh", id, "mesh", EntityKind::is_mesh) {
            if let EntityKind::Octree { rotation } = info.kind {
                if rotation != 0.0 {
                    refs.push("mesh", Constraint::RotatedMesh(rotation));
                }
            }
        }
    }

    let cells = &options.active_cells;
    if let Some(id) = cells.topography_object {
        refs.expect("topography_object", id, "object", EntityKind::is_object);
    }
    refs.model("topography", cells.topography);
    if let Some(id) = cells.active_model {
        refs.expect("active_model", id, "data", EntityKind::is_data);
    }

    let models = &options.models;
    refs.model("starting_model", models.starting_model);
    refs.model("reference_model", models.reference_model);
    refs.model("lower_bound", models.lower_bound);
    refs.model("upper_bound", models.upper_bound);

    if let Some(field) = &options.survey.inducing_field {
        refs.model("inducing_field_strength", Some(field.strength));
        refs.model("inducing_field_inclination", Some(field.inclination));
        refs.model("inducing_field_declination", Some(field.declination));
    }

    if let Some(d) = options.directives() {
        let multi = kind.spec().layout == ChannelLayout::PropertyGroup;
        for channel in &d.channels {
            let field = format!("{}_channel", channel.component);
            if multi {
                refs.expect(&field, channel.data, "property group", |k| {
                    matches!(k, EntityKind::PropertyGroup { .. })
                });
            } else {
                refs.expect(&field, channel.data, "data", EntityKind::is_data);
            }
            if let Uncertainty::PerObservation(id) = channel.uncertainty {
                let field = format!("{}_uncertainty", channel.component);
                refs.expect(&field, id, "data", |k| {
                    EntityKind::is_data(k) || matches!(k, EntityKind::PropertyGroup { .. })
                });
            }
        }

        let reg = &d.regularization;
        refs.model("alpha_s", reg.alpha_s);
        refs.model("length_scale_x", Some(reg.length_scale_x));
        refs.model("length_scale_y", reg.length_scale_y);
        refs.model("length_scale_z", Some(reg.length_scale_z));
        if let Some(id) = reg.gradient_rotation {
            refs.expect("gradient_rotation", id, "data", EntityKind::is_data);
        }

        let irls = &d.irls;
        refs.model("s_norm", irls.s_norm);
        refs.model("x_norm", Some(irls.x_norm));
        refs.model("y_norm", irls.y_norm);
        refs.model("z_norm", Some(irls.z_norm));
    }

    if let Some(line) = &options.survey.line {
        check_line(&mut refs, line);
    }

    if let Some(joint) = &options.survey.joint {
        check_joint(&mut refs, kind, joint);
    }

    if let Some(id) = options.out_group {
        refs.lookup("out_group", id);
    }
}

fn check_line(refs: &mut ReferenceCheck<'_>, line: &LineSelection) {
    let Some(info) = refs.expect("line_object", line.line_object, "referenced data", |k| {
        matches!(k, EntityKind::ReferencedData { .. })
    }) else {
        return;
    };
    if let EntityKind::ReferencedData { association, values } = info.kind {
        if association != Association::Cell {
            refs.push(
                "line_object",
                Constraint::Rule(String::from("Line identifier must be associated with cells.")),
            );
        } else if !values.contains(&line.line_id) {
            refs.push(
                "line_id",
                Constraint::Rule(String::from("Line id isn't referenced in the line object.")),
            );
        }
    }
}

fn check_joint(refs: &mut ReferenceCheck<'_>, kind: SurveyKind, joint: &JointGroups) {
    const NAMES: [&str; 3] = ["group_a", "group_b", "group_c"];
    let mut properties = Vec::new();
    for (name, member) in NAMES.iter().zip(&joint.members) {
        let info = refs.expect(name, member.group, "run group", |k| {
            matches!(k, EntityKind::RunGroup { .. })
        });
        if let Some(EntityInfo {
            kind: EntityKind::RunGroup {
                physical_property: Some(property),
                ..
            },
            ..
        }) = info
        {
            properties.push(property);
        }
    }

    if kind == SurveyKind::JointSurveys && properties.windows(2).any(|w| w[0] != w[1]) {
        refs.push(
            "group_a",
            Constraint::Rule(format!(
                "joint surveys require a common physical property, found {}",
                properties.join(", ")
            )),
        );
    }

    if let Some(id) = joint.petrophysical_model {
        refs.expect("petrophysical_model", id, "referenced data", |k| {
            matches!(k, EntityKind::ReferencedData { .. })
        });
    }
}
