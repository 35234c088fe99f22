#![cfg(test)]

use super::dependency::DependencyGraph;
use super::groups::*;
use super::survey::{Dimensionality, SurveyKind};
use super::uijson::UiJson;
use super::validation::{check_metadata, Constraint, FieldReader, RawParams, Report};
use super::value::{DataRef, FieldValue, ValueOrRef};

fn ctx(kind: SurveyKind, forward_only: bool) -> GroupContext {
    GroupContext {
        spec: kind.spec(),
        forward_only,
    }
}

/// Template a group, apply `values`, and read it back with its report.
fn read_group<G: OptionGroup>(
    ctx: &GroupContext,
    values: &[(&str, FieldValue)],
) -> (G, Report) {
    let mut ui = UiJson::new();
    G::template(&mut ui, ctx);
    for (name, value) in values {
        assert!(ui.set_value(name, value.clone()), "unknown field {name}");
    }
    // Governors outside the group are unknown here and leave dependents active.
    let (graph, _) = DependencyGraph::build(&ui);
    let raw = RawParams::from_ui(&ui, &graph.resolve(&ui));

    let mut report = Report::new();
    check_metadata(&ui, &raw, &mut report);
    let group = {
        let mut reader = FieldReader::new(&raw, &mut report);
        G::read(&mut reader, ctx)
    };
    group.check(&mut report);
    (group, report)
}

fn violations(report: Report) -> Vec<(String, Constraint)> {
    match report.into_result(()) {
        Ok(()) => Vec::new(),
        Err(err) => err
            .violations
            .into_iter()
            .map(|v| (v.field, v.constraint))
            .collect(),
    }
}

#[test]
fn active_cells_need_exactly_one_source() {
    let c = ctx(SurveyKind::Gravity, false);
    let topo = DataRef::new_v4();
    let model = DataRef::new_v4();

    let (_, report) = read_group::<ActiveCellsOptions>(&c, &[]);
    assert_eq!(
        violations(report),
        vec![("active_model".to_string(), Constraint::ActiveCellsMissing)]
    );

    let (cells, report) =
        read_group::<ActiveCellsOptions>(&c, &[("topography_object", topo.into())]);
    assert!(report.is_empty());
    assert_eq!(
        cells.source(),
        Some(ActiveCellsSource::Topography {
            object: topo,
            elevation: None
        })
    );

    let (cells, report) = read_group::<ActiveCellsOptions>(&c, &[("active_model", model.into())]);
    assert!(report.is_empty());
    assert_eq!(cells.source(), Some(ActiveCellsSource::ActiveModel(model)));
}

#[test]
fn active_model_next_to_topography_is_a_conflict() {
    let c = ctx(SurveyKind::Gravity, false);
    let model = DataRef::new_v4();
    let (cells, report) = read_group::<ActiveCellsOptions>(
        &c,
        &[
            ("topography_object", DataRef::new_v4().into()),
            ("active_model", model.into()),
        ],
    );
    assert_eq!(cells.active_model, Some(model));
    assert_eq!(cells.source(), None);
    assert_eq!(
        violations(report),
        vec![("active_model".to_string(), Constraint::ActiveCellsConflict)]
    );
}

#[test]
fn n_cpu_defaults_to_host_cores_when_parallelized() {
    let c = ctx(SurveyKind::Gravity, false);
    let (compute, report) = read_group::<ComputeOptions>(&c, &[]);
    assert!(report.is_empty());
    assert!(compute.parallelized);
    assert_eq!(compute.n_cpu, num_cpus::get());
    assert_eq!(compute.solver, SolverType::Pardiso);

    let (compute, _) = read_group::<ComputeOptions>(&c, &[("n_cpu", 3_i64.into())]);
    assert_eq!(compute.n_cpu, 3);

    let (compute, _) = read_group::<ComputeOptions>(
        &c,
        &[("parallelized", false.into()), ("n_cpu", 8_i64.into())],
    );
    assert_eq!(compute.n_cpu, 1);
}

#[test]
fn compute_bounds_come_from_metadata() {
    let c = ctx(SurveyKind::Gravity, false);
    let (_, report) = read_group::<ComputeOptions>(
        &c,
        &[
            ("tile_spatial", 0_i64.into()),
            ("solver_type", "Magic".into()),
        ],
    );
    let fields: Vec<String> = violations(report).into_iter().map(|(f, _)| f).collect();
    assert_eq!(fields, vec!["tile_spatial", "solver_type"]);
}

#[test]
fn lower_bound_above_upper_bound_is_rejected() {
    let c = ctx(SurveyKind::Gravity, false);
    let (models, report) = read_group::<ModelOptions>(
        &c,
        &[("lower_bound", 2.0.into()), ("upper_bound", 1.0.into())],
    );
    assert_eq!(models.lower_bound, Some(ValueOrRef::Value(2.0)));
    let found = violations(report);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, "lower_bound");
}

#[test]
fn induced_polarization_has_a_zero_lower_bound() {
    let c = ctx(SurveyKind::InducedPolarization3d, false);
    let (models, report) = read_group::<ModelOptions>(&c, &[]);
    assert!(report.is_empty());
    assert_eq!(models.lower_bound, Some(ValueOrRef::Value(0.0)));
    assert_eq!(models.upper_bound, None);
    assert_eq!(models.starting_model, Some(ValueOrRef::Value(0.0)));
}

#[test]
fn conductivity_surveys_carry_a_model_type() {
    let (models, _) = read_group::<ModelOptions>(&ctx(SurveyKind::Magnetotellurics, false), &[]);
    assert_eq!(models.model_type, Some(ModelType::Conductivity));

    let (models, _) = read_group::<ModelOptions>(
        &ctx(SurveyKind::Tdem, false),
        &[("model_type", "Resistivity (Ohm-m)".into())],
    );
    assert_eq!(models.model_type, Some(ModelType::Resistivity));

    let (models, _) = read_group::<ModelOptions>(&ctx(SurveyKind::Gravity, false), &[]);
    assert_eq!(models.model_type, None);
}

#[test]
fn forward_models_have_no_bounds() {
    let c = ctx(SurveyKind::Gravity, true);
    let mut ui = UiJson::new();
    ModelOptions::template(&mut ui, &c);
    assert!(ui.contains("starting_model"));
    assert!(!ui.contains("reference_model"));
    assert!(!ui.contains("lower_bound"));
}

#[test]
fn smallness_terms_follow_the_reference_model() {
    let c = ctx(SurveyKind::Gravity, false);
    let mut ui = UiJson::new();
    ModelOptions::template(&mut ui, &c);
    RegularizationOptions::template(&mut ui, &c);
    IrlsOptions::template(&mut ui, &c);

    let (graph, _) = DependencyGraph::build(&ui);
    let state = graph.resolve(&ui);
    assert!(!state.is_active("alpha_s"));
    assert!(!state.is_active("s_norm"));

    ui.set_value("reference_model", FieldValue::Float(0.0));
    let state = graph.resolve(&ui);
    assert!(state.is_active("alpha_s"));
    assert!(state.is_active("s_norm"));
}

#[test]
fn two_dimensional_surveys_drop_the_y_direction() {
    let c = ctx(SurveyKind::DirectCurrent2d, false);
    let (reg, report) = read_group::<RegularizationOptions>(&c, &[]);
    assert!(report.is_empty());
    assert_eq!(reg.length_scale_y, None);

    let (irls, _) = read_group::<IrlsOptions>(&c, &[]);
    assert_eq!(irls.y_norm, None);

    let (irls, _) = read_group::<IrlsOptions>(&ctx(SurveyKind::Gravity, false), &[]);
    assert_eq!(irls.y_norm, Some(ValueOrRef::Value(2.0)));
}

#[test]
fn norms_outside_zero_two_are_rejected() {
    let c = ctx(SurveyKind::Gravity, false);
    let (_, report) = read_group::<IrlsOptions>(&c, &[("x_norm", 2.5.into())]);
    let found = violations(report);
    assert_eq!(found.len(), 1);
    assert!(matches!(found[0].1, Constraint::OutOfRange { .. }));
}

#[test]
fn initial_beta_replaces_the_ratio() {
    let c = ctx(SurveyKind::Gravity, false);
    let (cooling, report) = read_group::<CoolingScheduleOptions>(&c, &[]);
    assert!(report.is_empty());
    assert_eq!(cooling.initial_beta_ratio, Some(10.0));
    assert_eq!(cooling.initial_beta, None);

    let (cooling, report) = read_group::<CoolingScheduleOptions>(
        &c,
        &[
            ("initial_beta_ratio", FieldValue::Null),
            ("initial_beta", 100.0.into()),
        ],
    );
    assert!(report.is_empty());
    assert_eq!(cooling.initial_beta_ratio, None);
    assert_eq!(cooling.initial_beta, Some(100.0));
}

#[test]
fn cooling_bounds_are_enforced() {
    let c = ctx(SurveyKind::Gravity, false);
    let (_, report) = read_group::<CoolingScheduleOptions>(
        &c,
        &[
            ("chi_factor", 0.05.into()),
            ("cooling_factor", 1.0.into()),
            ("cooling_rate", 11_i64.into()),
        ],
    );
    let fields: Vec<String> = violations(report).into_iter().map(|(f, _)| f).collect();
    assert_eq!(fields, vec!["chi_factor", "cooling_factor", "cooling_rate"]);
}

#[test]
fn drape_defaults_depend_on_dimensionality() {
    let one_d = DrapeModelOptions::for_dimensionality(Dimensionality::OneD);
    assert_eq!(one_d.u_cell_size, 10.0);
    assert_eq!(one_d.horizontal_padding, 0.0);

    let (two_d, report) =
        read_group::<DrapeModelOptions>(&ctx(SurveyKind::DirectCurrent2d, false), &[]);
    assert!(report.is_empty());
    assert_eq!(two_d.u_cell_size, 25.0);
    assert_eq!(two_d.horizontal_padding, 100.0);
    assert_eq!(two_d.expansion_factor, 1.1);
}

#[test]
fn line_selection_requires_a_line_object() {
    let c = ctx(SurveyKind::DirectCurrent2d, false);
    let (line, report) = read_group::<LineSelection>(&c, &[]);
    assert_eq!(line.line_id, 1);
    assert_eq!(
        violations(report),
        vec![("line_object".to_string(), Constraint::Required)]
    );
}

#[test]
fn fractional_line_id_is_a_type_error() {
    let c = ctx(SurveyKind::DirectCurrent2d, false);
    let line_object = DataRef::new_v4();
    let (line, report) = read_group::<LineSelection>(
        &c,
        &[
            ("line_object", line_object.into()),
            ("line_id", 1.7.into()),
        ],
    );
    assert_eq!(line.line_id, 1);
    let found = violations(report);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].0, "line_id");
    assert!(matches!(found[0].1, Constraint::WrongType { .. }));

    let (line, report) = read_group::<LineSelection>(
        &c,
        &[("line_object", line_object.into()), ("line_id", 3.0.into())],
    );
    assert!(report.is_empty());
    assert_eq!(line.line_id, 3);
}

#[test]
fn inducing_field_accepts_references() {
    let c = ctx(SurveyKind::MagneticScalar, false);
    let id = DataRef::new_v4();
    let (field, report) =
        read_group::<InducingField>(&c, &[("inducing_field_declination", id.into())]);
    assert!(report.is_empty());
    assert_eq!(field.strength, ValueOrRef::Value(50000.0));
    assert_eq!(field.declination, ValueOrRef::Ref(id));

    let (_, report) = read_group::<InducingField>(&c, &[("inducing_field_inclination", 95.0.into())]);
    assert_eq!(violations(report).len(), 1);
}

#[test]
fn joint_groups_take_an_optional_third_member() {
    let c = ctx(SurveyKind::JointCrossGradient, false);
    let (a, b, g) = (DataRef::new_v4(), DataRef::new_v4(), DataRef::new_v4());

    let (joint, report) = read_group::<JointGroups>(
        &c,
        &[("group_a", a.into()), ("group_b", b.into()), ("group_b_multiplier", 0.5.into())],
    );
    assert!(report.is_empty());
    assert_eq!(joint.members.len(), 2);
    assert_eq!(joint.members[1].multiplier, 0.5);
    let weights = joint.cross_gradient.unwrap();
    assert_eq!(weights.a_b, 1.0);
    assert_eq!(weights.a_c, None);

    let (joint, report) = read_group::<JointGroups>(
        &c,
        &[("group_a", a.into()), ("group_b", b.into()), ("group_c", g.into())],
    );
    assert!(report.is_empty());
    assert_eq!(joint.members.len(), 3);
    assert_eq!(joint.cross_gradient.unwrap().b_c, Some(1.0));
}

#[test]
fn joint_groups_reject_repeats_and_negative_multipliers() {
    let c = ctx(SurveyKind::JointSurveys, false);
    let a = DataRef::new_v4();
    let (_, report) = read_group::<JointGroups>(
        &c,
        &[("group_a", a.into()), ("group_b", a.into()), ("group_a_multiplier", (-1.0).into())],
    );
    let fields: Vec<String> = violations(report).into_iter().map(|(f, _)| f).collect();
    assert_eq!(fields, vec!["group_a_multiplier", "group_b"]);
}

#[test]
fn petrophysics_needs_a_reference_geology() {
    let c = ctx(SurveyKind::JointPetrophysics, false);
    let (joint, report) = read_group::<JointGroups>(
        &c,
        &[("group_a", DataRef::new_v4().into()), ("group_b", DataRef::new_v4().into())],
    );
    assert_eq!(joint.petrophysical_model, Some(DataRef::NIL));
    assert_eq!(
        violations(report),
        vec![("petrophysical_model".to_string(), Constraint::Required)]
    );
}
