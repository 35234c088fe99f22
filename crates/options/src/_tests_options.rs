#![cfg(test)]

use super::catalog::{Association, EntityInfo, EntityKind, MemoryCatalog, UncheckedCatalog};
use super::dependency::DependencyGraph;
use super::options::{template, OptionsBuilder, RunMode};
use super::survey::{Dimensionality, SurveyKind};
use super::uijson::{UiEntry, UiJson};
use super::validation::{check_metadata, Constraint, RawParams, Report};
use super::value::{DataRef, FieldValue, Uncertainty};

fn modes(kind: SurveyKind) -> Vec<bool> {
    if kind.has_forward() {
        vec![false, true]
    } else {
        vec![false]
    }
}

/// The smallest set of references that makes a template runnable.
fn minimal_overrides(kind: SurveyKind, forward_only: bool) -> Vec<(String, FieldValue)> {
    let spec = kind.spec();
    let mut out: Vec<(String, FieldValue)> = vec![(
        "topography_object".into(),
        DataRef::new_v4().into(),
    )];

    if kind.is_joint() {
        out.push(("group_a".into(), DataRef::new_v4().into()));
        out.push(("group_b".into(), DataRef::new_v4().into()));
        if kind == SurveyKind::JointPetrophysics {
            out.push(("mesh".into(), DataRef::new_v4().into()));
            out.push(("petrophysical_model".into(), DataRef::new_v4().into()));
        }
        return out;
    }

    out.push(("data_object".into(), DataRef::new_v4().into()));
    if spec.dimensionality == Dimensionality::ThreeD {
        out.push(("mesh".into(), DataRef::new_v4().into()));
    }
    if spec.dimensionality.uses_line_selection() {
        out.push(("line_object".into(), DataRef::new_v4().into()));
    }
    if !forward_only {
        out.push((format!("{}_channel", spec.components[0]), DataRef::new_v4().into()));
    }
    out
}

fn builder(kind: SurveyKind, forward_only: bool) -> OptionsBuilder<'static> {
    minimal_overrides(kind, forward_only)
        .into_iter()
        .fold(OptionsBuilder::new(kind, forward_only), |b, (name, value)| {
            b.with_override(&name, value)
        })
}

#[test]
fn template_defaults_satisfy_their_own_metadata() {
    for kind in SurveyKind::ALL {
        for forward_only in modes(kind) {
            let ui = template(kind, forward_only);
            let (graph, issues) = DependencyGraph::build(&ui);
            assert!(issues.is_empty(), "{kind}: {issues:?}");

            let raw = RawParams::from_ui(&ui, &graph.resolve(&ui));
            let mut report = Report::new();
            check_metadata(&ui, &raw, &mut report);
            assert!(report.is_empty(), "{kind} forward={forward_only}: {report:?}");
        }
    }
}

#[test]
fn templates_with_minimal_references_build() {
    for kind in SurveyKind::ALL {
        for forward_only in modes(kind) {
            let result = builder(kind, forward_only).build(&UncheckedCatalog);
            let options = match result {
                Ok(options) => options,
                Err(err) => panic!("{kind} forward={forward_only}: {err}"),
            };
            assert_eq!(options.kind, kind);
            assert_eq!(options.forward_only, forward_only);
            assert_eq!(options.title, kind.title(forward_only));
        }
    }
}

#[test]
fn template_alone_reports_missing_references() {
    let err = OptionsBuilder::new(SurveyKind::Gravity, false)
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(err.has(&Constraint::Required));
    assert!(err.mentions("data_object"));
    assert!(err.mentions("mesh"));
    assert!(err.has(&Constraint::NoActiveChannel));
    assert!(err.has(&Constraint::ActiveCellsMissing));
}

#[test]
fn inversion_types_are_fixed_by_the_builder() {
    let options = builder(SurveyKind::DirectCurrent3d, false)
        .with_override("inversion_type", "gravity")
        .build(&UncheckedCatalog)
        .unwrap();
    assert_eq!(options.kind, SurveyKind::DirectCurrent3d);
    let ui = options.to_ui_json();
    assert_eq!(ui.inversion_type().as_deref(), Some("direct current 3d"));
}

#[test]
fn joint_kinds_have_no_forward_mode() {
    let options = builder(SurveyKind::JointSurveys, false)
        .build(&UncheckedCatalog)
        .unwrap();
    let forward = OptionsBuilder::new(SurveyKind::JointSurveys, true);
    assert!(!forward.populate().forward_only());
    assert!(options.directives().is_some());
    assert!(options.models.starting_model.is_none());
}

#[test]
fn out_of_range_values_name_their_field() {
    let cases: [(&str, FieldValue); 5] = [
        ("chi_factor", 25.0.into()),
        ("x_norm", 3.0.into()),
        ("tile_spatial", 0_i64.into()),
        ("sens_wts_threshold", 101.0.into()),
        ("cooling_rate", 0_i64.into()),
    ];
    for (field, value) in cases {
        let err = builder(SurveyKind::Gravity, false)
            .with_override(field, value)
            .build(&UncheckedCatalog)
            .unwrap_err();
        assert!(err.mentions(field), "{field}: {err}");
    }
}

/// Values just below `min` and just above `max`, keeping integers integral.
fn outside(current: &FieldValue, min: Option<f64>, max: Option<f64>) -> Vec<FieldValue> {
    let integral = matches!(current, FieldValue::Int(_));
    let nudge = |bound: f64| bound.abs().max(1.0) * 1e-3;
    let mut out = Vec::new();
    if let Some(min) = min {
        out.push(if integral {
            FieldValue::Int(min.ceil() as i64 - 1)
        } else {
            FieldValue::Float(min - nudge(min))
        });
    }
    if let Some(max) = max {
        out.push(if integral {
            FieldValue::Int(max.floor() as i64 + 1)
        } else {
            FieldValue::Float(max + nudge(max))
        });
    }
    out
}

#[test]
fn every_bounded_field_rejects_values_outside_its_bounds() {
    let mut checked = 0;
    for kind in SurveyKind::ALL {
        for forward_only in modes(kind) {
            let ui = builder(kind, forward_only).populate();
            let state = DependencyGraph::build(&ui).0.resolve(&ui);

            for (name, entry) in ui.iter() {
                let UiEntry::Form(form) = entry else { continue };
                let current = ui.value_of(name);
                if !state.is_active(name) || !current.is_numeric() {
                    continue;
                }
                for value in outside(&current, form.min, form.max) {
                    let err = builder(kind, forward_only)
                        .with_override(name, value.clone())
                        .build(&UncheckedCatalog)
                        .unwrap_err();
                    assert!(err.mentions(name), "{kind} {name}={value}: {err}");
                    checked += 1;
                }
            }
        }
    }
    assert!(checked > 100, "only {checked} bounded values checked");
}

#[test]
fn file_bounds_cannot_loosen_the_template() {
    let file = UiJson::from_value(serde_json::json!({
        "chi_factor": {"value": 50.0, "min": 0.0, "max": 100.0}
    }))
    .unwrap();
    let err = builder(SurveyKind::Gravity, false)
        .with_file(&file)
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(err.mentions("chi_factor"), "{err}");
}

#[test]
fn file_form_without_value_keeps_the_default() {
    let file = UiJson::from_value(serde_json::json!({
        "chi_factor": {"label": "Target misfit"}
    }))
    .unwrap();
    let options = builder(SurveyKind::Gravity, false)
        .with_file(&file)
        .build(&UncheckedCatalog)
        .unwrap();
    let ui = options.to_ui_json();
    assert_eq!(ui.value_of("chi_factor"), FieldValue::Float(1.0));
}

#[test]
fn topography_and_active_model_together_are_rejected() {
    let err = builder(SurveyKind::Gravity, false)
        .with_override("active_model", DataRef::new_v4())
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(err.has(&Constraint::ActiveCellsConflict), "{err}");
}

#[test]
fn line_id_is_never_truncated() {
    let err = builder(SurveyKind::DirectCurrent2d, false)
        .with_override("line_id", 1.7)
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(err.mentions("line_id"), "{err}");
}

#[test]
fn disabling_every_channel_fails_every_inversion() {
    for kind in SurveyKind::ALL.into_iter().filter(|k| !k.is_joint()) {
        let channel = format!("{}_channel", kind.spec().components[0]);
        let err = builder(kind, false)
            .with_override(&channel, FieldValue::Null)
            .build(&UncheckedCatalog)
            .unwrap_err();
        assert!(err.has(&Constraint::NoActiveChannel), "{kind}: {err}");
        assert!(err.to_string().contains("at least one channel required"));
    }
}

#[test]
fn forward_runs_need_a_component() {
    let err = builder(SurveyKind::Gravity, true)
        .with_override("gz_channel_bool", false)
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(err.has(&Constraint::NoActiveComponent));

    let options = builder(SurveyKind::Gravity, true)
        .with_override("gzz_channel_bool", true)
        .build(&UncheckedCatalog)
        .unwrap();
    assert_eq!(options.active_components(), vec!["gz", "gzz"]);
    assert!(matches!(options.mode, RunMode::Forward { .. }));
}

#[test]
fn uncertainty_is_only_required_for_enabled_channels() {
    let options = builder(SurveyKind::Gravity, false)
        .with_override("gx_uncertainty", FieldValue::Null)
        .with_override("gz_uncertainty", 0.25)
        .build(&UncheckedCatalog)
        .unwrap();
    let channels = &options.directives().unwrap().channels;
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].uncertainty, Uncertainty::Constant(0.25));

    let err = builder(SurveyKind::Gravity, false)
        .with_override("gz_uncertainty", FieldValue::Null)
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(err.mentions("gz_uncertainty"));

    let err = builder(SurveyKind::Gravity, false)
        .with_override("gz_uncertainty", -1.0)
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(err.has(&Constraint::NegativeUncertainty(-1.0)));
    let reported = err.violations.iter().filter(|v| v.field == "gz_uncertainty").count();
    assert_eq!(reported, 1, "{err}");
}

#[test]
fn all_violations_are_reported_together() {
    let err = builder(SurveyKind::Gravity, false)
        .with_override("chi_factor", 50.0)
        .with_override("percentile", 1.0)
        .with_override("gz_channel", FieldValue::Null)
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(err.violations.len() >= 3);
    for field in ["chi_factor", "percentile", "channels"] {
        assert!(err.mentions(field), "{field} missing from {err}");
    }
}

#[test]
fn unknown_overrides_are_ignored() {
    let options = builder(SurveyKind::Gravity, false)
        .with_override("no_such_field", 1.0)
        .build(&UncheckedCatalog);
    assert!(options.is_ok());
}

#[test]
fn options_round_trip_through_ui_json() {
    for kind in SurveyKind::ALL {
        for forward_only in modes(kind) {
            let first = builder(kind, forward_only)
                .with_override("chi_factor", 2.0)
                .with_override("n_workers", FieldValue::Null)
                .build(&UncheckedCatalog)
                .unwrap();

            let text = first.to_ui_json().to_string_pretty().unwrap();
            let file = UiJson::from_str(&text).unwrap();
            let second = OptionsBuilder::new(kind, forward_only)
                .with_file(&file)
                .build(&UncheckedCatalog)
                .unwrap();
            assert_eq!(first, second, "{kind} forward={forward_only}");
        }
    }
}

#[test]
fn legacy_file_keys_reach_their_fields() {
    let file = UiJson::from_str(r#"{"coolingFactor": {"value": 4.0}, "prctile": 90}"#).unwrap();
    let options = minimal_overrides(SurveyKind::Gravity, false)
        .into_iter()
        .fold(
            OptionsBuilder::new(SurveyKind::Gravity, false).with_file(&file),
            |b, (name, value)| b.with_override(&name, value),
        )
        .build(&UncheckedCatalog)
        .unwrap();
    let d = options.directives().unwrap();
    assert_eq!(d.cooling.cooling_factor, 4.0);
    assert_eq!(d.irls.percentile, 90.0);
}

// ============================================================================
// Reference checks
// ============================================================================

struct Workspace {
    catalog: MemoryCatalog,
    survey: DataRef,
    mesh: DataRef,
    topography: DataRef,
    gz: DataRef,
}

fn workspace(rotation: f64) -> Workspace {
    let mut catalog = MemoryCatalog::new();
    let survey = catalog.add(EntityInfo::new("survey", EntityKind::Points));
    let mesh = catalog.add(EntityInfo::new("mesh", EntityKind::Octree { rotation }));
    let topography = catalog.add(EntityInfo::new("topo", EntityKind::Surface));
    let gz = catalog.add(
        EntityInfo::new(
            "gz",
            EntityKind::FloatData {
                association: Association::Vertex,
            },
        )
        .child_of(survey),
    );
    Workspace {
        catalog,
        survey,
        mesh,
        topography,
        gz,
    }
}

fn gravity_in(ws: &Workspace) -> OptionsBuilder<'static> {
    OptionsBuilder::new(SurveyKind::Gravity, false)
        .with_override("data_object", ws.survey)
        .with_override("mesh", ws.mesh)
        .with_override("topography_object", ws.topography)
        .with_override("gz_channel", ws.gz)
}

#[test]
fn known_references_pass() {
    let ws = workspace(0.0);
    assert!(gravity_in(&ws).build(&ws.catalog).is_ok());
}

#[test]
fn rotated_meshes_are_rejected() {
    let ws = workspace(30.0);
    let err = gravity_in(&ws).build(&ws.catalog).unwrap_err();
    assert!(err.has(&Constraint::RotatedMesh(30.0)));
    assert!(err.mentions("mesh"));
}

#[test]
fn missing_references_are_violations() {
    let ws = workspace(0.0);
    let ghost = DataRef::new_v4();
    let err = gravity_in(&ws)
        .with_override("starting_model", ghost)
        .build(&ws.catalog)
        .unwrap_err();
    assert!(err.has(&Constraint::MissingReference(ghost)));
    assert!(err.mentions("starting_model"));
}

#[test]
fn references_must_point_at_the_right_kind() {
    let ws = workspace(0.0);
    let err = gravity_in(&ws)
        .with_override("mesh", ws.topography)
        .build(&ws.catalog)
        .unwrap_err();
    assert!(err.has(&Constraint::WrongEntity {
        id: ws.topography,
        expected: "mesh",
        found: "surface",
    }));
}

#[test]
fn unchecked_catalog_skips_reference_checks() {
    let ws = workspace(45.0);
    assert!(gravity_in(&ws).build(&UncheckedCatalog).is_ok());
}

#[test]
fn line_objects_must_label_cells_and_contain_the_line() {
    let mut catalog = MemoryCatalog::new();
    let survey = catalog.add(EntityInfo::new("dipoles", EntityKind::Curve));
    let topo = catalog.add(EntityInfo::new("topo", EntityKind::Surface));
    let potential = catalog.add(EntityInfo::new(
        "potential",
        EntityKind::FloatData {
            association: Association::Cell,
        },
    ));
    let on_cells = catalog.add(EntityInfo::new(
        "lines",
        EntityKind::ReferencedData {
            association: Association::Cell,
            values: vec![1, 2, 3],
        },
    ));
    let on_vertices = catalog.add(EntityInfo::new(
        "vertex lines",
        EntityKind::ReferencedData {
            association: Association::Vertex,
            values: vec![1],
        },
    ));

    let build = |line_object: DataRef, line_id: i64| {
        OptionsBuilder::new(SurveyKind::DirectCurrent2d, false)
            .with_override("data_object", survey)
            .with_override("topography_object", topo)
            .with_override("potential_channel", potential)
            .with_override("line_object", line_object)
            .with_override("line_id", line_id)
            .build(&catalog)
    };

    assert!(build(on_cells, 2).is_ok());

    let err = build(on_cells, 7).unwrap_err();
    assert!(err.to_string().contains("Line id isn't referenced in the line object."));
    assert!(err.mentions("line_id"));

    let err = build(on_vertices, 1).unwrap_err();
    assert!(err
        .to_string()
        .contains("Line identifier must be associated with cells."));
}

#[test]
fn joint_surveys_share_a_physical_property() {
    let mut catalog = MemoryCatalog::new();
    let topo = catalog.add(EntityInfo::new("topo", EntityKind::Surface));
    let run = |property: &str| EntityKind::RunGroup {
        inversion_type: None,
        physical_property: Some(property.to_string()),
    };
    let a = catalog.add(EntityInfo::new("grav a", run("density")));
    let b = catalog.add(EntityInfo::new("grav b", run("density")));
    let m = catalog.add(EntityInfo::new("mag", run("susceptibility")));

    let build = |first: DataRef, second: DataRef| {
        OptionsBuilder::new(SurveyKind::JointSurveys, false)
            .with_override("topography_object", topo)
            .with_override("group_a", first)
            .with_override("group_b", second)
            .build(&catalog)
    };

    assert!(build(a, b).is_ok());
    let err = build(a, m).unwrap_err();
    assert!(err.mentions("group_a"));
    assert!(err.to_string().contains("common physical property"));

    let err = build(a, topo).unwrap_err();
    assert!(err.mentions("group_b"));
}

#[test]
fn property_group_channels_are_expected_for_em_surveys() {
    let mut catalog = MemoryCatalog::new();
    let survey = catalog.add(EntityInfo::new("loops", EntityKind::Curve));
    let mesh = catalog.add(EntityInfo::new("mesh", EntityKind::Octree { rotation: 0.0 }));
    let topo = catalog.add(EntityInfo::new("topo", EntityKind::Surface));
    let group = catalog.add(EntityInfo::new("dBzdt", EntityKind::PropertyGroup { properties: vec![] }));
    let single = catalog.add(EntityInfo::new(
        "dBzdt t0",
        EntityKind::FloatData {
            association: Association::Vertex,
        },
    ));

    let build = |channel: DataRef| {
        OptionsBuilder::new(SurveyKind::Tdem, false)
            .with_override("data_object", survey)
            .with_override("mesh", mesh)
            .with_override("topography_object", topo)
            .with_override("z_channel", channel)
            .build(&catalog)
    };

    let options = build(group).unwrap();
    assert_eq!(options.survey.data_units.as_deref(), Some("dB/dt (T/s)"));
    let err = build(single).unwrap_err();
    assert!(err.mentions("z_channel"));
}
