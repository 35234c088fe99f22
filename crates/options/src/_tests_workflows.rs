#![cfg(test)]

use super::catalog::{Association, EntityInfo, EntityKind, MemoryCatalog, UncheckedCatalog};
use super::dependency::DependencyGraph;
use super::uijson::{UiEntry, UiJson};
use super::validation::{check_metadata, Constraint, RawParams, Report};
use super::value::{DataRef, FieldValue};
use super::workflows::{
    workflow_template, CutoffMethod, ReferenceSurface, WorkflowBuilder, WorkflowKind,
    WorkflowParams, PLATE_SIMULATION_COMMAND,
};

fn required_refs(kind: WorkflowKind) -> &'static [&'static str] {
    match kind {
        WorkflowKind::SensitivityCutoff => &["mesh", "sensitivity_model"],
        WorkflowKind::Homogeneous => &["inversion_group", "mesh", "geo_model"],
        WorkflowKind::PlateSimulation => &["simulation"],
    }
}

fn builder(kind: WorkflowKind) -> WorkflowBuilder<'static> {
    required_refs(kind)
        .iter()
        .fold(WorkflowBuilder::new(kind), |b, name| {
            b.with_override(name, DataRef::new_v4())
        })
}

fn run_group(inversion_type: &str) -> EntityKind {
    EntityKind::RunGroup {
        inversion_type: Some(inversion_type.to_string()),
        physical_property: None,
    }
}

#[test]
fn templates_satisfy_their_own_metadata() {
    for kind in WorkflowKind::ALL {
        let ui = workflow_template(kind);
        let (graph, issues) = DependencyGraph::build(&ui);
        assert!(issues.is_empty(), "{kind}: {issues:?}");

        let raw = RawParams::from_ui(&ui, &graph.resolve(&ui));
        let mut report = Report::new();
        check_metadata(&ui, &raw, &mut report);
        assert!(report.is_empty(), "{kind}: {report:?}");
    }
}

#[test]
fn templates_are_recognised_by_detect() {
    for kind in WorkflowKind::ALL {
        assert_eq!(WorkflowKind::detect(&workflow_template(kind)), Some(kind));
    }
    let survey = super::options::template(super::survey::SurveyKind::Gravity, false);
    assert_eq!(WorkflowKind::detect(&survey), None);
}

#[test]
fn names_accept_underscores() {
    assert_eq!(
        WorkflowKind::from_name("plate_simulation"),
        Some(WorkflowKind::PlateSimulation)
    );
    assert_eq!(
        WorkflowKind::from_name(" Sensitivity Cutoff"),
        Some(WorkflowKind::SensitivityCutoff)
    );
    assert_eq!(WorkflowKind::from_name("gravity"), None);
}

#[test]
fn missing_references_are_required() {
    for kind in WorkflowKind::ALL {
        let err = WorkflowBuilder::new(kind).build(&UncheckedCatalog).unwrap_err();
        for name in required_refs(kind) {
            assert!(err.mentions(name), "{kind} {name}: {err}");
        }
    }
}

#[test]
fn sensitivity_cutoff_builds_against_the_catalog() {
    let mut catalog = MemoryCatalog::new();
    let mesh = catalog.add(EntityInfo::new("mesh", EntityKind::Octree { rotation: 0.0 }));
    let sensitivity = catalog.add(
        EntityInfo::new(
            "sensitivities",
            EntityKind::FloatData {
                association: Association::Cell,
            },
        )
        .child_of(mesh),
    );

    let options = WorkflowBuilder::new(WorkflowKind::SensitivityCutoff)
        .with_override("mesh", mesh)
        .with_override("sensitivity_model", sensitivity)
        .with_override("sensitivity_cutoff", 5.0)
        .with_override("cutoff_method", "log_percent")
        .build(&catalog)
        .unwrap();

    let WorkflowParams::SensitivityCutoff(params) = &options.params else {
        panic!("unexpected params {:?}", options.params);
    };
    assert_eq!(params.sensitivity_cutoff, 5.0);
    assert_eq!(params.cutoff_method, CutoffMethod::LogPercent);
    assert_eq!(params.mask_name, "Sensitivity Cutoff");
    assert_eq!(options.title, WorkflowKind::SensitivityCutoff.title());
}

#[test]
fn sensitivity_model_must_live_on_the_mesh() {
    let mut catalog = MemoryCatalog::new();
    let mesh = catalog.add(EntityInfo::new("mesh", EntityKind::Octree { rotation: 0.0 }));
    let other = catalog.add(EntityInfo::new("other", EntityKind::Octree { rotation: 0.0 }));
    let sensitivity = catalog.add(
        EntityInfo::new(
            "sensitivities",
            EntityKind::FloatData {
                association: Association::Cell,
            },
        )
        .child_of(other),
    );

    let err = WorkflowBuilder::new(WorkflowKind::SensitivityCutoff)
        .with_override("mesh", mesh)
        .with_override("sensitivity_model", sensitivity)
        .build(&catalog)
        .unwrap_err();
    assert_eq!(err.fields(), vec!["sensitivity_model"], "{err}");
}

#[test]
fn unknown_cutoff_method_is_rejected() {
    let err = builder(WorkflowKind::SensitivityCutoff)
        .with_override("cutoff_method", "median")
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(err.mentions("cutoff_method"), "{err}");
}

#[test]
fn homogeneous_needs_cell_units_and_a_single_survey_run() {
    let mut catalog = MemoryCatalog::new();
    let mesh = catalog.add(EntityInfo::new("mesh", EntityKind::Octree { rotation: 0.0 }));
    let units = catalog.add(
        EntityInfo::new(
            "units",
            EntityKind::ReferencedData {
                association: Association::Vertex,
                values: vec![1, 2, 3],
            },
        )
        .child_of(mesh),
    );
    let joint = catalog.add(EntityInfo::new("joint", run_group("joint surveys")));

    let err = WorkflowBuilder::new(WorkflowKind::Homogeneous)
        .with_override("inversion_group", joint)
        .with_override("mesh", mesh)
        .with_override("geo_model", units)
        .build(&catalog)
        .unwrap_err();
    assert!(err.mentions("inversion_group"), "{err}");
    assert!(err.mentions("geo_model"), "{err}");
    assert!(!err.mentions("mesh"), "{err}");
}

#[test]
fn homogeneous_builds_from_a_gravity_run() {
    let mut catalog = MemoryCatalog::new();
    let mesh = catalog.add(EntityInfo::new("mesh", EntityKind::Octree { rotation: 0.0 }));
    let units = catalog.add(EntityInfo::new(
        "units",
        EntityKind::ReferencedData {
            association: Association::Cell,
            values: vec![1, 2],
        },
    ));
    let run = catalog.add(EntityInfo::new("gravity run", run_group("gravity")));

    let options = WorkflowBuilder::new(WorkflowKind::Homogeneous)
        .with_override("inversion_group", run)
        .with_override("mesh", mesh)
        .with_override("geo_model", units)
        .build(&catalog)
        .unwrap();
    let WorkflowParams::Homogeneous(params) = &options.params else {
        panic!("unexpected params {:?}", options.params);
    };
    assert_eq!(params.inversion_group, run);
    assert_eq!(params.physical_property, "SI");
    assert_eq!(params.out_group, None);
}

#[test]
fn single_plate_has_no_spacing() {
    let options = builder(WorkflowKind::PlateSimulation)
        .with_override("spacing", 250.0)
        .with_override("reference_surface", "overburden")
        .build(&UncheckedCatalog)
        .unwrap();
    let WorkflowParams::PlateSimulation(params) = &options.params else {
        panic!("unexpected params {:?}", options.params);
    };
    let plate = &params.model.plate_model;
    assert_eq!(plate.number, 1);
    assert_eq!(plate.spacing, 0.0);
    assert_eq!(plate.reference_surface, ReferenceSurface::Overburden);
    assert_eq!(params.mesh.minimum_level, 8);
    assert_eq!(options.run_command, PLATE_SIMULATION_COMMAND);
}

#[test]
fn repeated_plates_need_spacing() {
    let err = builder(WorkflowKind::PlateSimulation)
        .with_override("number", 3_i64)
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(err.mentions("spacing"), "{err}");

    let options = builder(WorkflowKind::PlateSimulation)
        .with_override("number", 3_i64)
        .with_override("spacing", 100.0)
        .build(&UncheckedCatalog)
        .unwrap();
    let WorkflowParams::PlateSimulation(params) = &options.params else {
        panic!("unexpected params {:?}", options.params);
    };
    assert_eq!(params.model.plate_model.spacing, 100.0);
}

#[test]
fn plate_sizes_must_be_positive() {
    let err = builder(WorkflowKind::PlateSimulation)
        .with_override("width", 0.0)
        .build(&UncheckedCatalog)
        .unwrap_err();
    assert!(
        err.has(&Constraint::Rule(String::from("must be positive"))),
        "{err}"
    );
    assert_eq!(err.fields(), vec!["width"], "{err}");
}

#[test]
fn plate_simulation_checks_the_simulated_survey() {
    let mut catalog = MemoryCatalog::new();
    let gravity = catalog.add(EntityInfo::new("gravity", run_group("gravity")));
    let legacy_fem = catalog.add(EntityInfo::new("fem", run_group("fem")));
    let scalar = catalog.add(EntityInfo::new("tmi", run_group("magnetic scalar")));

    for accepted in [gravity, legacy_fem] {
        builder(WorkflowKind::PlateSimulation)
            .with_override("simulation", accepted)
            .build(&catalog)
            .unwrap();
    }

    let err = builder(WorkflowKind::PlateSimulation)
        .with_override("simulation", scalar)
        .build(&catalog)
        .unwrap_err();
    assert_eq!(err.fields(), vec!["simulation"], "{err}");
}

#[test]
fn every_bounded_field_rejects_values_outside_its_bounds() {
    let mut checked = 0;
    for kind in WorkflowKind::ALL {
        let ui = builder(kind).populate();
        for (name, entry) in ui.iter() {
            let UiEntry::Form(form) = entry else { continue };
            let current = ui.value_of(name);
            if !current.is_numeric() {
                continue;
            }
            let integral = matches!(current, FieldValue::Int(_));
            let mut values = Vec::new();
            if let Some(min) = form.min {
                values.push(if integral {
                    FieldValue::Int(min.ceil() as i64 - 1)
                } else {
                    FieldValue::Float(min - 1e-3)
                });
            }
            if let Some(max) = form.max {
                values.push(if integral {
                    FieldValue::Int(max.floor() as i64 + 1)
                } else {
                    FieldValue::Float(max + 1e-3)
                });
            }
            for value in values {
                let err = builder(kind)
                    .with_override(name, value.clone())
                    .build(&UncheckedCatalog)
                    .unwrap_err();
                assert!(err.mentions(name), "{kind} {name}={value}: {err}");
                checked += 1;
            }
        }
    }
    assert!(checked >= 15, "only {checked} bounded values checked");
}

#[test]
fn written_options_build_back_to_themselves() {
    let options = builder(WorkflowKind::PlateSimulation)
        .with_override("number", 2_i64)
        .with_override("spacing", 75.0)
        .with_override("dip", 45.0)
        .build(&UncheckedCatalog)
        .unwrap();

    let text = options.to_ui_json().to_string_pretty().unwrap();
    let file = UiJson::from_str(&text).unwrap();
    assert_eq!(WorkflowKind::detect(&file), Some(WorkflowKind::PlateSimulation));

    let rebuilt = WorkflowBuilder::new(WorkflowKind::PlateSimulation)
        .with_file(&file)
        .build(&UncheckedCatalog)
        .unwrap();
    assert_eq!(rebuilt, options);
}
