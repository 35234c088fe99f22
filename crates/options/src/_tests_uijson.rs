#![cfg(test)]

use serde_json::json;

use super::uijson::{DependencyType, UiEntry, UiForm, UiJson, UiJsonError};
use super::value::{DataRef, FieldValue};

const GRAV_ID: &str = "{4c2a5c1e-6b9f-4a3e-9d55-0f3b1a7e2c10}";

fn sample() -> serde_json::Value {
    json!({
        "title": "Gravity Inversion",
        "inversion_type": "gravity",
        "forward_only": false,
        "geoh5": "/data/project.geoh5",
        "gz_channel": {
            "main": true,
            "group": "Data",
            "label": "gz",
            "value": GRAV_ID,
            "optional": true,
            "enabled": true,
            "dataGroupType": "Multi-element"
        },
        "gz_uncertainty": {
            "label": "Uncertainty",
            "value": 0.05,
            "isValue": true,
            "property": "",
            "dependency": "gz_channel",
            "dependencyType": "enabled"
        },
        "coolingFactor": {"label": "Beta cooling factor", "value": 4.0, "min": 1.1},
        "z_from_topo": {"label": "Take z from topography", "value": true}
    })
}

#[test]
fn loads_forms_and_plain_entries_in_order() {
    let ui = UiJson::from_value(sample()).unwrap();
    let names: Vec<&str> = ui.names().collect();
    assert_eq!(
        names,
        vec![
            "title",
            "inversion_type",
            "forward_only",
            "geoh5",
            "gz_channel",
            "gz_uncertainty",
            "cooling_factor"
        ]
    );
    assert!(matches!(ui.get("title"), Some(UiEntry::Plain(_))));
    assert!(ui.form("gz_channel").is_some());
    assert_eq!(ui.inversion_type().as_deref(), Some("gravity"));
    assert!(!ui.forward_only());
    assert_eq!(ui.geoh5().unwrap().to_str(), Some("/data/project.geoh5"));
}

#[test]
fn legacy_aliases_and_deprecated_keys_are_folded() {
    let ui = UiJson::from_value(sample()).unwrap();
    assert!(!ui.contains("coolingFactor"));
    assert!(!ui.contains("z_from_topo"));
    assert_eq!(ui.value_of("cooling_factor"), FieldValue::Float(4.0));
}

#[test]
fn braced_uuids_become_references() {
    let ui = UiJson::from_value(sample()).unwrap();
    let expected = DataRef::parse(GRAV_ID).unwrap();
    assert_eq!(ui.value_of("gz_channel"), FieldValue::Ref(expected));
}

#[test]
fn unknown_form_keys_survive_a_round_trip() {
    let ui = UiJson::from_value(sample()).unwrap();
    let text = ui.to_string_pretty().unwrap();
    let again = UiJson::from_str(&text).unwrap();
    assert_eq!(ui, again);
    assert_eq!(
        again.form("gz_channel").unwrap().extra.get("dataGroupType"),
        Some(&json!("Multi-element"))
    );
    assert_eq!(
        again.form("gz_uncertainty").unwrap().dependency_type,
        Some(DependencyType::Enabled)
    );
}

#[test]
fn optional_disabled_form_has_no_value() {
    let form = UiForm::new(3.0).optional(false);
    assert_eq!(form.own_value(), FieldValue::Null);
    let form = UiForm::new(3.0).optional(true);
    assert_eq!(form.own_value(), FieldValue::Float(3.0));
}

#[test]
fn property_is_used_when_is_value_is_false() {
    let id = DataRef::new_v4();
    let mut form = UiForm::new(1e-3).value_or_data("mesh");
    assert_eq!(form.own_value(), FieldValue::Float(1e-3));

    form.set_value(FieldValue::Ref(id));
    assert_eq!(form.is_value, Some(false));
    assert_eq!(form.own_value(), FieldValue::Ref(id));

    form.set_value(FieldValue::Float(2.0));
    assert_eq!(form.own_value(), FieldValue::Float(2.0));
}

#[test]
fn set_value_toggles_optional_checkbox() {
    let mut ui = UiJson::new();
    ui.insert_form("upper_bound", UiForm::new(FieldValue::Null).optional(false));
    assert!(ui.set_value("upper_bound", FieldValue::Float(10.0)));
    assert_eq!(ui.form("upper_bound").unwrap().enabled, Some(true));
    ui.set_value("upper_bound", FieldValue::Null);
    assert_eq!(ui.form("upper_bound").unwrap().enabled, Some(false));
    assert!(!ui.set_value("not_there", FieldValue::Int(1)));
}

#[test]
fn merge_overlays_file_on_schema() {
    let mut schema = UiJson::new();
    schema.insert_plain("inversion_type", "gravity");
    schema.insert_form("chi_factor", UiForm::new(1.0).label("Chi factor").bounds(0.1, 20.0));
    schema.insert_form("max_cg_iterations", UiForm::new(30_i64).min(0.0));

    let file = UiJson::from_value(json!({
        "chi_factor": {"value": 2.5},
        "max_cg_iterations": 12,
        "mystery_key": {"value": 1}
    }))
    .unwrap();

    let merged = schema.merged(&file);
    let names: Vec<&str> = merged.names().collect();
    assert_eq!(names, vec!["inversion_type", "chi_factor", "max_cg_iterations"]);

    let chi = merged.form("chi_factor").unwrap();
    assert_eq!(chi.value, Some(FieldValue::Float(2.5)));
    assert_eq!(chi.label.as_deref(), Some("Chi factor"));
    assert_eq!(chi.max, Some(20.0));
    assert_eq!(merged.value_of("max_cg_iterations"), FieldValue::Int(12));
}

#[test]
fn form_without_value_keeps_the_schema_default() {
    let mut schema = UiJson::new();
    schema.insert_form("chi_factor", UiForm::new(1.0).label("Chi factor"));
    schema.insert_form("upper_bound", UiForm::new(5.0).optional(true));

    let file = UiJson::from_value(json!({
        "chi_factor": {"label": "Target misfit"},
        "upper_bound": {"label": "Upper bound", "value": null}
    }))
    .unwrap();
    assert_eq!(file.form("chi_factor").unwrap().value, None);

    let merged = schema.merged(&file);
    let chi = merged.form("chi_factor").unwrap();
    assert_eq!(chi.own_value(), FieldValue::Float(1.0));
    assert_eq!(chi.label.as_deref(), Some("Target misfit"));
    assert_eq!(merged.value_of("upper_bound"), FieldValue::Null);
}

#[test]
fn file_metadata_narrows_but_never_widens() {
    let mut schema = UiJson::new();
    schema.insert_form("chi_factor", UiForm::new(1.0).bounds(0.1, 20.0));
    schema.insert_form(
        "store_sensitivities",
        UiForm::new("ram").choices(&["disk", "ram", "forward_only"]),
    );

    let wide = UiJson::from_value(json!({
        "chi_factor": {"value": 50.0, "min": 0.0, "max": 100.0},
        "store_sensitivities": {"value": "cloud", "choiceList": ["cloud", "disk", "ram"]}
    }))
    .unwrap();
    let merged = schema.merged(&wide);
    let chi = merged.form("chi_factor").unwrap();
    assert_eq!((chi.min, chi.max), (Some(0.1), Some(20.0)));
    let store = merged.form("store_sensitivities").unwrap();
    assert_eq!(
        store.choice_list.as_deref(),
        Some(&[String::from("disk"), String::from("ram")][..])
    );

    let narrow = UiJson::from_value(json!({"chi_factor": {"value": 2.0, "min": 0.5, "max": 5.0}}))
        .unwrap();
    let chi = schema.merged(&narrow);
    let chi = chi.form("chi_factor").unwrap();
    assert_eq!((chi.min, chi.max), (Some(0.5), Some(5.0)));
}

#[test]
fn non_object_documents_are_rejected() {
    assert!(matches!(
        UiJson::from_value(json!([1, 2, 3])),
        Err(UiJsonError::NotAnObject)
    ));
    assert!(matches!(UiJson::from_str("{not json"), Err(UiJsonError::Json(_))));
}

#[test]
fn malformed_form_names_the_field() {
    let err = UiJson::from_value(json!({"chi_factor": {"value": 1.0, "min": "low"}})).unwrap_err();
    match err {
        UiJsonError::InvalidForm { field, .. } => assert_eq!(field, "chi_factor"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn file_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grav.ui.json");
    let ui = UiJson::from_value(sample()).unwrap();
    ui.write_file(&path).unwrap();
    assert_eq!(UiJson::from_file(&path).unwrap(), ui);

    let missing = dir.path().join("missing.ui.json");
    assert!(matches!(UiJson::from_file(&missing), Err(UiJsonError::Read { .. })));
}
