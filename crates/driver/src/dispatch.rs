//! Mapping of `inversion_type` and `forward_only` to a run route.

use std::fmt;

use geoinv_options::{SurveyKind, UiJson};

/// Where a run goes: which survey kind, forward or inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub kind: SurveyKind,
    pub forward_only: bool,
}

impl Route {
    pub fn title(&self) -> &'static str {
        self.kind.title(self.forward_only)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.forward_only { "forward" } else { "inversion" };
        write!(f, "{} {}", self.kind.inversion_type(), mode)
    }
}

/// Pure lookup; nothing is opened or launched here.
pub fn dispatch(inversion_type: Option<&str>, forward_only: bool) -> Result<Route, DispatchError> {
    let name = inversion_type
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(DispatchError::MissingInversionType)?;

    let kind = SurveyKind::from_inversion_type(name).ok_or_else(|| {
        DispatchError::UnknownInversionType {
            given: name.to_string(),
            valid: SurveyKind::valid_inversion_types().join(", "),
        }
    })?;

    if forward_only && !kind.has_forward() {
        return Err(DispatchError::ForwardNotSupported(kind));
    }

    Ok(Route { kind, forward_only })
}

/// Route of a loaded UI-description file.
pub fn dispatch_ui(ui: &UiJson) -> Result<Route, DispatchError> {
    dispatch(ui.inversion_type().as_deref(), ui.forward_only())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("the file does not name an inversion_type")]
    MissingInversionType,

    #[error("Inversion type {given} is not supported. Valid inversions are: {valid}.")]
    UnknownInversionType { given: String, valid: String },

    #[error("{0} has no forward mode; set forward_only to false")]
    ForwardNotSupported(SurveyKind),
}
