//! Closed catalogue of survey kinds.
//!
//! Each kind carries its constant metadata as plain data: the
//! `inversion_type` string used in UI-description files, titles, physical
//! property, data components and layout. Behaviour that differs between kinds
//! is selected by matching on [`SurveyKind`], never by a type hierarchy.

use std::fmt;

// ============================================================================
// Survey Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SurveyKind {
    Gravity,
    MagneticScalar,
    MagneticVector,
    DirectCurrent3d,
    DirectCurrent2d,
    DirectCurrentPseudo3d,
    InducedPolarization3d,
    InducedPolarization2d,
    InducedPolarizationPseudo3d,
    Fdem,
    Fdem1d,
    Tdem,
    Tdem1d,
    Magnetotellurics,
    Tipper,
    JointSurveys,
    JointCrossGradient,
    JointPetrophysics,
}

/// Spatial layout of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimensionality {
    ThreeD,
    /// One line at a time on a drape model.
    TwoD,
    /// Every line of a survey, each as an independent 2D problem.
    Pseudo3d,
    /// Layered earth below each sounding.
    OneD,
}

impl Dimensionality {
    /// Whether the survey is simulated on a drape model instead of a mesh.
    pub fn uses_drape_model(&self) -> bool {
        !matches!(self, Dimensionality::ThreeD)
    }

    /// Whether one line of the survey is selected.
    pub fn uses_line_selection(&self) -> bool {
        matches!(self, Dimensionality::TwoD | Dimensionality::Pseudo3d)
    }

    /// Whether the y direction carries weights and norms.
    pub fn has_y(&self) -> bool {
        matches!(self, Dimensionality::ThreeD)
    }
}

/// How observed data are stored on the survey object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// One data channel per component.
    Scalar,
    /// One property group per component, one channel per frequency or time.
    PropertyGroup,
    /// No channels; the run combines other runs.
    None,
}

/// Constant metadata of one survey kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveySpec {
    pub kind: SurveyKind,
    pub inversion_type: &'static str,
    /// `None` for inversion-only kinds.
    pub forward_title: Option<&'static str>,
    pub inversion_title: &'static str,
    pub physical_property: &'static str,
    pub model_units: &'static str,
    pub components: &'static [&'static str],
    /// Components simulated by default in forward mode.
    pub forward_defaults: &'static [&'static str],
    pub layout: ChannelLayout,
    pub dimensionality: Dimensionality,
    pub default_model: f64,
    pub default_lower_bound: Option<f64>,
    pub default_uncertainty: f64,
}

const GRAVITY_COMPONENTS: &[&str] = &[
    "gz", "gx", "gy", "guv", "gxx", "gxy", "gxz", "gyy", "gyz", "gzz",
];
const MAGNETIC_COMPONENTS: &[&str] = &[
    "tmi", "bx", "by", "bz", "bxx", "bxy", "bxz", "byy", "byz", "bzz",
];
const MT_COMPONENTS: &[&str] = &[
    "zxx_real", "zxx_imag", "zxy_real", "zxy_imag", "zyx_real", "zyx_imag", "zyy_real", "zyy_imag",
];
const TIPPER_COMPONENTS: &[&str] = &["txz_real", "txz_imag", "tyz_real", "tyz_imag"];

const fn potential_field(
    kind: SurveyKind,
    inversion_type: &'static str,
    titles: (&'static str, &'static str),
    physical_property: &'static str,
    model_units: &'static str,
    components: &'static [&'static str],
    forward_defaults: &'static [&'static str],
    default_model: f64,
) -> SurveySpec {
    SurveySpec {
        kind,
        inversion_type,
        forward_title: Some(titles.0),
        inversion_title: titles.1,
        physical_property,
        model_units,
        components,
        forward_defaults,
        layout: ChannelLayout::Scalar,
        dimensionality: Dimensionality::ThreeD,
        default_model,
        default_lower_bound: None,
        default_uncertainty: 1.0,
    }
}

const fn electrical(
    kind: SurveyKind,
    inversion_type: &'static str,
    titles: (&'static str, &'static str),
    chargeability: bool,
    dimensionality: Dimensionality,
) -> SurveySpec {
    SurveySpec {
        kind,
        inversion_type,
        forward_title: Some(titles.0),
        inversion_title: titles.1,
        physical_property: if chargeability { "chargeability" } else { "conductivity" },
        model_units: if chargeability { "V/V" } else { "S/m" },
        components: if chargeability { &["chargeability"] } else { &["potential"] },
        forward_defaults: if chargeability { &["chargeability"] } else { &["potential"] },
        layout: ChannelLayout::Scalar,
        dimensionality,
        default_model: if chargeability { 0.0 } else { 1e-3 },
        default_lower_bound: if chargeability { Some(0.0) } else { None },
        default_uncertainty: 1.0,
    }
}

const fn conductivity(
    kind: SurveyKind,
    inversion_type: &'static str,
    titles: (&'static str, &'static str),
    components: &'static [&'static str],
    forward_defaults: &'static [&'static str],
    layout: ChannelLayout,
    dimensionality: Dimensionality,
) -> SurveySpec {
    SurveySpec {
        kind,
        inversion_type,
        forward_title: Some(titles.0),
        inversion_title: titles.1,
        physical_property: "conductivity",
        model_units: "S/m",
        components,
        forward_defaults,
        layout,
        dimensionality,
        default_model: 1e-3,
        default_lower_bound: None,
        default_uncertainty: 1.0,
    }
}

const fn joint(kind: SurveyKind, inversion_type: &'static str, title: &'static str) -> SurveySpec {
    SurveySpec {
        kind,
        inversion_type,
        forward_title: None,
        inversion_title: title,
        physical_property: "",
        model_units: "",
        components: &[],
        forward_defaults: &[],
        layout: ChannelLayout::None,
        dimensionality: Dimensionality::ThreeD,
        default_model: 0.0,
        default_lower_bound: None,
        default_uncertainty: 1.0,
    }
}

/// Names written by older releases.
pub const LEGACY_INVERSION_TYPES: &[(&str, SurveyKind)] = &[("fem", SurveyKind::Fdem)];

static CATALOGUE: [SurveySpec; 18] = [
    potential_field(
        SurveyKind::Gravity,
        "gravity",
        ("Gravity Forward", "Gravity Inversion"),
        "density",
        "g/cc",
        GRAVITY_COMPONENTS,
        &["gz"],
        0.0,
    ),
    potential_field(
        SurveyKind::MagneticScalar,
        "magnetic scalar",
        ("Magnetic Scalar Forward", "Magnetic Scalar Inversion"),
        "susceptibility",
        "SI",
        MAGNETIC_COMPONENTS,
        &["tmi"],
        1e-4,
    ),
    potential_field(
        SurveyKind::MagneticVector,
        "magnetic vector",
        ("Magnetic Vector Forward", "Magnetic Vector Inversion"),
        "susceptibility",
        "SI",
        MAGNETIC_COMPONENTS,
        &["tmi"],
        1e-4,
    ),
    electrical(
        SurveyKind::DirectCurrent3d,
        "direct current 3d",
        ("Direct Current 3D Forward", "Direct Current 3D Inversion"),
        false,
        Dimensionality::ThreeD,
    ),
    electrical(
        SurveyKind::DirectCurrent2d,
        "direct current 2d",
        ("Direct Current 2D Forward", "Direct Current 2D Inversion"),
        false,
        Dimensionality::TwoD,
    ),
    electrical(
        SurveyKind::DirectCurrentPseudo3d,
        "direct current pseudo 3d",
        ("Direct Current (DC) 2D Batch Forward", "Direct Current (DC) 2D Batch Inversion"),
        false,
        Dimensionality::Pseudo3d,
    ),
    electrical(
        SurveyKind::InducedPolarization3d,
        "induced polarization 3d",
        ("Induced Polarization 3D Forward", "Induced Polarization 3D Inversion"),
        true,
        Dimensionality::ThreeD,
    ),
    electrical(
        SurveyKind::InducedPolarization2d,
        "induced polarization 2d",
        ("Induced Polarization 2D Forward", "Induced Polarization 2D Inversion"),
        true,
        Dimensionality::TwoD,
    ),
    electrical(
        SurveyKind::InducedPolarizationPseudo3d,
        "induced polarization pseudo 3d",
        (
            "Induced Polarization (IP) 2D Batch Forward",
            "Induced Polarization (IP) 2D Batch Inversion",
        ),
        true,
        Dimensionality::Pseudo3d,
    ),
    conductivity(
        SurveyKind::Fdem,
        "fdem",
        ("Frequency-domain EM (FEM) Forward", "Frequency-domain EM (FEM) Inversion"),
        &["z_real", "z_imag"],
        &["z_real", "z_imag"],
        ChannelLayout::PropertyGroup,
        Dimensionality::ThreeD,
    ),
    conductivity(
        SurveyKind::Fdem1d,
        "fdem 1d",
        ("Frequency-domain EM-1D (FEM-1D) Forward", "Frequency-domain EM-1D (FEM-1D) Inversion"),
        &["z_real", "z_imag"],
        &["z_real", "z_imag"],
        ChannelLayout::PropertyGroup,
        Dimensionality::OneD,
    ),
    conductivity(
        SurveyKind::Tdem,
        "tdem",
        ("Time-domain EM (TEM) Forward", "Time-domain EM (TEM) Inversion"),
        &["z", "x", "y"],
        &["z"],
        ChannelLayout::PropertyGroup,
        Dimensionality::ThreeD,
    ),
    conductivity(
        SurveyKind::Tdem1d,
        "tdem 1d",
        ("Time-domain EM-1D (TEM-1D) Forward", "Time-domain EM-1D (TEM-1D) Inversion"),
        &["z"],
        &["z"],
        ChannelLayout::PropertyGroup,
        Dimensionality::OneD,
    ),
    conductivity(
        SurveyKind::Magnetotellurics,
        "magnetotellurics",
        ("Magnetotellurics Forward", "Magnetotellurics Inversion"),
        MT_COMPONENTS,
        MT_COMPONENTS,
        ChannelLayout::Scalar,
        Dimensionality::ThreeD,
    ),
    conductivity(
        SurveyKind::Tipper,
        "tipper",
        ("Tipper Forward", "Tipper Inversion"),
        TIPPER_COMPONENTS,
        TIPPER_COMPONENTS,
        ChannelLayout::Scalar,
        Dimensionality::ThreeD,
    ),
    joint(SurveyKind::JointSurveys, "joint surveys", "Joint Surveys Inversion"),
    joint(
        SurveyKind::JointCrossGradient,
        "joint cross gradient",
        "Joint Cross Gradient Inversion",
    ),
    joint(
        SurveyKind::JointPetrophysics,
        "joint petrophysics",
        "Joint Petrophysically Guided Inversion (PGI)",
    ),
];

impl SurveyKind {
    pub const ALL: [SurveyKind; 18] = [
        SurveyKind::Gravity,
        SurveyKind::MagneticScalar,
        SurveyKind::MagneticVector,
        SurveyKind::DirectCurrent3d,
        SurveyKind::DirectCurrent2d,
        SurveyKind::DirectCurrentPseudo3d,
        SurveyKind::InducedPolarization3d,
        SurveyKind::InducedPolarization2d,
        SurveyKind::InducedPolarizationPseudo3d,
        SurveyKind::Fdem,
        SurveyKind::Fdem1d,
        SurveyKind::Tdem,
        SurveyKind::Tdem1d,
        SurveyKind::Magnetotellurics,
        SurveyKind::Tipper,
        SurveyKind::JointSurveys,
        SurveyKind::JointCrossGradient,
        SurveyKind::JointPetrophysics,
    ];

    pub fn spec(&self) -> &'static SurveySpec {
        // CATALOGUE is declared in the same order as the enum.
        &CATALOGUE[*self as usize]
    }

    /// Look up a kind by its `inversion_type` string or a legacy alias.
    pub fn from_inversion_type(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.inversion_type() == wanted)
            .or_else(|| {
                LEGACY_INVERSION_TYPES
                    .iter()
                    .find(|(alias, _)| *alias == wanted)
                    .map(|(_, kind)| *kind)
            })
    }

    /// Every valid `inversion_type` string, in catalogue order.
    pub fn valid_inversion_types() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.inversion_type()).collect()
    }

    pub fn inversion_type(&self) -> &'static str {
        self.spec().inversion_type
    }

    pub fn is_joint(&self) -> bool {
        matches!(
            self,
            SurveyKind::JointSurveys | SurveyKind::JointCrossGradient | SurveyKind::JointPetrophysics
        )
    }

    pub fn is_magnetic(&self) -> bool {
        matches!(self, SurveyKind::MagneticScalar | SurveyKind::MagneticVector)
    }

    pub fn has_forward(&self) -> bool {
        self.spec().forward_title.is_some()
    }

    pub fn title(&self, forward_only: bool) -> &'static str {
        let spec = self.spec();
        match (forward_only, spec.forward_title) {
            (true, Some(title)) => title,
            _ => spec.inversion_title,
        }
    }

    /// Whether the model may be given as resistivity instead of conductivity.
    pub fn has_model_type(&self) -> bool {
        self.spec().physical_property == "conductivity"
    }
}

impl fmt::Display for SurveyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inversion_type())
    }
}
