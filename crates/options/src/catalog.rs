//! Read-only view of the entities a run refers to.
//!
//! Options only hold identifiers. Whether an identifier exists, and what kind
//! of entity it names, is answered by an [`EntityCatalog`], implemented by the
//! external store. [`UncheckedCatalog`] answers nothing and turns reference
//! checks off for offline validation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::DataRef;

/// Where a data channel's values live on its parent object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Association {
    Vertex,
    Cell,
    Object,
    Unknown,
}

/// What an identifier points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    Points,
    Curve,
    Surface,
    Grid2d,
    Octree {
        #[serde(default)]
        rotation: f64,
    },
    DrapeModel,
    FloatData {
        association: Association,
    },
    IntegerData {
        association: Association,
    },
    BooleanData {
        association: Association,
    },
    ReferencedData {
        association: Association,
        #[serde(default)]
        values: Vec<i64>,
    },
    PropertyGroup {
        #[serde(default)]
        properties: Vec<DataRef>,
    },
    /// Output group of an earlier run, used by joint inversions.
    RunGroup {
        #[serde(default)]
        inversion_type: Option<String>,
        #[serde(default)]
        physical_property: Option<String>,
    },
}

impl EntityKind {
    pub fn describe(&self) -> &'static str {
        match self {
            EntityKind::Points => "points",
            EntityKind::Curve => "curve",
            EntityKind::Surface => "surface",
            EntityKind::Grid2d => "grid",
            EntityKind::Octree { .. } => "octree mesh",
            EntityKind::DrapeModel => "drape model",
            EntityKind::FloatData { .. } => "float data",
            EntityKind::IntegerData { .. } => "integer data",
            EntityKind::BooleanData { .. } => "boolean data",
            EntityKind::ReferencedData { .. } => "referenced data",
            EntityKind::PropertyGroup { .. } => "property group",
            EntityKind::RunGroup { .. } => "run group",
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(
            self,
            EntityKind::Points
                | EntityKind::Curve
                | EntityKind::Surface
                | EntityKind::Grid2d
                | EntityKind::Octree { .. }
                | EntityKind::DrapeModel
        )
    }

    pub fn is_mesh(&self) -> bool {
        matches!(
            self,
            EntityKind::Octree { .. } | EntityKind::DrapeModel | EntityKind::Grid2d
        )
    }

    pub fn is_data(&self) -> bool {
        matches!(
            self,
            EntityKind::FloatData { .. }
                | EntityKind::IntegerData { .. }
                | EntityKind::BooleanData { .. }
                | EntityKind::ReferencedData { .. }
        )
    }
}

/// One entity as seen by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub name: String,
    #[serde(flatten)]
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<DataRef>,
}

impl EntityInfo {
    pub fn new(name: &str, kind: EntityKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parent: None,
        }
    }

    pub fn child_of(mut self, parent: DataRef) -> Self {
        self.parent = Some(parent);
        self
    }
}

pub trait EntityCatalog {
    fn entity(&self, id: &DataRef) -> Option<EntityInfo>;

    /// `false` when the catalog cannot answer and reference checks are skipped.
    fn is_checked(&self) -> bool {
        true
    }
}

/// Catalog that knows nothing; used for offline validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UncheckedCatalog;

impl EntityCatalog for UncheckedCatalog {
    fn entity(&self, _id: &DataRef) -> Option<EntityInfo> {
        None
    }

    fn is_checked(&self) -> bool {
        false
    }
}

/// In-memory catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryCatalog {
    entities: HashMap<DataRef, EntityInfo>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: DataRef, info: EntityInfo) {
        self.entities.insert(id, info);
    }

    /// Insert under a fresh identifier and return it.
    pub fn add(&mut self, info: EntityInfo) -> DataRef {
        let id = DataRef::new_v4();
        self.insert(id, info);
        id
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityCatalog for MemoryCatalog {
    fn entity(&self, id: &DataRef) -> Option<EntityInfo> {
        self.entities.get(id).cloned()
    }
}

impl<C: EntityCatalog + ?Sized> EntityCatalog for &C {
    fn entity(&self, id: &DataRef) -> Option<EntityInfo> {
        (**self).entity(id)
    }

    fn is_checked(&self) -> bool {
        (**self).is_checked()
    }
}
