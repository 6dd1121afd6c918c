//! Static, read-only instance-type attribute table.
//!
//! Loaded once from an embedded JSON snapshot and treated as immutable for
//! the process lifetime, the way the original agent loaded its catalog from
//! a vendored `ec2-instances-info` data file.

use crate::errors::{AutospottingError, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

const CATALOG_JSON: &str = include_str!("instance_types.json");

/// Ephemeral (instance-store) disk layout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EphemeralStorage {
    pub count: u32,
    pub size_gib: f64,
    pub nvme: bool,
}

/// Immutable attributes of one instance type.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceType {
    pub id: String,
    pub vcpus: u32,
    pub memory_gib: f64,
    pub gpus: u32,
    pub architectures: HashSet<String>,
    pub virtualization: HashSet<String>,
    pub ephemeral_storage: Option<EphemeralStorage>,
    pub network_tier: String,
    pub ebs_optimized: bool,
    /// Region -> on-demand USD/hour.
    pub on_demand_price: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    types: Vec<InstanceType>,
}

/// Read-only lookup table, immutable once built.
pub struct InstanceCatalog {
    by_id: HashMap<String, InstanceType>,
}

impl InstanceCatalog {
    fn from_json(raw: &str) -> Self {
        let file: CatalogFile =
            serde_json::from_str(raw).expect("embedded instance catalog must be valid JSON");
        let by_id = file.types.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self { by_id }
    }

    pub fn get(&self, type_id: &str) -> Result<&InstanceType> {
        self.by_id
            .get(type_id)
            .ok_or_else(|| AutospottingError::unknown_type(type_id))
    }

    pub fn list_all(&self) -> impl Iterator<Item = &InstanceType> {
        self.by_id.values()
    }
}

/// Process-wide singleton, built lazily from the embedded snapshot.
pub fn catalog() -> &'static InstanceCatalog {
    static CATALOG: OnceLock<InstanceCatalog> = OnceLock::new();
    CATALOG.get_or_init(|| InstanceCatalog::from_json(CATALOG_JSON))
}
