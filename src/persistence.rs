//! Serializes a universe to a structured save document and restores it with a two-phase
//! load.
//!
//! The two phases exist because entities may reference each other by id during
//! initialization: phase one instantiates and registers every record without running any
//! hooks, phase two runs `init` on every entity in record order, so any entity's `init`
//! can already resolve any other entity from the same save, regardless of record order.
//!
//! Malformed persisted state (non-positive id, id above the declared maximum, duplicate id,
//! unknown type) is fatal and aborts the load before anything is committed; the registry
//! never operates in a partially-loaded state.

use std::fs::File;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::entity::{make_type_str, Entity, EntityId};
use crate::error::OrreryError;
use crate::physics::DynamicsWorld;
use crate::script::{resolve_type, BehaviorBinding};
use crate::universe::{Registry, Universe};
use crate::HashSet;

/// Package used to resolve bare type names in save records.
const SAVE_PACKAGE: &str = "core";

/// Scalar fields carried alongside the object list: the packages a save depends on, and
/// the identifier/version of the system it was created against. The embedded `scene`
/// sub-document is opaque to the registry and round-trips untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub system_identifier: String,
    #[serde(default)]
    pub system_version: String,
    #[serde(default)]
    pub scene: serde_json::Value,
}

/// One persisted entity record: id, behavior type, and whatever the behavior's `save`
/// hook contributed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedObject {
    pub id: i64,
    #[serde(rename = "type")]
    pub type_str: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// The save document. `next_id` is the maximum id the saved registry had assigned;
/// restored registries continue numbering above it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SaveDocument {
    pub next_id: i64,
    #[serde(flatten)]
    pub metadata: SaveMetadata,
    #[serde(default)]
    pub objects: Vec<SavedObject>,
}

/// What a successful load reports back.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadOutcome {
    /// Number of objects restored.
    pub loaded: usize,
    /// True if the save's `system_version` differs from the current version the host
    /// passed in. The load still succeeds; the host decides what a stale system means.
    pub is_system_outdated: bool,
}

/// Serializes the registry. Objects are written in creation order; objects pending
/// removal are not persisted. Each behavior's `save` hook contributes its
/// entity-specific blob, absent hooks persist id and type only.
pub fn save_registry(
    registry: &mut Registry,
    world: &mut dyn DynamicsWorld,
) -> Result<SaveDocument, OrreryError> {
    let mut objects = Vec::new();
    for handle in registry.snapshot() {
        let data = handle.save(registry, world)?;
        objects.push(SavedObject {
            id: handle.id().0,
            type_str: handle.entity_type().to_string(),
            data,
        });
    }
    Ok(SaveDocument {
        next_id: registry.highest_assigned_id(),
        metadata: registry.metadata.clone(),
        objects,
    })
}

/// Restores a registry from a save document. The registry must be empty.
///
/// Phase one validates every record and instantiates every behavior; nothing is committed
/// until all of them have loaded, so a failed load leaves the registry untouched. Phase
/// two runs `init` on every object in record order. Loading does not emit
/// `core:new_object`; restored objects are not new.
pub fn load_registry(
    registry: &mut Registry,
    world: &mut dyn DynamicsWorld,
    document: &SaveDocument,
    current_system_version: Option<&str>,
) -> Result<LoadOutcome, OrreryError> {
    if !registry.is_empty() {
        return Err(OrreryError::Save(
            "cannot load a save into a non-empty registry".into(),
        ));
    }
    if document.next_id < 0 {
        return Err(OrreryError::Save(format!(
            "invalid next_id {} in save",
            document.next_id
        )));
    }

    // Phase 1: validate and instantiate every record, committing nothing yet.
    let mut seen: HashSet<EntityId> = HashSet::default();
    let mut staged: Vec<Entity> = Vec::with_capacity(document.objects.len());
    for record in &document.objects {
        if record.id <= 0 || record.id > document.next_id {
            return Err(OrreryError::Save(format!(
                "invalid object id {} in save (next_id is {})",
                record.id, document.next_id
            )));
        }
        let id = EntityId(record.id);
        if !seen.insert(id) {
            return Err(OrreryError::Save(format!(
                "duplicate object id {id} in save"
            )));
        }
        let (package, name) = resolve_type(&record.type_str, SAVE_PACKAGE)?;
        let env = registry.load_env(&package, &name)?;
        let init_data = record.data.clone().unwrap_or(serde_json::Value::Null);
        let mut entity = Entity::new(
            id,
            BehaviorBinding::new(make_type_str(&package, &name), env),
            init_data,
        );
        entity.mark_registered();
        staged.push(entity);
    }

    registry.commit_loaded(staged, document.next_id);
    registry.metadata = document.metadata.clone();

    let is_system_outdated = match current_system_version {
        Some(current)
            if !document.metadata.system_version.is_empty()
                && current != document.metadata.system_version =>
        {
            warn!(
                "save system version ({}) is not equal to current system version ({}) (system = {})",
                document.metadata.system_version, current, document.metadata.system_identifier
            );
            true
        }
        _ => false,
    };

    // Phase 2: every object is resolvable by id before any init hook runs.
    for record in &document.objects {
        let handle = registry
            .handle(EntityId(record.id))
            .expect("staged object missing after commit");
        handle.setup(registry, world)?;
    }

    info!("loaded {} object(s) from save", document.objects.len());
    Ok(LoadOutcome {
        loaded: document.objects.len(),
        is_system_outdated,
    })
}

impl Universe {
    /// Serializes the universe to a save document. See [`save_registry`].
    pub fn save_document(&mut self) -> Result<SaveDocument, OrreryError> {
        let (registry, world) = self.parts_mut();
        save_registry(registry, world)
    }

    /// Restores the universe from a save document. See [`load_registry`].
    pub fn load_document(
        &mut self,
        document: &SaveDocument,
        current_system_version: Option<&str>,
    ) -> Result<LoadOutcome, OrreryError> {
        let (registry, world) = self.parts_mut();
        load_registry(registry, world, document, current_system_version)
    }

    /// Saves the universe as pretty-printed JSON at `path`.
    pub fn save_to_path(&mut self, path: &Path) -> Result<(), OrreryError> {
        let document = self.save_document()?;
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &document)?;
        Ok(())
    }

    /// Restores the universe from a JSON save at `path`.
    pub fn load_from_path(
        &mut self,
        path: &Path,
        current_system_version: Option<&str>,
    ) -> Result<LoadOutcome, OrreryError> {
        let file = File::open(path)?;
        let document: SaveDocument = serde_json::from_reader(file)?;
        self.load_document(&document, current_system_version)
    }
}
