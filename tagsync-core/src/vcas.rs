//! Version compare-and-swap writes.
//!
//! Every mutation names the version(s) it expects to replace. The store either
//! applies it and answers with the new record, or rejects it. A rejected
//! write on a stale version still carries the store's current record so the
//! caller can correct its local copy.

use crate::entities::{ColumnType, Entity, MergeConflict, TagDefinition, TagValue};
use crate::identity::{EntityId, TagDefinitionId, TagInstanceId, Version};
use serde::{Deserialize, Serialize};

/// Classified result of a guarded write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// Applied (HTTP 200). Carries the stored record with its new version.
    Ok(T),
    /// Stale version (HTTP 409). Carries the store's authoritative record.
    Conflict(T),
    /// Caller may not write this record (HTTP 403).
    Forbidden(String),
    /// Any other rejection.
    Failed(String),
}

impl<T> WriteOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, WriteOutcome::Ok(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            WriteOutcome::Ok(value) => WriteOutcome::Ok(f(value)),
            WriteOutcome::Conflict(value) => WriteOutcome::Conflict(f(value)),
            WriteOutcome::Forbidden(message) => WriteOutcome::Forbidden(message),
            WriteOutcome::Failed(message) => WriteOutcome::Failed(message),
        }
    }
}

/// A cell value proposed by the user. New values carry neither id nor version.
#[derive(Debug, Clone, PartialEq)]
pub struct TagInstanceDraft {
    pub id_persistent: Option<TagInstanceId>,
    pub version: Option<Version>,
    pub value: TagValue,
}

impl TagInstanceDraft {
    pub fn new_value(value: TagValue) -> Self {
        Self {
            id_persistent: None,
            version: None,
            value,
        }
    }

    pub fn replacing(id_persistent: TagInstanceId, version: Version, value: TagValue) -> Self {
        Self {
            id_persistent: Some(id_persistent),
            version: Some(version),
            value,
        }
    }
}

/// Wire shape of a single guarded tag value write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagInstanceSubmission {
    pub id_entity_persistent: EntityId,
    pub id_tag_definition_persistent: TagDefinitionId,
    pub value: TagValue,
    pub id_persistent: Option<TagInstanceId>,
    pub version: Option<Version>,
}

impl TagInstanceSubmission {
    pub fn new(
        entity: EntityId,
        tag_definition: TagDefinitionId,
        draft: &TagInstanceDraft,
    ) -> Self {
        Self {
            id_entity_persistent: entity,
            id_tag_definition_persistent: tag_definition,
            value: draft.value.clone(),
            id_persistent: draft.id_persistent.clone(),
            version: draft.version,
        }
    }
}

/// Entity create (no id, no version) or replace (both set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDraft {
    pub display_txt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_persistent: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl EntityDraft {
    pub fn create(display_txt: impl Into<String>) -> Self {
        Self {
            display_txt: display_txt.into(),
            id_persistent: None,
            version: None,
        }
    }

    pub fn replace(entity: &Entity, display_txt: impl Into<String>) -> Self {
        Self {
            display_txt: display_txt.into(),
            id_persistent: Some(entity.id_persistent.clone()),
            version: Some(entity.version),
        }
    }
}

/// A tag definition to be created under an optional parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTagDefinition {
    pub name: String,
    pub id_parent_persistent: Option<TagDefinitionId>,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Resolution of one merge conflict, guarded by five versions at once.
///
/// The store must reject the whole resolution if any one of them is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub id_entity_persistent: EntityId,
    pub id_entity_version: Version,
    pub id_tag_definition_origin_persistent: TagDefinitionId,
    pub id_tag_definition_origin_version: Version,
    pub id_tag_instance_origin_persistent: TagInstanceId,
    pub id_tag_instance_origin_version: Version,
    pub id_tag_definition_destination_persistent: TagDefinitionId,
    pub id_tag_definition_destination_version: Version,
    pub id_tag_instance_destination_persistent: Option<TagInstanceId>,
    pub id_tag_instance_destination_version: Option<Version>,
    pub replace: bool,
}

impl ConflictResolution {
    pub fn for_conflict(
        conflict: &MergeConflict,
        origin: &TagDefinition,
        destination: &TagDefinition,
        replace: bool,
    ) -> Self {
        let dest_instance = conflict.tag_instance_destination.as_ref();
        Self {
            id_entity_persistent: conflict.entity.id_persistent.clone(),
            id_entity_version: conflict.entity.version,
            id_tag_definition_origin_persistent: origin.id_persistent.clone(),
            id_tag_definition_origin_version: origin.version,
            id_tag_instance_origin_persistent: conflict.tag_instance_origin.id_persistent.clone(),
            id_tag_instance_origin_version: conflict.tag_instance_origin.version,
            id_tag_definition_destination_persistent: destination.id_persistent.clone(),
            id_tag_definition_destination_version: destination.version,
            id_tag_instance_destination_persistent: dest_instance
                .map(|cell| cell.id_persistent.clone()),
            id_tag_instance_destination_version: dest_instance.map(|cell| cell.version),
            replace,
        }
    }
}

/// Guarded toggle of a merge request's disable-origin flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisableOriginOnMerge {
    pub disable_origin_on_merge: bool,
    pub version: Version,
}
