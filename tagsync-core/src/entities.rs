//! Core record structures shared by every engine

use crate::error::ValidationError;
use crate::identity::{EntityId, MergeRequestId, TagDefinitionId, TagInstanceId, UserId, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used when rendering a tag definition's name path for humans.
pub const NAME_PATH_SEPARATOR: &str = " -> ";

// ============================================================================
// ENTITIES
// ============================================================================

/// A table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id_persistent: EntityId,
    pub display_txt: String,
    pub version: Version,
    #[serde(default)]
    pub disabled: bool,
}

// ============================================================================
// TAG DEFINITIONS
// ============================================================================

/// Value type carried by every instance of a tag definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    String,
    Float,
    Boolean,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "STRING",
            ColumnType::Float => "FLOAT",
            ColumnType::Boolean => "BOOLEAN",
        };
        f.write_str(name)
    }
}

/// A column's schema node inside the named tag hierarchy.
///
/// `name_path` lists names from the tree root down to this definition and is
/// never empty. A definition without a parent is a tree root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub id_persistent: TagDefinitionId,
    pub name_path: Vec<String>,
    #[serde(default)]
    pub id_parent_persistent: Option<TagDefinitionId>,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub curated: bool,
    #[serde(default)]
    pub owner: Option<String>,
    pub version: Version,
    #[serde(default)]
    pub hidden: bool,
}

impl TagDefinition {
    /// Leaf name, i.e. the last element of the name path.
    pub fn name(&self) -> &str {
        self.name_path.last().map(String::as_str).unwrap_or_default()
    }

    /// Human readable position in the hierarchy, e.g. `"a -> b -> c"`.
    pub fn display_path(&self) -> String {
        self.name_path.join(NAME_PATH_SEPARATOR)
    }

    pub fn is_root(&self) -> bool {
        self.id_parent_persistent.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name_path.is_empty() {
            return Err(ValidationError::EmptyNamePath {
                id: self.id_persistent.to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// TAG VALUES
// ============================================================================

/// A typed cell value.
///
/// On the wire values are bare JSON scalars; the owning definition's
/// [`ColumnType`] decides which variant is legal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Boolean(bool),
    Float(f64),
    String(String),
}

impl TagValue {
    /// Parse raw user input for a column of the given type.
    pub fn parse(column_type: ColumnType, raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        match column_type {
            ColumnType::String => Ok(TagValue::String(raw.to_string())),
            ColumnType::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(TagValue::Float)
                .ok_or_else(|| ValidationError::InvalidValue {
                    column_type,
                    raw: raw.to_string(),
                }),
            ColumnType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(TagValue::Boolean(true)),
                "false" | "no" | "0" => Ok(TagValue::Boolean(false)),
                _ => Err(ValidationError::InvalidValue {
                    column_type,
                    raw: raw.to_string(),
                }),
            },
        }
    }

    pub fn conforms_to(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (TagValue::String(_), ColumnType::String)
                | (TagValue::Float(_), ColumnType::Float)
                | (TagValue::Boolean(_), ColumnType::Boolean)
        )
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Boolean(value) => write!(f, "{}", value),
            TagValue::Float(value) => write!(f, "{}", value),
            TagValue::String(value) => f.write_str(value),
        }
    }
}

/// One versioned cell value, keyed implicitly by (entity, tag definition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellValue {
    pub id_persistent: TagInstanceId,
    pub version: Version,
    pub value: TagValue,
}

/// A tag instance as it travels over the wire, with its keys attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagInstanceRecord {
    pub id_entity_persistent: EntityId,
    pub id_tag_definition_persistent: TagDefinitionId,
    pub id_persistent: TagInstanceId,
    pub version: Version,
    pub value: TagValue,
}

impl TagInstanceRecord {
    pub fn cell(&self) -> CellValue {
        CellValue {
            id_persistent: self.id_persistent.clone(),
            version: self.version,
            value: self.value.clone(),
        }
    }

    pub fn into_cell(self) -> (EntityId, CellValue) {
        (
            self.id_entity_persistent,
            CellValue {
                id_persistent: self.id_persistent,
                version: self.version,
                value: self.value,
            },
        )
    }
}

// ============================================================================
// MERGE REQUESTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id_persistent: UserId,
    pub user_name: String,
}

/// Lifecycle step of a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MergeStep {
    Open,
    Conflicts,
    Closed,
    Resolved,
    Merged,
    Error,
}

/// A proposal to reconcile the values of an origin tag into a destination tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id_persistent: MergeRequestId,
    pub origin_tag_definition: TagDefinition,
    pub destination_tag_definition: TagDefinition,
    pub created_by: User,
    #[serde(default)]
    pub assigned_to: Option<User>,
    pub step: MergeStep,
    #[serde(default)]
    pub disable_origin_on_merge: bool,
    pub version: Version,
}

/// A per-entity pair of values that needs a replace decision.
///
/// `replace == None` means unresolved, `Some(true)` takes the origin value and
/// `Some(false)` keeps the destination value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub entity: Entity,
    pub tag_instance_origin: CellValue,
    #[serde(default)]
    pub tag_instance_destination: Option<CellValue>,
    #[serde(default)]
    pub replace: Option<bool>,
}

impl MergeConflict {
    pub fn is_resolved(&self) -> bool {
        self.replace.is_some()
    }
}
