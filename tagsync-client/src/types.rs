//! Wire request and response shapes for the remote store

use serde::{Deserialize, Serialize};
use tagsync_core::{
    Entity, EntityDraft, MergeConflict, MergeRequest, NewTagDefinition,
    TagDefinition, TagDefinitionId, TagInstanceRecord, TagInstanceSubmission,
};

#[derive(Debug, Clone, Serialize)]
pub struct EntityChunkRequest {
    pub offset: i64,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagChunkRequest<'a> {
    pub id_tag_definition_persistent: &'a TagDefinitionId,
    pub offset: i64,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChildrenRequest<'a> {
    pub id_parent_persistent: Option<&'a TagDefinitionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonsEnvelope<T> {
    pub persons: Vec<T>,
}

pub type EntityList = PersonsEnvelope<Entity>;
pub type EntityPut = PersonsEnvelope<EntityDraft>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagInstancesEnvelope<T> {
    pub tag_instances: Vec<T>,
}

pub type TagInstanceList = TagInstancesEnvelope<TagInstanceRecord>;
pub type TagInstancePost = TagInstancesEnvelope<TagInstanceSubmission>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDefinitionsEnvelope<T> {
    pub tag_definitions: Vec<T>,
}

pub type TagDefinitionList = TagDefinitionsEnvelope<TagDefinition>;
pub type TagDefinitionPost = TagDefinitionsEnvelope<NewTagDefinition>;

/// Body of `GET /merge_requests/{id}/conflicts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictsReply {
    /// Items already applied or decided, for information only.
    #[serde(default)]
    pub updated: Vec<MergeConflict>,
    /// Items waiting for a replace decision.
    #[serde(default)]
    pub conflicts: Vec<MergeConflict>,
    pub merge_request: MergeRequest,
}

/// Error body as sent by the store on 4xx/5xx.
///
/// Either `msg` or `detail` is present; `detail` may be a list of field
/// errors on 422.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldError {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

/// Extract a human readable message from an error body.
pub fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(msg) = parsed.msg {
            return msg;
        }
        match parsed.detail {
            Some(serde_json::Value::String(detail)) => return detail,
            Some(detail @ serde_json::Value::Array(_)) => {
                if let Ok(fields) = serde_json::from_value::<Vec<FieldError>>(detail) {
                    let joined = fields
                        .iter()
                        .map(|field| match field.loc.last() {
                            Some(serde_json::Value::String(name)) => {
                                format!("{}: {}", name, field.msg)
                            }
                            Some(other) => format!("{}: {}", other, field.msg),
                            None => field.msg.clone(),
                        })
                        .collect::<Vec<_>>()
                        .join("; ");
                    if !joined.is_empty() {
                        return joined;
                    }
                }
            }
            _ => {}
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Unknown error".to_string()
    } else {
        trimmed.to_string()
    }
}
