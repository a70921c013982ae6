//! Configuration types

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENTITY_PAGE_SIZE: usize = 500;
pub const DEFAULT_TAG_PAGE_SIZE: usize = 5000;
pub const DEFAULT_RELOAD_HINT: &str = "Please reload to see changes.";

/// Why the store refused to start a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRejectionKind {
    /// Some conflicts still lack a replace decision.
    UnresolvedConflicts,
    /// Data changed after the conflicts were computed.
    StaleConflicts,
}

/// Maps a store message onto a rejection kind by substring match.
///
/// The exact messages are owned by the store, so the table ships empty and is
/// filled in from deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageRule {
    pub pattern: String,
    pub kind: MergeRejectionKind,
}

/// Tuning for the synchronization engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Page size for entity scans (offset cursor).
    #[serde(default = "default_entity_page_size")]
    pub entity_page_size: usize,
    /// Page size for tag instance scans (high-water-mark cursor).
    #[serde(default = "default_tag_page_size")]
    pub tag_page_size: usize,
    #[serde(default)]
    pub merge_messages: Vec<MessageRule>,
    /// Appended to merge rejections that require reloading conflicts.
    #[serde(default = "default_reload_hint")]
    pub reload_hint: String,
}

fn default_entity_page_size() -> usize {
    DEFAULT_ENTITY_PAGE_SIZE
}

fn default_tag_page_size() -> usize {
    DEFAULT_TAG_PAGE_SIZE
}

fn default_reload_hint() -> String {
    DEFAULT_RELOAD_HINT.to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            entity_page_size: DEFAULT_ENTITY_PAGE_SIZE,
            tag_page_size: DEFAULT_TAG_PAGE_SIZE,
            merge_messages: Vec::new(),
            reload_hint: default_reload_hint(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.entity_page_size".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if self.tag_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.tag_page_size".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if let Some(rule) = self
            .merge_messages
            .iter()
            .find(|rule| rule.pattern.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                field: "sync.merge_messages".to_string(),
                reason: format!("empty pattern for {:?}", rule.kind),
            });
        }
        Ok(())
    }

    /// First configured rule whose pattern occurs in `message`.
    pub fn classify_merge_message(&self, message: &str) -> Option<MergeRejectionKind> {
        self.merge_messages
            .iter()
            .find(|rule| message.contains(rule.pattern.as_str()))
            .map(|rule| rule.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_page_sizes() {
        let config = SyncConfig::default();
        assert_eq!(config.entity_page_size, 500);
        assert_eq!(config.tag_page_size, 5000);
        assert!(config.merge_messages.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_page_size_rejected() {
        let config = SyncConfig {
            tag_page_size: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_pattern_rejected() {
        let config = SyncConfig {
            merge_messages: vec![MessageRule {
                pattern: "  ".to_string(),
                kind: MergeRejectionKind::StaleConflicts,
            }],
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn classification_uses_first_matching_rule() {
        let config = SyncConfig {
            merge_messages: vec![
                MessageRule {
                    pattern: "unresolved".to_string(),
                    kind: MergeRejectionKind::UnresolvedConflicts,
                },
                MessageRule {
                    pattern: "changed".to_string(),
                    kind: MergeRejectionKind::StaleConflicts,
                },
            ],
            ..SyncConfig::default()
        };
        assert_eq!(
            config.classify_merge_message("There are unresolved conflicts."),
            Some(MergeRejectionKind::UnresolvedConflicts)
        );
        assert_eq!(
            config.classify_merge_message("Data has changed"),
            Some(MergeRejectionKind::StaleConflicts)
        );
        assert_eq!(config.classify_merge_message("boom"), None);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"tag_page_size": 100}"#).unwrap();
        assert_eq!(config.tag_page_size, 100);
        assert_eq!(config.entity_page_size, 500);
        assert_eq!(config.reload_hint, DEFAULT_RELOAD_HINT);
    }
}
