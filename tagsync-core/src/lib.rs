//! tagsync Core - Record Types
//!
//! Pure data structures shared by the client, the engines and their tests.
//! Nothing in here performs I/O.

pub mod config;
pub mod entities;
pub mod error;
pub mod identity;
pub mod notify;
pub mod vcas;

pub use config::{
    MergeRejectionKind, MessageRule, SyncConfig, DEFAULT_ENTITY_PAGE_SIZE, DEFAULT_RELOAD_HINT,
    DEFAULT_TAG_PAGE_SIZE,
};
pub use entities::{
    CellValue, ColumnType, Entity, MergeConflict, MergeRequest, MergeStep, TagDefinition,
    TagInstanceRecord, TagValue, User, NAME_PATH_SEPARATOR,
};
pub use error::{ConfigError, StoreError, SyncError, SyncResult, ValidationError};
pub use identity::{
    EntityId, MergeRequestId, TagDefinitionId, TagInstanceId, Timestamp, UserId, Version,
};
pub use notify::{Notification, NotificationLevel, NotificationLog, Notifier, TracingNotifier};
pub use vcas::{
    ConflictResolution, DisableOriginOnMerge, EntityDraft, NewTagDefinition, TagInstanceDraft,
    TagInstanceSubmission, WriteOutcome,
};
