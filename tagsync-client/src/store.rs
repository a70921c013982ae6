//! The remote store seam.
//!
//! Engines only talk to a [`TagStore`]. The HTTP implementation lives in
//! [`crate::http`]; tests substitute an in-memory store.

use crate::types::ConflictsReply;
use async_trait::async_trait;
use tagsync_core::{
    ConflictResolution, DisableOriginOnMerge, Entity, EntityDraft, MergeRequest, MergeRequestId,
    NewTagDefinition, StoreError, TagDefinition, TagDefinitionId, TagInstanceRecord,
    TagInstanceSubmission, WriteOutcome,
};

/// Operations the synchronization core needs from the remote store.
///
/// Reads return `Err` for any non-success answer. Guarded writes classify
/// the answer into a [`WriteOutcome`] and only return `Err` when the request
/// could not be completed at all.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// One page of entities starting at `offset`.
    async fn entity_chunk(&self, offset: i64, limit: usize) -> Result<Vec<Entity>, StoreError>;

    /// One page of tag instances whose version is at least `offset`.
    async fn tag_instance_chunk(
        &self,
        tag_definition: &TagDefinitionId,
        offset: i64,
        limit: usize,
    ) -> Result<Vec<TagInstanceRecord>, StoreError>;

    async fn submit_tag_instance(
        &self,
        submission: TagInstanceSubmission,
    ) -> Result<WriteOutcome<TagInstanceRecord>, StoreError>;

    /// Direct children of `parent`, or the roots when `parent` is `None`.
    async fn tag_children(
        &self,
        parent: Option<&TagDefinitionId>,
    ) -> Result<Vec<TagDefinition>, StoreError>;

    async fn create_tag_definition(
        &self,
        definition: NewTagDefinition,
    ) -> Result<WriteOutcome<TagDefinition>, StoreError>;

    /// Create an entity, or replace one when the draft names id and version.
    async fn put_entity(&self, draft: EntityDraft) -> Result<WriteOutcome<Entity>, StoreError>;

    async fn merge_conflicts(&self, id: &MergeRequestId) -> Result<ConflictsReply, StoreError>;

    async fn resolve_conflict(
        &self,
        id: &MergeRequestId,
        resolution: ConflictResolution,
    ) -> Result<WriteOutcome<()>, StoreError>;

    async fn start_merge(&self, id: &MergeRequestId) -> Result<WriteOutcome<()>, StoreError>;

    async fn set_disable_origin_on_merge(
        &self,
        id: &MergeRequestId,
        toggle: DisableOriginOnMerge,
    ) -> Result<WriteOutcome<MergeRequest>, StoreError>;
}
