//! In-memory [`TagStore`] that behaves like the remote store.
//!
//! Versions are minted here on every successful write and guarded writes are
//! checked against the stored versions, so conflicts arise naturally. Every
//! call is logged and yields once to the scheduler, which lets concurrent
//! engine calls interleave the way they do over the network.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tagsync_client::{ConflictsReply, TagStore};
use tagsync_core::{
    ConflictResolution, DisableOriginOnMerge, Entity, EntityDraft, EntityId, MergeRequestId,
    MergeRequest, NewTagDefinition, StoreError, TagDefinition, TagDefinitionId, TagInstanceId,
    TagInstanceRecord, TagInstanceSubmission, Version, WriteOutcome,
};

/// Store operations, used for failure injection and request counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    EntityChunk,
    TagInstanceChunk,
    SubmitTagInstance,
    TagChildren,
    CreateTagDefinition,
    PutEntity,
    MergeConflicts,
    ResolveConflict,
    StartMerge,
    SetDisableOriginOnMerge,
}

/// One logged call with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    EntityChunk {
        offset: i64,
        limit: usize,
    },
    TagInstanceChunk {
        tag_definition: TagDefinitionId,
        offset: i64,
        limit: usize,
    },
    SubmitTagInstance(TagInstanceSubmission),
    TagChildren {
        parent: Option<TagDefinitionId>,
    },
    CreateTagDefinition(NewTagDefinition),
    PutEntity(EntityDraft),
    MergeConflicts(MergeRequestId),
    ResolveConflict(MergeRequestId, ConflictResolution),
    StartMerge(MergeRequestId),
    SetDisableOriginOnMerge(MergeRequestId, DisableOriginOnMerge),
}

impl Request {
    pub fn op(&self) -> StoreOp {
        match self {
            Request::EntityChunk { .. } => StoreOp::EntityChunk,
            Request::TagInstanceChunk { .. } => StoreOp::TagInstanceChunk,
            Request::SubmitTagInstance(_) => StoreOp::SubmitTagInstance,
            Request::TagChildren { .. } => StoreOp::TagChildren,
            Request::CreateTagDefinition(_) => StoreOp::CreateTagDefinition,
            Request::PutEntity(_) => StoreOp::PutEntity,
            Request::MergeConflicts(_) => StoreOp::MergeConflicts,
            Request::ResolveConflict(..) => StoreOp::ResolveConflict,
            Request::StartMerge(_) => StoreOp::StartMerge,
            Request::SetDisableOriginOnMerge(..) => StoreOp::SetDisableOriginOnMerge,
        }
    }
}

/// A scripted non-transport rejection.
#[derive(Debug, Clone)]
enum Rejection {
    Forbidden(String),
    Failed(String),
}

#[derive(Debug, Default)]
struct Inner {
    entities: Vec<Entity>,
    tag_instances: HashMap<TagDefinitionId, Vec<TagInstanceRecord>>,
    scripted_tag_pages: HashMap<TagDefinitionId, VecDeque<Vec<TagInstanceRecord>>>,
    children: HashMap<Option<TagDefinitionId>, Vec<TagDefinition>>,
    failing_children: HashMap<Option<TagDefinitionId>, StoreError>,
    merges: HashMap<MergeRequestId, ConflictsReply>,
    stale_merges: HashSet<MergeRequestId>,
    transport_failures: HashMap<StoreOp, VecDeque<Option<StoreError>>>,
    rejections: HashMap<StoreOp, VecDeque<Rejection>>,
    requests: Vec<Request>,
    next_version: Version,
    next_id: u64,
}

impl Inner {
    fn mint_version(&mut self) -> Version {
        self.next_version += 1;
        self.next_version
    }

    /// Minted ids never collide with the `fixtures` naming scheme.
    fn mint_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("minted-{}-{}", prefix, self.next_id)
    }

    fn observe_version(&mut self, version: Version) {
        self.next_version = self.next_version.max(version);
    }

    fn take_transport_failure(&mut self, op: StoreOp) -> Option<StoreError> {
        self.transport_failures.get_mut(&op)?.pop_front().flatten()
    }

    fn take_rejection<T>(&mut self, op: StoreOp) -> Option<WriteOutcome<T>> {
        let rejection = self.rejections.get_mut(&op)?.pop_front()?;
        Some(match rejection {
            Rejection::Forbidden(message) => WriteOutcome::Forbidden(message),
            Rejection::Failed(message) => WriteOutcome::Failed(message),
        })
    }
}

/// In-memory store. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MockTagStore {
    inner: Mutex<Inner>,
}

impl MockTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log the call, yield once, then fail it if a transport error is queued.
    async fn enter(&self, request: Request) -> Result<(), StoreError> {
        let op = request.op();
        self.inner().requests.push(request);
        tokio::task::yield_now().await;
        match self.inner().take_transport_failure(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn with_entities(self, entities: Vec<Entity>) -> Self {
        {
            let mut inner = self.inner();
            for entity in &entities {
                inner.observe_version(entity.version);
            }
            inner.entities = entities;
        }
        self
    }

    pub fn with_tag_instances(
        self,
        tag_definition: TagDefinitionId,
        records: Vec<TagInstanceRecord>,
    ) -> Self {
        {
            let mut inner = self.inner();
            for record in &records {
                inner.observe_version(record.version);
            }
            inner.tag_instances.insert(tag_definition, records);
        }
        self
    }

    /// Children returned for `parent`, `None` being the roots.
    pub fn with_children(self, parent: Option<TagDefinitionId>, children: Vec<TagDefinition>) -> Self {
        self.inner().children.insert(parent, children);
        self
    }

    pub fn with_merge(self, reply: ConflictsReply) -> Self {
        {
            let mut inner = self.inner();
            inner.observe_version(reply.merge_request.version);
            for conflict in reply.conflicts.iter().chain(&reply.updated) {
                inner.observe_version(conflict.entity.version);
                inner.observe_version(conflict.tag_instance_origin.version);
            }
            inner
                .merges
                .insert(reply.merge_request.id_persistent.clone(), reply);
        }
        self
    }

    /// Serve these pages, in order, for the next tag chunk requests of
    /// `tag_definition` instead of scanning the stored records.
    pub fn script_tag_pages(&self, tag_definition: TagDefinitionId, pages: Vec<Vec<TagInstanceRecord>>) {
        self.inner()
            .scripted_tag_pages
            .insert(tag_definition, pages.into());
    }

    // ------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------

    /// Fail the next call of `op` with a transport level error. Queued
    /// behind earlier `fail_next`/`pass_next` entries for the same op.
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.inner()
            .transport_failures
            .entry(op)
            .or_default()
            .push_back(Some(err));
    }

    /// Let the next call of `op` through, so a later `fail_next` hits a
    /// later call.
    pub fn pass_next(&self, op: StoreOp) {
        self.inner()
            .transport_failures
            .entry(op)
            .or_default()
            .push_back(None);
    }

    /// Answer the next write of `op` with 403.
    pub fn forbid_next(&self, op: StoreOp, message: impl Into<String>) {
        self.inner()
            .rejections
            .entry(op)
            .or_default()
            .push_back(Rejection::Forbidden(message.into()));
    }

    /// Answer the next write of `op` with a non-conflict error status.
    pub fn reject_next(&self, op: StoreOp, message: impl Into<String>) {
        self.inner()
            .rejections
            .entry(op)
            .or_default()
            .push_back(Rejection::Failed(message.into()));
    }

    /// Every children request for `parent` fails with `err`.
    pub fn fail_children(&self, parent: Option<TagDefinitionId>, err: StoreError) {
        self.inner().failing_children.insert(parent, err);
    }

    /// Starting this merge answers 409, as if data moved after the
    /// conflicts were computed.
    pub fn mark_merge_stale(&self, id: MergeRequestId) {
        self.inner().stale_merges.insert(id);
    }

    // ------------------------------------------------------------------
    // Out-of-band writes by "other users"
    // ------------------------------------------------------------------

    /// Overwrite a stored tag instance with a fresh version.
    pub fn concurrent_tag_write(
        &self,
        tag_definition: &TagDefinitionId,
        instance: &TagInstanceId,
        value: tagsync_core::TagValue,
    ) -> Option<Version> {
        let mut inner = self.inner();
        let version = inner.mint_version();
        let record = inner
            .tag_instances
            .get_mut(tag_definition)?
            .iter_mut()
            .find(|record| &record.id_persistent == instance)?;
        record.value = value;
        record.version = version;
        Some(version)
    }

    pub fn set_children(&self, parent: Option<TagDefinitionId>, children: Vec<TagDefinition>) {
        self.inner().children.insert(parent, children);
    }

    pub fn update_merge(&self, id: &MergeRequestId, update: impl FnOnce(&mut ConflictsReply)) {
        if let Some(reply) = self.inner().merges.get_mut(id) {
            update(reply);
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn requests(&self) -> Vec<Request> {
        self.inner().requests.clone()
    }

    pub fn request_count(&self, op: StoreOp) -> usize {
        self.inner()
            .requests
            .iter()
            .filter(|request| request.op() == op)
            .count()
    }

    pub fn clear_requests(&self) {
        self.inner().requests.clear();
    }

    pub fn stored_entities(&self) -> Vec<Entity> {
        self.inner().entities.clone()
    }

    pub fn stored_tag_instances(&self, tag_definition: &TagDefinitionId) -> Vec<TagInstanceRecord> {
        self.inner()
            .tag_instances
            .get(tag_definition)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stored_merge(&self, id: &MergeRequestId) -> Option<ConflictsReply> {
        self.inner().merges.get(id).cloned()
    }
}

fn stale_resolution(reply: &ConflictsReply, resolution: &ConflictResolution) -> bool {
    let merge_request = &reply.merge_request;
    if merge_request.origin_tag_definition.version != resolution.id_tag_definition_origin_version
        || merge_request.destination_tag_definition.version
            != resolution.id_tag_definition_destination_version
    {
        return true;
    }
    let Some(conflict) = reply.conflicts.iter().find(|conflict| {
        conflict.entity.id_persistent == resolution.id_entity_persistent
            && conflict.tag_instance_origin.id_persistent
                == resolution.id_tag_instance_origin_persistent
    }) else {
        return true;
    };
    let destination = conflict
        .tag_instance_destination
        .as_ref()
        .map(|cell| (cell.id_persistent.clone(), cell.version));
    let proposed = resolution
        .id_tag_instance_destination_persistent
        .clone()
        .zip(resolution.id_tag_instance_destination_version);
    conflict.entity.version != resolution.id_entity_version
        || conflict.tag_instance_origin.version != resolution.id_tag_instance_origin_version
        || destination != proposed
}

#[async_trait]
impl TagStore for MockTagStore {
    async fn entity_chunk(&self, offset: i64, limit: usize) -> Result<Vec<Entity>, StoreError> {
        self.enter(Request::EntityChunk { offset, limit }).await?;
        let inner = self.inner();
        let start = usize::try_from(offset).unwrap_or(0).min(inner.entities.len());
        let end = start.saturating_add(limit).min(inner.entities.len());
        Ok(inner.entities[start..end].to_vec())
    }

    async fn tag_instance_chunk(
        &self,
        tag_definition: &TagDefinitionId,
        offset: i64,
        limit: usize,
    ) -> Result<Vec<TagInstanceRecord>, StoreError> {
        self.enter(Request::TagInstanceChunk {
            tag_definition: tag_definition.clone(),
            offset,
            limit,
        })
        .await?;
        let mut inner = self.inner();
        if let Some(page) = inner
            .scripted_tag_pages
            .get_mut(tag_definition)
            .and_then(VecDeque::pop_front)
        {
            return Ok(page);
        }
        let mut page: Vec<TagInstanceRecord> = inner
            .tag_instances
            .get(tag_definition)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.version >= offset)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        page.sort_by_key(|record| record.version);
        page.truncate(limit);
        Ok(page)
    }

    async fn submit_tag_instance(
        &self,
        submission: TagInstanceSubmission,
    ) -> Result<WriteOutcome<TagInstanceRecord>, StoreError> {
        self.enter(Request::SubmitTagInstance(submission.clone())).await?;
        let mut inner = self.inner();
        if let Some(rejection) = inner.take_rejection(StoreOp::SubmitTagInstance) {
            return Ok(rejection);
        }
        let version = inner.mint_version();
        let records = inner
            .tag_instances
            .entry(submission.id_tag_definition_persistent.clone())
            .or_default();

        if let Some(id) = &submission.id_persistent {
            let Some(current) = records.iter_mut().find(|record| &record.id_persistent == id) else {
                return Ok(WriteOutcome::Failed(format!("Tag instance {} not found", id)));
            };
            if Some(current.version) != submission.version {
                return Ok(WriteOutcome::Conflict(current.clone()));
            }
            current.value = submission.value;
            current.version = version;
            return Ok(WriteOutcome::Ok(current.clone()));
        }

        let record = TagInstanceRecord {
            id_entity_persistent: submission.id_entity_persistent,
            id_tag_definition_persistent: submission.id_tag_definition_persistent,
            id_persistent: TagInstanceId::new(format!("instance-{}", version)),
            version,
            value: submission.value,
        };
        records.push(record.clone());
        Ok(WriteOutcome::Ok(record))
    }

    async fn tag_children(
        &self,
        parent: Option<&TagDefinitionId>,
    ) -> Result<Vec<TagDefinition>, StoreError> {
        let parent = parent.cloned();
        self.enter(Request::TagChildren {
            parent: parent.clone(),
        })
        .await?;
        let inner = self.inner();
        if let Some(err) = inner.failing_children.get(&parent) {
            return Err(err.clone());
        }
        Ok(inner.children.get(&parent).cloned().unwrap_or_default())
    }

    async fn create_tag_definition(
        &self,
        definition: NewTagDefinition,
    ) -> Result<WriteOutcome<TagDefinition>, StoreError> {
        self.enter(Request::CreateTagDefinition(definition.clone())).await?;
        let mut inner = self.inner();
        if let Some(rejection) = inner.take_rejection(StoreOp::CreateTagDefinition) {
            return Ok(rejection);
        }
        let parent_key = definition.id_parent_persistent.clone();
        if let Some(existing) = inner
            .children
            .get(&parent_key)
            .and_then(|siblings| siblings.iter().find(|sibling| sibling.name() == definition.name))
        {
            return Ok(WriteOutcome::Conflict(existing.clone()));
        }

        let parent_names = parent_key
            .as_ref()
            .and_then(|parent| {
                inner
                    .children
                    .values()
                    .flatten()
                    .find(|candidate| &candidate.id_persistent == parent)
            })
            .map(|parent| parent.name_path.clone())
            .unwrap_or_default();
        let mut name_path = parent_names;
        name_path.push(definition.name);

        let id = inner.mint_id("tag");
        let version = inner.mint_version();
        let created = TagDefinition {
            id_persistent: TagDefinitionId::new(id),
            name_path,
            id_parent_persistent: parent_key.clone(),
            column_type: definition.column_type,
            curated: false,
            owner: None,
            version,
            hidden: false,
        };
        inner
            .children
            .entry(parent_key)
            .or_default()
            .push(created.clone());
        Ok(WriteOutcome::Ok(created))
    }

    async fn put_entity(&self, draft: EntityDraft) -> Result<WriteOutcome<Entity>, StoreError> {
        self.enter(Request::PutEntity(draft.clone())).await?;
        let mut inner = self.inner();
        if let Some(rejection) = inner.take_rejection(StoreOp::PutEntity) {
            return Ok(rejection);
        }
        let version = inner.mint_version();

        if let Some(id) = &draft.id_persistent {
            let Some(current) = inner.entities.iter_mut().find(|entity| &entity.id_persistent == id) else {
                return Ok(WriteOutcome::Failed(format!("Entity {} not found", id)));
            };
            if Some(current.version) != draft.version {
                return Ok(WriteOutcome::Conflict(current.clone()));
            }
            current.display_txt = draft.display_txt;
            current.version = version;
            return Ok(WriteOutcome::Ok(current.clone()));
        }

        let id = inner.mint_id("entity");
        let entity = Entity {
            id_persistent: EntityId::new(id),
            display_txt: draft.display_txt,
            version,
            disabled: false,
        };
        inner.entities.push(entity.clone());
        Ok(WriteOutcome::Ok(entity))
    }

    async fn merge_conflicts(&self, id: &MergeRequestId) -> Result<ConflictsReply, StoreError> {
        self.enter(Request::MergeConflicts(id.clone())).await?;
        self.inner()
            .merges
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                resource: format!("merge request {}", id),
            })
    }

    async fn resolve_conflict(
        &self,
        id: &MergeRequestId,
        resolution: ConflictResolution,
    ) -> Result<WriteOutcome<()>, StoreError> {
        self.enter(Request::ResolveConflict(id.clone(), resolution.clone()))
            .await?;
        let mut inner = self.inner();
        if let Some(rejection) = inner.take_rejection(StoreOp::ResolveConflict) {
            return Ok(rejection);
        }
        let Some(reply) = inner.merges.get_mut(id) else {
            return Ok(WriteOutcome::Failed(format!("Merge request {} not found", id)));
        };
        if stale_resolution(reply, &resolution) {
            return Ok(WriteOutcome::Conflict(()));
        }
        if let Some(conflict) = reply.conflicts.iter_mut().find(|conflict| {
            conflict.entity.id_persistent == resolution.id_entity_persistent
                && conflict.tag_instance_origin.id_persistent
                    == resolution.id_tag_instance_origin_persistent
        }) {
            conflict.replace = Some(resolution.replace);
        }
        Ok(WriteOutcome::Ok(()))
    }

    async fn start_merge(&self, id: &MergeRequestId) -> Result<WriteOutcome<()>, StoreError> {
        self.enter(Request::StartMerge(id.clone())).await?;
        let mut inner = self.inner();
        if let Some(rejection) = inner.take_rejection(StoreOp::StartMerge) {
            return Ok(rejection);
        }
        if inner.stale_merges.contains(id) {
            return Ok(WriteOutcome::Conflict(()));
        }
        let Some(reply) = inner.merges.get_mut(id) else {
            return Ok(WriteOutcome::Failed(format!("Merge request {} not found", id)));
        };
        if reply.conflicts.iter().any(|conflict| !conflict.is_resolved()) {
            return Ok(WriteOutcome::Failed(
                "Merge request has unresolved conflicts".to_string(),
            ));
        }
        reply.merge_request.step = tagsync_core::MergeStep::Merged;
        Ok(WriteOutcome::Ok(()))
    }

    async fn set_disable_origin_on_merge(
        &self,
        id: &MergeRequestId,
        toggle: DisableOriginOnMerge,
    ) -> Result<WriteOutcome<MergeRequest>, StoreError> {
        self.enter(Request::SetDisableOriginOnMerge(id.clone(), toggle.clone()))
            .await?;
        let mut inner = self.inner();
        if let Some(rejection) = inner.take_rejection(StoreOp::SetDisableOriginOnMerge) {
            return Ok(rejection);
        }
        let version = inner.mint_version();
        let Some(reply) = inner.merges.get_mut(id) else {
            return Ok(WriteOutcome::Failed(format!("Merge request {} not found", id)));
        };
        let merge_request = &mut reply.merge_request;
        if merge_request.version != toggle.version {
            return Ok(WriteOutcome::Conflict(merge_request.clone()));
        }
        merge_request.disable_origin_on_merge = toggle.disable_origin_on_merge;
        merge_request.version = version;
        Ok(WriteOutcome::Ok(merge_request.clone()))
    }
}
