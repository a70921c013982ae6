//! Merge request reconciliation.
//!
//! Holds the conflict list of one merge request, submits per-conflict
//! decisions and triggers the server side merge.

use std::sync::Arc;
use tagsync_client::TagStore;
use tagsync_core::{
    ConflictResolution, DisableOriginOnMerge, EntityId, MergeConflict, MergeRequest,
    MergeRequestId, Notifier, SyncConfig, SyncError, SyncResult, TagDefinition, TagInstanceId,
    WriteOutcome,
};
use tokio::sync::RwLock;

const STALE_CONFLICTS_MESSAGE: &str = "The data changed since the conflicts were computed.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeState {
    pub merge_request: Option<MergeRequest>,
    /// Already applied items, informational only.
    pub updated: Vec<MergeConflict>,
    pub conflicts: Vec<MergeConflict>,
    pub is_loading: bool,
    pub load_error: Option<String>,
    pub is_merging: bool,
}

impl MergeState {
    /// Conflicts that carry a decision. Always computed from the list.
    pub fn resolved_count(&self) -> usize {
        self.conflicts
            .iter()
            .filter(|conflict| conflict.is_resolved())
            .count()
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.resolved_count() == self.conflicts.len()
    }

    /// Record a decision on the conflict for (entity, origin instance).
    pub(crate) fn set_replace(
        &mut self,
        entity: &EntityId,
        origin_instance: &TagInstanceId,
        replace: bool,
    ) -> bool {
        match self.conflicts.iter_mut().find(|conflict| {
            &conflict.entity.id_persistent == entity
                && &conflict.tag_instance_origin.id_persistent == origin_instance
        }) {
            Some(conflict) => {
                conflict.replace = Some(replace);
                true
            }
            None => false,
        }
    }
}

pub struct MergeEngine {
    store: Arc<dyn TagStore>,
    config: SyncConfig,
    notifier: Arc<dyn Notifier>,
    state: RwLock<MergeState>,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn TagStore>, config: SyncConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            config,
            notifier,
            state: RwLock::new(MergeState::default()),
        }
    }

    pub async fn snapshot(&self) -> MergeState {
        self.state.read().await.clone()
    }

    pub async fn resolved_count(&self) -> usize {
        self.state.read().await.resolved_count()
    }

    /// Fetch the conflict list and the merge request it belongs to.
    pub async fn load_conflicts(&self, id: &MergeRequestId) -> SyncResult<()> {
        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.load_error = None;
        }

        let result = self.store.merge_conflicts(id).await;
        let mut state = self.state.write().await;
        state.is_loading = false;
        match result {
            Ok(reply) => {
                tracing::info!(
                    merge_request = %id,
                    conflicts = reply.conflicts.len(),
                    updated = reply.updated.len(),
                    "merge conflicts loaded"
                );
                state.merge_request = Some(reply.merge_request);
                state.updated = reply.updated;
                state.conflicts = reply.conflicts;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(merge_request = %id, error = %err, "loading merge conflicts failed");
                state.load_error = Some(err.user_message());
                Err(err.into())
            }
        }
    }

    /// Decide one conflict.
    ///
    /// The write is guarded by the entity, both tag definitions and both tag
    /// instances at the versions held in `conflict`. Only a successful write
    /// records `replace` locally.
    pub async fn resolve(
        &self,
        conflict: &MergeConflict,
        origin: &TagDefinition,
        destination: &TagDefinition,
        replace: bool,
    ) -> SyncResult<()> {
        let id = self.merge_request_id().await?;
        let resolution = ConflictResolution::for_conflict(conflict, origin, destination, replace);
        let entity = &conflict.entity;

        let failure = match self.store.resolve_conflict(&id, resolution).await {
            Ok(WriteOutcome::Ok(())) => {
                self.state.write().await.set_replace(
                    &entity.id_persistent,
                    &conflict.tag_instance_origin.id_persistent,
                    replace,
                );
                tracing::debug!(merge_request = %id, entity = %entity.id_persistent, replace, "conflict resolved");
                return Ok(());
            }
            Ok(WriteOutcome::Conflict(())) => {
                format!("{} {}", STALE_CONFLICTS_MESSAGE, self.config.reload_hint)
            }
            Ok(WriteOutcome::Forbidden(message)) | Ok(WriteOutcome::Failed(message)) => message,
            Err(err) => err.user_message(),
        };
        tracing::warn!(merge_request = %id, entity = %entity.id_persistent, "conflict resolution rejected");
        Err(self.report(SyncError::ResolveFailed {
            entity: entity.display_txt.clone(),
            message: failure,
        }))
    }

    /// Decide the conflict at `index` of the loaded list against the merge
    /// request's own tag definitions.
    pub async fn resolve_at(&self, index: usize, replace: bool) -> SyncResult<()> {
        let (conflict, merge_request) = {
            let state = self.state.read().await;
            let merge_request = state
                .merge_request
                .clone()
                .ok_or(SyncError::NotLoaded { what: "merge request" })?;
            let conflict = state
                .conflicts
                .get(index)
                .cloned()
                .ok_or(SyncError::NotLoaded { what: "merge conflict" })?;
            (conflict, merge_request)
        };
        self.resolve(
            &conflict,
            &merge_request.origin_tag_definition,
            &merge_request.destination_tag_definition,
            replace,
        )
        .await
    }

    /// Ask the store to apply all decisions.
    ///
    /// Rejections caused by open or stale conflicts come back with
    /// `reload_required` set and the reload hint appended.
    pub async fn start_merge(&self, id: &MergeRequestId) -> SyncResult<()> {
        self.state.write().await.is_merging = true;
        let outcome = self.store.start_merge(id).await;
        self.state.write().await.is_merging = false;

        let err = match outcome {
            Ok(WriteOutcome::Ok(())) => {
                tracing::info!(merge_request = %id, "merge started");
                self.notifier.add_success_vanish("Merge started.");
                return Ok(());
            }
            Ok(WriteOutcome::Conflict(())) => SyncError::MergeRejected {
                message: format!("{} {}", STALE_CONFLICTS_MESSAGE, self.config.reload_hint),
                reload_required: true,
            },
            Ok(WriteOutcome::Failed(message)) => match self.config.classify_merge_message(&message) {
                Some(kind) => {
                    tracing::debug!(merge_request = %id, ?kind, "merge rejection classified");
                    SyncError::MergeRejected {
                        message: format!("{} {}", message, self.config.reload_hint),
                        reload_required: true,
                    }
                }
                None => SyncError::Failed { message },
            },
            Ok(WriteOutcome::Forbidden(message)) => SyncError::Forbidden {
                subject: format!("merge request {}", id),
                message,
            },
            Err(err) => SyncError::Failed {
                message: err.user_message(),
            },
        };
        tracing::warn!(merge_request = %id, error = %err, "merge rejected");
        Err(self.report(err))
    }

    /// Flip the merge request's disable-origin flag, guarded by its version.
    /// Returns the new flag value.
    pub async fn toggle_disable_origin_on_merge(&self) -> SyncResult<bool> {
        let merge_request = self
            .state
            .read()
            .await
            .merge_request
            .clone()
            .ok_or(SyncError::NotLoaded { what: "merge request" })?;
        let toggle = DisableOriginOnMerge {
            disable_origin_on_merge: !merge_request.disable_origin_on_merge,
            version: merge_request.version,
        };
        let id = merge_request.id_persistent;
        let subject = format!("merge request {}", id);

        match self.store.set_disable_origin_on_merge(&id, toggle).await {
            Ok(WriteOutcome::Ok(updated)) => {
                let flag = updated.disable_origin_on_merge;
                self.state.write().await.merge_request = Some(updated);
                Ok(flag)
            }
            Ok(WriteOutcome::Conflict(current)) => {
                tracing::warn!(merge_request = %id, version = current.version, "disable origin toggle conflict");
                self.state.write().await.merge_request = Some(current);
                Err(self.report(SyncError::Conflict { subject }))
            }
            Ok(WriteOutcome::Forbidden(message)) => {
                Err(self.report(SyncError::Forbidden { subject, message }))
            }
            Ok(WriteOutcome::Failed(message)) => Err(self.report(SyncError::Failed { message })),
            Err(err) => Err(self.report(SyncError::Failed {
                message: err.user_message(),
            })),
        }
    }

    async fn merge_request_id(&self) -> SyncResult<MergeRequestId> {
        self.state
            .read()
            .await
            .merge_request
            .as_ref()
            .map(|merge_request| merge_request.id_persistent.clone())
            .ok_or(SyncError::NotLoaded { what: "merge request" })
    }

    fn report(&self, err: SyncError) -> SyncError {
        self.notifier.add_error(&err.to_string());
        err
    }
}

impl std::fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
