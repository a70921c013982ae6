//! Table synchronization engine.
//!
//! Owns the entity list, the displayed columns and their sparse cells. Loads
//! run through the chunked fetcher; edits are version-guarded writes.

use crate::chunk::{fetch_chunks, Cursor};
use crate::state::{collect_cells, is_display_txt_column, TableState};
use futures_util::future::join_all;
use std::sync::Arc;
use tagsync_client::TagStore;
use tagsync_core::{
    CellValue, Entity, EntityDraft, EntityId, Notifier, StoreError, SyncConfig, SyncError,
    SyncResult, TagDefinition, TagDefinitionId, TagInstanceDraft, TagInstanceId,
    TagInstanceSubmission, TagValue, ValidationError, WriteOutcome,
};
use tokio::sync::RwLock;

/// What a load request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// A load for the same target was already running; nothing was sent.
    AlreadyLoading,
    /// Target already loaded; use an explicit reload to refresh it.
    AlreadyLoaded,
    /// Finished after the column had been removed; results were dropped.
    Discarded,
}

pub struct TableEngine {
    store: Arc<dyn TagStore>,
    config: SyncConfig,
    notifier: Arc<dyn Notifier>,
    state: RwLock<TableState>,
}

impl TableEngine {
    pub fn new(store: Arc<dyn TagStore>, config: SyncConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            config,
            notifier,
            state: RwLock::new(TableState::new()),
        }
    }

    /// Copy of the current table state.
    pub async fn snapshot(&self) -> TableState {
        self.state.read().await.clone()
    }

    /// Tag definitions of the displayed columns, without the display text
    /// column. Handed out as copies for the column menu.
    pub async fn display_tag_definitions(&self) -> Vec<TagDefinition> {
        self.state
            .read()
            .await
            .columns()
            .iter()
            .filter(|column| !is_display_txt_column(column.id()))
            .map(|column| column.tag_definition.clone())
            .collect()
    }

    // ========================================================================
    // ENTITIES
    // ========================================================================

    /// Load all entities and publish them with the display text column.
    pub async fn load_all(&self) -> SyncResult<LoadOutcome> {
        {
            let mut state = self.state.write().await;
            if state.is_loading() {
                return Ok(LoadOutcome::AlreadyLoading);
            }
            if !state.begin_entity_load() {
                return Ok(LoadOutcome::AlreadyLoaded);
            }
        }

        let result = fetch_chunks(self.config.entity_page_size, Cursor::Offset, |offset, limit| {
            self.store.entity_chunk(offset, limit)
        })
        .await;

        match result {
            Ok(entities) => {
                let count = entities.len();
                self.state.write().await.set_entities(entities);
                tracing::info!(count, "entities loaded");
                Ok(LoadOutcome::Loaded)
            }
            Err(err) => {
                self.state.write().await.fail_entity_load(err.to_string());
                Err(err)
            }
        }
    }

    /// Manual retry after an inline entity load error.
    pub async fn retry_entities(&self) -> SyncResult<LoadOutcome> {
        self.state.write().await.mark_entities_stale();
        self.load_all().await
    }

    /// Load entities, then the given columns concurrently.
    ///
    /// Fails only if the entities cannot be loaded. Each column reports its
    /// own result in the order given.
    pub async fn load_all_with_columns(
        &self,
        columns: &[TagDefinition],
    ) -> SyncResult<Vec<SyncResult<LoadOutcome>>> {
        self.load_all().await?;
        Ok(join_all(columns.iter().map(|definition| self.load_column(definition))).await)
    }

    /// Create a new entity.
    pub async fn create_entity(&self, display_txt: &str) -> SyncResult<Entity> {
        let outcome = self.store.put_entity(EntityDraft::create(display_txt)).await;
        self.apply_entity_outcome(outcome, display_txt).await
    }

    /// Replace the display text of a loaded entity, guarded by its version.
    pub async fn replace_entity(&self, id: &EntityId, display_txt: &str) -> SyncResult<Entity> {
        let current = self.state.read().await.entity(id).cloned();
        let Some(current) = current else {
            return Err(self.report(SyncError::NotLoaded { what: "entity" }));
        };
        let outcome = self
            .store
            .put_entity(EntityDraft::replace(&current, display_txt))
            .await;
        self.apply_entity_outcome(outcome, &current.display_txt).await
    }

    async fn apply_entity_outcome(
        &self,
        outcome: Result<WriteOutcome<Entity>, StoreError>,
        subject: &str,
    ) -> SyncResult<Entity> {
        match outcome {
            Ok(WriteOutcome::Ok(entity)) => {
                self.state.write().await.upsert_entity(entity.clone());
                Ok(entity)
            }
            Ok(WriteOutcome::Conflict(entity)) => {
                tracing::warn!(entity = %entity.id_persistent, version = entity.version, "entity write conflict");
                self.state.write().await.upsert_entity(entity);
                Err(self.report(SyncError::Conflict {
                    subject: subject.to_string(),
                }))
            }
            Ok(WriteOutcome::Forbidden(message)) => Err(self.report(SyncError::Forbidden {
                subject: subject.to_string(),
                message,
            })),
            Ok(WriteOutcome::Failed(message)) => Err(self.report(SyncError::Failed { message })),
            Err(err) => Err(self.report(SyncError::Failed {
                message: err.user_message(),
            })),
        }
    }

    // ========================================================================
    // COLUMNS
    // ========================================================================

    /// Load a column's cells. No-op while that column is loading or once it
    /// has loaded.
    pub async fn load_column(&self, definition: &TagDefinition) -> SyncResult<LoadOutcome> {
        self.load_column_inner(definition, false).await
    }

    /// Explicitly reload an already loaded column.
    pub async fn reload_column(&self, definition: &TagDefinition) -> SyncResult<LoadOutcome> {
        self.load_column_inner(definition, true).await
    }

    async fn load_column_inner(
        &self,
        definition: &TagDefinition,
        force: bool,
    ) -> SyncResult<LoadOutcome> {
        let id = definition.id_persistent.clone();
        if is_display_txt_column(&id) {
            return if force {
                self.retry_entities().await
            } else {
                Ok(LoadOutcome::AlreadyLoaded)
            };
        }

        let generation = {
            let mut state = self.state.write().await;
            match state.begin_column_load(definition, force) {
                Some(generation) => generation,
                None => {
                    let loading = state.column(&id).is_some_and(|column| column.is_loading);
                    return Ok(if loading {
                        LoadOutcome::AlreadyLoading
                    } else {
                        LoadOutcome::AlreadyLoaded
                    });
                }
            }
        };
        tracing::debug!(tag_definition = %id, generation, "column load started");

        let result = fetch_chunks(self.config.tag_page_size, Cursor::HighWaterMark, |offset, limit| {
            self.store.tag_instance_chunk(&id, offset, limit)
        })
        .await;

        match result {
            Ok(records) => {
                let count = records.len();
                let cells = collect_cells(records);
                let entities = cells.len();
                let committed = self
                    .state
                    .write()
                    .await
                    .finish_column_load(&id, generation, cells);
                if committed {
                    tracing::info!(tag_definition = %id, count, entities, "column loaded");
                    Ok(LoadOutcome::Loaded)
                } else {
                    tracing::debug!(tag_definition = %id, generation, "column superseded while loading");
                    Ok(LoadOutcome::Discarded)
                }
            }
            Err(err) => {
                let recorded = self
                    .state
                    .write()
                    .await
                    .fail_column_load(&id, generation, err.to_string());
                if !recorded {
                    tracing::debug!(tag_definition = %id, generation, "superseded column load failed");
                }
                Err(err)
            }
        }
    }

    /// Remove a column. Unknown columns are ignored.
    pub async fn remove_column(&self, id: &TagDefinitionId) -> bool {
        self.state.write().await.remove_column(id)
    }

    pub async fn move_column(&self, from: usize, to: usize) -> bool {
        self.state.write().await.move_column(from, to)
    }

    pub async fn set_column_width(&self, id: &TagDefinitionId, width: u32) -> bool {
        self.state.write().await.set_column_width(id, width)
    }

    // ========================================================================
    // CELL EDITS
    // ========================================================================

    /// Submit a cell edit as a version-guarded write.
    ///
    /// On a version conflict the store's current value replaces the local
    /// cell *and* the call fails, so the user sees the truth and can retry
    /// against it. Forbidden and other failures leave the cell untouched.
    pub async fn submit_edit(
        &self,
        entity: &EntityId,
        tag_definition: &TagDefinitionId,
        draft: TagInstanceDraft,
    ) -> SyncResult<CellValue> {
        if is_display_txt_column(tag_definition) {
            return self.submit_display_txt(entity, draft).await;
        }

        let definition = self
            .state
            .read()
            .await
            .column(tag_definition)
            .map(|column| column.tag_definition.clone());
        let Some(definition) = definition else {
            return Err(self.report(SyncError::UnknownColumn {
                id: tag_definition.to_string(),
            }));
        };
        if !draft.value.conforms_to(definition.column_type) {
            return Err(self.report(
                ValidationError::TypeMismatch {
                    expected: definition.column_type,
                }
                .into(),
            ));
        }

        let submission = TagInstanceSubmission::new(entity.clone(), tag_definition.clone(), &draft);
        self.state.write().await.begin_submission();
        let outcome = self.store.submit_tag_instance(submission).await;

        let mut state = self.state.write().await;
        state.end_submission();
        let subject = definition.display_path();
        match outcome {
            Ok(WriteOutcome::Ok(record)) => {
                let cell = record.cell();
                state.put_cell(entity, tag_definition, draft.id_persistent.as_ref(), cell.clone());
                Ok(cell)
            }
            Ok(WriteOutcome::Conflict(record)) => {
                let cell = record.cell();
                state.put_cell(entity, tag_definition, draft.id_persistent.as_ref(), cell);
                drop(state);
                tracing::warn!(
                    entity = %entity,
                    tag_definition = %tag_definition,
                    version = record.version,
                    "cell edit conflict, local value refreshed"
                );
                Err(self.report(SyncError::Conflict { subject }))
            }
            Ok(WriteOutcome::Forbidden(message)) => {
                drop(state);
                tracing::warn!(tag_definition = %tag_definition, "cell edit forbidden");
                Err(self.report(SyncError::Forbidden { subject, message }))
            }
            Ok(WriteOutcome::Failed(message)) => {
                drop(state);
                Err(self.report(SyncError::Failed { message }))
            }
            Err(err) => {
                drop(state);
                Err(self.report(SyncError::Failed {
                    message: err.user_message(),
                }))
            }
        }
    }

    /// Edits of the display text column are entity replacements.
    async fn submit_display_txt(
        &self,
        entity: &EntityId,
        draft: TagInstanceDraft,
    ) -> SyncResult<CellValue> {
        let TagValue::String(display_txt) = draft.value else {
            return Err(self.report(
                ValidationError::TypeMismatch {
                    expected: tagsync_core::ColumnType::String,
                }
                .into(),
            ));
        };
        let updated = self.replace_entity(entity, &display_txt).await?;
        Ok(CellValue {
            id_persistent: TagInstanceId::new(updated.id_persistent.as_str()),
            version: updated.version,
            value: TagValue::String(updated.display_txt),
        })
    }

    fn report(&self, err: SyncError) -> SyncError {
        self.notifier.add_error(&err.to_string());
        err
    }
}

impl std::fmt::Debug for TableEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableEngine")
            .field("config", &self.config)
            .finish()
    }
}
