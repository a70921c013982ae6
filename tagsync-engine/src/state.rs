//! Table state owned by a [`crate::TableEngine`].
//!
//! Columns and entities each live in an ordered vector plus an id -> index
//! map. Every mutation goes through a method here so the two never drift.

use std::collections::HashMap;
use tagsync_core::{
    CellValue, ColumnType, Entity, EntityId, TagDefinition, TagDefinitionId, TagInstanceId,
    TagInstanceRecord, TagValue,
};

/// Id of the synthetic column that shows each entity's display text.
pub const DISPLAY_TXT_COLUMN_ID: &str = "display_txt_id";
pub const DISPLAY_TXT_COLUMN_NAME: &str = "Display Text";
pub const DEFAULT_COLUMN_WIDTH: u32 = 200;

/// Definition backing the synthetic display text column.
pub fn display_txt_definition() -> TagDefinition {
    TagDefinition {
        id_persistent: TagDefinitionId::new(DISPLAY_TXT_COLUMN_ID),
        name_path: vec![DISPLAY_TXT_COLUMN_NAME.to_string()],
        id_parent_persistent: None,
        column_type: ColumnType::String,
        curated: true,
        owner: None,
        version: 0,
        hidden: false,
    }
}

pub fn is_display_txt_column(id: &TagDefinitionId) -> bool {
    id.as_str() == DISPLAY_TXT_COLUMN_ID
}

fn display_txt_cell(entity: &Entity) -> CellValue {
    CellValue {
        id_persistent: TagInstanceId::new(entity.id_persistent.as_str()),
        version: entity.version,
        value: TagValue::String(entity.display_txt.clone()),
    }
}

/// Reduce tag instance records to cells.
///
/// The same instance can show up on two pages when it was rewritten during
/// the scan; only its highest version is kept. Distinct instances for one
/// entity stay side by side as a multi-value cell.
pub fn collect_cells(records: Vec<TagInstanceRecord>) -> HashMap<EntityId, Vec<CellValue>> {
    let mut cells: HashMap<EntityId, Vec<CellValue>> = HashMap::new();
    for record in records {
        let (entity, cell) = record.into_cell();
        let values = cells.entry(entity).or_default();
        match values
            .iter_mut()
            .find(|existing| existing.id_persistent == cell.id_persistent)
        {
            Some(existing) if existing.version < cell.version => *existing = cell,
            Some(_) => {}
            None => values.push(cell),
        }
    }
    cells
}

/// Lay edits that landed while a scan was running over the scan's cells.
/// Per instance the higher version wins.
fn apply_edits(
    mut scanned: HashMap<EntityId, Vec<CellValue>>,
    edits: Vec<LoadEdit>,
) -> HashMap<EntityId, Vec<CellValue>> {
    for LoadEdit { entity, replaced, cell } in edits {
        let values = scanned.entry(entity).or_default();
        if let Some(replaced) = replaced.filter(|id| *id != cell.id_persistent) {
            values.retain(|existing| existing.id_persistent != replaced);
        }
        match values
            .iter_mut()
            .find(|existing| existing.id_persistent == cell.id_persistent)
        {
            Some(existing) if existing.version < cell.version => *existing = cell,
            Some(_) => {}
            None => values.push(cell),
        }
    }
    scanned
}

/// A cell written while the column's scan was running.
#[derive(Debug, Clone, PartialEq)]
struct LoadEdit {
    entity: EntityId,
    replaced: Option<TagInstanceId>,
    cell: CellValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnState {
    pub tag_definition: TagDefinition,
    /// Empty = absent, one = normal, several = multi-value display.
    pub cell_contents: HashMap<EntityId, Vec<CellValue>>,
    pub is_loading: bool,
    pub width: u32,
    /// Inline error of the last failed load, cleared by the next attempt.
    pub load_error: Option<String>,
    /// Generation of the scan allowed to commit into this column.
    load_generation: u64,
    /// Cells written by edits since the current scan began.
    edits_during_load: Vec<LoadEdit>,
}

impl ColumnState {
    fn loading(tag_definition: TagDefinition, load_generation: u64) -> Self {
        Self {
            tag_definition,
            cell_contents: HashMap::new(),
            is_loading: true,
            width: DEFAULT_COLUMN_WIDTH,
            load_error: None,
            load_generation,
            edits_during_load: Vec::new(),
        }
    }

    fn accepts(&self, generation: u64) -> bool {
        self.is_loading && self.load_generation == generation
    }

    pub fn id(&self) -> &TagDefinitionId {
        &self.tag_definition.id_persistent
    }

    pub fn is_loaded(&self) -> bool {
        !self.is_loading && self.load_error.is_none()
    }

    pub fn cells(&self, entity: &EntityId) -> &[CellValue] {
        self.cell_contents
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableState {
    column_states: Vec<ColumnState>,
    column_indices: HashMap<TagDefinitionId, usize>,
    entities: Vec<Entity>,
    entity_indices: HashMap<EntityId, usize>,
    is_loading: bool,
    entities_loaded: bool,
    submissions_in_flight: usize,
    load_error: Option<String>,
    /// Bumped for every column scan; never reused, even across removal.
    last_load_generation: u64,
}

impl TableState {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn columns(&self) -> &[ColumnState] {
        &self.column_states
    }

    pub fn column(&self, id: &TagDefinitionId) -> Option<&ColumnState> {
        self.column_indices
            .get(id)
            .and_then(|&index| self.column_states.get(index))
    }

    pub fn column_index(&self, id: &TagDefinitionId) -> Option<usize> {
        self.column_indices.get(id).copied()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entity_indices
            .get(id)
            .and_then(|&index| self.entities.get(index))
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn entities_loaded(&self) -> bool {
        self.entities_loaded
    }

    pub fn is_submitting_values(&self) -> bool {
        self.submissions_in_flight > 0
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Both index maps mirror their vectors exactly.
    pub fn indices_consistent(&self) -> bool {
        self.column_indices.len() == self.column_states.len()
            && self
                .column_states
                .iter()
                .enumerate()
                .all(|(i, column)| self.column_indices.get(column.id()) == Some(&i))
            && self.entity_indices.len() == self.entities.len()
            && self
                .entities
                .iter()
                .enumerate()
                .all(|(i, entity)| self.entity_indices.get(&entity.id_persistent) == Some(&i))
    }

    // ------------------------------------------------------------------
    // Entity load
    // ------------------------------------------------------------------

    /// Mark the entity load as started. False when already loading or loaded.
    pub(crate) fn begin_entity_load(&mut self) -> bool {
        if self.is_loading || self.entities_loaded {
            return false;
        }
        self.is_loading = true;
        self.load_error = None;
        true
    }

    pub(crate) fn fail_entity_load(&mut self, message: String) {
        self.is_loading = false;
        self.load_error = Some(message);
    }

    pub(crate) fn mark_entities_stale(&mut self) {
        self.entities_loaded = false;
    }

    /// Publish the entity list and derive the display text column from it.
    pub(crate) fn set_entities(&mut self, entities: Vec<Entity>) {
        self.entity_indices = entities
            .iter()
            .enumerate()
            .map(|(i, entity)| (entity.id_persistent.clone(), i))
            .collect();
        let cells = entities
            .iter()
            .map(|entity| (entity.id_persistent.clone(), vec![display_txt_cell(entity)]))
            .collect();
        self.entities = entities;
        self.is_loading = false;
        self.entities_loaded = true;
        self.load_error = None;

        let display_id = TagDefinitionId::new(DISPLAY_TXT_COLUMN_ID);
        match self.column_indices.get(&display_id).copied() {
            Some(index) => {
                let column = &mut self.column_states[index];
                column.cell_contents = cells;
                column.is_loading = false;
                column.load_error = None;
            }
            None => {
                let mut column = ColumnState::loading(display_txt_definition(), 0);
                column.cell_contents = cells;
                column.is_loading = false;
                self.column_states.insert(0, column);
                self.reindex_columns();
            }
        }
    }

    /// Insert or replace one entity, keeping the display column in step.
    pub(crate) fn upsert_entity(&mut self, entity: Entity) {
        let id = entity.id_persistent.clone();
        let cell = display_txt_cell(&entity);
        match self.entity_indices.get(&id).copied() {
            Some(index) => self.entities[index] = entity,
            None => {
                self.entity_indices.insert(id.clone(), self.entities.len());
                self.entities.push(entity);
            }
        }
        if let Some(index) = self.column_index(&TagDefinitionId::new(DISPLAY_TXT_COLUMN_ID)) {
            self.column_states[index].cell_contents.insert(id, vec![cell]);
        }
    }

    // ------------------------------------------------------------------
    // Column load
    // ------------------------------------------------------------------

    /// Put the column into the loading state, inserting it at the end when
    /// new. Returns the generation the scan must commit with, or `None` when
    /// the column is already loading, or already loaded and `force` is not set.
    pub(crate) fn begin_column_load(
        &mut self,
        tag_definition: &TagDefinition,
        force: bool,
    ) -> Option<u64> {
        let generation = self.last_load_generation + 1;
        match self.column_index(&tag_definition.id_persistent) {
            Some(index) => {
                let column = &mut self.column_states[index];
                if column.is_loading || (column.is_loaded() && !force) {
                    return None;
                }
                column.is_loading = true;
                column.load_error = None;
                column.tag_definition = tag_definition.clone();
                column.load_generation = generation;
                column.edits_during_load.clear();
            }
            None => {
                self.column_indices
                    .insert(tag_definition.id_persistent.clone(), self.column_states.len());
                self.column_states
                    .push(ColumnState::loading(tag_definition.clone(), generation));
            }
        }
        self.last_load_generation = generation;
        Some(generation)
    }

    /// Commit a finished scan. False when the scan was superseded: the column
    /// is gone, or was removed and added again under a newer scan.
    pub(crate) fn finish_column_load(
        &mut self,
        id: &TagDefinitionId,
        generation: u64,
        cells: HashMap<EntityId, Vec<CellValue>>,
    ) -> bool {
        let Some(index) = self.column_index(id) else {
            return false;
        };
        let column = &mut self.column_states[index];
        if !column.accepts(generation) {
            return false;
        }
        let edits = std::mem::take(&mut column.edits_during_load);
        column.cell_contents = apply_edits(cells, edits);
        column.is_loading = false;
        column.load_error = None;
        true
    }

    /// Record a failed scan. Ignored for superseded scans, like
    /// [`finish_column_load`](Self::finish_column_load).
    pub(crate) fn fail_column_load(
        &mut self,
        id: &TagDefinitionId,
        generation: u64,
        message: String,
    ) -> bool {
        let Some(index) = self.column_index(id) else {
            return false;
        };
        let column = &mut self.column_states[index];
        if !column.accepts(generation) {
            return false;
        }
        column.is_loading = false;
        column.load_error = Some(message);
        column.edits_during_load.clear();
        true
    }

    // ------------------------------------------------------------------
    // Cells
    // ------------------------------------------------------------------

    /// Store `cell` for (entity, column), replacing the value it supersedes.
    ///
    /// The superseded value is found by `replaced` (the id the edit was
    /// made against) or by the cell's own id; otherwise the cell is added.
    pub(crate) fn put_cell(
        &mut self,
        entity: &EntityId,
        column: &TagDefinitionId,
        replaced: Option<&TagInstanceId>,
        cell: CellValue,
    ) -> bool {
        let Some(index) = self.column_index(column) else {
            return false;
        };
        let column = &mut self.column_states[index];
        if column.is_loading {
            column.edits_during_load.push(LoadEdit {
                entity: entity.clone(),
                replaced: replaced.cloned(),
                cell: cell.clone(),
            });
        }
        let values = column.cell_contents.entry(entity.clone()).or_default();
        let position = values.iter().position(|existing| {
            Some(&existing.id_persistent) == replaced || existing.id_persistent == cell.id_persistent
        });
        match position {
            Some(position) => values[position] = cell,
            None => values.push(cell),
        }
        true
    }

    pub(crate) fn begin_submission(&mut self) {
        self.submissions_in_flight += 1;
    }

    pub(crate) fn end_submission(&mut self) {
        self.submissions_in_flight = self.submissions_in_flight.saturating_sub(1);
    }

    // ------------------------------------------------------------------
    // Column layout
    // ------------------------------------------------------------------

    /// Remove a column. Removing an unknown column is a no-op.
    pub fn remove_column(&mut self, id: &TagDefinitionId) -> bool {
        let Some(index) = self.column_indices.remove(id) else {
            return false;
        };
        self.column_states.remove(index);
        self.reindex_columns();
        true
    }

    /// Move the column at `from` so that it ends up at `to`.
    pub fn move_column(&mut self, from: usize, to: usize) -> bool {
        let len = self.column_states.len();
        if from >= len || to >= len {
            return false;
        }
        if from != to {
            let column = self.column_states.remove(from);
            self.column_states.insert(to, column);
            self.reindex_columns();
        }
        true
    }

    pub fn set_column_width(&mut self, id: &TagDefinitionId, width: u32) -> bool {
        match self.column_index(id) {
            Some(index) => {
                self.column_states[index].width = width;
                true
            }
            None => false,
        }
    }

    fn reindex_columns(&mut self) {
        self.column_indices = self
            .column_states
            .iter()
            .enumerate()
            .map(|(i, column)| (column.id().clone(), i))
            .collect();
    }
}
