//! Command execution against a store. Output is one JSON document per line.

use crate::command::Command;
use crate::error::CliError;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tagsync_client::TagStore;
use tagsync_core::{
    Notifier, SyncConfig, TagDefinition, TagDefinitionId, TagInstanceDraft, TagValue,
};
use tagsync_engine::{
    display_txt_definition, is_display_txt_column, HierarchyForest, HierarchyLoader,
    HierarchyNode, MergeEngine, TableEngine,
};

pub struct Runner {
    store: Arc<dyn TagStore>,
    config: SyncConfig,
    notifier: Arc<dyn Notifier>,
}

impl Runner {
    pub fn new(store: Arc<dyn TagStore>, config: SyncConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            config,
            notifier,
        }
    }

    fn table(&self) -> TableEngine {
        TableEngine::new(self.store.clone(), self.config.clone(), self.notifier.clone())
    }

    fn hierarchy(&self) -> HierarchyLoader {
        HierarchyLoader::new(self.store.clone(), self.notifier.clone())
    }

    fn merge(&self) -> MergeEngine {
        MergeEngine::new(self.store.clone(), self.config.clone(), self.notifier.clone())
    }

    pub async fn run<W: Write>(&self, command: Command, out: &mut W) -> Result<(), CliError> {
        tracing::debug!(?command, "Running command");
        match command {
            Command::Entities => {
                let table = self.table();
                table.load_all().await?;
                for entity in table.snapshot().await.entities() {
                    writeln!(out, "{}", serde_json::to_string(entity)?)?;
                }
            }
            Command::Tree { expand } => {
                let loader = self.hierarchy();
                let report = loader.load_roots(expand).await;
                for failure in &report.failures {
                    tracing::warn!(path = ?failure.path, "{}", failure.message);
                }
                let forest = loader.snapshot().await;
                if let Some(error) = &forest.load_error {
                    return Err(CliError::Hierarchy(error.clone()));
                }
                for root in &forest.roots {
                    write_node(out, root, 0)?;
                }
            }
            Command::Column { tag_definition } => {
                let definition = self.find_definition(&tag_definition).await?;
                let table = self.table();
                table.load_all().await?;
                table.load_column(&definition).await?;
                let state = table.snapshot().await;
                if let Some(column) = state.column(&definition.id_persistent) {
                    for entity in state.entities() {
                        let cells = column.cells(&entity.id_persistent);
                        if cells.is_empty() {
                            continue;
                        }
                        let line = json!({
                            "entity": entity.id_persistent,
                            "display_txt": entity.display_txt,
                            "values": cells,
                        });
                        writeln!(out, "{}", line)?;
                    }
                }
            }
            Command::CreateEntity { display_txt } => {
                let entity = self.table().create_entity(&display_txt).await?;
                writeln!(out, "{}", serde_json::to_string(&entity)?)?;
            }
            Command::Edit {
                entity,
                tag_definition,
                value,
            } => {
                let definition = if is_display_txt_column(&tag_definition) {
                    display_txt_definition()
                } else {
                    self.find_definition(&tag_definition).await?
                };
                let table = self.table();
                table.load_all().await?;
                table.load_column(&definition).await?;
                let value = TagValue::parse(definition.column_type, &value)
                    .map_err(tagsync_core::SyncError::from)?;
                let existing = table
                    .snapshot()
                    .await
                    .column(&definition.id_persistent)
                    .and_then(|column| column.cells(&entity).first().cloned());
                let draft = match existing {
                    Some(cell) => TagInstanceDraft::replacing(cell.id_persistent, cell.version, value),
                    None => TagInstanceDraft::new_value(value),
                };
                let cell = table
                    .submit_edit(&entity, &definition.id_persistent, draft)
                    .await?;
                writeln!(out, "{}", serde_json::to_string(&cell)?)?;
            }
            Command::CreateTag {
                name,
                column_type,
                parent,
            } => {
                let loader = self.hierarchy();
                loader.load_roots(false).await;
                let parent_path = match &parent {
                    Some(id) => Some(
                        path_of(&loader.snapshot().await, id)
                            .ok_or_else(|| CliError::UnknownTagDefinition(id.to_string()))?,
                    ),
                    None => None,
                };
                let created = loader
                    .create_tag_definition(&name, parent_path.as_deref(), column_type.into())
                    .await?;
                writeln!(out, "{}", serde_json::to_string(&created)?)?;
            }
            Command::Conflicts { merge_request } => {
                let engine = self.merge();
                engine.load_conflicts(&merge_request).await?;
                let state = engine.snapshot().await;
                let summary = json!({
                    "merge_request": state.merge_request,
                    "resolved": state.resolved_count(),
                    "total": state.conflicts.len(),
                });
                writeln!(out, "{}", summary)?;
                for (index, conflict) in state.conflicts.iter().enumerate() {
                    let line = json!({ "index": index, "conflict": conflict });
                    writeln!(out, "{}", line)?;
                }
            }
            Command::Resolve {
                merge_request,
                index,
                decision,
            } => {
                let engine = self.merge();
                engine.load_conflicts(&merge_request).await?;
                engine.resolve_at(index, decision.replace()).await?;
                let state = engine.snapshot().await;
                let line = json!({
                    "resolved": state.resolved_count(),
                    "total": state.conflicts.len(),
                });
                writeln!(out, "{}", line)?;
            }
            Command::Merge { merge_request } => {
                let engine = self.merge();
                engine.load_conflicts(&merge_request).await?;
                engine.start_merge(&merge_request).await?;
                writeln!(out, "{}", json!({ "merge_request": merge_request, "started": true }))?;
            }
            Command::ToggleDisableOrigin { merge_request } => {
                let engine = self.merge();
                engine.load_conflicts(&merge_request).await?;
                let disabled = engine.toggle_disable_origin_on_merge().await?;
                let line = json!({
                    "merge_request": merge_request,
                    "disable_origin_on_merge": disabled,
                });
                writeln!(out, "{}", line)?;
            }
        }
        Ok(())
    }

    async fn find_definition(&self, id: &TagDefinitionId) -> Result<TagDefinition, CliError> {
        let loader = self.hierarchy();
        loader.load_roots(false).await;
        let forest = loader.snapshot().await;
        path_of(&forest, id)
            .and_then(|path| forest.node_at(&path).map(|node| node.tag_definition.clone()))
            .ok_or_else(|| CliError::UnknownTagDefinition(id.to_string()))
    }
}

fn path_of(forest: &HierarchyForest, id: &TagDefinitionId) -> Option<Vec<usize>> {
    fn walk(nodes: &[HierarchyNode], id: &TagDefinitionId, path: &mut Vec<usize>) -> bool {
        for (index, node) in nodes.iter().enumerate() {
            path.push(index);
            if node.id() == id {
                return true;
            }
            if let Some(children) = &node.children {
                if walk(children, id, path) {
                    return true;
                }
            }
            path.pop();
        }
        false
    }

    let mut path = Vec::new();
    walk(&forest.roots, id, &mut path).then_some(path)
}

fn write_node<W: Write>(out: &mut W, node: &HierarchyNode, depth: usize) -> Result<(), CliError> {
    let definition = &node.tag_definition;
    let line = json!({
        "depth": depth,
        "id": definition.id_persistent,
        "name_path": definition.name_path,
        "type": definition.column_type,
        "error": node.load_error,
    });
    writeln!(out, "{}", line)?;
    for child in node.children.iter().flatten() {
        write_node(out, child, depth + 1)?;
    }
    Ok(())
}
