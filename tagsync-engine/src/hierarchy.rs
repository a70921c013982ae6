//! Hierarchy tree loader for the column selection menu.
//!
//! The forest is addressed by index paths from the roots. Expansion fans out
//! over siblings and only returns once the whole subtree has settled.

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use std::sync::Arc;
use tagsync_client::TagStore;
use tagsync_core::{
    ColumnType, Notifier, NewTagDefinition, SyncError, SyncResult, TagDefinition, TagDefinitionId,
    WriteOutcome,
};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    pub tag_definition: TagDefinition,
    pub is_expanded: bool,
    /// `None` until the children request for this node has answered.
    pub children: Option<Vec<HierarchyNode>>,
    pub load_error: Option<String>,
}

impl HierarchyNode {
    pub fn new(tag_definition: TagDefinition, is_expanded: bool) -> Self {
        Self {
            tag_definition,
            is_expanded,
            children: None,
            load_error: None,
        }
    }

    pub fn id(&self) -> &TagDefinitionId {
        &self.tag_definition.id_persistent
    }
}

/// The tree roots plus the error of a failed root request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyForest {
    pub roots: Vec<HierarchyNode>,
    pub load_error: Option<String>,
}

impl HierarchyForest {
    pub fn node_at(&self, path: &[usize]) -> Option<&HierarchyNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get(*first)?;
        for index in rest {
            node = node.children.as_ref()?.get(*index)?;
        }
        Some(node)
    }

    fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut HierarchyNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get_mut(*first)?;
        for index in rest {
            node = node.children.as_mut()?.get_mut(*index)?;
        }
        Some(node)
    }

    /// The node at `path` if it still holds `expected`. Paths go stale when
    /// the roots are reloaded while a subtree request is in flight.
    fn target_mut(
        &mut self,
        path: &[usize],
        expected: Option<&TagDefinitionId>,
    ) -> Option<&mut HierarchyNode> {
        let node = self.node_at_mut(path)?;
        (Some(node.id()) == expected).then_some(node)
    }

    /// Place freshly loaded children at `path`. An empty path replaces the
    /// roots. Returns false when the target is gone.
    fn publish(
        &mut self,
        path: &[usize],
        parent: Option<&TagDefinitionId>,
        nodes: Vec<HierarchyNode>,
    ) -> bool {
        if path.is_empty() {
            self.roots = nodes;
            self.load_error = None;
            return true;
        }
        match self.target_mut(path, parent) {
            Some(node) => {
                node.children = Some(nodes);
                node.load_error = None;
                true
            }
            None => false,
        }
    }

    fn record_error(&mut self, path: &[usize], parent: Option<&TagDefinitionId>, message: String) {
        if path.is_empty() {
            self.load_error = Some(message);
        } else if let Some(node) = self.target_mut(path, parent) {
            node.load_error = Some(message);
        }
    }
}

/// Prefix a child's name path with its parent's when the store only sent
/// the leaf name. A complete path is strictly longer than the parent's.
fn complete_name_path(definition: &mut TagDefinition, parent_names: &[String]) {
    let complete = definition.name_path.len() > parent_names.len()
        && definition.name_path.starts_with(parent_names);
    if parent_names.is_empty() || complete {
        return;
    }
    let mut full = parent_names.to_vec();
    full.push(definition.name().to_string());
    definition.name_path = full;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandFailure {
    pub path: Vec<usize>,
    pub message: String,
}

/// Summary of one expansion call over the whole subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandReport {
    /// Nodes published.
    pub loaded: usize,
    pub failures: Vec<ExpandFailure>,
}

impl ExpandReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, other: ExpandReport) {
        self.loaded += other.loaded;
        self.failures.extend(other.failures);
    }
}

pub struct HierarchyLoader {
    store: Arc<dyn TagStore>,
    notifier: Arc<dyn Notifier>,
    forest: RwLock<HierarchyForest>,
}

impl HierarchyLoader {
    pub fn new(store: Arc<dyn TagStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            forest: RwLock::new(HierarchyForest::default()),
        }
    }

    /// Drop the tree and load it again from the roots.
    pub async fn load_roots(&self, auto_expand: bool) -> ExpandReport {
        *self.forest.write().await = HierarchyForest::default();
        self.expand(None, Vec::new(), Vec::new(), auto_expand).await
    }

    /// Load the children of `parent` into `index_path`, then every deeper
    /// level below them.
    ///
    /// Each level is published as soon as it arrives. A failed request marks
    /// its own node and leaves siblings alone. Results for a path that no
    /// longer holds `parent` are dropped.
    pub fn expand(
        &self,
        parent: Option<TagDefinitionId>,
        index_path: Vec<usize>,
        name_path: Vec<String>,
        auto_expand: bool,
    ) -> BoxFuture<'_, ExpandReport> {
        async move {
            let fetched = match self.store.tag_children(parent.as_ref()).await {
                Ok(children) => children
                    .iter()
                    .try_for_each(TagDefinition::validate)
                    .map(|()| children)
                    .map_err(|err| err.to_string()),
                Err(err) => Err(err.user_message()),
            };
            let children = match fetched {
                Ok(children) => children,
                Err(message) => {
                    tracing::warn!(path = ?index_path, error = %message, "tag children request failed");
                    self.forest
                        .write()
                        .await
                        .record_error(&index_path, parent.as_ref(), message.clone());
                    return ExpandReport {
                        loaded: 0,
                        failures: vec![ExpandFailure {
                            path: index_path,
                            message,
                        }],
                    };
                }
            };

            let children: Vec<TagDefinition> = children
                .into_iter()
                .map(|mut definition| {
                    complete_name_path(&mut definition, &name_path);
                    definition
                })
                .collect();
            let nodes = children
                .iter()
                .map(|definition| HierarchyNode::new(definition.clone(), auto_expand))
                .collect();

            let published = self
                .forest
                .write()
                .await
                .publish(&index_path, parent.as_ref(), nodes);
            if !published {
                tracing::debug!(path = ?index_path, "hierarchy target gone, children dropped");
                return ExpandReport::default();
            }
            tracing::debug!(path = ?index_path, count = children.len(), "hierarchy level published");

            let mut report = ExpandReport {
                loaded: children.len(),
                failures: Vec::new(),
            };
            let expansions = children.into_iter().enumerate().map(|(index, child)| {
                let mut path = index_path.clone();
                path.push(index);
                let names = child.name_path;
                self.expand(Some(child.id_persistent), path, names, auto_expand)
            });
            for child in join_all(expansions).await {
                report.absorb(child);
            }
            report
        }
        .boxed()
    }

    /// Flip the expanded flag of a node. Returns the new value.
    pub async fn toggle_expanded(&self, path: &[usize]) -> Option<bool> {
        let mut forest = self.forest.write().await;
        let node = forest.node_at_mut(path)?;
        node.is_expanded = !node.is_expanded;
        Some(node.is_expanded)
    }

    pub async fn node_at(&self, path: &[usize]) -> Option<HierarchyNode> {
        self.forest.read().await.node_at(path).cloned()
    }

    pub async fn roots(&self) -> Vec<HierarchyNode> {
        self.forest.read().await.roots.clone()
    }

    pub async fn snapshot(&self) -> HierarchyForest {
        self.forest.read().await.clone()
    }

    pub async fn clear(&self) {
        *self.forest.write().await = HierarchyForest::default();
    }

    /// Create a tag definition below the node at `parent_path`, or as a new
    /// root. The result shows up under its parent if that level is loaded.
    pub async fn create_tag_definition(
        &self,
        name: &str,
        parent_path: Option<&[usize]>,
        column_type: ColumnType,
    ) -> SyncResult<TagDefinition> {
        let parent = match parent_path {
            Some(path) => {
                let parent = self
                    .node_at(path)
                    .await
                    .map(|node| node.tag_definition);
                match parent {
                    Some(parent) => Some(parent),
                    None => return Err(self.report(SyncError::NotLoaded { what: "parent tag definition" })),
                }
            }
            None => None,
        };
        let parent_names = parent
            .as_ref()
            .map(|parent| parent.name_path.clone())
            .unwrap_or_default();
        let mut display_names = parent_names.clone();
        display_names.push(name.to_string());
        let subject = display_names.join(tagsync_core::NAME_PATH_SEPARATOR);

        let request = NewTagDefinition {
            name: name.to_string(),
            id_parent_persistent: parent.as_ref().map(|parent| parent.id_persistent.clone()),
            column_type,
        };
        let mut created = match self.store.create_tag_definition(request).await {
            Ok(WriteOutcome::Ok(created)) => created,
            Ok(WriteOutcome::Conflict(_)) => {
                return Err(self.report(SyncError::Failed {
                    message: format!("Tag definition {} already exists", subject),
                }))
            }
            Ok(WriteOutcome::Forbidden(message)) => {
                return Err(self.report(SyncError::Forbidden { subject, message }))
            }
            Ok(WriteOutcome::Failed(message)) => {
                return Err(self.report(SyncError::Failed { message }))
            }
            Err(err) => {
                return Err(self.report(SyncError::Failed {
                    message: err.user_message(),
                }))
            }
        };
        complete_name_path(&mut created, &parent_names);

        let mut forest = self.forest.write().await;
        match (parent_path, parent.as_ref()) {
            (Some(path), Some(parent)) => {
                if let Some(children) = forest
                    .target_mut(path, Some(&parent.id_persistent))
                    .and_then(|node| node.children.as_mut())
                {
                    children.push(HierarchyNode::new(created.clone(), false));
                }
            }
            _ => forest.roots.push(HierarchyNode::new(created.clone(), false)),
        }
        drop(forest);

        tracing::info!(tag_definition = %created.id_persistent, "tag definition created");
        self.notifier
            .add_success_vanish(&format!("Created tag definition {}", created.display_path()));
        Ok(created)
    }

    fn report(&self, err: SyncError) -> SyncError {
        self.notifier.add_error(&err.to_string());
        err
    }
}

impl std::fmt::Debug for HierarchyLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyLoader").finish_non_exhaustive()
    }
}
