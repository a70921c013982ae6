use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tagsync_core::{
    ColumnType, EntityId, MergeRequestId, NotificationLog, SyncConfig, TagDefinitionId,
    TagInstanceId,
};
use tagsync_engine::{collect_cells, HierarchyLoader, MergeEngine, TableEngine};
use tagsync_test_utils::fixtures::{child_definition, conflicts_reply, tag_definition};
use tagsync_test_utils::generators::{arb_column_records, arb_decisions};
use tagsync_test_utils::MockTagStore;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

#[derive(Debug, Clone)]
enum LayoutOp {
    Load(usize),
    Remove(usize),
    Move(usize, usize),
    Width(usize, u32),
}

fn arb_layout_op() -> impl Strategy<Value = LayoutOp> {
    prop_oneof![
        (0usize..5).prop_map(LayoutOp::Load),
        (0usize..6).prop_map(LayoutOp::Remove),
        (0usize..6, 0usize..6).prop_map(|(from, to)| LayoutOp::Move(from, to)),
        (0usize..5, 50u32..400).prop_map(|(column, width)| LayoutOp::Width(column, width)),
    ]
}

proptest! {
    /// Duplicates of one instance collapse to the highest version; distinct
    /// instances of one entity stay side by side.
    #[test]
    fn column_cells_keep_latest_version_per_instance(
        records in arb_column_records(TagDefinitionId::new("t"))
    ) {
        let mut latest: HashMap<(EntityId, TagInstanceId), i64> = HashMap::new();
        for record in &records {
            let key = (record.id_entity_persistent.clone(), record.id_persistent.clone());
            let version = latest.entry(key).or_insert(record.version);
            *version = (*version).max(record.version);
        }

        let cells = collect_cells(records);

        let total: usize = cells.values().map(Vec::len).sum();
        prop_assert_eq!(total, latest.len());
        for (entity, values) in &cells {
            let ids: HashSet<_> = values.iter().map(|cell| cell.id_persistent.clone()).collect();
            prop_assert_eq!(ids.len(), values.len());
            for cell in values {
                let expected = latest[&(entity.clone(), cell.id_persistent.clone())];
                prop_assert_eq!(cell.version, expected);
            }
        }
    }

    #[test]
    fn resolved_count_moves_by_at_most_one(
        decisions in arb_decisions(8),
        index in 0usize..8,
        replace in any::<bool>(),
        stale in any::<bool>(),
    ) {
        let mut reply = conflicts_reply("mr", decisions.len());
        for (conflict, decision) in reply.conflicts.iter_mut().zip(&decisions) {
            conflict.replace = *decision;
        }
        let expected = decisions.iter().filter(|decision| decision.is_some()).count();

        let (before, after, state_count) = block_on(async {
            let store = Arc::new(MockTagStore::new().with_merge(reply));
            let engine = MergeEngine::new(store.clone(), SyncConfig::default(), Arc::new(NotificationLog::new()));
            engine.load_conflicts(&MergeRequestId::new("mr")).await.unwrap();
            let before = engine.resolved_count().await;
            if stale {
                store.update_merge(&MergeRequestId::new("mr"), |reply| {
                    reply.merge_request.origin_tag_definition.version += 1;
                });
            }
            let _ = engine.resolve_at(index, replace).await;
            let snapshot = engine.snapshot().await;
            let counted = snapshot.conflicts.iter().filter(|c| c.replace.is_some()).count();
            (before, snapshot.resolved_count(), counted)
        });

        prop_assert_eq!(before, expected);
        prop_assert_eq!(after, state_count);
        prop_assert!(after == before || after == before + 1);
        if stale || index >= decisions.len() {
            prop_assert_eq!(after, before);
        }
    }

    #[test]
    fn column_layout_keeps_index_maps_in_step(ops in prop::collection::vec(arb_layout_op(), 1..30)) {
        let definitions: Vec<_> = (0..5)
            .map(|i| tag_definition(&format!("c{}", i), &[format!("C{}", i).as_str()], ColumnType::String))
            .collect();

        let consistent = block_on(async {
            let engine = TableEngine::new(
                Arc::new(MockTagStore::new()),
                SyncConfig::default(),
                Arc::new(NotificationLog::new()),
            );
            for op in ops {
                match op {
                    LayoutOp::Load(column) => {
                        engine.load_column(&definitions[column]).await.unwrap();
                    }
                    LayoutOp::Remove(column) => {
                        let id = definitions
                            .get(column)
                            .map(|def| def.id_persistent.clone())
                            .unwrap_or_else(|| TagDefinitionId::new("missing"));
                        engine.remove_column(&id).await;
                    }
                    LayoutOp::Move(from, to) => {
                        engine.move_column(from, to).await;
                    }
                    LayoutOp::Width(column, width) => {
                        engine.set_column_width(&definitions[column].id_persistent, width).await;
                    }
                }
                let state = engine.snapshot().await;
                let unique: HashSet<_> = state.columns().iter().map(|c| c.id().clone()).collect();
                if !state.indices_consistent() || unique.len() != state.columns().len() {
                    return false;
                }
            }
            true
        });
        prop_assert!(consistent);
    }

    /// Re-expanding one second-level node changes nothing outside it.
    #[test]
    fn expanding_a_node_leaves_the_rest_of_the_forest_alone(
        shape in prop::collection::vec(1usize..4, 1..4),
        pick in any::<prop::sample::Index>(),
        replacement in 0usize..4,
    ) {
        let mut store = MockTagStore::new();
        let mut roots = Vec::new();
        let mut second_level = Vec::new();
        for (r, width) in shape.iter().enumerate() {
            let root = tag_definition(&format!("r{}", r), &[format!("R{}", r).as_str()], ColumnType::String);
            let children: Vec<_> = (0..*width)
                .map(|c| child_definition(&root, &format!("r{}c{}", r, c), &format!("C{}", c)))
                .collect();
            for (c, child) in children.iter().enumerate() {
                second_level.push((vec![r, c], child.clone()));
            }
            store = store.with_children(Some(root.id_persistent.clone()), children);
            roots.push(root);
        }
        store = store.with_children(None, roots);
        let (path, target) = second_level[pick.index(second_level.len())].clone();

        let (before, after) = block_on(async {
            let store = Arc::new(store);
            let loader = HierarchyLoader::new(store.clone(), Arc::new(NotificationLog::new()));
            loader.load_roots(false).await;
            let before = loader.snapshot().await;
            let fresh = (0..replacement)
                .map(|n| child_definition(&target, &format!("new{}", n), &format!("N{}", n)))
                .collect();
            store.set_children(Some(target.id_persistent.clone()), fresh);
            loader
                .expand(Some(target.id_persistent.clone()), path.clone(), target.name_path.clone(), false)
                .await;
            (before, loader.snapshot().await)
        });

        prop_assert_eq!(before.roots.len(), after.roots.len());
        for (r, (old_root, new_root)) in before.roots.iter().zip(&after.roots).enumerate() {
            if r != path[0] {
                prop_assert_eq!(old_root, new_root);
                continue;
            }
            prop_assert_eq!(&old_root.tag_definition, &new_root.tag_definition);
            let old_children = old_root.children.as_ref().unwrap();
            let new_children = new_root.children.as_ref().unwrap();
            for (c, (old_child, new_child)) in old_children.iter().zip(new_children).enumerate() {
                if c != path[1] {
                    prop_assert_eq!(old_child, new_child);
                }
            }
        }
        let expanded = after.node_at(&path).unwrap();
        prop_assert_eq!(expanded.children.as_ref().map(Vec::len), Some(replacement));
    }
}
