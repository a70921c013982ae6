use std::sync::Arc;
use tagsync_core::{
    MergeRejectionKind, MergeRequestId, MergeStep, MessageRule, NotificationLog, StoreError,
    SyncConfig, SyncError, DEFAULT_RELOAD_HINT,
};
use tagsync_engine::MergeEngine;
use tagsync_test_utils::assertions::{assert_conflict, assert_reload_required};
use tagsync_test_utils::fixtures::conflicts_reply;
use tagsync_test_utils::{MockTagStore, Request, StoreOp};

const MR: &str = "mr-1";

fn engine_with(store: MockTagStore, config: SyncConfig) -> (Arc<MockTagStore>, Arc<NotificationLog>, MergeEngine) {
    let store = Arc::new(store);
    let log = Arc::new(NotificationLog::new());
    let engine = MergeEngine::new(store.clone(), config, log.clone());
    (store, log, engine)
}

async fn loaded(count: usize) -> (Arc<MockTagStore>, Arc<NotificationLog>, MergeEngine) {
    loaded_with(count, SyncConfig::default()).await
}

async fn loaded_with(count: usize, config: SyncConfig) -> (Arc<MockTagStore>, Arc<NotificationLog>, MergeEngine) {
    let (store, log, engine) = engine_with(MockTagStore::new().with_merge(conflicts_reply(MR, count)), config);
    engine.load_conflicts(&MergeRequestId::new(MR)).await.unwrap();
    (store, log, engine)
}

#[tokio::test]
async fn load_conflicts_publishes_list_and_request() {
    let (_, _, engine) = loaded(4).await;
    let state = engine.snapshot().await;
    assert_eq!(state.conflicts.len(), 4);
    assert!(state.updated.is_empty());
    assert_eq!(state.merge_request.unwrap().id_persistent.as_str(), MR);
    assert_eq!(engine.resolved_count().await, 0);
    assert!(!state.is_loading);
}

#[tokio::test]
async fn unknown_merge_request_fails_inline() {
    let (_, _, engine) = engine_with(MockTagStore::new(), SyncConfig::default());
    let err = engine
        .load_conflicts(&MergeRequestId::new("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::NotFound { .. })));
    let state = engine.snapshot().await;
    assert!(state.load_error.is_some());
    assert!(state.merge_request.is_none());
}

#[tokio::test]
async fn matching_versions_record_the_decision() {
    let (store, log, engine) = loaded(2).await;

    engine.resolve_at(0, true).await.unwrap();

    let state = engine.snapshot().await;
    assert_eq!(state.conflicts[0].replace, Some(true));
    assert_eq!(state.conflicts[1].replace, None);
    assert_eq!(state.resolved_count(), 1);
    assert!(log.errors().is_empty());

    let resolution = store
        .requests()
        .into_iter()
        .find_map(|request| match request {
            Request::ResolveConflict(_, resolution) => Some(resolution),
            _ => None,
        })
        .unwrap();
    assert_eq!(resolution.id_entity_version, 1);
    assert_eq!(resolution.id_tag_definition_origin_version, 1);
    assert_eq!(resolution.id_tag_instance_origin_version, 10);
    assert_eq!(resolution.id_tag_definition_destination_version, 1);
    assert_eq!(resolution.id_tag_instance_destination_version, Some(20));
    assert!(resolution.replace);
}

#[tokio::test]
async fn missing_destination_value_resolves() {
    let (_, _, engine) = loaded(2).await;
    engine.resolve_at(1, false).await.unwrap();
    let state = engine.snapshot().await;
    assert!(state.conflicts[1].tag_instance_destination.is_none());
    assert_eq!(state.conflicts[1].replace, Some(false));
}

#[tokio::test]
async fn changed_entity_version_rejects_resolution() {
    let (store, log, engine) = loaded(2).await;
    store.update_merge(&MergeRequestId::new(MR), |reply| {
        reply.conflicts[0].entity.version = 2;
    });

    let result = engine.resolve_at(0, true).await;

    match result {
        Err(SyncError::ResolveFailed { entity, message }) => {
            assert_eq!(entity, "Entity entity-0");
            assert!(message.ends_with(DEFAULT_RELOAD_HINT));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(engine.snapshot().await.conflicts[0].replace, None);
    assert_eq!(engine.resolved_count().await, 0);
    assert_eq!(log.errors().len(), 1);
}

#[tokio::test]
async fn changed_tag_definition_version_rejects_resolution() {
    let (store, _, engine) = loaded(1).await;
    store.update_merge(&MergeRequestId::new(MR), |reply| {
        reply.merge_request.destination_tag_definition.version += 1;
    });
    assert!(engine.resolve_at(0, false).await.is_err());
    assert_eq!(engine.resolved_count().await, 0);
}

#[tokio::test]
async fn resolve_needs_loaded_conflicts() {
    let (_, _, engine) = engine_with(MockTagStore::new(), SyncConfig::default());
    assert!(matches!(
        engine.resolve_at(0, true).await,
        Err(SyncError::NotLoaded { .. })
    ));
}

#[tokio::test]
async fn merge_with_open_conflicts_is_a_plain_failure_by_default() {
    let (_, log, engine) = loaded(2).await;
    let result = engine.start_merge(&MergeRequestId::new(MR)).await;
    assert_eq!(
        result.unwrap_err(),
        SyncError::Failed {
            message: "Merge request has unresolved conflicts".to_string()
        }
    );
    assert_eq!(log.errors().len(), 1);
}

#[tokio::test]
async fn configured_message_asks_for_reload() {
    let config = SyncConfig {
        merge_messages: vec![MessageRule {
            pattern: "unresolved conflicts".to_string(),
            kind: MergeRejectionKind::UnresolvedConflicts,
        }],
        ..SyncConfig::default()
    };
    let (_, log, engine) = loaded_with(2, config).await;

    let result = engine.start_merge(&MergeRequestId::new(MR)).await;

    assert_reload_required(&result);
    assert_eq!(
        log.errors(),
        vec![format!("Merge request has unresolved conflicts {}", DEFAULT_RELOAD_HINT)]
    );
    assert!(!engine.snapshot().await.is_merging);
}

#[tokio::test]
async fn stale_merge_asks_for_reload() {
    let (store, _, engine) = loaded(1).await;
    engine.resolve_at(0, true).await.unwrap();
    store.mark_merge_stale(MergeRequestId::new(MR));

    let result = engine.start_merge(&MergeRequestId::new(MR)).await;

    assert_reload_required(&result);
    assert!(result.unwrap_err().to_string().ends_with(DEFAULT_RELOAD_HINT));
}

#[tokio::test]
async fn fully_resolved_merge_starts() {
    let (store, log, engine) = loaded(3).await;
    for index in 0..3 {
        engine.resolve_at(index, index % 2 == 0).await.unwrap();
    }
    assert!(engine.snapshot().await.is_fully_resolved());

    engine.start_merge(&MergeRequestId::new(MR)).await.unwrap();

    assert_eq!(log.successes().len(), 1);
    let stored = store.stored_merge(&MergeRequestId::new(MR)).unwrap();
    assert_eq!(stored.merge_request.step, MergeStep::Merged);
}

#[tokio::test]
async fn forbidden_merge_names_the_request() {
    let (store, _, engine) = loaded(0).await;
    store.forbid_next(StoreOp::StartMerge, "Only the assignee may merge");
    let result = engine.start_merge(&MergeRequestId::new(MR)).await;
    assert!(matches!(
        result,
        Err(SyncError::Forbidden { ref subject, .. }) if subject == "merge request mr-1"
    ));
}

#[tokio::test]
async fn disable_origin_toggle_round_trips() {
    let (_, _, engine) = loaded(0).await;
    assert!(engine.toggle_disable_origin_on_merge().await.unwrap());
    let first = engine.snapshot().await.merge_request.unwrap();
    assert!(first.disable_origin_on_merge);
    assert!(first.version > 1);

    assert!(!engine.toggle_disable_origin_on_merge().await.unwrap());
}

#[tokio::test]
async fn stale_toggle_applies_server_request() {
    let (store, log, engine) = loaded(0).await;
    store.update_merge(&MergeRequestId::new(MR), |reply| {
        reply.merge_request.disable_origin_on_merge = true;
        reply.merge_request.version = 9;
    });

    let result = engine.toggle_disable_origin_on_merge().await;

    assert_conflict(&result);
    let local = engine.snapshot().await.merge_request.unwrap();
    assert!(local.disable_origin_on_merge);
    assert_eq!(local.version, 9);
    assert_eq!(log.errors().len(), 1);
}
