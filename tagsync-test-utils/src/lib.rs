//! tagsync Test Utilities
//!
//! Shared test infrastructure for the tagsync workspace:
//! - `MockTagStore`, an in-memory store with request log and failure injection
//! - Proptest generators for the record types
//! - Fixtures for common scenarios
//! - Assertions for engine results

pub mod mock_store;

pub use mock_store::{MockTagStore, Request, StoreOp};

pub use tagsync_client::{ConflictsReply, TagStore};
pub use tagsync_core::{
    CellValue, ColumnType, Entity, EntityId, MergeConflict, MergeRequest, MergeRequestId,
    MergeStep, NotificationLog, StoreError, SyncConfig, SyncError, SyncResult, TagDefinition,
    TagDefinitionId, TagInstanceId, TagInstanceRecord, TagValue, User, UserId, Version,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for tagsync records.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        "[a-z0-9]{1,12}".prop_map(EntityId::new)
    }

    pub fn arb_tag_definition_id() -> impl Strategy<Value = TagDefinitionId> {
        "[a-z0-9]{1,12}".prop_map(TagDefinitionId::new)
    }

    pub fn arb_column_type() -> impl Strategy<Value = ColumnType> {
        prop_oneof![
            Just(ColumnType::String),
            Just(ColumnType::Float),
            Just(ColumnType::Boolean),
        ]
    }

    /// A value that conforms to `column_type`.
    pub fn arb_tag_value(column_type: ColumnType) -> BoxedStrategy<TagValue> {
        match column_type {
            ColumnType::String => "[a-zA-Z0-9 ]{0,20}".prop_map(TagValue::String).boxed(),
            ColumnType::Float => (-1.0e6f64..1.0e6).prop_map(TagValue::Float).boxed(),
            ColumnType::Boolean => any::<bool>().prop_map(TagValue::Boolean).boxed(),
        }
    }

    pub fn arb_entity() -> impl Strategy<Value = Entity> {
        (arb_entity_id(), "[a-zA-Z ]{1,30}", 1i64..10_000, any::<bool>()).prop_map(
            |(id_persistent, display_txt, version, disabled)| Entity {
                id_persistent,
                display_txt,
                version,
                disabled,
            },
        )
    }

    /// Entities with distinct ids.
    pub fn arb_entities(max: usize) -> impl Strategy<Value = Vec<Entity>> {
        prop::collection::vec(arb_entity(), 0..max).prop_map(|entities| {
            let mut seen = std::collections::HashSet::new();
            entities
                .into_iter()
                .filter(|entity| seen.insert(entity.id_persistent.clone()))
                .collect()
        })
    }

    pub fn arb_tag_definition() -> impl Strategy<Value = TagDefinition> {
        (
            arb_tag_definition_id(),
            prop::collection::vec("[a-z]{1,8}", 1..4),
            arb_column_type(),
            any::<bool>(),
            1i64..1_000,
        )
            .prop_map(|(id_persistent, name_path, column_type, curated, version)| TagDefinition {
                id_persistent,
                name_path,
                id_parent_persistent: None,
                column_type,
                curated,
                owner: None,
                version,
                hidden: false,
            })
    }

    /// Records of one Float column drawn from a small pool of entities and
    /// instances, so duplicates and rewrites of the same instance are common.
    pub fn arb_column_records(
        tag_definition: TagDefinitionId,
    ) -> impl Strategy<Value = Vec<TagInstanceRecord>> {
        prop::collection::vec((0usize..8, 0usize..3, 1i64..500), 0..60).prop_map(move |raw| {
            raw.into_iter()
                .map(|(entity, instance, version)| TagInstanceRecord {
                    id_entity_persistent: EntityId::new(format!("e{}", entity)),
                    id_tag_definition_persistent: tag_definition.clone(),
                    id_persistent: TagInstanceId::new(format!("e{}-i{}", entity, instance)),
                    version,
                    value: TagValue::Float(version as f64),
                })
                .collect()
        })
    }

    /// Replace decisions for a conflict list, `None` being undecided.
    pub fn arb_decisions(max: usize) -> impl Strategy<Value = Vec<Option<bool>>> {
        prop::collection::vec(prop::option::of(any::<bool>()), 0..max)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common scenarios.

    use super::*;

    pub fn entity(id: &str, version: Version) -> Entity {
        Entity {
            id_persistent: EntityId::new(id),
            display_txt: format!("Entity {}", id),
            version,
            disabled: false,
        }
    }

    /// `count` entities with ids `entity-0..` and versions starting at 1.
    pub fn entities(count: usize) -> Vec<Entity> {
        (0..count)
            .map(|i| entity(&format!("entity-{}", i), i as Version + 1))
            .collect()
    }

    pub fn tag_definition(id: &str, name_path: &[&str], column_type: ColumnType) -> TagDefinition {
        TagDefinition {
            id_persistent: TagDefinitionId::new(id),
            name_path: name_path.iter().map(|name| name.to_string()).collect(),
            id_parent_persistent: None,
            column_type,
            curated: true,
            owner: Some("owner".to_string()),
            version: 1,
            hidden: false,
        }
    }

    /// A child definition linked to `parent`, named below it.
    pub fn child_definition(parent: &TagDefinition, id: &str, name: &str) -> TagDefinition {
        let mut name_path = parent.name_path.clone();
        name_path.push(name.to_string());
        TagDefinition {
            id_persistent: TagDefinitionId::new(id),
            name_path,
            id_parent_persistent: Some(parent.id_persistent.clone()),
            column_type: ColumnType::String,
            curated: false,
            owner: None,
            version: 1,
            hidden: false,
        }
    }

    pub fn record(
        entity: &str,
        tag_definition: &str,
        instance: &str,
        version: Version,
        value: TagValue,
    ) -> TagInstanceRecord {
        TagInstanceRecord {
            id_entity_persistent: EntityId::new(entity),
            id_tag_definition_persistent: TagDefinitionId::new(tag_definition),
            id_persistent: TagInstanceId::new(instance),
            version,
            value,
        }
    }

    pub fn cell(instance: &str, version: Version, value: TagValue) -> CellValue {
        CellValue {
            id_persistent: TagInstanceId::new(instance),
            version,
            value,
        }
    }

    pub fn user(name: &str) -> User {
        User {
            id_persistent: UserId::new(format!("user-{}", name)),
            user_name: name.to_string(),
        }
    }

    pub fn merge_request(id: &str, origin: TagDefinition, destination: TagDefinition) -> MergeRequest {
        MergeRequest {
            id_persistent: MergeRequestId::new(id),
            origin_tag_definition: origin,
            destination_tag_definition: destination,
            created_by: user("alice"),
            assigned_to: None,
            step: MergeStep::Conflicts,
            disable_origin_on_merge: false,
            version: 1,
        }
    }

    /// Conflict on `entity` with an origin value and an optional destination
    /// value.
    pub fn conflict(entity: Entity, origin: CellValue, destination: Option<CellValue>) -> MergeConflict {
        MergeConflict {
            entity,
            tag_instance_origin: origin,
            tag_instance_destination: destination,
            replace: None,
        }
    }

    /// A merge request with `count` unresolved conflicts, every other one
    /// without a destination value.
    pub fn conflicts_reply(id: &str, count: usize) -> ConflictsReply {
        let origin = tag_definition("origin", &["origin"], ColumnType::String);
        let destination = tag_definition("destination", &["destination"], ColumnType::String);
        let conflicts = (0..count)
            .map(|i| {
                let destination_cell = (i % 2 == 0).then(|| {
                    cell(&format!("dest-{}", i), 20 + i as Version, TagValue::String(format!("d{}", i)))
                });
                conflict(
                    entity(&format!("entity-{}", i), 1),
                    cell(&format!("origin-{}", i), 10 + i as Version, TagValue::String(format!("o{}", i))),
                    destination_cell,
                )
            })
            .collect();
        ConflictsReply {
            updated: Vec::new(),
            conflicts,
            merge_request: merge_request(id, origin, destination),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for engine results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &SyncResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert a version conflict, the kind that refreshes local state.
    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &SyncResult<T>) {
        match result {
            Err(err) if err.is_conflict() => {}
            other => panic!("Expected Conflict error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_forbidden<T: std::fmt::Debug>(result: &SyncResult<T>, subject: &str) {
        match result {
            Err(SyncError::Forbidden { subject: s, .. }) => {
                assert_eq!(s, subject, "Wrong subject in Forbidden error");
            }
            other => panic!("Expected Forbidden error for {}, got: {:?}", subject, other),
        }
    }

    #[track_caller]
    pub fn assert_reload_required<T: std::fmt::Debug>(result: &SyncResult<T>) {
        match result {
            Err(err) if err.reload_required() => {}
            other => panic!("Expected a rejection asking for reload, got: {:?}", other),
        }
    }
}
