use std::sync::Arc;
use tagsync_cli::run::Runner;
use clap::Parser;
use tagsync_cli::{Cli, CliError};
use tagsync_core::{ColumnType, NotificationLog, SyncConfig, TagDefinitionId, TagValue};
use tagsync_test_utils::fixtures::{child_definition, conflicts_reply, entities, record, tag_definition};
use tagsync_test_utils::MockTagStore;

fn store() -> MockTagStore {
    let people = tag_definition("people", &["People"], ColumnType::String);
    let mut age = child_definition(&people, "age", "Age");
    age.column_type = ColumnType::Float;
    MockTagStore::new()
        .with_entities(entities(3))
        .with_children(None, vec![people.clone()])
        .with_children(Some(people.id_persistent.clone()), vec![age])
        .with_children(Some(TagDefinitionId::new("age")), Vec::new())
        .with_tag_instances(
            TagDefinitionId::new("age"),
            vec![record("entity-0", "age", "age-0", 5, TagValue::Float(30.0))],
        )
        .with_merge(conflicts_reply("mr-1", 2))
}

async fn run(store: Arc<MockTagStore>, line: &str) -> Result<Vec<String>, CliError> {
    let runner = Runner::new(store, SyncConfig::default(), Arc::new(NotificationLog::new()));
    let cli = Cli::try_parse_from(std::iter::once("tagsync").chain(line.split_whitespace())).unwrap();
    let mut out = Vec::new();
    runner.run(cli.command, &mut out).await?;
    let text = String::from_utf8(out).unwrap();
    Ok(text.lines().map(str::to_string).collect())
}

#[tokio::test]
async fn entities_prints_one_line_each() {
    let lines = run(Arc::new(store()), "entities").await.unwrap();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("Entity entity-0"));
}

#[tokio::test]
async fn column_lists_only_filled_cells() {
    let lines = run(Arc::new(store()), "column age").await.unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("entity-0"));
    assert!(lines[0].contains("age-0"));
}

#[tokio::test]
async fn unknown_column_is_reported() {
    let result = run(Arc::new(store()), "column height").await;
    assert!(matches!(result, Err(CliError::UnknownTagDefinition(id)) if id == "height"));
}

#[tokio::test]
async fn edit_replaces_the_existing_cell() {
    let store = Arc::new(store());
    run(store.clone(), "edit entity-0 age 31").await.unwrap();

    let stored = store.stored_tag_instances(&TagDefinitionId::new("age"));
    let cell = stored
        .iter()
        .find(|record| record.id_persistent.as_str() == "age-0")
        .unwrap();
    assert_eq!(cell.value, TagValue::Float(31.0));
    assert!(cell.version > 5);
}

#[tokio::test]
async fn edit_rejects_values_of_the_wrong_type() {
    let result = run(Arc::new(store()), "edit entity-1 age old").await;
    assert!(matches!(result, Err(CliError::Sync(_))));
}

#[tokio::test]
async fn create_tag_resolves_the_parent_path() {
    let lines = run(Arc::new(store()), "create-tag Height float --parent people")
        .await
        .unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("\"People\",\"Height\""));
}

#[tokio::test]
async fn tree_prints_depths() {
    let lines = run(Arc::new(store()), "tree").await.unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"depth\":0"));
    assert!(lines[1].contains("\"depth\":1"));
}

#[tokio::test]
async fn resolve_then_merge() {
    let store = Arc::new(store());
    let lines = run(store.clone(), "conflicts mr-1").await.unwrap();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("\"total\":2"));

    for index in 0..2 {
        run(store.clone(), &format!("resolve mr-1 {} replace", index))
            .await
            .unwrap();
    }
    let lines = run(store.clone(), "merge mr-1").await.unwrap();
    assert!(lines[0].contains("\"started\":true"));
}
