//! Command line definition.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tagsync_client::config::CONFIG_ENV_VAR;
use tagsync_core::{ColumnType, EntityId, MergeRequestId, TagDefinitionId};

#[derive(Parser, Debug)]
#[command(name = "tagsync", version, about = "Drive the tagsync engines against a tag store")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List every entity
    Entities,
    /// Print the tag definition hierarchy
    Tree {
        /// Mark every node as expanded
        #[arg(long)]
        expand: bool,
    },
    /// Load one column and print its filled cells
    Column {
        #[arg(value_parser = tag_definition_id)]
        tag_definition: TagDefinitionId,
    },
    /// Create an entity
    CreateEntity { display_txt: String },
    /// Set one cell, replacing its current value if there is one
    Edit {
        #[arg(value_parser = entity_id)]
        entity: EntityId,
        #[arg(value_parser = tag_definition_id)]
        tag_definition: TagDefinitionId,
        value: String,
    },
    /// Create a tag definition
    CreateTag {
        name: String,
        #[arg(value_enum, ignore_case = true)]
        column_type: CliColumnType,
        /// Parent tag definition; omitted for a new root
        #[arg(long, value_parser = tag_definition_id)]
        parent: Option<TagDefinitionId>,
    },
    /// List the conflicts of a merge request
    Conflicts {
        #[arg(value_parser = merge_request_id)]
        merge_request: MergeRequestId,
    },
    /// Decide one conflict by its index
    Resolve {
        #[arg(value_parser = merge_request_id)]
        merge_request: MergeRequestId,
        index: usize,
        #[arg(value_enum)]
        decision: Decision,
    },
    /// Start a merge
    Merge {
        #[arg(value_parser = merge_request_id)]
        merge_request: MergeRequestId,
    },
    /// Flip whether the origin tag definition is disabled after merging
    ToggleDisableOrigin {
        #[arg(value_parser = merge_request_id)]
        merge_request: MergeRequestId,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliColumnType {
    String,
    Float,
    Boolean,
}

impl From<CliColumnType> for ColumnType {
    fn from(column_type: CliColumnType) -> Self {
        match column_type {
            CliColumnType::String => ColumnType::String,
            CliColumnType::Float => ColumnType::Float,
            CliColumnType::Boolean => ColumnType::Boolean,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Decision {
    /// Take the origin value
    Replace,
    /// Keep the destination value
    Keep,
}

impl Decision {
    pub fn replace(self) -> bool {
        self == Decision::Replace
    }
}

fn non_empty(raw: &str) -> Result<&str, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("id must not be empty".to_string());
    }
    Ok(trimmed)
}

fn entity_id(raw: &str) -> Result<EntityId, String> {
    non_empty(raw).map(EntityId::new)
}

fn tag_definition_id(raw: &str) -> Result<TagDefinitionId, String> {
    non_empty(raw).map(TagDefinitionId::new)
}

fn merge_request_id(raw: &str) -> Result<MergeRequestId, String> {
    non_empty(raw).map(MergeRequestId::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(line: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("tagsync").chain(line.split_whitespace()))
    }

    #[test]
    fn definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn config_flag_is_global() {
        let cli = parse("tree --config other.toml --expand").unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("other.toml")));
        assert_eq!(cli.command, Command::Tree { expand: true });

        let cli = parse("--config tagsync.toml entities").unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("tagsync.toml")));
        assert_eq!(cli.command, Command::Entities);
    }

    #[test]
    fn resolve_reads_index_and_decision() {
        let cli = parse("resolve mr-1 3 keep").unwrap();
        assert_eq!(
            cli.command,
            Command::Resolve {
                merge_request: MergeRequestId::new("mr-1"),
                index: 3,
                decision: Decision::Keep,
            }
        );
        assert_eq!(
            parse("resolve mr-1 x keep").unwrap_err().kind(),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            parse("resolve mr-1 0 maybe").unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn create_tag_takes_optional_parent() {
        let cli = parse("create-tag Height FLOAT --parent people").unwrap();
        assert_eq!(
            cli.command,
            Command::CreateTag {
                name: "Height".to_string(),
                column_type: CliColumnType::Float,
                parent: Some(TagDefinitionId::new("people")),
            }
        );
        assert!(parse("entities --parent people").is_err());
    }

    #[test]
    fn unknown_or_incomplete_commands_fail() {
        assert!(parse("").is_err());
        assert_eq!(
            parse("column").unwrap_err().kind(),
            ErrorKind::MissingRequiredArgument
        );
        assert_eq!(
            parse("frobnicate").unwrap_err().kind(),
            ErrorKind::InvalidSubcommand
        );
    }
}
