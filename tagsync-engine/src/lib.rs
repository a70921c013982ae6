//! tagsync Engine
//!
//! The synchronization core: chunked fetching, the table engine, the
//! hierarchy loader and the merge engine. Every engine owns its state behind
//! an async lock and talks to the store only through [`tagsync_client::TagStore`].

pub mod chunk;
pub mod hierarchy;
pub mod merge;
pub mod state;
pub mod table;

pub use chunk::{fetch_chunks, Cursor, Versioned};
pub use hierarchy::{ExpandFailure, ExpandReport, HierarchyForest, HierarchyLoader, HierarchyNode};
pub use merge::{MergeEngine, MergeState};
pub use state::{
    collect_cells, display_txt_definition, is_display_txt_column, ColumnState, TableState,
    DEFAULT_COLUMN_WIDTH, DISPLAY_TXT_COLUMN_ID, DISPLAY_TXT_COLUMN_NAME,
};
pub use table::{LoadOutcome, TableEngine};
