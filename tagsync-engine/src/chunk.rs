//! Chunked fetching: request pages until the store hands back a short one.

use std::future::Future;
use tagsync_core::{Entity, StoreError, SyncError, SyncResult, TagInstanceRecord, Version};

/// Records that carry a store-minted version.
pub trait Versioned {
    fn version(&self) -> Version;
}

impl Versioned for Entity {
    fn version(&self) -> Version {
        self.version
    }
}

impl Versioned for TagInstanceRecord {
    fn version(&self) -> Version {
        self.version
    }
}

/// How the cursor moves between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// `offset += limit`. Only safe for collections nobody appends to mid-scan.
    Offset,
    /// `offset = 1 + max(version seen on this page)`. Safe while other
    /// writers bump versions concurrently: nothing is fetched twice and
    /// nothing written before the scan started is skipped.
    HighWaterMark,
}

impl Cursor {
    pub fn advance<T: Versioned>(self, offset: i64, limit: usize, page: &[T]) -> i64 {
        match self {
            Cursor::Offset => offset + limit as i64,
            Cursor::HighWaterMark => page
                .iter()
                .map(Versioned::version)
                .max()
                .map_or(offset, |max| max + 1),
        }
    }
}

/// Fetch every page and return the concatenation in request order.
///
/// Stops after the first page holding fewer than `limit` items, or when the
/// store reports the resource as not found. Any other error aborts the scan
/// and drops what was accumulated; the page index is kept in the error.
pub async fn fetch_chunks<T, F, Fut>(limit: usize, cursor: Cursor, mut fetch_page: F) -> SyncResult<Vec<T>>
where
    T: Versioned,
    F: FnMut(i64, usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, StoreError>>,
{
    let limit = limit.max(1);
    let mut items = Vec::new();
    let mut offset = 0i64;
    let mut page = 0usize;

    loop {
        let batch = match fetch_page(offset, limit).await {
            Ok(batch) => batch,
            Err(StoreError::NotFound { resource }) => {
                tracing::debug!(page, offset, %resource, "chunk scan hit not found, treating as exhausted");
                break;
            }
            Err(source) => {
                tracing::warn!(page, offset, error = %source, "chunk scan aborted");
                return Err(SyncError::ChunkFailed { page, source });
            }
        };

        let count = batch.len();
        tracing::debug!(page, offset, count, "chunk received");
        if count < limit {
            items.extend(batch);
            break;
        }

        let next = cursor.advance(offset, limit, &batch);
        if next <= offset {
            return Err(SyncError::CursorStalled { page, offset });
        }
        items.extend(batch);
        offset = next;
        page += 1;
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tagsync_core::{EntityId, TagDefinitionId, TagInstanceId, TagValue};

    fn record(entity: usize, version: Version) -> TagInstanceRecord {
        TagInstanceRecord {
            id_entity_persistent: EntityId::new(format!("e{}", entity)),
            id_tag_definition_persistent: TagDefinitionId::new("t"),
            id_persistent: TagInstanceId::new(format!("i{}", entity)),
            version,
            value: TagValue::Float(version as f64),
        }
    }

    #[test]
    fn offset_cursor_steps_by_limit() {
        let page = vec![record(0, 99)];
        assert_eq!(Cursor::Offset.advance(500, 500, &page), 1000);
    }

    #[test]
    fn high_water_mark_steps_past_max_version() {
        let page = vec![record(0, 7), record(1, 42), record(2, 3)];
        assert_eq!(Cursor::HighWaterMark.advance(0, 3, &page), 43);
    }

    #[tokio::test]
    async fn stops_on_short_page() {
        let calls = RefCell::new(Vec::new());
        let result = fetch_chunks(2, Cursor::Offset, |offset, limit| {
            calls.borrow_mut().push(offset);
            let page: Vec<TagInstanceRecord> = match offset {
                0 => vec![record(0, 1), record(1, 2)],
                2 => vec![record(2, 3)],
                _ => Vec::new(),
            };
            assert_eq!(limit, 2);
            async move { Ok(page) }
        })
        .await
        .unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(*calls.borrow(), vec![0, 2]);
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_page() {
        let calls = RefCell::new(0);
        let result = fetch_chunks(1, Cursor::HighWaterMark, |offset, _| {
            *calls.borrow_mut() += 1;
            let page = if offset == 0 { vec![record(0, 5)] } else { Vec::new() };
            async move { Ok(page) }
        })
        .await
        .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(*calls.borrow(), 2);
    }

    #[tokio::test]
    async fn not_found_is_exhaustion() {
        let result: Vec<TagInstanceRecord> = fetch_chunks(10, Cursor::HighWaterMark, |_, _| async {
            Err(StoreError::NotFound {
                resource: "tag_instances".to_string(),
            })
        })
        .await
        .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn error_reports_page_index() {
        let result = fetch_chunks(1, Cursor::Offset, |offset, _| async move {
            if offset < 2 {
                Ok(vec![record(offset as usize, offset)])
            } else {
                Err(StoreError::Status {
                    status: 500,
                    message: "boom".to_string(),
                })
            }
        })
        .await;
        match result {
            Err(SyncError::ChunkFailed { page, source }) => {
                assert_eq!(page, 2);
                assert_eq!(source.user_message(), "boom");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn stalled_cursor_aborts() {
        let result = fetch_chunks(1, Cursor::HighWaterMark, |_, _| async {
            Ok(vec![record(0, -5)])
        })
        .await;
        assert!(matches!(result, Err(SyncError::CursorStalled { page: 0, .. })));
    }
}
