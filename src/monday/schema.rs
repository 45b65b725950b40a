//! Board schema cache and relation-column resolution.
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::error::Error;
use crate::monday::model::BoardColumnsResp;
use crate::monday::MondayApi;

/// One column of a board: opaque id plus parsed `settings_str`.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub id: String,
    pub settings: Value,
}

/// Column display title → column.
pub type ColumnMap = HashMap<String, Column>;

const COLUMNS_QUERY: &str = "\
query ($b:[ID!]) {
  boards(ids:$b){ columns{ id title settings_str } }
}";

/// Lazy per-board column cache. Each board is fetched at most once per
/// process lifetime; concurrent first calls for the same board share a
/// single in-flight fetch. Entries are inserted whole and never refreshed
/// (column definitions are assumed stable while the process runs).
#[derive(Default)]
pub struct SchemaCache {
    boards: Mutex<HashMap<String, Arc<OnceCell<Arc<ColumnMap>>>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn columns(
        &self,
        api: &dyn MondayApi,
        board_id: &str,
    ) -> Result<Arc<ColumnMap>, Error> {
        let cell = {
            let mut boards = self.boards.lock().await;
            boards.entry(board_id.to_string()).or_default().clone()
        };
        cell.get_or_try_init(|| async {
            let map = fetch_columns(api, board_id).await?;
            Ok(Arc::new(map))
        })
        .await
        .map(Arc::clone)
    }
}

async fn fetch_columns(api: &dyn MondayApi, board_id: &str) -> Result<ColumnMap, Error> {
    let data = api
        .execute(COLUMNS_QUERY, json!({ "b": [board_id] }), "get_board_columns")
        .await?;
    let resp: BoardColumnsResp = serde_json::from_value(data)
        .map_err(|e| Error::Transport(format!("malformed columns response for board {board_id}: {e}")))?;
    let board = resp
        .boards
        .into_iter()
        .next()
        .ok_or_else(|| Error::configuration(format!("board {board_id} not found")))?;

    let mut map = ColumnMap::new();
    for c in board.columns {
        // A column with unparseable settings is still usable by id.
        let settings = match c.settings_str.as_deref() {
            None | Some("") => json!({}),
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|err| {
                warn!(column = %c.title, %err, "unparseable column settings, treating as empty");
                json!({})
            }),
        };
        map.insert(c.title, Column { id: c.id, settings });
    }
    info!(%board_id, columns = map.len(), "board columns cached");
    Ok(map)
}

/// Look a column up by its display title.
pub fn require_column<'a>(
    columns: &'a ColumnMap,
    title: &str,
    board_id: &str,
) -> Result<&'a Column, Error> {
    columns
        .get(title)
        .ok_or_else(|| Error::configuration(format!("column '{title}' not found on board {board_id}")))
}

/// Extract the first linked board id from a relation column's settings.
/// `boardIds` is checked before `linkedBoardIds`; within a list the first
/// entry wins. Numeric and string ids are both accepted.
pub fn linked_board_id(title: &str, column: &Column) -> Result<String, Error> {
    for key in ["boardIds", "linkedBoardIds"] {
        if let Some(first) = column.settings.get(key).and_then(|v| v.get(0)) {
            if let Some(n) = first.as_i64() {
                return Ok(n.to_string());
            }
            if let Some(s) = first.as_str() {
                return Ok(s.to_string());
            }
        }
    }
    Err(Error::configuration(format!(
        "column '{title}' does not link to another board"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monday::upload::ReceiptFile;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingApi {
        calls: AtomicU32,
        response: Value,
    }

    impl CountingApi {
        fn new(response: Value) -> Self {
            Self {
                calls: AtomicU32::new(0),
                response,
            }
        }
    }

    #[async_trait]
    impl MondayApi for CountingApi {
        async fn execute(&self, _query: &str, _variables: Value, _label: &str) -> Result<Value, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Widen the race window so concurrent callers overlap.
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(self.response.clone())
        }

        async fn add_file_to_column(
            &self,
            _item_id: &str,
            _column_id: &str,
            _file: &ReceiptFile,
        ) -> Result<String, Error> {
            unreachable!("schema tests never upload");
        }
    }

    fn columns_response() -> Value {
        json!({
            "boards": [{
                "columns": [
                    { "id": "date_1", "title": "Anfang Datum", "settings_str": "{}" },
                    {
                        "id": "rel_1",
                        "title": "Mitarbeiter",
                        "settings_str": "{\"boardIds\":[4711]}"
                    },
                    { "id": "text_1", "title": "Notiz", "settings_str": "not json {" }
                ]
            }]
        })
    }

    #[tokio::test]
    async fn second_lookup_is_a_cache_hit() {
        let api = CountingApi::new(columns_response());
        let cache = SchemaCache::new();

        let first = cache.columns(&api, "123").await.unwrap();
        let second = cache.columns(&api, "123").await.unwrap();

        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first["Mitarbeiter"].id, "rel_1");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn concurrent_first_calls_share_one_fetch() {
        let api = CountingApi::new(columns_response());
        let cache = SchemaCache::new();

        let (a, b) = tokio::join!(cache.columns(&api, "123"), cache.columns(&api, "123"));
        a.unwrap();
        b.unwrap();

        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_boards_fetch_separately() {
        let api = CountingApi::new(columns_response());
        let cache = SchemaCache::new();

        cache.columns(&api, "123").await.unwrap();
        cache.columns(&api, "456").await.unwrap();

        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unparseable_settings_fall_back_to_empty() {
        let api = CountingApi::new(columns_response());
        let cache = SchemaCache::new();

        let cols = cache.columns(&api, "123").await.unwrap();
        assert_eq!(cols["Notiz"].settings, json!({}));
        assert_eq!(cols["Notiz"].id, "text_1");
    }

    #[tokio::test]
    async fn unknown_board_is_a_configuration_error() {
        let api = CountingApi::new(json!({ "boards": [] }));
        let cache = SchemaCache::new();

        let err = cache.columns(&api, "999").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn board_ids_wins_over_linked_board_ids() {
        let col = Column {
            id: "rel_1".into(),
            settings: json!({ "boardIds": [111, 222], "linkedBoardIds": [333] }),
        };
        assert_eq!(linked_board_id("Mitarbeiter", &col).unwrap(), "111");
    }

    #[test]
    fn linked_board_ids_is_the_fallback() {
        let col = Column {
            id: "rel_1".into(),
            settings: json!({ "linkedBoardIds": ["333"] }),
        };
        assert_eq!(linked_board_id("Mitarbeiter", &col).unwrap(), "333");
    }

    #[test]
    fn missing_relation_settings_fail() {
        let col = Column {
            id: "rel_1".into(),
            settings: json!({ "somethingElse": true }),
        };
        let err = linked_board_id("Mitarbeiter", &col).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn require_column_reports_the_missing_title() {
        let map = ColumnMap::new();
        let err = require_column(&map, "Beleg", "456").unwrap_err();
        match err {
            Error::Configuration(msg) => assert!(msg.contains("Beleg")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
