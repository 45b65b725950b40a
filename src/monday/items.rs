//! Item retrieval: cursor pagination and relation lookups.
use serde_json::json;
use tracing::info;

use crate::error::Error;
use crate::monday::model::{ItemRef, ItemsPageResp, LinkedItemsResp};
use crate::monday::MondayApi;

/// Page size accepted by `items_page`. An API constraint, not a tunable.
const ITEMS_PAGE_LIMIT: u32 = 500;

const ITEMS_QUERY: &str = "\
query ($b:[ID!], $c:String, $l:Int!) {
  boards(ids:$b){
    items_page(limit:$l, cursor:$c){
      items{ id name } cursor
    }
  }
}";

const LINKED_ITEMS_QUERY: &str = "\
query ($item:[ID!], $rel:String!, $board:ID!) {
  items(ids:$item){
    linked_items(link_to_item_column_id:$rel, linked_board_id:$board){ id name }
  }
}";

/// Fetch every item of a board, following the pagination cursor until a page
/// comes back without one. Pages are concatenated in arrival order; nothing
/// is re-sorted or deduplicated.
pub async fn fetch_all_items(api: &dyn MondayApi, board_id: &str) -> Result<Vec<ItemRef>, Error> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    let mut page = 1u32;

    loop {
        let label = format!("items_page#{page}");
        let data = api
            .execute(
                ITEMS_QUERY,
                json!({ "b": [board_id], "c": cursor, "l": ITEMS_PAGE_LIMIT }),
                &label,
            )
            .await?;
        let resp: ItemsPageResp = serde_json::from_value(data)
            .map_err(|e| Error::Transport(format!("malformed items page for board {board_id}: {e}")))?;
        let board = resp
            .boards
            .into_iter()
            .next()
            .ok_or_else(|| Error::configuration(format!("board {board_id} not found")))?;

        let slice = board.items_page;
        all.extend(slice.items);
        cursor = slice.cursor.filter(|c| !c.is_empty());
        if cursor.is_none() {
            break;
        }
        page += 1;
    }

    info!(%board_id, items = all.len(), "items loaded");
    Ok(all)
}

/// Fetch the items on `linked_board_id` that an item references through a
/// relation column. An unknown item yields an empty list.
pub async fn fetch_linked_items(
    api: &dyn MondayApi,
    item_id: &str,
    relation_column_id: &str,
    linked_board_id: &str,
) -> Result<Vec<ItemRef>, Error> {
    let data = api
        .execute(
            LINKED_ITEMS_QUERY,
            json!({ "item": [item_id], "rel": relation_column_id, "board": linked_board_id }),
            "linked_items",
        )
        .await?;
    let resp: LinkedItemsResp = serde_json::from_value(data)
        .map_err(|e| Error::Transport(format!("malformed linked_items response: {e}")))?;
    Ok(resp
        .items
        .into_iter()
        .next()
        .map(|entry| entry.linked_items)
        .unwrap_or_default())
}
