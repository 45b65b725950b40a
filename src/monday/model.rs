use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GraphQL response envelope. `errors` being present and non-empty means the
/// call failed even when the HTTP status is 200.
#[derive(Deserialize, Debug)]
pub struct Envelope {
    pub data: Option<Value>,
    pub errors: Option<Value>,
}

/// One column as returned by the columns-listing query. `settings_str` is a
/// JSON document embedded in a string.
#[derive(Deserialize, Debug)]
pub struct RawColumn {
    pub id: String,
    pub title: String,
    pub settings_str: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct BoardColumns {
    pub columns: Vec<RawColumn>,
}

#[derive(Deserialize, Debug)]
pub struct BoardColumnsResp {
    pub boards: Vec<BoardColumns>,
}

/// Minimal item projection used for the dropdown endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemRef {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct ItemsPage {
    pub items: Vec<ItemRef>,
    pub cursor: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ItemsPageBoard {
    pub items_page: ItemsPage,
}

#[derive(Deserialize, Debug)]
pub struct ItemsPageResp {
    pub boards: Vec<ItemsPageBoard>,
}

#[derive(Deserialize, Debug)]
pub struct LinkedItemsEntry {
    #[serde(default)]
    pub linked_items: Vec<ItemRef>,
}

#[derive(Deserialize, Debug)]
pub struct LinkedItemsResp {
    pub items: Vec<LinkedItemsEntry>,
}

#[derive(Deserialize, Debug)]
pub struct CreatedItem {
    pub id: String,
}

#[derive(Deserialize, Debug)]
pub struct CreateItemResp {
    pub create_item: CreatedItem,
}

#[derive(Deserialize, Debug)]
pub struct FileAsset {
    pub id: String,
}

#[derive(Deserialize, Debug)]
pub struct AddFileResp {
    pub add_file_to_column: Option<FileAsset>,
}
