//! Translation of validated form submissions into `create_item` mutations.
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::config::{ExpenseBoard, ExpenseColumns, HoursBoard, HoursColumns};
use crate::error::Error;
use crate::monday::model::CreateItemResp;
use crate::monday::schema::{require_column, ColumnMap, SchemaCache};
use crate::monday::MondayApi;

const CREATE_ITEM_MUTATION: &str = "\
mutation ($board:ID!, $name:String!, $vals:JSON!) {
  create_item(board_id:$board, item_name:$name, column_values:$vals){ id }
}";

/// Collapse decoded form pairs into a map where the first value of a
/// repeated field wins. Repeats are a form-encoding artifact, not an error.
pub fn first_values(pairs: impl IntoIterator<Item = (String, String)>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (k, v) in pairs {
        map.entry(k).or_insert(v);
    }
    map
}

fn required<'a>(fields: &'a HashMap<String, String>, name: &'static str) -> Result<&'a str, Error> {
    match fields.get(name).map(String::as_str) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::validation(format!("Pflichtfeld fehlt: {name}"))),
    }
}

fn required_id(fields: &HashMap<String, String>, name: &'static str) -> Result<i64, Error> {
    required(fields, name)?
        .parse::<i64>()
        .map_err(|_| Error::validation(format!("{name} ist keine gültige ID")))
}

/// A calendar date plus time of day in UTC, seconds precision, no offset.
/// This is the shape monday's date column expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtcStamp {
    pub date: String,
    pub time: String,
}

/// Normalize a submitted date-time into UTC date and time-of-day parts.
/// Accepts RFC 3339 (with offset or `Z`) and the offset-less forms an HTML
/// `datetime-local` input produces; offset-less input is taken as UTC.
pub fn to_utc_parts(input: &str) -> Result<UtcStamp, Error> {
    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        let utc = dt.with_timezone(&Utc);
        return Ok(UtcStamp {
            date: utc.format("%Y-%m-%d").to_string(),
            time: utc.format("%H:%M:%S").to_string(),
        });
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(UtcStamp {
                date: naive.format("%Y-%m-%d").to_string(),
                time: naive.format("%H:%M:%S").to_string(),
            });
        }
    }
    Err(Error::validation(format!("unverständliches Datum: {trimmed}")))
}

/// Cleaned time-entry submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeEntry {
    pub item_name: String,
    pub start: UtcStamp,
    pub end: UtcStamp,
    pub pause_minutes: i64,
    pub project_id: i64,
    pub employee_id: i64,
}

impl TimeEntry {
    /// Validate and normalize raw form fields. Fails before any external
    /// call is made; `pauseMins` defaults to zero when absent.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, Error> {
        let item_name = required(fields, "itemName")?.to_string();
        let start = to_utc_parts(required(fields, "startDate")?)?;
        let end = to_utc_parts(required(fields, "endDate")?)?;
        let pause_minutes = match fields.get("pauseMins").map(String::as_str) {
            None | Some("") => 0,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| Error::validation("pauseMins ist keine gültige Zahl"))?,
        };
        let project_id = required_id(fields, "projectId")?;
        let employee_id = required_id(fields, "mitarbeiterId")?;
        Ok(Self {
            item_name,
            start,
            end,
            pause_minutes,
            project_id,
            employee_id,
        })
    }
}

/// Cleaned expense submission. `amount` stays in its raw textual form; the
/// API accepts it verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseEntry {
    pub item_name: String,
    pub description: String,
    pub amount: String,
    pub project_id: i64,
    pub employee_id: i64,
}

impl ExpenseEntry {
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, Error> {
        let item_name = required(fields, "itemName")?.to_string();
        let description = fields.get("beschreibung").cloned().unwrap_or_default();
        let amount = required(fields, "betrag")?.to_string();
        let project_id = required_id(fields, "projectId")?;
        let employee_id = required_id(fields, "mitarbeiterId")?;
        Ok(Self {
            item_name,
            description,
            amount,
            project_id,
            employee_id,
        })
    }
}

fn relation(item_id: i64) -> Value {
    json!({ "item_ids": [item_id] })
}

/// Build the column-value map for a time entry, resolving configured column
/// titles against the board's cached schema.
pub fn time_entry_values(
    columns: &ColumnMap,
    titles: &HoursColumns,
    board_id: &str,
    entry: &TimeEntry,
) -> Result<Value, Error> {
    let mut vals = Map::new();
    vals.insert(
        require_column(columns, &titles.start, board_id)?.id.clone(),
        json!({ "date": entry.start.date, "time": entry.start.time }),
    );
    vals.insert(
        require_column(columns, &titles.end, board_id)?.id.clone(),
        json!({ "date": entry.end.date, "time": entry.end.time }),
    );
    vals.insert(
        require_column(columns, &titles.pause, board_id)?.id.clone(),
        json!(entry.pause_minutes),
    );
    vals.insert(
        require_column(columns, &titles.project, board_id)?.id.clone(),
        relation(entry.project_id),
    );
    vals.insert(
        require_column(columns, &titles.employee, board_id)?.id.clone(),
        relation(entry.employee_id),
    );
    Ok(Value::Object(vals))
}

/// Build the column-value map for an expense entry.
pub fn expense_values(
    columns: &ColumnMap,
    titles: &ExpenseColumns,
    board_id: &str,
    entry: &ExpenseEntry,
) -> Result<Value, Error> {
    let mut vals = Map::new();
    vals.insert(
        require_column(columns, &titles.description, board_id)?.id.clone(),
        json!({ "text": entry.description }),
    );
    vals.insert(
        require_column(columns, &titles.amount, board_id)?.id.clone(),
        json!(entry.amount),
    );
    vals.insert(
        require_column(columns, &titles.project, board_id)?.id.clone(),
        relation(entry.project_id),
    );
    vals.insert(
        require_column(columns, &titles.employee, board_id)?.id.clone(),
        relation(entry.employee_id),
    );
    Ok(Value::Object(vals))
}

async fn create_item(
    api: &dyn MondayApi,
    board_id: &str,
    item_name: &str,
    vals: &Value,
    label: &str,
) -> Result<String, Error> {
    // column_values is a JSON document passed inside the JSON variables.
    let data = api
        .execute(
            CREATE_ITEM_MUTATION,
            json!({ "board": board_id, "name": item_name, "vals": vals.to_string() }),
            label,
        )
        .await?;
    let resp: CreateItemResp = serde_json::from_value(data)
        .map_err(|e| Error::Transport(format!("malformed create_item response: {e}")))?;
    Ok(resp.create_item.id)
}

/// Create a time-tracking item. Returns the created item id.
pub async fn create_time_entry(
    api: &dyn MondayApi,
    cache: &SchemaCache,
    board: &HoursBoard,
    entry: &TimeEntry,
) -> Result<String, Error> {
    let columns = cache.columns(api, &board.id).await?;
    let vals = time_entry_values(&columns, &board.columns, &board.id, entry)?;
    create_item(api, &board.id, &entry.item_name, &vals, "create_item").await
}

/// Create an expense item. The returned id is what the attachment uploader
/// needs.
pub async fn create_expense(
    api: &dyn MondayApi,
    cache: &SchemaCache,
    board: &ExpenseBoard,
    entry: &ExpenseEntry,
) -> Result<String, Error> {
    let columns = cache.columns(api, &board.id).await?;
    let vals = expense_values(&columns, &board.columns, &board.id, entry)?;
    create_item(api, &board.id, &entry.item_name, &vals, "create_expense").await
}
