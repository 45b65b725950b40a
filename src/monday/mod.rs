//! Client adapter for the monday.com GraphQL API.
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::monday::model::Envelope;
use crate::monday::upload::ReceiptFile;

pub mod items;
pub mod model;
pub mod payload;
pub mod schema;
pub mod upload;

const MONDAY_API_BASE: &str = "https://api.monday.com/v2";

/// Seam between the request handlers and the real API. Everything that talks
/// to monday goes through this trait so tests can substitute a recording
/// implementation.
#[async_trait]
pub trait MondayApi: Send + Sync {
    /// Send one GraphQL request and return the `data` part of the envelope.
    async fn execute(&self, query: &str, variables: Value, label: &str) -> Result<Value, Error>;

    /// Attach one file to an item's file column; returns the asset id.
    async fn add_file_to_column(
        &self,
        item_id: &str,
        column_id: &str,
        file: &ReceiptFile,
    ) -> Result<String, Error>;
}

#[derive(Clone)]
pub struct MondayClient {
    http: Client,
    api_url: Url,
    file_url: Url,
    token: String,
}

impl fmt::Debug for MondayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MondayClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl MondayClient {
    pub fn new(token: String) -> Self {
        let api_url = Url::parse(MONDAY_API_BASE).expect("valid default monday URL");
        Self::with_base_url(token, api_url)
    }

    pub fn with_base_url(token: String, api_url: Url) -> Self {
        let file_url = Url::parse(&format!("{}/file", api_url.as_str().trim_end_matches('/')))
            .expect("valid monday file URL");
        let http = Client::builder()
            .user_agent("zeitportal/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_url,
            file_url,
            token,
        }
    }

    pub fn build_execute_request(&self, query: &str, variables: &Value) -> Result<reqwest::Request, Error> {
        Ok(self
            .http
            .post(self.api_url.clone())
            .header("Authorization", &self.token)
            .header("Content-Type", "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .build()?)
    }
}

/// Unwrap the `{data, errors}` envelope. A non-empty `errors` field means the
/// call failed, regardless of HTTP status.
pub fn decode_envelope(label: &str, envelope: Envelope) -> Result<Value, Error> {
    if let Some(errors) = envelope.errors {
        let empty = errors.as_array().map(Vec::is_empty).unwrap_or(errors.is_null());
        if !empty {
            warn!(%label, %errors, "monday returned errors");
            return Err(Error::Api {
                label: label.to_string(),
                errors,
            });
        }
    }
    envelope.data.ok_or_else(|| Error::Api {
        label: label.to_string(),
        errors: json!("response envelope contained no data"),
    })
}

#[async_trait]
impl MondayApi for MondayClient {
    async fn execute(&self, query: &str, variables: Value, label: &str) -> Result<Value, Error> {
        debug!(%label, query, %variables, "monday request");

        let request = self.build_execute_request(query, &variables)?;
        let res = self.http.execute(request).await?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!(%label, "rate limited by monday");
        }

        let envelope: Envelope = res.json().await?;
        let data = decode_envelope(label, envelope)?;
        debug!(%label, "monday request ok");
        Ok(data)
    }

    async fn add_file_to_column(
        &self,
        item_id: &str,
        column_id: &str,
        file: &ReceiptFile,
    ) -> Result<String, Error> {
        let content = fs::read(&file.path).await.map_err(|e| Error::Upload {
            filename: file.original_name.clone(),
            details: format!("failed to read spooled file: {e}"),
        })?;

        let variables = json!({
            "file": null,
            "item": item_id,
            "col": column_id,
        });
        let form = reqwest::multipart::Form::new()
            .text("query", ADD_FILE_MUTATION)
            .text("variables", variables.to_string())
            .text("map", r#"{"file":["variables.file"]}"#)
            .part(
                "file",
                reqwest::multipart::Part::bytes(content)
                    .file_name(file.original_name.clone())
                    .mime_str(content_type(&file.original_name))
                    .map_err(Error::from)?,
            );

        let res = self
            .http
            .post(self.file_url.clone())
            .header("Authorization", &self.token)
            .multipart(form)
            .send()
            .await?;

        let envelope: Envelope = res.json().await?;
        let data = decode_envelope("add_file_to_column", envelope)?;
        let asset: model::AddFileResp = serde_json::from_value(data).map_err(|e| Error::Upload {
            filename: file.original_name.clone(),
            details: format!("unexpected upload response: {e}"),
        })?;
        let asset_id = asset
            .add_file_to_column
            .map(|a| a.id)
            .ok_or_else(|| Error::Upload {
                filename: file.original_name.clone(),
                details: "upload response carried no asset id".into(),
            })?;
        info!(filename = %file.original_name, %asset_id, "receipt uploaded");
        Ok(asset_id)
    }
}

const ADD_FILE_MUTATION: &str = "\
mutation ($file: File!, $item: ID!, $col: String!) {
  add_file_to_column(item_id:$item, column_id:$col, file:$file){ id }
}";

fn content_type(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(str::to_ascii_lowercase) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_execute_request_sets_headers() {
        let client = MondayClient::new("token".into());
        let request = client
            .build_execute_request("query { boards { id } }", &json!({ "b": ["1"] }))
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://api.monday.com/v2");
        let headers = request.headers();
        assert_eq!(
            headers.get("Authorization").and_then(|h| h.to_str().ok()).unwrap(),
            "token"
        );
        assert_eq!(
            headers.get("Content-Type").and_then(|h| h.to_str().ok()).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn file_url_derived_from_base() {
        let client = MondayClient::new("token".into());
        assert_eq!(client.file_url.as_str(), "https://api.monday.com/v2/file");
    }

    #[test]
    fn decode_envelope_returns_data() {
        let envelope = Envelope {
            data: Some(json!({ "boards": [] })),
            errors: None,
        };
        let data = decode_envelope("test", envelope).unwrap();
        assert_eq!(data, json!({ "boards": [] }));
    }

    #[test]
    fn decode_envelope_rejects_errors() {
        let envelope = Envelope {
            data: Some(json!({})),
            errors: Some(json!([{ "message": "no access" }])),
        };
        let err = decode_envelope("create_item", envelope).unwrap_err();
        match err {
            Error::Api { label, .. } => assert_eq!(label, "create_item"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decode_envelope_ignores_empty_errors_array() {
        let envelope = Envelope {
            data: Some(json!({ "ok": true })),
            errors: Some(json!([])),
        };
        assert!(decode_envelope("test", envelope).is_ok());
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type("beleg.PDF"), "application/pdf");
        assert_eq!(content_type("foto.jpeg"), "image/jpeg");
        assert_eq!(content_type("unbekannt.bin"), "application/octet-stream");
        assert_eq!(content_type("ohne-endung"), "application/octet-stream");
    }

    #[test]
    fn debug_redacts_token() {
        let client = MondayClient::new("super-secret".into());
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("super-secret"));
    }
}
