//! Sequential receipt uploads for a created item.
use std::path::PathBuf;
use tracing::info;

use crate::error::Error;
use crate::monday::MondayApi;

/// One spooled attachment awaiting upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptFile {
    pub path: PathBuf,
    pub original_name: String,
    pub size: u64,
}

/// Upload receipts one at a time, in listed order. Zero-byte files are
/// skipped without error. The first failure aborts the remaining uploads;
/// the created item and any files already uploaded stay in place — there is
/// no rollback. Returns the number of files uploaded.
pub async fn upload_attachments(
    api: &dyn MondayApi,
    item_id: &str,
    column_id: &str,
    files: &[ReceiptFile],
) -> Result<usize, Error> {
    let mut uploaded = 0;
    for file in files {
        if file.size == 0 {
            info!(filename = %file.original_name, "skipping empty receipt");
            continue;
        }
        match api.add_file_to_column(item_id, column_id, file).await {
            Ok(_) => uploaded += 1,
            Err(err @ Error::Upload { .. }) => return Err(err),
            Err(err) => {
                return Err(Error::Upload {
                    filename: file.original_name.clone(),
                    details: err.to_string(),
                })
            }
        }
    }
    Ok(uploaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingUploads {
        responses: Arc<Mutex<VecDeque<Result<String, Error>>>>,
        uploads: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingUploads {
        fn with_responses(responses: Vec<Result<String, Error>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(VecDeque::from(responses))),
                ..Default::default()
            }
        }

        async fn uploads(&self) -> Vec<String> {
            self.uploads.lock().await.clone()
        }
    }

    #[async_trait]
    impl MondayApi for RecordingUploads {
        async fn execute(&self, _query: &str, _variables: Value, _label: &str) -> Result<Value, Error> {
            unreachable!("upload tests never query");
        }

        async fn add_file_to_column(
            &self,
            _item_id: &str,
            _column_id: &str,
            file: &ReceiptFile,
        ) -> Result<String, Error> {
            self.uploads.lock().await.push(file.original_name.clone());
            let mut guard = self.responses.lock().await;
            guard.pop_front().unwrap_or_else(|| Ok("asset".into()))
        }
    }

    fn receipt(name: &str, size: u64) -> ReceiptFile {
        ReceiptFile {
            path: PathBuf::from(format!("/tmp/{name}")),
            original_name: name.to_string(),
            size,
        }
    }

    #[tokio::test]
    async fn zero_byte_files_are_skipped() {
        let api = RecordingUploads::default();
        let files = vec![
            receipt("a.pdf", 100),
            receipt("leer.pdf", 0),
            receipt("b.jpg", 200),
        ];

        let uploaded = upload_attachments(&api, "42", "file_col", &files).await.unwrap();

        assert_eq!(uploaded, 2);
        assert_eq!(api.uploads().await, vec!["a.pdf", "b.jpg"]);
    }

    #[tokio::test]
    async fn failure_aborts_remaining_uploads() {
        let api = RecordingUploads::with_responses(vec![
            Ok("asset-1".into()),
            Err(Error::Upload {
                filename: "b.jpg".into(),
                details: "boom".into(),
            }),
        ]);
        let files = vec![
            receipt("a.pdf", 100),
            receipt("b.jpg", 200),
            receipt("c.png", 300),
        ];

        let err = upload_attachments(&api, "42", "file_col", &files).await.unwrap_err();

        match err {
            Error::Upload { filename, .. } => assert_eq!(filename, "b.jpg"),
            other => panic!("unexpected error: {other:?}"),
        }
        // Third file never attempted.
        assert_eq!(api.uploads().await, vec!["a.pdf", "b.jpg"]);
    }

    #[tokio::test]
    async fn non_upload_errors_are_wrapped_with_the_filename() {
        let api = RecordingUploads::with_responses(vec![Err(Error::Transport("timeout".into()))]);
        let files = vec![receipt("a.pdf", 100)];

        let err = upload_attachments(&api, "42", "file_col", &files).await.unwrap_err();
        match err {
            Error::Upload { filename, details } => {
                assert_eq!(filename, "a.pdf");
                assert!(details.contains("timeout"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_files_is_a_no_op() {
        let api = RecordingUploads::default();
        let uploaded = upload_attachments(&api, "42", "file_col", &[]).await.unwrap();
        assert_eq!(uploaded, 0);
        assert!(api.uploads().await.is_empty());
    }
}
