//! Stored file types.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{InferraError, InferraResult};
use crate::transport::MultipartPart;

/// Default purpose for uploads.
pub const DEFAULT_PURPOSE: &str = "batch";

/// Filename used when records are uploaded as JSONL.
pub const RECORDS_FILENAME: &str = "batch.jsonl";

/// Content type of JSONL uploads.
pub const JSONL_CONTENT_TYPE: &str = "application/jsonl";

/// A stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileObject {
    /// File ID.
    pub id: String,

    /// Object type.
    #[serde(default)]
    pub object: String,

    /// Purpose the file was uploaded for.
    pub purpose: String,

    /// Original filename.
    pub filename: String,

    /// Size in bytes.
    #[serde(default, alias = "bytes")]
    pub size: u64,

    /// Creation timestamp.
    pub created_at: i64,

    /// Processing status.
    #[serde(default)]
    pub status: Option<String>,
}

/// Source of an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    /// In-memory bytes.
    Bytes {
        /// Filename reported to the API.
        filename: String,
        /// Content type.
        content_type: String,
        /// File data.
        data: Vec<u8>,
    },
    /// A file on disk, read when the upload starts.
    Path(PathBuf),
    /// JSON records, uploaded as one JSONL document.
    Records(Vec<serde_json::Value>),
}

impl FileSource {
    /// In-memory bytes with a filename. Content type follows the extension.
    pub fn bytes(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let filename = filename.into();
        FileSource::Bytes {
            content_type: content_type_for(Path::new(&filename)),
            filename,
            data: data.into(),
        }
    }

    /// A file on disk.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        FileSource::Path(path.into())
    }

    /// JSON records.
    pub fn records(records: Vec<serde_json::Value>) -> Self {
        FileSource::Records(records)
    }

    /// Builds the multipart `file` part, reading from disk if needed.
    pub(crate) async fn into_part(self) -> InferraResult<MultipartPart> {
        let (filename, content_type, data) = match self {
            FileSource::Bytes {
                filename,
                content_type,
                data,
            } => (filename, content_type, data),
            FileSource::Path(path) => {
                let data = tokio::fs::read(&path)
                    .await
                    .map_err(|e| InferraError::io(&path, e))?;
                let filename = path
                    .file_name()
                    .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
                (filename, content_type_for(&path), data)
            }
            FileSource::Records(records) => (
                RECORDS_FILENAME.to_string(),
                JSONL_CONTENT_TYPE.to_string(),
                to_jsonl(&records)?.into_bytes(),
            ),
        };

        Ok(MultipartPart::File {
            name: "file".to_string(),
            filename,
            content_type,
            data,
        })
    }
}

/// Joins records into newline-separated JSON.
pub(crate) fn to_jsonl(records: &[serde_json::Value]) -> InferraResult<String> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

fn content_type_for(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") => JSONL_CONTENT_TYPE.to_string(),
        Some("json") => mime::APPLICATION_JSON.to_string(),
        Some("txt") => mime::TEXT_PLAIN.to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}

/// Downloaded file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// Content was valid UTF-8.
    Text(String),
    /// Anything else.
    Bytes(Vec<u8>),
}

impl FileContent {
    /// Decodes as text when possible.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        match String::from_utf8(data) {
            Ok(text) => FileContent::Text(text),
            Err(e) => FileContent::Bytes(e.into_bytes()),
        }
    }

    /// Returns the text, if the content was UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Text(text) => Some(text),
            FileContent::Bytes(_) => None,
        }
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileContent::Text(text) => text.as_bytes(),
            FileContent::Bytes(bytes) => bytes,
        }
    }
}

/// Filters for listing files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListParams {
    /// Only files with this purpose.
    pub purpose: Option<String>,
    /// Maximum number of files.
    pub limit: u32,
    /// Return files after this ID.
    pub after: Option<String>,
}

impl FileListParams {
    /// Filters by purpose.
    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    /// Sets the page size.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the cursor.
    pub fn after(mut self, after: impl Into<String>) -> Self {
        self.after = Some(after.into());
        self
    }
}

impl Default for FileListParams {
    fn default() -> Self {
        Self {
            purpose: None,
            limit: super::common::ListParams::DEFAULT_LIMIT,
            after: None,
        }
    }
}
