//! Files service.

use futures::{StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use super::{resource_request, ServiceContext};
use crate::errors::{InferraError, InferraResult};
use crate::resilience::ResilienceOrchestrator;
use crate::transport::{
    HttpMethod, MultipartPart, OutboundRequest, RequestPipeline, ResponseBody, TransportError,
};
use crate::types::common::ListResponse;
use crate::types::files::{FileContent, FileListParams, FileObject, FileSource};
use crate::types::models::endpoints;

/// Files service.
#[derive(Debug, Clone)]
pub struct FilesService {
    context: ServiceContext,
}

impl FilesService {
    /// Creates a new files service.
    pub fn new(pipeline: Arc<RequestPipeline>, resilience: Arc<ResilienceOrchestrator>) -> Self {
        Self::from_context(ServiceContext::new(pipeline, resilience))
    }

    pub(crate) fn from_context(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Uploads a file. Batch input files use purpose
    /// [`crate::types::files::DEFAULT_PURPOSE`].
    ///
    /// A path source is read once, before the first attempt.
    #[instrument(skip(self, source))]
    pub async fn upload(&self, source: FileSource, purpose: &str) -> InferraResult<FileObject> {
        if purpose.trim().is_empty() {
            return Err(InferraError::validation_param(
                "purpose cannot be empty",
                "purpose",
            ));
        }

        let file = source.into_part().await?;
        let outbound = OutboundRequest::post(endpoints::FILES).multipart(vec![
            MultipartPart::Text {
                name: "purpose".to_string(),
                value: purpose.to_string(),
            },
            file,
        ]);
        self.context.call_json(&outbound).await
    }

    /// Retrieves file metadata.
    #[instrument(skip(self))]
    pub async fn retrieve(&self, file_id: &str) -> InferraResult<FileObject> {
        let outbound = resource_request(HttpMethod::Get, endpoints::FILES, file_id, "file_id", "")?;
        self.context.call_json(&outbound).await
    }

    /// Downloads file content into memory.
    ///
    /// A connection failure while the body is read re-issues the download.
    #[instrument(skip(self))]
    pub async fn download(&self, file_id: &str) -> InferraResult<FileContent> {
        let outbound = content_request(file_id)?;
        let data = self
            .context
            .call_and_consume(&outbound, |body| async move {
                let stream = body.into_stream()?;
                let data = stream
                    .try_fold(Vec::new(), |mut data, chunk| async move {
                        data.extend_from_slice(&chunk);
                        Ok::<_, TransportError>(data)
                    })
                    .await?;
                Ok::<_, InferraError>(data)
            })
            .await?;

        Ok(FileContent::from_bytes(data))
    }

    /// Streams file content to `path`, returning the number of bytes written.
    ///
    /// The file is truncated at the start of every attempt.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn download_to(&self, file_id: &str, path: impl AsRef<Path>) -> InferraResult<u64> {
        let outbound = content_request(file_id)?;
        let path = path.as_ref();

        self.context
            .call_and_consume(&outbound, |body| write_body(body, path))
            .await
    }

    /// Deletes a file.
    #[instrument(skip(self))]
    pub async fn delete(&self, file_id: &str) -> InferraResult<()> {
        let outbound =
            resource_request(HttpMethod::Delete, endpoints::FILES, file_id, "file_id", "")?;
        self.context.call(&outbound).await?;
        Ok(())
    }

    /// Lists files.
    #[instrument(skip(self))]
    pub async fn list(&self, params: FileListParams) -> InferraResult<Vec<FileObject>> {
        let mut outbound = OutboundRequest::get(endpoints::FILES).query("limit", params.limit);
        if let Some(purpose) = &params.purpose {
            outbound = outbound.query("purpose", purpose);
        }
        if let Some(after) = &params.after {
            outbound = outbound.query("after", after);
        }

        let list: ListResponse<FileObject> = self.context.call_json(&outbound).await?;
        Ok(list.into_items())
    }
}

fn content_request(file_id: &str) -> InferraResult<OutboundRequest> {
    Ok(
        resource_request(HttpMethod::Get, endpoints::FILES, file_id, "file_id", "/content")?
            .streaming(true),
    )
}

async fn write_body(body: ResponseBody, path: &Path) -> InferraResult<u64> {
    let mut stream = body.into_stream()?;
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| InferraError::io(path, e))?;

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| InferraError::io(path, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| InferraError::io(path, e))?;

    tracing::debug!(bytes = written, "Download written");
    Ok(written)
}
