//! Document retrieval: stream one PDF from the canonical URL to disk.
//!
//! The body is written through a fixed-capacity buffer as chunks arrive, so
//! peak memory stays bounded whatever the document size. Every failure
//! (connection, timeout, HTTP status, body stream, local write, non-PDF
//! payload) comes back as [`RecordError::Retrieval`]; nothing escapes the
//! call. On failure the destination may hold a partial file; removing it is
//! the caller's job (see [`Artifact`]).

use crate::config::RunConfig;
use crate::error::{BatchError, RecordError};
use futures::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Source of document bytes, keyed by identifier.
///
/// Implementations write the complete document to `dest` and report the
/// number of bytes written.
pub trait Fetch {
    fn fetch(
        &self,
        id: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<u64, RecordError>> + Send;
}

/// HTTP fetcher for the canonical PDF endpoint.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    chunk_size: usize,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn from_config(config: &RunConfig) -> Result<Self, BatchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| BatchError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chunk_size: config.chunk_size,
            timeout_secs: config.download_timeout_secs,
        })
    }

    /// Canonical retrieval URL for an identifier.
    pub fn url_for(&self, id: &str) -> String {
        canonical_url(&self.base_url, id)
    }

    async fn download(&self, id: &str, url: &str, dest: &Path) -> Result<u64, String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                format!("timed out after {}s", self.timeout_secs)
            } else {
                e.to_string()
            }
        })?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| format!("cannot create '{}': {e}", dest.display()))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);

        let mut body = response.bytes_stream();
        let mut written: u64 = 0;
        let mut head: Vec<u8> = Vec::with_capacity(PDF_MAGIC.len());

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    format!("body timed out after {}s", self.timeout_secs)
                } else {
                    format!("body stream: {e}")
                }
            })?;
            if head.len() < PDF_MAGIC.len() {
                let take = (PDF_MAGIC.len() - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
                if head.len() == PDF_MAGIC.len() && head.as_slice() != PDF_MAGIC {
                    return Err(format!("not a PDF (first bytes {head:?})"));
                }
            }
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| format!("write '{}': {e}", dest.display()))?;
            written += chunk.len() as u64;
        }

        writer
            .flush()
            .await
            .map_err(|e| format!("flush '{}': {e}", dest.display()))?;

        if head.as_slice() != PDF_MAGIC {
            return Err(format!("truncated body ({written} bytes)"));
        }

        debug!("{}: {} bytes streamed to {}", id, written, dest.display());
        Ok(written)
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, id: &str, dest: &Path) -> Result<u64, RecordError> {
        let url = self.url_for(id);
        info!("Fetching {}", url);
        self.download(id, &url, dest)
            .await
            .map_err(|detail| RecordError::retrieval(id, format!("{url}: {detail}")))
    }
}

/// `{base}/{id}` with the identifier trimmed.
pub fn canonical_url(base_url: &str, id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), id.trim())
}

/// The transient downloaded document of one record.
///
/// Backed by a [`NamedTempFile`], so the file is removed when the artifact
/// is dropped on any path, including panics and early returns. The runner
/// still calls [`Artifact::discard`] explicitly to surface removal errors in
/// the log.
#[derive(Debug)]
pub struct Artifact {
    file: NamedTempFile,
}

impl Artifact {
    /// Reserve a uniquely named `.pdf` file for `id` inside `dir`.
    pub fn create_in(dir: &Path, id: &str) -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(&format!("{}.", crate::config::file_stem(id)))
            .suffix(".pdf")
            .tempfile_in(dir)?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Owned copy of the path, for moving into blocking tasks.
    pub fn path_buf(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    /// Delete the file now.
    pub fn discard(self) -> std::io::Result<()> {
        self.file.close()
    }
}
