//! Blob protocol (C4): existence check, chunked upload, monolithic
//! fallback, idempotent skip-if-exists.

use crate::digest::Digest;
use crate::error::{Phase, PusherError, Result};
use crate::image::ImageBundle;
use crate::logging::Logger;
use crate::model::LayerRef;
use crate::retry::RetryPolicy;
use crate::transport::{HttpMethod, HttpResponse, HttpSession};
use bytes::Bytes;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A blob's bytes, reopenable on retry without materializing the whole
/// thing twice in memory: config bytes already live in memory, but a tar
/// layer is reopened by seeking into the tar file (§9 "factory that
/// produces a finite byte stream on demand").
#[derive(Clone)]
pub enum BlobPayload {
    InMemory(Arc<Vec<u8>>),
    TarLayer { bundle: Arc<ImageBundle>, layer: LayerRef },
}

impl BlobPayload {
    async fn open(&self) -> Result<Pin<Box<dyn AsyncRead + Send + Unpin + '_>>> {
        match self {
            BlobPayload::InMemory(bytes) => Ok(Box::pin(std::io::Cursor::new((**bytes).clone()))),
            BlobPayload::TarLayer { bundle, layer } => Ok(Box::pin(bundle.open_layer(layer).await?)),
        }
    }
}

#[derive(Clone)]
pub struct BlobProtocol {
    session: HttpSession,
    retry: RetryPolicy,
    logger: Logger,
    chunk_size: usize,
    monolithic_threshold: u64,
}

impl BlobProtocol {
    pub fn new(session: HttpSession, retry: RetryPolicy, logger: Logger, chunk_size: usize, monolithic_threshold: u64) -> Self {
        BlobProtocol { session, retry, logger, chunk_size, monolithic_threshold }
    }

    /// `HEAD /v2/{name}/blobs/{digest}` (§4.4.1).
    pub async fn exists(&self, repository: &str, digest: &Digest) -> Result<bool> {
        let path = format!("/v2/{}/blobs/{}", repository, digest);
        let resp = HttpSession::send_with_retry(&self.retry, &self.logger, "blob head", || {
            self.session.send(HttpMethod::Head, &path, None, None)
        })
        .await?;
        match resp.status {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(PusherError::RegistryProtocolError { status, snippet: resp.body_snippet() }),
        }
    }

    /// Idempotent entry point used by the push orchestrator: HEAD first,
    /// upload only if absent (§4.4.4).
    pub async fn ensure_uploaded(
        &self,
        repository: &str,
        digest: &Digest,
        size: u64,
        payload: &BlobPayload,
    ) -> Result<()> {
        if self.exists(repository, digest).await.map_err(|e| wrap(digest, Phase::Head, e))? {
            self.logger.detail(&format!("blob {} already present, skipping upload", digest));
            return Ok(());
        }
        if size < self.monolithic_threshold {
            self.upload_monolithic(repository, digest, payload).await
        } else {
            self.upload_chunked(repository, digest, size, payload).await
        }
    }

    async fn upload_monolithic(&self, repository: &str, digest: &Digest, payload: &BlobPayload) -> Result<()> {
        let mut reader = payload.open().await.map_err(|e| wrap(digest, Phase::OpenSession, e))?;
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .await
            .map_err(|e| wrap(digest, Phase::OpenSession, PusherError::from(e)))?;
        let body = Bytes::from(body);
        let path = format!("/v2/{}/blobs/uploads/?digest={}", repository, digest);
        let resp = HttpSession::send_with_retry(&self.retry, &self.logger, "blob monolithic put", || {
            self.session.send(HttpMethod::Put, &path, Some(body.clone()), Some("application/octet-stream"))
        })
        .await
        .map_err(|e| wrap(digest, Phase::Finalize, e))?;
        if resp.status != 201 {
            return Err(wrap(
                digest,
                Phase::Finalize,
                PusherError::RegistryProtocolError { status: resp.status, snippet: resp.body_snippet() },
            ));
        }
        self.verify_echoed_digest(digest, &resp)
    }

    async fn upload_chunked(&self, repository: &str, digest: &Digest, size: u64, payload: &BlobPayload) -> Result<()> {
        let mut location = self.open_session(repository).await.map_err(|e| wrap(digest, Phase::OpenSession, e))?;

        let mut reader = payload.open().await.map_err(|e| wrap(digest, Phase::OpenSession, e))?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut sent: u64 = 0;
        loop {
            let n = read_chunk(&mut reader, &mut buf).await.map_err(|e| wrap(digest, Phase::ChunkAt(sent), e.into()))?;
            if n == 0 {
                break;
            }
            let chunk = Bytes::copy_from_slice(&buf[..n]);
            let offset = sent;
            let resp = HttpSession::send_with_retry(&self.retry, &self.logger, "blob chunk put", || {
                self.session.send(HttpMethod::Patch, &location, Some(chunk.clone()), Some("application/octet-stream"))
            })
            .await
            .map_err(|e| wrap(digest, Phase::ChunkAt(offset), e))?;
            if resp.status != 202 {
                return Err(wrap(
                    digest,
                    Phase::ChunkAt(offset),
                    PusherError::RegistryProtocolError { status: resp.status, snippet: resp.body_snippet() },
                ));
            }
            if let Some(next) = resp.location() {
                location = next.to_string();
            }
            sent += n as u64;
            if sent >= size {
                break;
            }
        }

        self.finalize(&location, digest).await
    }

    /// `POST /v2/{name}/blobs/uploads/` with empty body; expects 202 and a
    /// `Location` naming the session.
    async fn open_session(&self, repository: &str) -> Result<String> {
        let path = format!("/v2/{}/blobs/uploads/", repository);
        let resp = HttpSession::send_with_retry(&self.retry, &self.logger, "blob upload open", || {
            self.session.send(HttpMethod::Post, &path, None, None)
        })
        .await?;
        if resp.status != 202 {
            return Err(PusherError::RegistryProtocolError { status: resp.status, snippet: resp.body_snippet() });
        }
        resp.location()
            .map(|s| s.to_string())
            .ok_or_else(|| PusherError::RegistryProtocolError { status: resp.status, snippet: "missing Location header".to_string() })
    }

    /// `PUT <session>[&?]digest=<d>` with an empty body (§4.4.2).
    async fn finalize(&self, location: &str, digest: &Digest) -> Result<()> {
        let url = append_digest_query(location, digest);
        let resp = HttpSession::send_with_retry(&self.retry, &self.logger, "blob finalize", || {
            self.session.send(HttpMethod::Put, &url, None, None)
        })
        .await
        .map_err(|e| wrap(digest, Phase::Finalize, e))?;
        if resp.status != 201 {
            return Err(wrap(
                digest,
                Phase::Finalize,
                PusherError::RegistryProtocolError { status: resp.status, snippet: resp.body_snippet() },
            ));
        }
        self.verify_echoed_digest(digest, &resp)
    }

    fn verify_echoed_digest(&self, expected: &Digest, resp: &HttpResponse) -> Result<()> {
        match resp.docker_content_digest() {
            Some(got) if got != expected.to_string() => {
                Err(PusherError::DigestMismatch { expected: expected.to_string(), got: got.to_string() })
            }
            Some(_) => Ok(()),
            None => {
                self.logger.detail(&format!(
                    "registry did not echo Docker-Content-Digest for {}; trusting client-computed digest",
                    expected
                ));
                Ok(())
            }
        }
    }
}

fn wrap(digest: &Digest, phase: Phase, cause: PusherError) -> PusherError {
    if let PusherError::DigestMismatch { .. } = cause {
        return cause;
    }
    PusherError::UploadFailed { digest: digest.to_string(), phase, cause: cause.to_string() }
}

fn append_digest_query(location: &str, digest: &Digest) -> String {
    let sep = if location.contains('?') { '&' } else { '?' };
    format!("{}{}digest={}", location, sep, digest)
}

async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
