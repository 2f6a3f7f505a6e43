//! Manifest protocol (C5): GET/PUT/DELETE, digest verification.

use crate::digest::Digest;
use crate::error::{PusherError, Result};
use crate::logging::Logger;
use crate::model::{ManifestV2, MANIFEST_V2_MEDIA_TYPE};
use crate::retry::RetryPolicy;
use crate::transport::{HttpMethod, HttpSession};
use bytes::Bytes;

#[derive(Clone)]
pub struct ManifestProtocol {
    session: HttpSession,
    retry: RetryPolicy,
    logger: Logger,
}

impl ManifestProtocol {
    pub fn new(session: HttpSession, retry: RetryPolicy, logger: Logger) -> Self {
        ManifestProtocol { session, retry, logger }
    }

    /// `GET /v2/{name}/manifests/{reference}` (§4.5).
    pub async fn get(&self, repository: &str, reference: &str) -> Result<ManifestV2> {
        Ok(self.get_with_digest(repository, reference).await?.0)
    }

    /// Same as `get`, but also returns the digest of the exact bytes the
    /// registry returned (not a re-serialization of the parsed struct),
    /// which is what `delete_by_tag` needs to address the right blob.
    async fn get_with_digest(&self, repository: &str, reference: &str) -> Result<(ManifestV2, Digest)> {
        let path = format!("/v2/{}/manifests/{}", repository, reference);
        let resp = HttpSession::send_with_retry(&self.retry, &self.logger, "manifest get", || {
            self.session.send_accepting(HttpMethod::Get, &path, None, None, Some(MANIFEST_V2_MEDIA_TYPE))
        })
        .await?;
        match resp.status {
            200 => {
                let manifest: ManifestV2 = serde_json::from_slice(&resp.body)?;
                let digest = Digest::compute(&resp.body);
                Ok((manifest, digest))
            }
            404 => Err(PusherError::NotFound(format!("{}/{}", repository, reference))),
            status => Err(PusherError::RegistryProtocolError { status, snippet: resp.body_snippet() }),
        }
    }

    /// `PUT /v2/{name}/manifests/{reference}` with the manifest's exact
    /// canonical bytes. Returns the verified manifest digest: the
    /// registry's `Docker-Content-Digest` if it echoes one, else the
    /// client-computed digest (§9 open question resolution — logged at
    /// `detail`, never silently mismatched).
    pub async fn put(&self, repository: &str, reference: &str, manifest: &ManifestV2) -> Result<Digest> {
        let path = format!("/v2/{}/manifests/{}", repository, reference);
        let body = Bytes::from(manifest.to_canonical_bytes());
        let computed = manifest.digest();
        let resp = HttpSession::send_with_retry(&self.retry, &self.logger, "manifest put", || {
            self.session.send(HttpMethod::Put, &path, Some(body.clone()), Some(MANIFEST_V2_MEDIA_TYPE))
        })
        .await?;
        if resp.status != 201 {
            return Err(PusherError::RegistryProtocolError { status: resp.status, snippet: resp.body_snippet() });
        }
        match resp.docker_content_digest() {
            Some(got) if got != computed.to_string() => {
                Err(PusherError::DigestMismatch { expected: computed.to_string(), got: got.to_string() })
            }
            Some(_) => Ok(computed),
            None => {
                self.logger.detail(&format!(
                    "registry did not echo Docker-Content-Digest for manifest PUT; using client-computed digest {}",
                    computed
                ));
                Ok(computed)
            }
        }
    }

    /// `DELETE /v2/{name}/manifests/sha256:...` (§4.5).
    pub async fn delete_by_digest(&self, repository: &str, digest: &Digest) -> Result<()> {
        let path = format!("/v2/{}/manifests/{}", repository, digest);
        let resp = HttpSession::send_with_retry(&self.retry, &self.logger, "manifest delete", || {
            self.session.send(HttpMethod::Delete, &path, None, None)
        })
        .await?;
        match resp.status {
            202 => Ok(()),
            405 => Err(PusherError::DeletionDisabled),
            status => Err(PusherError::RegistryProtocolError { status, snippet: resp.body_snippet() }),
        }
    }

    /// Delete by tag: GET to resolve the digest, then delete by digest.
    pub async fn delete_by_tag(&self, repository: &str, tag: &str) -> Result<()> {
        let (_, digest) = self.get_with_digest(repository, tag).await?;
        self.delete_by_digest(repository, &digest).await
    }
}
