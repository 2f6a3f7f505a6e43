//! Catalog / tag listing (C6). No repository not present in the teacher's
//! own surface (`yorelog-docker-image-pusher` never calls `_catalog`);
//! grounded instead on the wire shape `getnora-io-nora/nora-registry`'s
//! `src/registry/docker.rs` actually serves, and on the teacher's
//! `RepositoryOperations::list_tags` for the tags half.

use crate::error::{PusherError, Result};
use crate::logging::Logger;
use crate::retry::RetryPolicy;
use crate::transport::{HttpMethod, HttpSession};
use serde::Deserialize;

#[derive(Clone)]
pub struct CatalogClient {
    session: HttpSession,
    retry: RetryPolicy,
    logger: Logger,
}

#[derive(Deserialize)]
struct CatalogResponse {
    repositories: Vec<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl CatalogClient {
    pub fn new(session: HttpSession, retry: RetryPolicy, logger: Logger) -> Self {
        CatalogClient { session, retry, logger }
    }

    /// `GET /v2/_catalog` -> `{repositories: [...]}`. Pagination via
    /// `?n=&last=`/`Link` is not implemented: §4.6 marks it optional for
    /// conformance and the targeted registries in this corpus don't page.
    pub async fn list_repositories(&self) -> Result<Vec<String>> {
        let resp = HttpSession::send_with_retry(&self.retry, &self.logger, "catalog list", || {
            self.session.send(HttpMethod::Get, "/v2/_catalog", None, None)
        })
        .await?;
        if resp.status != 200 {
            return Err(PusherError::RegistryProtocolError { status: resp.status, snippet: resp.body_snippet() });
        }
        let parsed: CatalogResponse = serde_json::from_slice(&resp.body)?;
        Ok(parsed.repositories)
    }

    /// `GET /v2/{name}/tags/list` -> `{tags: [...] | null}`, normalizing a
    /// null/absent `tags` to the empty sequence.
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let path = format!("/v2/{}/tags/list", repository);
        let resp = HttpSession::send_with_retry(&self.retry, &self.logger, "tags list", || {
            self.session.send(HttpMethod::Get, &path, None, None)
        })
        .await?;
        if resp.status != 200 {
            return Err(PusherError::RegistryProtocolError { status: resp.status, snippet: resp.body_snippet() });
        }
        let parsed: TagsResponse = serde_json::from_slice(&resp.body)?;
        Ok(parsed.tags.unwrap_or_default())
    }
}
