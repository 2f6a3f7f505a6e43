//! Push orchestrator (C7): composes C1-C5 into decode -> bounded blob
//! fan-out -> manifest PUT, grounded on `upload/parallel.rs`'s
//! `Semaphore` + `try_join_all` shape rather than the teacher's
//! over-scoped `concurrency/` module.

use crate::digest::Digest;
use crate::endpoint::{PushOptions, RegistryEndpoint};
use crate::error::{PusherError, Result};
use crate::image::ImageBundle;
use crate::logging::Logger;
use crate::model::{BlobRef, ManifestV2};
use crate::naming::{validate_reference, validate_repository};
use crate::registry::{BlobPayload, BlobProtocol, CatalogClient, ManifestProtocol};
use crate::transport::HttpSession;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;

pub struct Pusher {
    blob: BlobProtocol,
    manifest: ManifestProtocol,
    catalog: CatalogClient,
    options: PushOptions,
    logger: Logger,
}

struct BlobUnit {
    blob: BlobRef,
    payload: BlobPayload,
}

/// Partial-success outcome of `push_with_all_original_tags`: successes and
/// failures per tag, per §4.7/§7.
#[derive(Debug)]
pub struct MultiTagPushError {
    pub successes: Vec<(String, String, Digest)>,
    pub failures: Vec<(String, String, PusherError)>,
}

impl fmt::Display for MultiTagPushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "multi-tag push: {} succeeded, {} failed ({})",
            self.successes.len(),
            self.failures.len(),
            self.failures
                .iter()
                .map(|(repo, tag, e)| format!("{}:{} -> {}", repo, tag, e))
                .collect::<Vec<_>>()
                .join("; ")
        )
    }
}

impl std::error::Error for MultiTagPushError {}

impl Pusher {
    pub fn new(endpoint: &RegistryEndpoint, options: PushOptions, logger: Logger) -> Result<Self> {
        let session = HttpSession::new(endpoint)?;
        Ok(Pusher {
            blob: BlobProtocol::new(
                session.clone(),
                options.retry,
                logger.clone(),
                options.chunk_size,
                options.monolithic_threshold,
            ),
            manifest: ManifestProtocol::new(session.clone(), options.retry, logger.clone()),
            catalog: CatalogClient::new(session, options.retry, logger.clone()),
            options,
            logger,
        })
    }

    pub fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    pub fn manifest(&self) -> &ManifestProtocol {
        &self.manifest
    }

    pub fn blob(&self) -> &BlobProtocol {
        &self.blob
    }

    /// `push(bundle, repository, reference) -> manifest-digest` (§4.7).
    pub async fn push(&self, bundle: Arc<ImageBundle>, repository: &str, reference: &str) -> Result<Digest> {
        let (_tx, rx) = oneshot::channel::<()>();
        self.push_cancellable(bundle, repository, reference, rx).await
    }

    /// Same as `push`, but aborts all in-flight blob uploads and returns
    /// `Cancelled` if `cancel` resolves before the push finishes (§5).
    pub async fn push_cancellable(
        &self,
        bundle: Arc<ImageBundle>,
        repository: &str,
        reference: &str,
        cancel: oneshot::Receiver<()>,
    ) -> Result<Digest> {
        validate_repository(repository)?;
        validate_reference(reference)?;

        let units = self.unique_blobs(&bundle);
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_blobs));
        let mut tasks = JoinSet::new();
        for unit in units {
            let blob = self.blob.clone();
            let repository = repository.to_string();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                blob.ensure_uploaded(&repository, &unit.blob.digest, unit.blob.size, &unit.payload).await
            });
        }

        let drain = async {
            let mut first_err = None;
            while let Some(joined) = tasks.join_next().await {
                let outcome = match joined {
                    Ok(result) => result,
                    Err(e) => Err(PusherError::UploadFailed {
                        digest: "unknown".to_string(),
                        phase: crate::error::Phase::OpenSession,
                        cause: format!("blob task panicked: {}", e),
                    }),
                };
                if let Err(e) = outcome {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        };

        tokio::select! {
            result = drain => {
                result?;
            }
            _ = cancel => {
                // JoinHandle drop only detaches a task, it doesn't stop it;
                // JoinSet::abort_all actually cancels every outstanding
                // blob upload at its next suspension point (§5).
                tasks.abort_all();
                return Err(PusherError::Cancelled);
            }
        }

        let manifest = ManifestV2::new(&bundle.config, &bundle.layers.iter().map(|l| l.blob.clone()).collect::<Vec<_>>());
        self.manifest.put(repository, reference, &manifest).await
    }

    /// `push_with_first_original_tag(bundle)` (§4.7 variant 1).
    pub async fn push_with_first_original_tag(&self, bundle: Arc<ImageBundle>) -> Result<Digest> {
        let first = bundle.original_tags.first().ok_or(PusherError::NoOriginalTag)?.clone();
        let (repository, reference) = split_repo_tag(&first);
        self.push(bundle, &repository, &reference).await
    }

    /// `push_with_all_original_tags(bundle)` (§4.7 variant 2): uploads
    /// blobs once, then PUTs the manifest under every original tag.
    pub async fn push_with_all_original_tags(
        &self,
        bundle: Arc<ImageBundle>,
    ) -> std::result::Result<Vec<(String, String, Digest)>, MultiTagPushError> {
        if bundle.original_tags.is_empty() {
            return Err(MultiTagPushError {
                successes: vec![],
                failures: vec![("*".to_string(), "*".to_string(), PusherError::NoOriginalTag)],
            });
        }

        let units = self.unique_blobs(&bundle);
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_blobs));
        let handles: Vec<_> = units
            .into_iter()
            .map(|unit| {
                let blob = self.blob.clone();
                let repository = split_repo_tag(&bundle.original_tags[0]).0;
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                    blob.ensure_uploaded(&repository, &unit.blob.digest, unit.blob.size, &unit.payload).await
                })
            })
            .collect();

        let results = match try_join_all(handles).await {
            Ok(results) => results,
            Err(e) => {
                return Err(MultiTagPushError {
                    successes: vec![],
                    failures: vec![("*".to_string(), "*".to_string(), PusherError::UploadFailed {
                        digest: "unknown".to_string(),
                        phase: crate::error::Phase::OpenSession,
                        cause: format!("blob task panicked: {}", e),
                    })],
                })
            }
        };
        if let Some(err) = results.into_iter().find_map(|r| r.err()) {
            return Err(MultiTagPushError { successes: vec![], failures: vec![("*".to_string(), "*".to_string(), err)] });
        }

        let manifest = ManifestV2::new(&bundle.config, &bundle.layers.iter().map(|l| l.blob.clone()).collect::<Vec<_>>());
        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for tag in &bundle.original_tags {
            let (repository, reference) = split_repo_tag(tag);
            if let Err(e) = validate_repository(&repository).and(validate_reference(&reference)) {
                failures.push((repository, reference, e));
                continue;
            }
            match self.manifest.put(&repository, &reference, &manifest).await {
                Ok(digest) => successes.push((repository, reference, digest)),
                Err(e) => {
                    self.logger.warning(&format!("manifest put for tag {} failed: {}", tag, e));
                    failures.push((repository, reference, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(successes)
        } else {
            Err(MultiTagPushError { successes, failures })
        }
    }

    fn unique_blobs(&self, bundle: &Arc<ImageBundle>) -> Vec<BlobUnit> {
        let mut seen: HashMap<String, ()> = HashMap::new();
        let mut units = Vec::new();

        let config_payload = BlobPayload::InMemory(Arc::new(bundle.config_bytes.clone()));
        seen.insert(bundle.config.digest.to_string(), ());
        units.push(BlobUnit { blob: bundle.config.clone(), payload: config_payload });

        for layer in &bundle.layers {
            let key = layer.blob.digest.to_string();
            if seen.insert(key, ()).is_some() {
                continue;
            }
            units.push(BlobUnit {
                blob: layer.blob.clone(),
                payload: BlobPayload::TarLayer { bundle: bundle.clone(), layer: layer.clone() },
            });
        }
        units
    }
}

/// Splits `"repo:tag"` on the last `:`; tag defaults to `latest`.
fn split_repo_tag(original_tag: &str) -> (String, String) {
    match original_tag.rsplit_once(':') {
        Some((repo, tag)) => (repo.to_string(), tag.to_string()),
        None => (original_tag.to_string(), "latest".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_repo_and_tag() {
        assert_eq!(split_repo_tag("app:v1"), ("app".to_string(), "v1".to_string()));
        assert_eq!(split_repo_tag("app"), ("app".to_string(), "latest".to_string()));
        assert_eq!(split_repo_tag("my.org/team/app:v1"), ("my.org/team/app".to_string(), "v1".to_string()));
    }
}
