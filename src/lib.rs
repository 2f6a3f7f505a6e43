//! A client library that pushes container-export tar archives (the output
//! of the standard `docker save`-style export) into an unauthenticated v2
//! image registry, and performs the handful of read/delete operations
//! that share its protocol engine.
//!
//! The core exposes five operations: [`push::Pusher::push`] and its tag
//! variants, blob existence check ([`registry::BlobProtocol::exists`]),
//! manifest get/put/delete ([`registry::ManifestProtocol`]), and
//! repository/tag listing ([`registry::CatalogClient`]). It does not parse
//! CLI flags, load configuration, render progress output, or authenticate
//! — those are a caller's concern.
//!
//! ## Example
//!
//! ```no_run
//! use registry_pusher::{Digest, Pusher, PushOptions, RegistryEndpoint, Logger};
//! use registry_pusher::image::ImageBundle;
//! use std::sync::Arc;
//!
//! # async fn run() -> registry_pusher::Result<Digest> {
//! let bundle = Arc::new(ImageBundle::decode("myimage.tar").await?);
//! let endpoint = RegistryEndpoint::new("http://localhost:5000");
//! let pusher = Pusher::new(&endpoint, PushOptions::default(), Logger::new_quiet())?;
//! pusher.push_with_first_original_tag(bundle).await
//! # }
//! ```

pub mod digest;
pub mod endpoint;
pub mod error;
pub mod image;
pub mod logging;
pub mod model;
pub mod naming;
pub mod push;
pub mod registry;
pub mod retry;
pub mod transport;

pub use digest::Digest;
pub use endpoint::{PushOptions, RegistryEndpoint};
pub use error::{PusherError, Result};
pub use logging::Logger;
pub use model::{BlobRef, LayerRef, ManifestV2};
pub use push::{MultiTagPushError, Pusher};
pub use retry::RetryPolicy;
