//! Registry protocol operations (C4/C5/C6), sharing one HTTP session per
//! endpoint (C3).

pub mod blob;
pub mod catalog;
pub mod manifest;

pub use blob::{BlobPayload, BlobProtocol};
pub use catalog::CatalogClient;
pub use manifest::ManifestProtocol;
