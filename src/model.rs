//! Value types shared across the decoder, protocol, and orchestrator (C2/C3 data model)

use crate::digest::Digest;
use serde::{Deserialize, Serialize};

/// An immutable content-addressed reference, constructed during tar decode
/// and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub digest: Digest,
    pub size: u64,
    pub media_type: String,
}

/// A blob plus the locator C2 uses to find its bytes inside the tar.
#[derive(Debug, Clone)]
pub struct LayerRef {
    pub blob: BlobRef,
    /// Byte offset of the entry's content within the tar file, recorded
    /// during the header scan so the decoder can reopen the entry by
    /// seeking rather than rescanning the whole archive.
    pub(crate) raw_offset: u64,
    pub(crate) entry_path: String,
}

/// One wire-form entry inside a schema-2 manifest's `config`/`layers` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestBlobRef {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub size: u64,
    pub digest: String,
}

impl From<&BlobRef> for ManifestBlobRef {
    fn from(blob: &BlobRef) -> Self {
        ManifestBlobRef {
            media_type: blob.media_type.clone(),
            size: blob.size,
            digest: blob.digest.to_string(),
        }
    }
}

pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";
pub const LAYER_GZIP_MEDIA_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const LAYER_TAR_MEDIA_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar";

/// Schema-2 manifest. Field declaration order is the wire order: serde_json
/// serializes struct fields in declaration order, which is what makes one
/// serialization path (`serde_json::to_vec`) produce the exact bytes both
/// sent to the registry and hashed for the manifest digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestV2 {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub config: ManifestBlobRef,
    pub layers: Vec<ManifestBlobRef>,
}

impl ManifestV2 {
    pub fn new(config: &BlobRef, layers: &[BlobRef]) -> Self {
        ManifestV2 {
            schema_version: 2,
            media_type: MANIFEST_V2_MEDIA_TYPE.to_string(),
            config: config.into(),
            layers: layers.iter().map(Into::into).collect(),
        }
    }

    /// The exact bytes sent on the wire and hashed for the manifest digest.
    /// Never use `to_string_pretty` here: the digest depends on these bytes
    /// verbatim.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("ManifestV2 always serializes")
    }

    pub fn digest(&self) -> Digest {
        Digest::compute(&self.to_canonical_bytes())
    }
}
