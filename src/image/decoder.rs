//! Parses `manifest.json` out of a container-export tar, locates the
//! config JSON and ordered layer blobs, and reports the original
//! `repo:tag` list (§4.2).
//!
//! The archive is scanned twice: once to index every entry's byte offset
//! and declared size (cheap, no hashing), and once more to read exactly
//! the entries `manifest.json` names, seeking straight to each one's
//! offset rather than rescanning from the start per blob. This is a
//! generalization of the teacher's "scan the whole tar, collect a path ->
//! bytes map" pattern (`image/parser.rs`, `registry/tar_utils.rs`) that
//! keeps the same two-phase shape but records offsets so layers can be
//! reopened by seeking instead of rereading everything on every retry.

use crate::digest::Digest;
use crate::error::{PusherError, Result};
use crate::model::{BlobRef, LayerRef, CONFIG_MEDIA_TYPE, LAYER_GZIP_MEDIA_TYPE, LAYER_TAR_MEDIA_TYPE};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Clone, serde::Deserialize)]
struct ManifestJsonEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
    #[serde(rename = "RepoTags")]
    #[serde(default)]
    repo_tags: Vec<String>,
}

struct IndexedEntry {
    offset: u64,
    size: u64,
}

/// Output of C2: config blob + bytes, ordered layers, and the original
/// tags a push can address the result under.
#[derive(Debug)]
pub struct ImageBundle {
    pub config: BlobRef,
    pub config_bytes: Vec<u8>,
    pub layers: Vec<LayerRef>,
    pub original_tags: Vec<String>,
    source_path: PathBuf,
}

fn normalize_entry_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    s.strip_prefix("./").unwrap_or(&s).to_string()
}

impl ImageBundle {
    /// Decodes the tar at `tar_path`. Runs synchronously (it is intended
    /// to be called via `decode_async`, which offloads it to a blocking
    /// worker per §5's "blocking tar I/O must not stall other in-flight
    /// uploads").
    pub fn decode_sync(tar_path: impl AsRef<Path>) -> Result<Self> {
        let tar_path = tar_path.as_ref().to_path_buf();
        let index = Self::index_entries(&tar_path)?;

        let manifest_entry = index
            .get("manifest.json")
            .ok_or_else(|| PusherError::InvalidImageTar("manifest.json missing".to_string()))?;
        let manifest_bytes = Self::read_at(&tar_path, manifest_entry.offset, manifest_entry.size)?;
        let manifest_array: Vec<ManifestJsonEntry> = serde_json::from_slice(&manifest_bytes)?;
        if manifest_array.is_empty() {
            return Err(PusherError::InvalidImageTar("manifest.json is an empty array".to_string()));
        }
        let canonical = &manifest_array[0];

        let config_entry = index.get(canonical.config.as_str()).ok_or_else(|| {
            PusherError::InvalidImageTar(format!("config entry missing: {}", canonical.config))
        })?;
        let config_bytes = Self::read_at(&tar_path, config_entry.offset, config_entry.size)?;
        let config = BlobRef {
            digest: Digest::compute(&config_bytes),
            size: config_bytes.len() as u64,
            media_type: CONFIG_MEDIA_TYPE.to_string(),
        };

        let mut layers = Vec::with_capacity(canonical.layers.len());
        for layer_path in &canonical.layers {
            let entry = index
                .get(layer_path.as_str())
                .ok_or_else(|| PusherError::InvalidImageTar(format!("layer entry missing: {}", layer_path)))?;
            let digest = Self::hash_at(&tar_path, entry.offset, entry.size)?;
            let media_type = if layer_path.ends_with(".tar.gz") || layer_path.ends_with(".tgz") {
                LAYER_GZIP_MEDIA_TYPE
            } else {
                LAYER_TAR_MEDIA_TYPE
            }
            .to_string();
            layers.push(LayerRef {
                blob: BlobRef { digest, size: entry.size, media_type },
                raw_offset: entry.offset,
                entry_path: layer_path.clone(),
            });
        }

        let mut original_tags = Vec::new();
        for entry in &manifest_array {
            for tag in &entry.repo_tags {
                if !original_tags.contains(tag) {
                    original_tags.push(tag.clone());
                }
            }
        }

        Ok(ImageBundle { config, config_bytes, layers, original_tags, source_path: tar_path })
    }

    /// Async entry point: offloads the blocking tar scan to a worker so it
    /// cannot stall other in-flight uploads sharing the same runtime.
    pub async fn decode(tar_path: impl AsRef<Path> + Send + 'static) -> Result<Self> {
        tokio::task::spawn_blocking(move || ImageBundle::decode_sync(tar_path))
            .await
            .map_err(|e| PusherError::TarReadError(format!("decode task panicked: {}", e)))?
    }

    /// Reopens a layer's bytes as a finite, single-pass stream by seeking
    /// to its recorded offset, per §9's "factory that produces a finite
    /// byte stream on demand". Safe to call once per upload attempt.
    pub async fn open_layer(&self, layer: &LayerRef) -> Result<impl AsyncRead + Unpin> {
        let path = self.source_path.clone();
        let offset = layer.raw_offset;
        let std_file = tokio::task::spawn_blocking(move || -> Result<File> {
            let mut file = File::open(&path)?;
            file.seek(SeekFrom::Start(offset))?;
            Ok(file)
        })
        .await
        .map_err(|e| PusherError::TarReadError(format!("open_layer task panicked: {}", e)))??;
        let tokio_file = tokio::fs::File::from_std(std_file);
        Ok(tokio_file.take(layer.blob.size))
    }

    fn index_entries(tar_path: &Path) -> Result<HashMap<String, IndexedEntry>> {
        let file = File::open(tar_path)?;
        let mut archive = tar::Archive::new(file);
        let mut index = HashMap::new();
        for entry in archive.entries()? {
            let entry = entry?;
            let offset = entry.raw_file_position();
            let size = entry.header().size()?;
            let path = normalize_entry_path(&entry.path()?);
            index.insert(path, IndexedEntry { offset, size });
        }
        Ok(index)
    }

    fn read_at(tar_path: &Path, offset: u64, size: u64) -> Result<Vec<u8>> {
        let mut file = File::open(tar_path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn hash_at(tar_path: &Path, offset: u64, size: u64) -> Result<Digest> {
        use sha2::{Digest as _, Sha256};
        let mut file = File::open(tar_path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut hasher = Sha256::new();
        let mut remaining = size;
        let mut buf = [0u8; 64 * 1024];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            file.read_exact(&mut buf[..want])?;
            hasher.update(&buf[..want]);
            remaining -= want as u64;
        }
        let hex = hex::encode(hasher.finalize());
        Digest::format("sha256", &hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tar::{Builder, Header};

    fn build_test_tar(config_json: &[u8], layer_bytes: &[u8], repo_tags: Vec<String>) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut builder = Builder::new(file.reopen().unwrap());

        let manifest = serde_json::json!([{
            "Config": "config.json",
            "RepoTags": repo_tags,
            "Layers": ["layer.tar"],
        }]);
        let manifest_bytes = serde_json::to_vec(&manifest).unwrap();
        append(&mut builder, "manifest.json", &manifest_bytes);
        append(&mut builder, "config.json", config_json);
        append(&mut builder, "layer.tar", layer_bytes);
        builder.finish().unwrap();
        file
    }

    fn append(builder: &mut Builder<File>, path: &str, bytes: &[u8]) {
        let mut header = Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(bytes.len() as u64);
        header.set_cksum();
        builder.append(&header, bytes).unwrap();
    }

    #[test]
    fn decodes_single_layer_bundle() {
        let config = br#"{"architecture":"amd64","os":"linux"}"#;
        let layer = b"test layer bytes\n";
        let tar = build_test_tar(config, layer, vec!["app:latest".to_string()]);

        let bundle = ImageBundle::decode_sync(tar.path()).unwrap();
        assert_eq!(bundle.config.digest, Digest::compute(config));
        assert_eq!(bundle.config_bytes, config);
        assert_eq!(bundle.layers.len(), 1);
        assert_eq!(bundle.layers[0].blob.digest, Digest::compute(layer));
        assert_eq!(bundle.layers[0].blob.size, layer.len() as u64);
        assert_eq!(bundle.original_tags, vec!["app:latest".to_string()]);
    }

    #[test]
    fn dedups_repo_tags_preserving_first_occurrence() {
        let config = b"{}";
        let layer = b"x";
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut builder = Builder::new(file.reopen().unwrap());
        let manifest = serde_json::json!([
            {"Config": "config.json", "RepoTags": ["app:v1", "app:latest"], "Layers": ["layer.tar"]},
            {"Config": "config.json", "RepoTags": ["app:latest", "app:v2"], "Layers": ["layer.tar"]},
        ]);
        append(&mut builder, "manifest.json", &serde_json::to_vec(&manifest).unwrap());
        append(&mut builder, "config.json", config);
        append(&mut builder, "layer.tar", layer);
        builder.finish().unwrap();

        let bundle = ImageBundle::decode_sync(file.path()).unwrap();
        assert_eq!(bundle.original_tags, vec!["app:v1".to_string(), "app:latest".to_string(), "app:v2".to_string()]);
    }

    #[test]
    fn missing_manifest_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut builder = Builder::new(file.reopen().unwrap());
        append(&mut builder, "config.json", b"{}");
        builder.finish().unwrap();
        let err = ImageBundle::decode_sync(file.path()).unwrap_err();
        assert!(matches!(err, PusherError::InvalidImageTar(_)));
    }

    #[test]
    fn missing_layer_entry_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut builder = Builder::new(file.reopen().unwrap());
        let manifest = serde_json::json!([{
            "Config": "config.json",
            "RepoTags": [],
            "Layers": ["blobs/sha256/deadbeef"],
        }]);
        append(&mut builder, "manifest.json", &serde_json::to_vec(&manifest).unwrap());
        append(&mut builder, "config.json", b"{}");
        builder.finish().unwrap();

        let err = ImageBundle::decode_sync(file.path()).unwrap_err();
        match err {
            PusherError::InvalidImageTar(detail) => assert!(detail.contains("blobs/sha256/deadbeef")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn open_layer_reopens_exact_bytes() {
        let layer = b"test layer bytes\n";
        let tar = build_test_tar(b"{}", layer, vec![]);
        let bundle = ImageBundle::decode_sync(tar.path()).unwrap();
        let mut reader = bundle.open_layer(&bundle.layers[0]).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, layer);
    }
}
