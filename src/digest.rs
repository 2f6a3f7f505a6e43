//! Content digests (C1)

use crate::error::{PusherError, Result};
use sha2::{Digest as _, Sha256};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

const SHA256_HEX_LEN: usize = 64;

/// A canonical content identifier, `"<algo>:<lowercase-hex>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algo: String,
    hex: String,
}

impl Digest {
    /// Builds a digest from an algorithm name and hex string, validating
    /// that the hex is lowercase and matches the algorithm's fixed length.
    pub fn format(algo: &str, hex: &str) -> Result<Self> {
        if algo != "sha256" {
            return Err(PusherError::Validation(format!("unsupported digest algorithm: {}", algo)));
        }
        if hex.len() != SHA256_HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(PusherError::Validation(format!("malformed sha256 hex: {}", hex)));
        }
        Ok(Digest { algo: algo.to_string(), hex: hex.to_string() })
    }

    /// Computes the sha256 digest of an in-memory byte slice.
    pub fn compute(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let hex = hex::encode(hasher.finalize());
        Digest { algo: "sha256".to_string(), hex }
    }

    /// Hashes a lazy byte sequence without materializing it, returning the
    /// digest and the total number of bytes streamed.
    pub async fn compute_stream<R: AsyncRead + Unpin>(mut reader: R) -> Result<(Self, u64)> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        let mut total: u64 = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        let hex = hex::encode(hasher.finalize());
        Ok((Digest { algo: "sha256".to_string(), hex }, total))
    }

    /// Parses `"sha256:<hex>"`, failing `InvalidDigest`-shaped validation
    /// errors on any other shape.
    pub fn parse(s: &str) -> Result<Self> {
        let (algo, hex) = s
            .split_once(':')
            .ok_or_else(|| PusherError::Validation(format!("not a digest: {}", s)))?;
        Digest::format(algo, hex)
    }

    pub fn algo(&self) -> &str {
        &self.algo
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// True iff the hash of `bytes` equals this digest's hex portion.
    pub fn verifies(&self, bytes: &[u8]) -> bool {
        Digest::compute(bytes) == *self
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algo, self.hex)
    }
}
