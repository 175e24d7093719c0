//! Binary images read fully into memory before loading

use std::path::Path;

use sha2::{Digest, Sha256};

/// Raw bytes of a compiled component module
///
/// The file is read in one call and closed before anything is compiled,
/// so the loaded module never holds a handle on the file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryImage {
    bytes: Vec<u8>,
}

impl BinaryImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Read the entire file at `path`
    pub fn read(path: &Path) -> std::io::Result<Self> {
        std::fs::read(path).map(Self::new)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the image, used to detect unchanged rebuilds
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for BinaryImage {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}
