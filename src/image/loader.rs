//! LC-3 object image format.
//!
//! An image is a flat sequence of big-endian 16-bit words:
//! - word 0: origin, the address the payload is loaded at
//! - words 1..: payload, copied verbatim starting at the origin
//!
//! There is no header, magic number, or length field.

use crate::cpu::memory::Memory;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

/// A parsed object image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Load address of the first payload word.
    pub origin: u16,
    /// Payload words in host order.
    pub words: Vec<u16>,
}

impl Image {
    /// Create an image from its parts.
    pub fn new(origin: u16, words: Vec<u16>) -> Self {
        Self { origin, words }
    }

    /// Parse an image from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() % 2 != 0 {
            return Err(LoadError::OddLength(bytes.len()));
        }

        let mut words = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));

        let origin = words.next().ok_or(LoadError::MissingOrigin)?;

        Ok(Self {
            origin,
            words: words.collect(),
        })
    }

    /// Read a whole image from `reader`.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, LoadError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Load an image file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let file = File::open(path.as_ref())?;
        Self::read_from(file)
    }

    /// Serialize back to the on-disk format.
    pub fn to_bytes(&self) -> Vec<u8> {
        std::iter::once(self.origin)
            .chain(self.words.iter().copied())
            .flat_map(u16::to_be_bytes)
            .collect()
    }

    /// Number of payload words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Copy the payload into memory at the origin.
    ///
    /// Words that would land beyond 0xFFFF are silently dropped. Returns the
    /// number of words written.
    pub fn install(&self, mem: &mut Memory) -> usize {
        let written = mem.load(self.origin, &self.words);

        log::info!(
            "loaded {} words at x{:04X}",
            written,
            self.origin
        );
        if written < self.words.len() {
            log::warn!(
                "image truncated at xFFFF: {} of {} words dropped",
                self.words.len() - written,
                self.words.len()
            );
        }

        written
    }
}

/// Errors that can occur while loading an image.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unreadable image: {0}")]
    Unreadable(#[from] io::Error),

    #[error("image is {0} bytes long, not a whole number of 16-bit words")]
    OddLength(usize),

    #[error("image is empty, expected an origin word")]
    MissingOrigin,
}
