//! Overlapping character chunks for indexing.

use text_splitter::{ChunkConfig, TextSplitter};

use crate::error::{BujjiError, Result};

pub const CHUNK_SIZE: usize = 500;
pub const CHUNK_OVERLAP: usize = 50;

/// Split `text` into chunks of at most [`CHUNK_SIZE`] characters that
/// overlap by up to [`CHUNK_OVERLAP`]. Blank chunks are dropped.
pub fn split_text(text: &str) -> Result<Vec<String>> {
    split_with(text, CHUNK_SIZE, CHUNK_OVERLAP)
}

pub fn split_with(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    let config = ChunkConfig::new(size)
        .with_overlap(overlap)
        .map_err(|e| BujjiError::InvalidArgument(format!("chunk config: {e}")))?;
    let splitter = TextSplitter::new(config);
    Ok(splitter
        .chunks(text)
        .filter(|chunk| !chunk.trim().is_empty())
        .map(str::to_string)
        .collect())
}
