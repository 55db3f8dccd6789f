//! Fixed-size text chunking with exact character overlap.
//!
//! Chunk boundaries are counted in characters (Unicode scalar values), so
//! the same text always produces the same spans regardless of encoding
//! width. Consecutive chunks share exactly `overlap` characters: dropping
//! the first `overlap` characters of every chunk after the first and
//! concatenating the rest reconstructs the original text.

use quarry_core::{AppError, AppResult};

/// One chunk of a document's normalized text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position of the chunk within the document, starting at 0.
    pub seq: u32,
    /// Character offset of the chunk start.
    pub start: usize,
    /// Character offset one past the chunk end.
    pub end: usize,
    /// Characters shared with the preceding chunk (0 for the first).
    pub overlap: usize,
    pub text: String,
}

/// Splits text into overlapping fixed-size chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Creates a chunker, rejecting sizes that cannot make progress.
    pub fn new(chunk_size: usize, overlap: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::InvalidConfiguration(
                "Chunk size must be positive".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(AppError::InvalidConfiguration(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Returns a lazy iterator over the chunks of `text`.
    ///
    /// The iterator holds no chunk state beyond the current position, so
    /// calling this again restarts from the beginning. Empty text yields
    /// no chunks; text shorter than the chunk size yields exactly one.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            byte_start: 0,
            char_start: 0,
            seq: 0,
            done: text.is_empty(),
        }
    }
}

/// Lazy chunk iterator. Each `next` scans at most one chunk's worth of
/// characters forward from the current position.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    chunk_size: usize,
    overlap: usize,
    byte_start: usize,
    char_start: usize,
    seq: u32,
    done: bool,
}

impl<'a> Chunks<'a> {
    /// Byte offset of the character `count` characters past `from`,
    /// clamped to the end of the text.
    fn advance_chars(&self, from: usize, count: usize) -> usize {
        let mut taken = 0;
        for (offset, _) in self.text[from..].char_indices() {
            if taken == count {
                return from + offset;
            }
            taken += 1;
        }
        self.text.len()
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let byte_end = self.advance_chars(self.byte_start, self.chunk_size);
        let char_count = self.text[self.byte_start..byte_end].chars().count();

        let chunk = Chunk {
            seq: self.seq,
            start: self.char_start,
            end: self.char_start + char_count,
            overlap: if self.seq == 0 { 0 } else { self.overlap },
            text: self.text[self.byte_start..byte_end].to_string(),
        };

        // A chunk that reaches the end of the text is the last one, even
        // when another stride would still fit. This keeps the tail from
        // being re-emitted as a shorter duplicate.
        if byte_end >= self.text.len() {
            self.done = true;
        } else {
            let stride = self.chunk_size - self.overlap;
            self.byte_start = self.advance_chars(self.byte_start, stride);
            self.char_start += stride;
        }

        self.seq += 1;
        Some(chunk)
    }
}
