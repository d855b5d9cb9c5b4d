//! Incremental UTF-8 decoding
//!
//! Reply bodies arrive in arbitrary byte chunks; a multi-byte character can
//! straddle two of them. [`Utf8StreamDecoder`] holds back an incomplete
//! trailing sequence until the rest arrives.

use thiserror::Error;

/// Reply bytes that are not UTF-8
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A byte sequence that can never be valid UTF-8
    #[error("invalid UTF-8 sequence at byte {offset} of the reply")]
    InvalidSequence {
        /// Offset from the start of the reply
        offset: usize,
    },

    /// The reply ended in the middle of a character
    #[error("reply ended inside a multi-byte character ({pending} byte(s) pending)")]
    Truncated {
        /// Bytes still held back
        pending: usize,
    },
}

/// Streaming UTF-8 decoder
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    /// Incomplete trailing sequence from the previous chunk
    pending: Vec<u8>,
    /// Bytes already decoded, for error offsets
    consumed: usize,
}

impl Utf8StreamDecoder {
    /// Create a decoder with nothing buffered
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, returning every complete character it finishes
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String, DecodeError> {
        self.pending.extend_from_slice(chunk);

        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_some() => {
                return Err(DecodeError::InvalidSequence {
                    offset: self.consumed + e.valid_up_to(),
                });
            }
            Err(e) => e.valid_up_to(),
        };

        let rest = self.pending.split_off(valid);
        let complete = std::mem::replace(&mut self.pending, rest);
        self.consumed += complete.len();

        String::from_utf8(complete).map_err(|e| DecodeError::InvalidSequence {
            offset: self.consumed + e.utf8_error().valid_up_to(),
        })
    }

    /// Whether an incomplete sequence is held back
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// End of stream: anything still held back is an error
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Truncated {
                pending: self.pending.len(),
            })
        }
    }
}
