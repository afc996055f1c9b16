use crate::{GenerationError, Generator};
use rand::rngs::OsRng;
use rand::RngCore;
use waypoint_core::ShortCode;

/// The 62 characters a generated code may contain.
pub const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default number of characters in a generated code.
pub const DEFAULT_LENGTH: usize = 6;

// Largest multiple of 62 that fits in a byte; bytes at or above it are
// rejected so every character stays equally likely.
const REJECTION_BOUND: u8 = (u8::MAX / 62) * 62;

/// Generates fixed-length codes from [`ALPHABET`] using the operating
/// system's CSPRNG.
///
/// Holds no mutable state, so one instance can be shared freely.
#[derive(Debug, Clone, Copy)]
pub struct RandomGenerator {
    length: usize,
}

impl RandomGenerator {
    /// Creates a generator producing codes of `length` characters.
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_LENGTH)
    }
}

impl Generator for RandomGenerator {
    fn generate(&self) -> Result<ShortCode, GenerationError> {
        let mut code = String::with_capacity(self.length);
        let mut buf = [0u8; 32];

        while code.len() < self.length {
            OsRng
                .try_fill_bytes(&mut buf)
                .map_err(|e| GenerationError(e.to_string()))?;

            for byte in buf.iter().copied().filter(|b| *b < REJECTION_BOUND) {
                if code.len() == self.length {
                    break;
                }
                code.push(ALPHABET[usize::from(byte % 62)] as char);
            }
        }

        Ok(ShortCode::new_unchecked(code))
    }
}
