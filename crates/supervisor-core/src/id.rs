//! Random identifiers for services started without an explicit id

use rand::Rng;

use crate::error::{Error, Result};

/// Symbols identifiers are drawn from
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length used when the caller does not ask for one
pub const DEFAULT_ID_LENGTH: usize = 10;

/// Collisions tolerated before giving up
pub const DEFAULT_MAX_ATTEMPTS: usize = 64;

/// A random alphanumeric string of `length` symbols, empty for zero
pub fn random_id(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Draw identifiers until `taken` rejects none, at most `max_attempts` times
pub fn generate_unique<F>(length: usize, max_attempts: usize, taken: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    if length == 0 {
        return Ok(String::new());
    }

    for _ in 0..max_attempts {
        let candidate = random_id(length);
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }

    Err(Error::IdSpaceExhausted {
        length,
        attempts: max_attempts,
    })
}
