//! Random URL-safe identifiers for tasks, short links and stored filenames.

use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

/// Bytes of entropy behind a task id (11 characters).
pub const TASK_ID_BYTES: usize = 8;
/// Bytes of entropy behind a short link slug (8 characters).
pub const LINK_SLUG_BYTES: usize = 6;
/// Bytes of entropy behind the stored filename suffix (6 characters).
pub const FILENAME_SUFFIX_BYTES: usize = 4;

#[derive(Debug, Error)]
#[error("System random source unavailable")]
pub struct RandomError;

/// Base64url (unpadded) encoding of `num_bytes` bytes from the system RNG.
pub fn random_id(num_bytes: usize) -> Result<String, RandomError> {
    let mut buf = vec![0u8; num_bytes];
    SystemRandom::new().fill(&mut buf).map_err(|_| RandomError)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_id_lengths() {
        assert_eq!(random_id(LINK_SLUG_BYTES).unwrap().len(), 8);
        assert_eq!(random_id(FILENAME_SUFFIX_BYTES).unwrap().len(), 6);
        assert_eq!(random_id(TASK_ID_BYTES).unwrap().len(), 11);
    }

    #[test]
    fn test_random_id_is_url_safe() {
        for _ in 0..64 {
            let id = random_id(TASK_ID_BYTES).unwrap();
            assert!(id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }
}
