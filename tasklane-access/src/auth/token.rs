/// Invitation token utilities
///
/// These work in conjunction with `models::invitation`, which stores only the
/// digest produced here.
///
/// # Security
///
/// - **Entropy**: 32 bytes from the operating system CSPRNG (256 bits)
/// - **Format**: lowercase hex, 64 characters
/// - **Storage**: tokens are hashed with SHA-256 before storage
/// - **Lookup**: by digest; the plaintext never reaches storage
///
/// # Example
///
/// ```
/// use tasklane_access::auth::token::{generate_invitation_token, hash_token, validate_token_format};
///
/// let (token, hash) = generate_invitation_token();
/// assert_eq!(token.len(), 64);
/// assert!(validate_token_format(&token));
/// assert_eq!(hash, hash_token(&token));
/// ```

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Number of random bytes in a token
const TOKEN_BYTES: usize = 32;

/// Length of a token once hex encoded
pub const TOKEN_LENGTH: usize = TOKEN_BYTES * 2;

/// Generates a new invitation token
///
/// # Returns
///
/// Tuple of (plaintext_token, sha256_hash)
pub fn generate_invitation_token() -> (String, String) {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let hash = hash_token(&token);

    (token, hash)
}

/// Hashes a token using SHA-256
///
/// Returns the hex-encoded digest (64 characters).
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Checks that `token` looks like something [`generate_invitation_token`] produced
///
/// Lets callers reject garbage without a storage round-trip.
///
/// ```
/// use tasklane_access::auth::token::validate_token_format;
///
/// assert!(validate_token_format(&"a1".repeat(32)));
/// assert!(!validate_token_format("short"));
/// assert!(!validate_token_format(&"A1".repeat(32)));
/// ```
pub fn validate_token_format(token: &str) -> bool {
    token.len() == TOKEN_LENGTH
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_invitation_token() {
        let (token, hash) = generate_invitation_token();

        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(validate_token_format(&token));
        assert_eq!(hash.len(), 64);
        assert_ne!(token, hash);
    }

    #[test]
    fn test_tokens_are_unique() {
        let mut tokens = HashSet::new();
        for _ in 0..1000 {
            let (token, _) = generate_invitation_token();
            assert!(tokens.insert(token));
        }
    }

    #[test]
    fn test_hash_token_deterministic() {
        let hash1 = hash_token("abc");
        let hash2 = hash_token("abc");
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash_token("abd"));
        // Known SHA-256 of "abc"
        assert_eq!(
            hash1,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_validate_token_format() {
        assert!(validate_token_format(&"0123456789abcdef".repeat(4)));
        assert!(!validate_token_format(&"0123456789abcdef".repeat(3)));
        assert!(!validate_token_format(&"0123456789ABCDEF".repeat(4)));
        assert!(!validate_token_format(&"g".repeat(64)));
        assert!(!validate_token_format(""));
    }
}
