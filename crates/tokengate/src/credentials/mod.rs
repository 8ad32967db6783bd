//! Credential store: single-use staff tokens bound to one identity.
//!
//! Token format: `b64(identity).b64(issued_at).secret`. Only the secret
//! carries security weight; the first two segments are diagnostic hints and
//! are never parsed for authorization.

mod file;
mod redis_store;

pub use self::file::FileCredentialStore;
pub use self::redis_store::RedisCredentialStore;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

use tokengate_common::constants::TOKEN_SECRET_BYTES;
use tokengate_common::{GateError, UserId};

/// Durable mapping of outstanding tokens to the identity allowed to redeem them
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Mint and persist a token for `identity`
    async fn issue(&self, identity: UserId) -> Result<String, GateError>;

    /// Consume `token` if it is bound to `claimed`.
    ///
    /// Returns `Ok(true)` only after the removal is durable. Two concurrent
    /// calls with the same token never both return `Ok(true)`.
    async fn redeem(&self, token: &str, claimed: UserId) -> Result<bool, GateError>;

    /// Put a consumed token back (the grant that followed it failed)
    async fn restore(&self, token: &str, identity: UserId) -> Result<(), GateError>;

    /// Number of outstanding tokens
    async fn len(&self) -> Result<u64, GateError>;

    /// Backend health (used by the readiness probe)
    async fn ping(&self) -> bool {
        true
    }
}

/// Generate a fresh token for `identity`
pub fn generate_token(identity: UserId, issued_at: i64) -> String {
    let mut secret = [0u8; TOKEN_SECRET_BYTES];
    rand::rng().fill_bytes(&mut secret);

    let p1 = URL_SAFE_NO_PAD.encode(identity.to_string());
    let p2 = URL_SAFE_NO_PAD.encode(issued_at.to_string());
    let p3 = URL_SAFE_NO_PAD.encode(secret);
    format!("{p1}.{p2}.{p3}")
}

/// Short, non-reversible token identifier safe to put in logs
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_has_three_segments() {
        let token = generate_token(UserId::new(1234), 1_700_000_000);
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(URL_SAFE_NO_PAD.decode(parts[0]).unwrap(), b"1234");
        assert_eq!(URL_SAFE_NO_PAD.decode(parts[1]).unwrap(), b"1700000000");
        assert_eq!(URL_SAFE_NO_PAD.decode(parts[2]).unwrap().len(), 32);
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_token(UserId::new(1), 0);
        let b = generate_token(UserId::new(1), 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("abc").len(), 12);
    }
}
