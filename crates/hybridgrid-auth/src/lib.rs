//! AuthGuard: bearer-token verification at the RPC boundary (§4.6).
//!
//! Reads a `Bearer <token>` header from inbound request metadata and rejects
//! with [`HybridGridError::Unauthenticated`] unless the header is well
//! formed and its token matches the configured one under constant-time
//! comparison. A disabled guard is a pass-through; a configurable method
//! allow-list skips verification for health checks.

use std::collections::HashSet;

use hybridgrid_types::HybridGridError;

pub const MIN_TOKEN_LENGTH: usize = 32;
const BEARER_PREFIX: &str = "Bearer ";

/// The server-side gate: holds the configured token (if auth is enabled)
/// and the set of RPC methods exempt from verification.
#[derive(Clone)]
pub struct AuthGuard {
    configured_token: Option<String>,
    allow_listed_methods: HashSet<String>,
}

impl AuthGuard {
    /// Build an enabled guard that verifies every request against `token`.
    pub fn enabled(token: impl Into<String>) -> Self {
        Self { configured_token: Some(token.into()), allow_listed_methods: HashSet::new() }
    }

    /// Build a disabled guard: every request is admitted without checking.
    pub fn disabled() -> Self {
        Self { configured_token: None, allow_listed_methods: HashSet::new() }
    }

    /// Exempt `method` (e.g. `"HealthCheck"`) from verification.
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allow_listed_methods.insert(method.into());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.configured_token.is_some()
    }

    /// Verify an inbound request's `authorization` metadata for `method`.
    ///
    /// `authorization` is the raw metadata value, if present at all —
    /// `None` models "the header was absent".
    pub fn verify(&self, method: &str, authorization: Option<&str>) -> Result<(), HybridGridError> {
        let Some(configured) = &self.configured_token else {
            return Ok(());
        };
        if self.allow_listed_methods.contains(method) {
            return Ok(());
        }

        let Some(header) = authorization else {
            return Err(HybridGridError::Unauthenticated("missing authorization metadata".into()));
        };

        let Some(token) = header.strip_prefix(BEARER_PREFIX) else {
            return Err(HybridGridError::Unauthenticated(
                "authorization header is not a Bearer token".into(),
            ));
        };
        if token.is_empty() {
            return Err(HybridGridError::Unauthenticated("bearer token is empty".into()));
        }

        if configured.len() < MIN_TOKEN_LENGTH || token.len() < MIN_TOKEN_LENGTH {
            return Err(HybridGridError::Unauthenticated(
                "tokens shorter than 32 characters are never valid".into(),
            ));
        }

        if constant_time_eq(configured.as_bytes(), token.as_bytes()) {
            Ok(())
        } else {
            Err(HybridGridError::Unauthenticated("token mismatch".into()))
        }
    }
}

/// Build the `authorization` metadata value a client attaches to outbound
/// requests carrying `token`.
pub fn bearer_header(token: &str) -> String {
    format!("{BEARER_PREFIX}{token}")
}

/// Compare two byte strings in time independent of *where* they first
/// differ. Unequal lengths are rejected up front — length is not the secret
/// here, the token contents are.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Generate a fresh bearer token: `byte_count` cryptographically random
/// bytes, hex-encoded into a `2 * byte_count`-character string.
pub fn generate_token(byte_count: usize) -> String {
    let mut bytes = vec![0u8; byte_count];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Mask a token for safe inclusion in logs: first 4 and last 4 characters,
/// the rest replaced with `*`.
pub fn mask_token(token: &str) -> String {
    if token.len() <= 8 {
        return "*".repeat(token.len());
    }
    let (head, _) = token.split_at(4);
    let (_, tail) = token.split_at(token.len() - 4);
    format!("{head}{}{tail}", "*".repeat(token.len() - 8))
}

use rand::RngCore;

#[cfg(test)]
mod tests {
    use super::*;

    fn token(n: usize) -> String {
        "a".repeat(n)
    }

    #[test]
    fn disabled_guard_admits_everything() {
        let guard = AuthGuard::disabled();
        assert!(guard.verify("Dispatch", None).is_ok());
    }

    #[test]
    fn missing_metadata_rejected() {
        let guard = AuthGuard::enabled(token(32));
        assert!(guard.verify("Dispatch", None).is_err());
    }

    #[test]
    fn malformed_header_rejected() {
        let guard = AuthGuard::enabled(token(32));
        assert!(guard.verify("Dispatch", Some("Basic abc")).is_err());
        assert!(guard.verify("Dispatch", Some("Bearer ")).is_err());
    }

    #[test]
    fn mismatched_token_rejected() {
        let guard = AuthGuard::enabled(token(32));
        let header = bearer_header(&token(31));
        assert!(guard.verify("Dispatch", Some(&header)).is_err());
    }

    #[test]
    fn matching_token_admitted() {
        let guard = AuthGuard::enabled(token(32));
        let header = bearer_header(&token(32));
        assert!(guard.verify("Dispatch", Some(&header)).is_ok());
    }

    #[test]
    fn short_tokens_always_invalid() {
        let guard = AuthGuard::enabled(token(20));
        let header = bearer_header(&token(20));
        assert!(guard.verify("Dispatch", Some(&header)).is_err());
    }

    #[test]
    fn allow_listed_method_skips_verification() {
        let guard = AuthGuard::enabled(token(32)).allow_method("HealthCheck");
        assert!(guard.verify("HealthCheck", None).is_ok());
        assert!(guard.verify("Dispatch", None).is_err());
    }

    #[test]
    fn generated_tokens_are_valid_length_and_hex() {
        let generated = generate_token(16);
        assert_eq!(generated.len(), 32);
        assert!(generated.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn masking_preserves_head_and_tail_only() {
        let masked = mask_token(&token(32));
        assert!(masked.starts_with("aaaa"));
        assert!(masked.ends_with("aaaa"));
        assert!(masked.contains('*'));
    }

    proptest::proptest! {
        #[test]
        fn constant_time_eq_agrees_with_equality(a in ".{0,40}", b in ".{0,40}") {
            proptest::prop_assert_eq!(constant_time_eq(a.as_bytes(), b.as_bytes()), a == b);
        }
    }
}
