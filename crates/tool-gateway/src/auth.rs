// crates/tool-gateway/src/auth.rs
// ============================================================================
// Module: Caller Authentication
// Description: Bearer credential validation against the gateway secret.
// Purpose: Admit callers holding the configured secret and key their limits.
// Dependencies: sha2, subtle, thiserror, tool-gateway-config
// ============================================================================

//! ## Overview
//! Callers present `Authorization: Bearer <secret>`; the `Bearer` scheme is
//! optional and matched case-insensitively. The extracted credential is
//! compared to the configured secret in constant time and, on success,
//! doubles as the rate-limit key.
//!
//! Security posture: raw credentials never leave this module in logs; audit
//! records carry a SHA-256 fingerprint instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Write as _;

use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tool_gateway_config::SecretString;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of an Authorization header value.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;
/// Hex characters kept in a credential fingerprint.
const FINGERPRINT_HEX_LEN: usize = 16;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication failures. All variants surface as `401 unauthorized`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No Authorization header was sent.
    #[error("missing authorization")]
    Missing,
    /// Header carried no credential after stripping.
    #[error("empty credential")]
    Empty,
    /// Header exceeded the size limit.
    #[error("authorization header too large")]
    TooLarge,
    /// Credential does not match the configured secret.
    #[error("invalid bearer token")]
    Mismatch,
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Credential extracted from a successfully authenticated request.
#[derive(Clone, PartialEq, Eq)]
pub struct CallerCredential(String);

impl CallerCredential {
    /// Returns the raw credential, used as the rate-limit key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short SHA-256 fingerprint safe for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl fmt::Debug for CallerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallerCredential").field(&self.fingerprint()).finish()
    }
}

/// Validates caller credentials against a single configured secret.
#[derive(Debug, Clone)]
pub struct CallerAuthenticator {
    /// Caller-facing shared secret.
    secret: SecretString,
}

impl CallerAuthenticator {
    /// Creates an authenticator for `secret`.
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self {
            secret,
        }
    }

    /// Authenticates a raw `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the header is absent, empty after
    /// stripping, oversized, or does not match the secret.
    pub fn authenticate(&self, auth_header: Option<&str>) -> Result<CallerCredential, AuthError> {
        let header = auth_header.ok_or(AuthError::Missing)?;
        if header.len() > MAX_AUTH_HEADER_BYTES {
            return Err(AuthError::TooLarge);
        }
        let token = strip_bearer_prefix(header);
        if token.is_empty() {
            return Err(AuthError::Empty);
        }
        if !bool::from(token.as_bytes().ct_eq(self.secret.expose().as_bytes())) {
            return Err(AuthError::Mismatch);
        }
        Ok(CallerCredential(token.to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Strips surrounding whitespace and an optional case-insensitive `Bearer`
/// scheme.
fn strip_bearer_prefix(header: &str) -> &str {
    let trimmed = header.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => trimmed,
    }
}

/// Hex-encoded SHA-256 prefix of a credential.
fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex.truncate(FINGERPRINT_HEX_LEN);
    hex
}

// ============================================================================
// SECTION: Tests
// ============================================================================
