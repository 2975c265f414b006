//! Request signature computation and comparison.
//!
//! The default scheme is `uppercase(hex(MD5(payload)))`, which is what
//! deployed clients produce. MD5 here fingerprints the payload and keys the
//! replay cache; it provides no secrecy and anyone can forge it. The keyed
//! `HmacSha256` scheme signs the same payload with a shared secret for
//! deployments that can move their clients.

use std::path::Path;

use md5::{Digest, Md5};
use ring::hmac;
use subtle::ConstantTimeEq;

use crate::error::{GatewayError, SignatureErrorKind};

use super::CanonicalPayload;

/// How the expected signature is derived from a canonical payload.
pub enum SignatureScheme {
    /// Unkeyed MD5 digest.
    Md5,
    /// HMAC-SHA256 with a shared secret.
    HmacSha256(hmac::Key),
}

impl std::fmt::Debug for SignatureScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => f.write_str("Md5"),
            Self::HmacSha256(_) => f.write_str("HmacSha256(..)"),
        }
    }
}

/// Result of comparing a supplied signature against the expected one.
///
/// `computed` is returned whether or not the signatures match; the gate
/// uses it as the replay key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub computed: String,
    pub matched: bool,
}

/// Recomputes and checks request signatures.
#[derive(Debug)]
pub struct SignatureVerifier {
    scheme: SignatureScheme,
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::md5()
    }
}

impl SignatureVerifier {
    /// Verifier using the unkeyed MD5 scheme.
    pub fn md5() -> Self {
        Self {
            scheme: SignatureScheme::Md5,
        }
    }

    /// Verifier using HMAC-SHA256 with `secret`.
    pub fn hmac_sha256(secret: &[u8]) -> Self {
        Self {
            scheme: SignatureScheme::HmacSha256(hmac::Key::new(hmac::HMAC_SHA256, secret)),
        }
    }

    pub fn scheme(&self) -> &SignatureScheme {
        &self.scheme
    }

    /// Compute the expected signature: uppercase hex of the digest.
    pub fn sign(&self, payload: &CanonicalPayload) -> String {
        match &self.scheme {
            SignatureScheme::Md5 => hex::encode_upper(Md5::digest(payload.as_bytes())),
            SignatureScheme::HmacSha256(key) => {
                hex::encode_upper(hmac::sign(key, payload.as_bytes()).as_ref())
            }
        }
    }

    /// Compare `supplied` against the signature computed over `payload`.
    ///
    /// The supplied value is upper-cased before a constant-time comparison,
    /// so clients may send either hex case.
    pub fn verify(&self, payload: &CanonicalPayload, supplied: &str) -> Verification {
        let computed = self.sign(payload);
        let supplied = supplied.trim().to_ascii_uppercase();
        let matched = computed.len() == supplied.len()
            && bool::from(computed.as_bytes().ct_eq(supplied.as_bytes()));

        Verification { computed, matched }
    }

    /// Load an HMAC secret from a file.
    ///
    /// The file must not be readable by group or others.
    pub fn load_secret(path: &Path) -> Result<Vec<u8>, GatewayError> {
        let metadata = std::fs::metadata(path).map_err(|e| GatewayError::Signature {
            kind: SignatureErrorKind::SecretUnreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(GatewayError::Signature {
                    kind: SignatureErrorKind::InsecureSecretFile {
                        path: path.to_path_buf(),
                        mode: mode & 0o777,
                    },
                });
            }
        }
        #[cfg(not(unix))]
        let _ = metadata;

        let secret = std::fs::read(path).map_err(|e| GatewayError::Signature {
            kind: SignatureErrorKind::SecretUnreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        // Trailing newline from `echo secret > file` is not part of the key.
        let trimmed_len = secret
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |pos| pos + 1);
        if trimmed_len == 0 {
            return Err(GatewayError::Signature {
                kind: SignatureErrorKind::EmptySecret {
                    path: path.to_path_buf(),
                },
            });
        }

        let mut secret = secret;
        secret.truncate(trimmed_len);
        Ok(secret)
    }
}
