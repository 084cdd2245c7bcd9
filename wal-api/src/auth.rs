//! The static API-key allowlist: the bundled stand-in for the
//! out-of-scope "Namespace CRUD/admin" collaborator's ACL (spec §1
//! "Namespace CRUD/admin ... out of scope", SPEC_FULL.md §10.3
//! "VALID_API_KEYS ... for the bundled static authorizer").
//!
//! Format validation (is this even API-key shaped?) stays inside the
//! ingestion pipeline's C3 step 2 — that's core pipeline behavior. This
//! is the narrower "is this specific, well-formed key on the allowlist"
//! ACL check, which belongs to the HTTP surface the spec places out of
//! scope, grounded on `capture::token`'s token-validation-before-dispatch
//! placement in `router`/`capture`.

use wal_common::error::{ErrorKind, WalError};
use wal_common::identity::is_valid_api_key_format;

#[derive(Clone, Default)]
pub struct ApiKeyAuthorizer {
    allowlist: Vec<String>,
}

impl ApiKeyAuthorizer {
    pub fn new(allowlist: Vec<String>) -> Self {
        Self { allowlist }
    }

    /// An empty allowlist means "ACL disabled" (local/dev runs); any
    /// well-formed key is accepted and format/step-2 validation inside
    /// C3 remains the only gate.
    pub fn authorize(&self, api_key: &str) -> Result<(), WalError> {
        if self.allowlist.is_empty() || !is_valid_api_key_format(api_key) {
            return Ok(());
        }
        if self.allowlist.iter().any(|k| k == api_key) {
            Ok(())
        } else {
            Err(WalError::new(
                ErrorKind::Forbidden,
                "API key is not authorized",
            ))
        }
    }
}
