//! Location reference → live [`RemoteHandle`].
//!
//! The mutation API addresses files by identity, not path. A location
//! reference is turned into an opaque share token (`u!` + unpadded URL-safe
//! base64 of the URL bytes) and looked up with a single call.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::debug;

use crate::error::ResolveError;
use crate::models::{RemoteHandle, LOCATION_UNKNOWN};
use crate::traits::MutationApi;

const SHARE_TOKEN_PREFIX: &str = "u!";

/// Encode a location reference as a share token.
///
/// Standard base64 with `+` → `-`, `/` → `_` and trailing `=` stripped.
pub fn encode_share_token(location_ref: &str) -> String {
    format!("{}{}", SHARE_TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(location_ref.as_bytes()))
}

/// Resolve a location reference to a handle.
///
/// Every failure, including a reference that was never determinable from
/// the index, collapses into one [`ResolveError`].
pub async fn resolve(api: &dyn MutationApi, location_ref: &str) -> Result<RemoteHandle, ResolveError> {
    let location = location_ref.trim();
    if location.is_empty() || location == LOCATION_UNKNOWN {
        return Err(ResolveError {
            location: location_ref.to_string(),
            detail: "location not available from index data".to_string(),
        });
    }
    if !location.contains("://") {
        return Err(ResolveError {
            location: location_ref.to_string(),
            detail: "location is not an absolute URL".to_string(),
        });
    }

    let token = encode_share_token(location);
    debug!(location, token = %token, "resolving share token");

    api.resolve_share(&token).await.map_err(|e| ResolveError {
        location: location_ref.to_string(),
        detail: format!("{:#}", e),
    })
}
