//! Remote blob store holding one serialized profile per id
//!
//! - [`RemoteStore`] - the client contract used by the reconciler
//! - [`MemoryRemote`] - in-process store for tests and offline use
//! - [`DriveRemote`] - Google Drive application-data folder
//! - [`CredentialProvider`] - opaque source of authorized sessions

mod credentials;
mod drive;
mod memory;

pub use credentials::{authorize, AccessToken, CredentialProvider, StaticTokenProvider, AUTH_TIMEOUT};
pub use drive::{DriveRemote, DEFAULT_API_BASE};
pub use memory::MemoryRemote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::profile::Profile;

const BLOB_PREFIX: &str = "profile-";
const BLOB_SUFFIX: &str = ".json";

/// Deterministic blob name for a profile id
pub fn blob_name(id: &str) -> String {
    format!("{}{}{}", BLOB_PREFIX, id, BLOB_SUFFIX)
}

/// Profile id encoded in a blob name, if it is one of ours
pub fn id_from_blob_name(name: &str) -> Option<&str> {
    name.strip_prefix(BLOB_PREFIX)?
        .strip_suffix(BLOB_SUFFIX)
        .filter(|id| !id.is_empty())
}

/// Decode a blob body, reporting failures as corrupt records
pub(crate) fn decode_blob(name: &str, body: &[u8]) -> Result<Profile> {
    serde_json::from_slice(body).map_err(|e| Error::corrupt(name, e))
}

/// Build a record from a listed blob, checking the body matches its name
pub(crate) fn record_from_blob(
    key: String,
    name: &str,
    modified_time: DateTime<Utc>,
    body: &[u8],
) -> Result<RemoteRecord> {
    let profile = decode_blob(name, body)?;
    if id_from_blob_name(name) != Some(profile.id.as_str()) {
        return Err(Error::corrupt(name, "profile id does not match blob name"));
    }
    Ok(RemoteRecord {
        key,
        id: profile.id.clone(),
        name: profile.name.clone(),
        modified_time,
        profile,
    })
}

pub(crate) fn encode_blob(profile: &Profile) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(profile)?)
}

/// A profile as seen in the remote store
#[derive(Debug, Clone)]
pub struct RemoteRecord {
    /// Backend handle used by [`RemoteStore::get`]
    pub key: String,
    pub id: String,
    pub name: String,
    /// Server-assigned last modification time
    pub modified_time: DateTime<Utc>,
    pub profile: Profile,
}

/// Connectivity and identity report for the outer application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteStatus {
    pub configured: bool,
    pub connected: bool,
    pub identity: Option<String>,
}

/// Client contract for the remote blob store.
///
/// Every call fails with [`Error::RemoteUnavailable`] when no authorized
/// session exists.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every decodable profile blob. Undecodable blobs are logged and skipped.
    async fn list_all(&self) -> Result<Vec<RemoteRecord>>;

    /// Fetch and decode one blob by its key
    async fn get(&self, key: &str) -> Result<Profile>;

    /// Create or replace the blob for `profile.id`, returning the
    /// modification time the server recorded.
    async fn put(&self, profile: &Profile) -> Result<DateTime<Utc>>;

    /// Remove the blob for `id`; absent blobs are ignored.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Whether an authorized session is currently held
    fn is_connected(&self) -> bool;

    /// Account identity of the session, if the backend knows it
    async fn identity(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_name_round_trip() {
        let name = blob_name("0b7e-42");
        assert_eq!(name, "profile-0b7e-42.json");
        assert_eq!(id_from_blob_name(&name), Some("0b7e-42"));
    }

    #[test]
    fn test_foreign_blob_names() {
        assert_eq!(id_from_blob_name("settings.json"), None);
        assert_eq!(id_from_blob_name("profile-.json"), None);
        assert_eq!(id_from_blob_name("profile-abc.txt"), None);
    }
}
