//! Settings profiles: the unit of capture, storage and synchronization.
//!
//! A [`Profile`] bundles the saved-variables files of a selection of add-ons
//! plus one opaque game-settings blob. Profiles are captured from and applied
//! to a [`LiveTarget`] by the functions in [`codec`].

mod addon;
pub mod codec;

pub use addon::{Addon, GameVariant, LiveTarget};
pub use codec::{capture, plan_apply, write_plan, ApplyPlan, CaptureRequest, PlannedWrite};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A named bundle of captured add-on settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Assigned once at creation
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Label of the device the profile was captured on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub game_variant: GameVariant,
    pub account_name: String,
    pub created_at: DateTime<Utc>,
    /// Last local write; the only authority signal during reconciliation
    pub updated_at: DateTime<Utc>,
    /// Add-on name to captured bundle. A missing add-on was not captured.
    #[serde(default)]
    pub addons: BTreeMap<String, AddonBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_settings: Option<RawContent>,
}

/// Current time at millisecond precision.
///
/// Remote stores keep modification times in milliseconds, so stamps minted
/// locally must not carry finer precision or they never compare equal.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

impl Profile {
    /// Create an empty profile with a fresh id
    pub fn new(name: impl Into<String>, game_variant: GameVariant, account_name: impl Into<String>) -> Self {
        let now = timestamp_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            device: None,
            game_variant,
            account_name: account_name.into(),
            created_at: now,
            updated_at: now,
            addons: BTreeMap::new(),
            game_settings: None,
        }
    }

    /// Names of add-ons whose bundle is enabled
    pub fn enabled_addons(&self) -> impl Iterator<Item = &str> {
        self.addons
            .iter()
            .filter(|(_, bundle)| bundle.enabled)
            .map(|(name, _)| name.as_str())
    }

    /// Total number of captured files across all bundles
    pub fn file_count(&self) -> usize {
        self.addons.values().map(|bundle| bundle.files.len()).sum()
    }
}

/// Settings captured for one add-on within a profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonBundle {
    pub enabled: bool,
    #[serde(default)]
    pub files: BTreeMap<FileKey, RawContent>,
}

/// Raw file bytes, stored as base64 in serialized records.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawContent(pub Vec<u8>);

impl RawContent {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RawContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for RawContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawContent({} bytes)", self.0.len())
    }
}

impl Serialize for RawContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for RawContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(RawContent)
            .map_err(serde::de::Error::custom)
    }
}

/// Scope a captured file belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileScope {
    /// Account-wide saved variables (the only scope captured today)
    Account,
    /// Per-character saved variables
    Character { realm: String, name: String },
}

/// Key of a captured file: scope tag plus file name, written `scope:file`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileKey {
    pub scope: FileScope,
    pub file: String,
}

impl FileKey {
    pub fn account(file: impl Into<String>) -> Self {
        Self {
            scope: FileScope::Account,
            file: file.into(),
        }
    }
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && !s.contains(|c: char| matches!(c, '/' | '\\' | ':'))
}

impl FromStr for FileKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (scope, file) = s
            .split_once(':')
            .ok_or_else(|| format!("file key '{}' has no scope tag", s))?;

        if !valid_segment(file) {
            return Err(format!("invalid file name in key '{}'", s));
        }

        let scope = match scope.split('/').collect::<Vec<_>>().as_slice() {
            ["account"] => FileScope::Account,
            ["character", realm, name] if valid_segment(realm) && valid_segment(name) => {
                FileScope::Character {
                    realm: realm.to_string(),
                    name: name.to_string(),
                }
            }
            _ => return Err(format!("unknown scope tag in key '{}'", s)),
        };

        Ok(Self {
            scope,
            file: file.to_string(),
        })
    }
}

impl TryFrom<String> for FileKey {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileKey> for String {
    fn from(key: FileKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            FileScope::Account => write!(f, "account:{}", self.file),
            FileScope::Character { realm, name } => {
                write!(f, "character/{}/{}:{}", realm, name, self.file)
            }
        }
    }
}
