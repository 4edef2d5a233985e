//! Known add-ons and the live game installations their settings live in

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::{FileKey, FileScope};

/// Add-ons whose settings can be captured into a profile.
///
/// New add-ons are supported by adding a variant and a row in `ADDON_TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Addon {
    ElvUI,
    WeakAuras,
    Details,
    Plater,
    BigWigs,
    Dbm,
    Bartender4,
    Questie,
}

struct AddonSpec {
    addon: Addon,
    name: &'static str,
    settings_files: &'static [&'static str],
}

const ADDON_TABLE: &[AddonSpec] = &[
    AddonSpec {
        addon: Addon::ElvUI,
        name: "ElvUI",
        settings_files: &["ElvUI.lua", "ElvUI_OptionsUI.lua"],
    },
    AddonSpec {
        addon: Addon::WeakAuras,
        name: "WeakAuras",
        settings_files: &["WeakAuras.lua", "WeakAurasOptions.lua"],
    },
    AddonSpec {
        addon: Addon::Details,
        name: "Details",
        settings_files: &["Details.lua"],
    },
    AddonSpec {
        addon: Addon::Plater,
        name: "Plater",
        settings_files: &["Plater.lua"],
    },
    AddonSpec {
        addon: Addon::BigWigs,
        name: "BigWigs",
        settings_files: &["BigWigs.lua"],
    },
    AddonSpec {
        addon: Addon::Dbm,
        name: "DBM",
        settings_files: &["DBM-Core.lua", "DBM-StatusBarTimers.lua"],
    },
    AddonSpec {
        addon: Addon::Bartender4,
        name: "Bartender4",
        settings_files: &["Bartender4.lua"],
    },
    AddonSpec {
        addon: Addon::Questie,
        name: "Questie",
        settings_files: &["Questie.lua"],
    },
];

impl Addon {
    fn spec(&self) -> &'static AddonSpec {
        ADDON_TABLE
            .iter()
            .find(|spec| spec.addon == *self)
            .unwrap_or(&ADDON_TABLE[0])
    }

    /// All known add-ons, in table order
    pub fn all() -> impl Iterator<Item = Addon> {
        ADDON_TABLE.iter().map(|spec| spec.addon)
    }

    /// Canonical name, used as the key in a profile's add-on map
    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    /// Saved-variables file names this add-on keeps its settings in
    pub fn settings_files(&self) -> &'static [&'static str] {
        self.spec().settings_files
    }

    /// Parse an add-on name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        ADDON_TABLE
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name.trim()))
            .map(|spec| spec.addon)
    }
}

impl fmt::Display for Addon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Game release channel a profile targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameVariant {
    #[default]
    Retail,
    Classic,
    ClassicEra,
    Ptr,
}

impl GameVariant {
    pub const ALL: [GameVariant; 4] = [Self::Retail, Self::Classic, Self::ClassicEra, Self::Ptr];

    /// Sub-directory of the game install holding this variant
    pub fn install_dir(&self) -> &'static str {
        match self {
            Self::Retail => "_retail_",
            Self::Classic => "_classic_",
            Self::ClassicEra => "_classic_era_",
            Self::Ptr => "_ptr_",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Retail => "Retail",
            Self::Classic => "Classic",
            Self::ClassicEra => "Classic Era",
            Self::Ptr => "PTR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "retail" | "_retail_" => Some(Self::Retail),
            "classic" | "_classic_" => Some(Self::Classic),
            "classic_era" | "classic-era" | "era" | "_classic_era_" => Some(Self::ClassicEra),
            "ptr" | "_ptr_" => Some(Self::Ptr),
            _ => None,
        }
    }
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A live configuration tree: one account of one installed game variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LiveTarget {
    pub game_path: PathBuf,
    pub variant: GameVariant,
    pub account: String,
}

impl LiveTarget {
    pub fn new(game_path: impl Into<PathBuf>, variant: GameVariant, account: impl Into<String>) -> Self {
        Self {
            game_path: game_path.into(),
            variant,
            account: account.into(),
        }
    }

    /// `<game>/<variant>/WTF/Account/<ACCOUNT>`
    pub fn account_dir(&self) -> PathBuf {
        self.game_path
            .join(self.variant.install_dir())
            .join("WTF")
            .join("Account")
            .join(&self.account)
    }

    pub fn saved_variables_dir(&self) -> PathBuf {
        self.account_dir().join("SavedVariables")
    }

    /// Account keybinds, captured as the profile's opaque game-settings blob
    pub fn game_settings_path(&self) -> PathBuf {
        self.account_dir().join("bindings-cache.wtf")
    }

    /// Live path a scoped file key maps to, or `None` if this target
    /// does not support the key's scope.
    pub fn path_for(&self, key: &FileKey) -> Option<PathBuf> {
        match key.scope {
            FileScope::Account => Some(self.saved_variables_dir().join(&key.file)),
            FileScope::Character { .. } => None,
        }
    }
}
