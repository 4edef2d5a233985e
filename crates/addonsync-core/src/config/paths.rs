//! Platform-specific path detection for game installations

use std::fs;
use std::path::{Path, PathBuf};

use crate::profile::GameVariant;

/// Get all available drive letters on Windows
#[cfg(target_os = "windows")]
fn get_available_drives() -> Vec<PathBuf> {
    let mut drives = Vec::new();
    for letter in b'A'..=b'Z' {
        let path = PathBuf::from(format!("{}:\\", letter as char));
        if path.exists() {
            drives.push(path);
        }
    }
    drives
}

/// Check if a path is a game install root.
/// Looks for at least one variant directory holding a `WTF` or `Interface` folder.
fn is_game_installation(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }

    GameVariant::ALL.iter().any(|variant| {
        let dir = path.join(variant.install_dir());
        dir.join("WTF").is_dir() || dir.join("Interface").is_dir()
    })
}

/// Detect the game install root
pub fn detect_game_path() -> Option<PathBuf> {
    const INSTALL_DIR: &str = "World of Warcraft";

    #[cfg(target_os = "windows")]
    {
        for drive in get_available_drives() {
            let candidates = [
                drive.join("Program Files (x86)").join(INSTALL_DIR),
                drive.join("Program Files").join(INSTALL_DIR),
                drive.join("Games").join(INSTALL_DIR),
                drive.join(INSTALL_DIR),
            ];

            for path in candidates {
                if is_game_installation(&path) {
                    return Some(path);
                }
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(home) = dirs::home_dir() {
            let wine_paths = [
                home.join(".wine/drive_c/Program Files (x86)").join(INSTALL_DIR),
                home.join("Games/battlenet/drive_c/Program Files (x86)").join(INSTALL_DIR),
                home.join("Games").join(INSTALL_DIR),
            ];

            for path in wine_paths {
                if is_game_installation(&path) {
                    return Some(path);
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let path = PathBuf::from("/Applications").join(INSTALL_DIR);
        if is_game_installation(&path) {
            return Some(path);
        }
    }

    None
}

/// Validate that `path` has an install directory for `variant`
pub fn validate_game_path(path: &Path, variant: GameVariant) -> bool {
    path.join(variant.install_dir()).is_dir()
}

/// Account directory names under `WTF/Account`, sorted
pub fn list_accounts(game_path: &Path, variant: GameVariant) -> Vec<String> {
    let account_root = game_path
        .join(variant.install_dir())
        .join("WTF")
        .join("Account");

    let mut accounts: Vec<String> = fs::read_dir(&account_root)
        .into_iter()
        .flatten()
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        // account-wide SavedVariables sits beside the account folders
        .filter(|name| name != "SavedVariables")
        .collect();
    accounts.sort();
    accounts
}
