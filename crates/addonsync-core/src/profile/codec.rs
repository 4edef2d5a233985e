//! Capturing live settings into a profile and planning their write-back

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{Addon, AddonBundle, FileKey, LiveTarget, Profile, RawContent};
use crate::error::Result;

/// What to capture from a live target
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub name: String,
    pub description: Option<String>,
    pub device: Option<String>,
    /// Explicit add-on selection
    pub addons: Vec<Addon>,
    /// Also capture the account keybinds blob if present
    pub include_game_settings: bool,
}

impl CaptureRequest {
    pub fn new(name: impl Into<String>, addons: Vec<Addon>) -> Self {
        Self {
            name: name.into(),
            description: None,
            device: None,
            addons,
            include_game_settings: true,
        }
    }
}

/// Read a file, treating "not found" as absent.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Capture the selected add-ons' settings from `target` into a new profile.
///
/// Add-ons with none of their settings files present are left out of the
/// profile entirely.
pub fn capture(target: &LiveTarget, request: &CaptureRequest) -> Result<Profile> {
    let mut profile = Profile::new(&request.name, target.variant, &target.account);
    profile.description = request.description.clone();
    profile.device = request.device.clone();

    let saved_variables = target.saved_variables_dir();
    let selected: BTreeSet<Addon> = request.addons.iter().copied().collect();

    for addon in selected {
        let mut bundle = AddonBundle::default();

        for file in addon.settings_files() {
            if let Some(bytes) = read_optional(&saved_variables.join(file))? {
                bundle.files.insert(FileKey::account(*file), RawContent(bytes));
            }
        }

        if bundle.files.is_empty() {
            tracing::debug!("No settings found for {}, leaving it out", addon);
            continue;
        }

        bundle.enabled = true;
        profile.addons.insert(addon.name().to_string(), bundle);
    }

    if request.include_game_settings {
        profile.game_settings = read_optional(&target.game_settings_path())?.map(RawContent);
    }

    tracing::info!(
        "Captured profile '{}' ({} add-ons, {} files)",
        profile.name,
        profile.addons.len(),
        profile.file_count()
    );

    Ok(profile)
}

/// A single file write-back
#[derive(Debug, Clone)]
pub struct PlannedWrite {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

/// Every write needed to apply a profile to a target
#[derive(Debug, Clone, Default)]
pub struct ApplyPlan {
    pub writes: Vec<PlannedWrite>,
    /// Keys whose scope the target cannot hold
    pub skipped: Vec<String>,
}

impl ApplyPlan {
    /// Live paths that will be overwritten or created
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.writes.iter().map(|w| w.path.as_path())
    }
}

/// Work out the writes for applying `profile` onto `target`.
///
/// Disabled bundles are ignored; keys with an unsupported scope are skipped.
pub fn plan_apply(profile: &Profile, target: &LiveTarget) -> ApplyPlan {
    let mut plan = ApplyPlan::default();

    for (name, bundle) in &profile.addons {
        if !bundle.enabled {
            continue;
        }
        for (key, content) in &bundle.files {
            match target.path_for(key) {
                Some(path) => plan.writes.push(PlannedWrite {
                    path,
                    contents: content.0.clone(),
                }),
                None => {
                    tracing::debug!("Skipping {} for {}: scope not supported", key, name);
                    plan.skipped.push(key.to_string());
                }
            }
        }
    }

    if let Some(settings) = &profile.game_settings {
        plan.writes.push(PlannedWrite {
            path: target.game_settings_path(),
            contents: settings.0.clone(),
        });
    }

    plan
}

/// Perform the writes of a plan, creating parent directories as needed.
///
/// Callers must have backed up the affected files first.
pub fn write_plan(plan: &ApplyPlan) -> Result<usize> {
    for write in &plan.writes {
        if let Some(parent) = write.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&write.path, &write.contents)?;
    }
    Ok(plan.writes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{FileScope, GameVariant};
    use tempfile::TempDir;

    fn live_target(dir: &TempDir) -> LiveTarget {
        LiveTarget::new(dir.path(), GameVariant::Retail, "ACCOUNT1")
    }

    fn seed(target: &LiveTarget, file: &str, contents: &[u8]) {
        let dir = target.saved_variables_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), contents).unwrap();
    }

    #[test]
    fn test_capture_skips_addons_without_files() {
        let temp = TempDir::new().unwrap();
        let target = live_target(&temp);
        seed(&target, "WeakAuras.lua", b"WeakAurasSaved = {}");

        let request = CaptureRequest::new("Main", vec![Addon::WeakAuras, Addon::Plater]);
        let profile = capture(&target, &request).unwrap();

        assert_eq!(profile.addons.len(), 1);
        let bundle = &profile.addons["WeakAuras"];
        assert!(bundle.enabled);
        assert_eq!(bundle.files.len(), 1);
        assert!(bundle.files.contains_key(&FileKey::account("WeakAuras.lua")));
        assert!(!profile.addons.contains_key("Plater"));
        assert!(profile.game_settings.is_none());
        assert_eq!(profile.account_name, "ACCOUNT1");
    }

    #[test]
    fn test_capture_game_settings_blob() {
        let temp = TempDir::new().unwrap();
        let target = live_target(&temp);
        fs::create_dir_all(target.account_dir()).unwrap();
        fs::write(target.game_settings_path(), b"bind SPACE JUMP").unwrap();

        let mut request = CaptureRequest::new("Binds", vec![]);
        let profile = capture(&target, &request).unwrap();
        assert_eq!(
            profile.game_settings.as_ref().map(|c| c.as_bytes()),
            Some(&b"bind SPACE JUMP"[..])
        );

        request.include_game_settings = false;
        let profile = capture(&target, &request).unwrap();
        assert!(profile.game_settings.is_none());
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let source_dir = TempDir::new().unwrap();
        let source = live_target(&source_dir);
        let binary = vec![0u8, 159, 146, 150, 255, b'\n', b'\r'];
        seed(&source, "ElvUI.lua", &binary);
        seed(&source, "ElvUI_OptionsUI.lua", b"ElvUI_Options = { x = 1 }\r\n");
        seed(&source, "Details.lua", b"_detalhes_global = nil");

        let request = CaptureRequest::new("All", vec![Addon::ElvUI, Addon::Details]);
        let profile = capture(&source, &request).unwrap();

        // through the serialized form, as stored on disk and remotely
        let json = serde_json::to_string(&profile).unwrap();
        let profile: Profile = serde_json::from_str(&json).unwrap();

        let dest_dir = TempDir::new().unwrap();
        let dest = live_target(&dest_dir);
        let written = write_plan(&plan_apply(&profile, &dest)).unwrap();
        assert_eq!(written, 3);

        for file in ["ElvUI.lua", "ElvUI_OptionsUI.lua", "Details.lua"] {
            assert_eq!(
                fs::read(dest.saved_variables_dir().join(file)).unwrap(),
                fs::read(source.saved_variables_dir().join(file)).unwrap(),
                "{} differs",
                file
            );
        }
    }

    #[test]
    fn test_plan_skips_disabled_and_unsupported_scopes() {
        let temp = TempDir::new().unwrap();
        let target = live_target(&temp);

        let mut profile = Profile::new("p", GameVariant::Retail, "ACCOUNT1");
        let mut enabled = AddonBundle {
            enabled: true,
            ..Default::default()
        };
        enabled
            .files
            .insert(FileKey::account("Plater.lua"), RawContent(b"a".to_vec()));
        enabled.files.insert(
            FileKey {
                scope: FileScope::Character {
                    realm: "Realm".to_string(),
                    name: "Alice".to_string(),
                },
                file: "Plater.lua".to_string(),
            },
            RawContent(b"b".to_vec()),
        );
        let mut disabled = AddonBundle::default();
        disabled
            .files
            .insert(FileKey::account("Questie.lua"), RawContent(b"c".to_vec()));

        profile.addons.insert("Plater".to_string(), enabled);
        profile.addons.insert("Questie".to_string(), disabled);

        let plan = plan_apply(&profile, &target);
        assert_eq!(plan.writes.len(), 1);
        assert_eq!(plan.writes[0].path, target.saved_variables_dir().join("Plater.lua"));
        assert_eq!(plan.skipped, vec!["character/Realm/Alice:Plater.lua".to_string()]);
    }
}
