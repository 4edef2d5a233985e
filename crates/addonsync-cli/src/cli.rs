//! Command handling for the headless CLI
//!
//! Usage:
//!   addonsync status                         Remote connection status
//!   addonsync capture <name> --addons a,b    Capture live settings
//!   addonsync apply <id>                     Apply a stored profile
//!   addonsync sync                           Reconcile with the remote store
//!
//! Options:
//!   --json             Output in JSON format
//!   --offline          Use an in-process remote store

use std::path::PathBuf;

use anyhow::Context as _;
use addonsync_core::{
    Addon, AppContext, CaptureRequest, Config, GameVariant, Profile, SyncPlan, SyncResult,
};

/// CLI command to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Status,
    Config,
    List,
    Show { id: String },
    Delete { id: String, remote: bool },
    Capture {
        name: String,
        addons: Vec<Addon>,
        description: Option<String>,
        game_settings: bool,
    },
    Apply { id: String },
    Preview,
    Sync,
    PushAll,
    PullAll,
    Backups,
    Restore { path: PathBuf },
    Activity,
}

impl CliCommand {
    /// Whether the command talks to the remote store
    fn needs_remote(&self) -> bool {
        matches!(
            self,
            Self::Status
                | Self::Preview
                | Self::Sync
                | Self::PushAll
                | Self::PullAll
                | Self::Delete { remote: true, .. }
        )
    }
}

/// CLI options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub json: bool,
    pub offline: bool,
    /// Confirms destructive bulk operations
    pub yes: bool,
    /// Persist the selection overrides (`config` command)
    pub save: bool,
    pub game_path: Option<PathBuf>,
    pub account: Option<String>,
    pub variant: Option<GameVariant>,
    pub data_dir: Option<PathBuf>,
}

impl CliOptions {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref path) = self.game_path {
            config.game_path = Some(path.clone());
        }
        if let Some(ref account) = self.account {
            config.account = Some(account.clone());
        }
        if let Some(variant) = self.variant {
            config.variant = variant;
        }
        if let Some(ref dir) = self.data_dir {
            config.data_dir = Some(dir.clone());
        }
    }
}

fn take_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", flag))
}

/// Parse CLI arguments and return command + options
pub fn parse_args(args: &[String]) -> Result<(CliCommand, CliOptions), String> {
    let mut options = CliOptions::default();
    let mut positional: Vec<&str> = Vec::new();
    let mut addons: Option<Vec<Addon>> = None;
    let mut description: Option<String> = None;
    let mut game_settings = true;
    let mut remote = false;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--json" => options.json = true,
            "--offline" => options.offline = true,
            "--yes" | "-y" => options.yes = true,
            "--save" => options.save = true,
            "--remote" => remote = true,
            "--no-game-settings" => game_settings = false,
            "--addons" => addons = Some(parse_addons(take_value(args, &mut i, arg)?)?),
            "--description" => description = Some(take_value(args, &mut i, arg)?.to_string()),
            "--game-path" => options.game_path = Some(PathBuf::from(take_value(args, &mut i, arg)?)),
            "--data-dir" => options.data_dir = Some(PathBuf::from(take_value(args, &mut i, arg)?)),
            "--account" => options.account = Some(take_value(args, &mut i, arg)?.to_string()),
            "--variant" => {
                let value = take_value(args, &mut i, arg)?;
                options.variant = Some(
                    GameVariant::parse(value)
                        .ok_or_else(|| format!("Invalid variant '{}'. Use: retail, classic, classic_era, ptr", value))?,
                );
            }
            _ if arg.starts_with('-') => return Err(format!("Unknown option: {}", arg)),
            _ => positional.push(arg),
        }
        i += 1;
    }

    let (name, rest) = positional
        .split_first()
        .ok_or_else(|| "No command specified. Run with --help for the command list".to_string())?;

    let operand = |what: &str| -> Result<String, String> {
        rest.first()
            .map(|s| s.to_string())
            .ok_or_else(|| format!("{} requires {}", name, what))
    };

    let command = match *name {
        "status" => CliCommand::Status,
        "config" => CliCommand::Config,
        "list" => CliCommand::List,
        "show" => CliCommand::Show { id: operand("a profile id")? },
        "delete" => CliCommand::Delete {
            id: operand("a profile id")?,
            remote,
        },
        "capture" => CliCommand::Capture {
            name: operand("a profile name")?,
            addons: addons.ok_or_else(|| "capture requires --addons".to_string())?,
            description,
            game_settings,
        },
        "apply" => CliCommand::Apply { id: operand("a profile id")? },
        "preview" => CliCommand::Preview,
        "sync" => CliCommand::Sync,
        "push-all" => CliCommand::PushAll,
        "pull-all" => CliCommand::PullAll,
        "backups" => CliCommand::Backups,
        "restore" => CliCommand::Restore {
            path: PathBuf::from(operand("a backup directory")?),
        },
        "activity" => CliCommand::Activity,
        other => return Err(format!("Unknown command: {}", other)),
    };

    if matches!(command, CliCommand::PushAll | CliCommand::PullAll) && !options.yes {
        return Err(format!(
            "{} overwrites profiles without comparing timestamps; rerun with --yes to confirm",
            name
        ));
    }

    Ok((command, options))
}

fn parse_addons(s: &str) -> Result<Vec<Addon>, String> {
    let addons: Vec<Addon> = s
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            Addon::from_name(name).ok_or_else(|| {
                let known: Vec<&str> = Addon::all().map(|a| a.name()).collect();
                format!("Unknown add-on '{}'. Known: {}", name, known.join(", "))
            })
        })
        .collect::<Result<_, _>>()?;

    if addons.is_empty() {
        return Err("--addons needs at least one add-on".to_string());
    }
    Ok(addons)
}

async fn build_context(command: &CliCommand, options: &CliOptions, config: Config) -> anyhow::Result<AppContext> {
    if options.offline {
        tracing::debug!("Offline mode: using a throwaway in-memory remote");
        return Ok(AppContext::offline(config)?);
    }
    if command.needs_remote() {
        tracing::debug!("Connecting to the remote store for {:?}", command);
        return AppContext::open(config)
            .await
            .context("Failed to connect to the remote store");
    }
    Ok(AppContext::new(config, None)?)
}

/// Run CLI command
pub async fn run(command: CliCommand, options: CliOptions) -> anyhow::Result<()> {
    let mut config = Config::load();
    options.apply_overrides(&mut config);
    tracing::debug!(
        "Game path: {:?}, account: {:?}, variant: {}",
        config.game_path,
        config.account,
        config.variant.label()
    );

    if command == CliCommand::Config {
        return run_config(config, &options);
    }

    let ctx = build_context(&command, &options, config).await?;

    match command {
        CliCommand::Status => {
            let status = ctx.status().await;
            if options.json {
                print_json(&status)?;
            } else {
                println!("Remote configured: {}", yes_no(status.configured));
                println!("Remote connected:  {}", yes_no(status.connected));
                if let Some(identity) = status.identity {
                    println!("Signed in as:      {}", identity);
                }
            }
        }
        CliCommand::Config => {}
        CliCommand::List => {
            let profiles = ctx.list_profiles()?;
            if options.json {
                let items: Vec<_> = profiles.iter().map(profile_summary).collect();
                print_json(&items)?;
            } else if profiles.is_empty() {
                println!("No profiles stored.");
            } else {
                for profile in &profiles {
                    println!(
                        "{}  {:<24} {:<12} {} add-ons, updated {}",
                        profile.id,
                        profile.name,
                        profile.game_variant.label(),
                        profile.enabled_addons().count(),
                        profile.updated_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        CliCommand::Show { id } => {
            let profile = ctx.get_profile(&id)?;
            if options.json {
                print_json(&profile_detail(&profile))?;
            } else {
                print_profile(&profile);
            }
        }
        CliCommand::Delete { id, remote } => {
            if remote {
                ctx.delete_remote_profile(&id).await?;
            } else {
                ctx.delete_profile(&id)?;
            }
            if options.json {
                print_json(&serde_json::json!({ "deleted": id, "remote": remote }))?;
            } else {
                println!("Deleted {} {}", if remote { "remote profile" } else { "profile" }, id);
            }
        }
        CliCommand::Capture {
            name,
            addons,
            description,
            game_settings,
        } => {
            let mut request = CaptureRequest::new(name, addons);
            request.description = description;
            request.include_game_settings = game_settings;

            let profile = ctx.capture(request)?;
            if options.json {
                print_json(&profile_summary(&profile))?;
            } else {
                println!(
                    "Captured {} ({}): {} add-ons, {} files",
                    profile.name,
                    profile.id,
                    profile.enabled_addons().count(),
                    profile.file_count()
                );
                if profile.addons.is_empty() {
                    println!("Warning: none of the selected add-ons had settings files");
                }
            }
        }
        CliCommand::Apply { id } => {
            let outcome = ctx.apply_profile(&id)?;
            if options.json {
                print_json(&outcome)?;
            } else {
                println!("Applied {}: {} files written", outcome.profile, outcome.files_written);
                match outcome.backup {
                    Some(ref dir) => println!(
                        "  Backed up {} files to {}",
                        outcome.files_backed_up,
                        dir.display()
                    ),
                    None => println!("  Nothing to back up"),
                }
                if !outcome.skipped.is_empty() {
                    println!("  Skipped (unsupported scope): {}", outcome.skipped.join(", "));
                }
            }
        }
        CliCommand::Preview => {
            let plan = ctx.preview().await?;
            print_plan(&plan, &options)?;
        }
        CliCommand::Sync => {
            let result = ctx.sync().await?;
            print_sync_result("Sync Complete", &result, &options)?;
        }
        CliCommand::PushAll => {
            let result = ctx.push_all().await?;
            print_sync_result("Push Complete", &result, &options)?;
        }
        CliCommand::PullAll => {
            let result = ctx.pull_all().await?;
            print_sync_result("Pull Complete", &result, &options)?;
        }
        CliCommand::Backups => {
            let backups = ctx.backups()?;
            if options.json {
                let items: Vec<_> = backups
                    .iter()
                    .map(|b| {
                        serde_json::json!({
                            "path": b.path,
                            "account": b.manifest.account,
                            "created_at": b.manifest.created_at,
                            "files": b.file_count(),
                        })
                    })
                    .collect();
                print_json(&items)?;
            } else if backups.is_empty() {
                println!("No backups.");
            } else {
                for backup in &backups {
                    println!(
                        "{}  {} ({} files)",
                        backup.manifest.created_at.format("%Y-%m-%d %H:%M:%S"),
                        backup.path.display(),
                        backup.file_count()
                    );
                }
            }
        }
        CliCommand::Restore { path } => {
            let restored = ctx.restore_backup(&path)?;
            if options.json {
                print_json(&serde_json::json!({ "restored": restored }))?;
            } else {
                println!("Restored {} files from {}", restored, path.display());
            }
        }
        CliCommand::Activity => {
            let entries = ctx.recent_activity(addonsync_core::activity::MAX_LOG_ENTRIES);
            if options.json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("No recent activity.");
            } else {
                for entry in &entries {
                    println!(
                        "{}  {:<9} {}",
                        entry.formatted_datetime(),
                        entry.activity_type.display_name(),
                        entry.description
                    );
                }
            }
        }
    }

    Ok(())
}

fn run_config(config: Config, options: &CliOptions) -> anyhow::Result<()> {
    if options.save {
        config.save()?;
    }

    let mut shown = config.clone();
    if shown.remote.access_token.is_some() {
        shown.remote.access_token = Some("<redacted>".to_string());
    }

    if options.json {
        print_json(&shown)?;
    } else {
        if let Some(path) = Config::config_path() {
            println!("Config file: {}", path.display());
        }
        println!(
            "Game path:   {}",
            shown
                .game_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not set".to_string())
        );
        println!("Account:     {}", shown.account.as_deref().unwrap_or("not set"));
        println!("Variant:     {}", shown.variant);
        println!("Data dir:    {}", shown.data_root()?.display());
        println!("Keep:        {} backups", shown.backup_keep);
        println!("Remote:      {}", yes_no(config.access_token().is_some()));
        if options.save {
            println!();
            println!("Saved.");
        }
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn profile_summary(profile: &Profile) -> serde_json::Value {
    serde_json::json!({
        "id": profile.id,
        "name": profile.name,
        "description": profile.description,
        "device": profile.device,
        "game_variant": profile.game_variant,
        "account": profile.account_name,
        "created_at": profile.created_at,
        "updated_at": profile.updated_at,
        "addons": profile.enabled_addons().collect::<Vec<_>>(),
        "files": profile.file_count(),
    })
}

fn profile_detail(profile: &Profile) -> serde_json::Value {
    let mut value = profile_summary(profile);
    let files: serde_json::Map<String, serde_json::Value> = profile
        .addons
        .iter()
        .map(|(name, bundle)| {
            let keys: Vec<String> = bundle.files.keys().map(|k| k.to_string()).collect();
            (name.clone(), serde_json::json!(keys))
        })
        .collect();
    value["file_keys"] = serde_json::Value::Object(files);
    value["game_settings"] = serde_json::json!(profile.game_settings.is_some());
    value
}

fn print_profile(profile: &Profile) {
    println!("{} ({})", profile.name, profile.id);
    if let Some(ref description) = profile.description {
        println!("  {}", description);
    }
    println!("  Variant:  {}", profile.game_variant);
    println!("  Account:  {}", profile.account_name);
    if let Some(ref device) = profile.device {
        println!("  Device:   {}", device);
    }
    println!("  Created:  {}", profile.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated:  {}", profile.updated_at.format("%Y-%m-%d %H:%M:%S"));
    println!();
    for (name, bundle) in &profile.addons {
        let state = if bundle.enabled { "" } else { " (disabled)" };
        println!("  {}{}", name, state);
        for key in bundle.files.keys() {
            println!("    {}", key);
        }
    }
    if profile.game_settings.is_some() {
        println!("  + account keybinds");
    }
}

fn print_plan(plan: &SyncPlan, options: &CliOptions) -> anyhow::Result<()> {
    if options.json {
        return print_json(&serde_json::json!({
            "upload": plan.upload_names(),
            "download": plan.download_names(),
        }));
    }

    if plan.is_empty() {
        println!("Already in sync.");
        return Ok(());
    }
    println!("Preview:");
    println!("  To upload:   {}", plan.uploads.len());
    println!("  To download: {}", plan.downloads.len());
    for name in plan.upload_names() {
        println!("  ↑ {}", name);
    }
    for name in plan.download_names() {
        println!("  ↓ {}", name);
    }
    Ok(())
}

fn print_sync_result(title: &str, result: &SyncResult, options: &CliOptions) -> anyhow::Result<()> {
    if options.json {
        return print_json(result);
    }

    println!("{}:", title);
    println!("  Uploaded:   {}", result.uploaded.len());
    println!("  Downloaded: {}", result.downloaded.len());
    for name in &result.uploaded {
        println!("  ↑ {}", name);
    }
    for name in &result.downloaded {
        println!("  ↓ {}", name);
    }
    if !result.conflicts.is_empty() {
        println!();
        println!("Conflicts:");
        for name in &result.conflicts {
            println!("  - {}", name);
        }
    }
    Ok(())
}

/// Print CLI help
pub fn print_help() {
    println!("addonsync v{}", env!("CARGO_PKG_VERSION"));
    println!("Capture, apply and sync add-on settings profiles");
    println!();
    println!("USAGE:");
    println!("    addonsync <command> [options]");
    println!();
    println!("COMMANDS:");
    println!("    status                      Show remote store connection");
    println!("    config [--save]             Show (and optionally save) the configuration");
    println!("    list                        List stored profiles");
    println!("    show <id>                   Show one profile");
    println!("    delete <id> [--remote]      Delete a local (or remote) profile");
    println!("    capture <name> --addons a,b Capture settings from the live account");
    println!("        [--description <text>] [--no-game-settings]");
    println!("    apply <id>                  Back up, then apply a profile");
    println!("    preview                     Show what sync would transfer");
    println!("    sync                        Reconcile with the remote store");
    println!("    push-all --yes              Upload every profile, overwriting remote copies");
    println!("    pull-all --yes              Download every profile, overwriting local copies");
    println!("    backups                     List backups");
    println!("    restore <backup-dir>        Restore a backup onto its account");
    println!("    activity                    Show recent activity");
    println!();
    println!("OPTIONS:");
    println!("    --json                      Output in JSON format");
    println!("    --offline                   Use an in-process remote store");
    println!("    --game-path <dir>           Override the game install path");
    println!("    --account <name>            Override the account");
    println!("    --variant <variant>         retail, classic, classic_era or ptr");
    println!("    --data-dir <dir>            Override where profiles and backups live");
    println!();
    println!("ENVIRONMENT:");
    println!("    ADDONSYNC_ACCESS_TOKEN      Remote store access token");
    println!("    ADDONSYNC_LOG               Log filter (default: warn)");
    println!();
    println!("EXAMPLES:");
    println!("    addonsync capture \"Raid night\" --addons plater,dbm,weakauras");
    println!("    addonsync preview --json");
    println!("    addonsync push-all --yes");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_addons() {
        let addons = parse_addons("plater, DBM,WeakAuras").unwrap();
        assert_eq!(addons, vec![Addon::Plater, Addon::Dbm, Addon::WeakAuras]);

        assert!(parse_addons("plater,nonsense").is_err());
        assert!(parse_addons(" , ").is_err());
    }

    #[test]
    fn test_parse_args_capture() {
        let (cmd, options) = parse_args(&args(&[
            "capture",
            "Raid",
            "--addons",
            "plater,details",
            "--description",
            "mythic setup",
            "--no-game-settings",
            "--json",
        ]))
        .unwrap();

        assert!(options.json);
        assert_eq!(
            cmd,
            CliCommand::Capture {
                name: "Raid".to_string(),
                addons: vec![Addon::Plater, Addon::Details],
                description: Some("mythic setup".to_string()),
                game_settings: false,
            }
        );
    }

    #[test]
    fn test_capture_requires_addons() {
        assert!(parse_args(&args(&["capture", "Raid"])).is_err());
        assert!(parse_args(&args(&["capture", "--addons", "plater"])).is_err());
    }

    #[test]
    fn test_bulk_operations_require_confirmation() {
        assert!(parse_args(&args(&["push-all"])).is_err());
        assert!(parse_args(&args(&["pull-all"])).is_err());

        let (cmd, options) = parse_args(&args(&["push-all", "--yes"])).unwrap();
        assert_eq!(cmd, CliCommand::PushAll);
        assert!(options.yes);
        let (cmd, _) = parse_args(&args(&["pull-all", "-y"])).unwrap();
        assert_eq!(cmd, CliCommand::PullAll);
    }

    #[test]
    fn test_parse_args_operands() {
        let (cmd, _) = parse_args(&args(&["apply", "abc-123"])).unwrap();
        assert_eq!(cmd, CliCommand::Apply { id: "abc-123".to_string() });

        let (cmd, _) = parse_args(&args(&["delete", "abc", "--remote"])).unwrap();
        assert_eq!(
            cmd,
            CliCommand::Delete {
                id: "abc".to_string(),
                remote: true
            }
        );
        assert!(cmd.needs_remote());

        let (cmd, _) = parse_args(&args(&["restore", "/tmp/backup"])).unwrap();
        assert_eq!(cmd, CliCommand::Restore { path: PathBuf::from("/tmp/backup") });

        assert!(parse_args(&args(&["show"])).is_err());
    }

    #[test]
    fn test_parse_args_overrides() {
        let (cmd, options) = parse_args(&args(&[
            "--offline",
            "sync",
            "--game-path",
            "/games/wow",
            "--account",
            "MAIN",
            "--variant",
            "classic",
        ]))
        .unwrap();
        assert_eq!(cmd, CliCommand::Sync);
        assert!(options.offline);

        let mut config = Config::default();
        options.apply_overrides(&mut config);
        assert_eq!(config.game_path, Some(PathBuf::from("/games/wow")));
        assert_eq!(config.account.as_deref(), Some("MAIN"));
        assert_eq!(config.variant, GameVariant::Classic);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["list", "--bogus"])).is_err());
        assert!(parse_args(&args(&["list", "--variant", "moon"])).is_err());
        assert!(parse_args(&args(&["list", "--account"])).is_err());
    }

    #[test]
    fn test_local_commands_stay_offline() {
        assert!(!CliCommand::List.needs_remote());
        assert!(!CliCommand::Apply { id: "x".to_string() }.needs_remote());
        assert!(CliCommand::Sync.needs_remote());
        assert!(CliCommand::Status.needs_remote());
    }
}
