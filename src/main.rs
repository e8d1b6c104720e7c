//! brcodes - inspect, edit, and watch captured Broadlink remote codes.
//!
//! Provides both human-friendly and machine-readable (robot mode) output.
#![forbid(unsafe_code)]

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use clap::Parser;
use console::style;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use brcodes::cli::{self, Cli, Commands};
use brcodes::entities::{EntityDiff, EntitySync, MemoryEntityRegistry, buttons_for};
use brcodes::error::{CodesError, Result, ResultExt};
use brcodes::naming::{colon_mac, format_name};
use brcodes::{CodeStore, Settings, StoreRegistry, logging};

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> &'static str {
        option_env!("VERGEN_GIT_DIRTY").unwrap_or("false")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color || !io::stdout().is_terminal() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    logging::init_logging(cli.use_json(), cli.verbose, cli.quiet);

    if let Err(e) = run(&cli).await {
        output_error(&cli, &e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let command = match &cli.command {
        None => return print_quick_start(cli),
        Some(Commands::Version) => return cmd_version(cli),
        Some(Commands::Completions(args)) => return cmd_completions(args),
        Some(command) => command,
    };

    let watch = matches!(command, Commands::Watch(_));
    let store = open_store(cli, watch).await?;

    match command {
        Commands::Devices => cmd_devices(cli, &store),
        Commands::Commands(args) => cmd_commands(cli, &store, args),
        Commands::Get(args) => cmd_get(cli, &store, args),
        Commands::Buttons => cmd_buttons(cli, &store),
        Commands::AddDevice(args) => cmd_add_device(cli, &store, args).await,
        Commands::RemoveDevice(args) => cmd_remove_device(cli, &store, args).await,
        Commands::RenameDevice(args) => cmd_rename_device(cli, &store, args).await,
        Commands::Set(args) => cmd_set(cli, &store, args).await,
        Commands::Remove(args) => cmd_remove(cli, &store, args).await,
        Commands::Rename(args) => cmd_rename(cli, &store, args).await,
        Commands::Watch(args) => cmd_watch(cli, &store, args).await,
        Commands::Version | Commands::Completions(_) => Ok(()),
    }
}

async fn open_store(cli: &Cli, watch: bool) -> Result<CodeStore> {
    let hub = cli.hub.as_deref().ok_or_else(|| {
        CodesError::Config("No hub selected: pass --hub <MAC> or set BRCODES_HUB".to_string())
    })?;

    let mut settings = Settings::discover(cli.config.as_deref())?;
    if let Some(dir) = &cli.storage_dir {
        settings.storage_dir.clone_from(dir);
    }
    settings.watch = watch;

    StoreRegistry::new(settings).get_or_create(hub).await
}

// === Quick Start ===

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn print_quick_start(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "tool": "brcodes",
                "version": build_info::VERSION,
                "description": "Watched store for captured Broadlink IR/RF codes",
                "inspect": {
                    "devices": "brcodes --hub <MAC> devices --robot",
                    "commands": "brcodes --hub <MAC> commands <DEVICE> --robot",
                    "code": "brcodes --hub <MAC> get <DEVICE> <COMMAND> --robot",
                    "buttons": "brcodes --hub <MAC> buttons --robot",
                },
                "edit": {
                    "add_device": "brcodes add-device <DEVICE>",
                    "set_code": "brcodes set <DEVICE> <COMMAND> <CODE>",
                    "rename_device": "brcodes rename-device <OLD> <NEW> [--force]",
                    "rename_command": "brcodes rename <DEVICE> <OLD> <NEW> [--force]",
                    "remove_command": "brcodes remove <DEVICE> <COMMAND>",
                    "remove_device": "brcodes remove-device <DEVICE>",
                },
                "watch": "brcodes --hub <MAC> watch --robot",
                "environment": {
                    "hub": "BRCODES_HUB",
                    "storage_dir": "BRCODES_STORAGE_DIR",
                    "config": "BRCODES_CONFIG",
                },
            }),
        );
    } else {
        println!(
            "{} {} - Broadlink code store\n",
            style("brcodes").bold().cyan(),
            build_info::VERSION
        );
        println!("{}", style("QUICK START").bold().underlined());
        println!();
        println!("  {}  Pick a hub", style("export BRCODES_HUB=aa:bb:cc:dd:ee:ff").green());
        println!("  {}  List devices", style("brcodes devices").green());
        println!("  {}  List commands", style("brcodes commands tv").green());
        println!("  {}  Store a code", style("brcodes set tv power <CODE>").green());
        println!("  {}  Rename a command", style("brcodes rename tv power on").green());
        println!("  {}  Follow edits", style("brcodes watch").green());
        println!();
        println!("Run {} for all commands.", style("brcodes --help").bold());
    }
    Ok(())
}

// === Inspection ===

#[derive(Serialize)]
struct DeviceSummary {
    name: String,
    commands: usize,
}

#[derive(Serialize)]
struct DevicesReport {
    hub: String,
    path: String,
    last_modified: Option<DateTime<Utc>>,
    devices: Vec<DeviceSummary>,
}

fn cmd_devices(cli: &Cli, store: &CodeStore) -> Result<()> {
    let codes = store.snapshot()?;
    let report = DevicesReport {
        hub: colon_mac(store.hub()),
        path: store.path().display().to_string(),
        last_modified: store.last_modified().map(DateTime::<Utc>::from),
        devices: codes
            .iter()
            .map(|(name, commands)| DeviceSummary {
                name: name.clone(),
                commands: commands.len(),
            })
            .collect(),
    };

    if cli.use_json() {
        output_json(cli, &report);
        return Ok(());
    }

    if report.devices.is_empty() {
        println!("{}", style("No devices stored for this hub").yellow());
        println!("Add one with: brcodes add-device <NAME>");
        return Ok(());
    }
    for d in &report.devices {
        println!("{} ({} commands)", style(&d.name).green(), d.commands);
    }
    if !cli.quiet {
        if let Some(modified) = report.last_modified {
            println!(
                "\n{}",
                style(format!("Last changed {}", modified.format("%Y-%m-%d %H:%M:%S UTC"))).dim()
            );
        }
    }
    Ok(())
}

fn cmd_commands(cli: &Cli, store: &CodeStore, args: &cli::DeviceArgs) -> Result<()> {
    require_device(store, &args.device)?;
    let commands = store.get_commands(&args.device)?;

    if cli.use_json() {
        output_json(cli, &commands);
    } else if commands.is_empty() {
        println!("{}", style(format!("No commands stored for '{}'", args.device)).yellow());
    } else {
        for name in commands.keys() {
            println!("{name}");
        }
    }
    Ok(())
}

fn cmd_get(cli: &Cli, store: &CodeStore, args: &cli::CommandArgs) -> Result<()> {
    let value = store
        .get_command(&args.device, &args.command)?
        .ok_or_else(|| command_not_found(&args.device, &args.command))?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "device": args.device,
                "command": args.command,
                "value": value,
            }),
        );
    } else {
        match value {
            Value::String(code) => println!("{code}"),
            other => println!("{other}"),
        }
    }
    Ok(())
}

fn cmd_buttons(cli: &Cli, store: &CodeStore) -> Result<()> {
    let buttons = buttons_for(store.hub(), &store.snapshot()?);

    if cli.use_json() {
        output_json(cli, &buttons);
    } else if buttons.is_empty() {
        println!("{}", style("No buttons: no commands stored for this hub").yellow());
    } else {
        println!(
            "{}: {}",
            style("Hub").bold(),
            colon_mac(store.hub())
        );
        let mut device = None;
        for b in &buttons {
            if device != Some(&b.device) {
                println!("\n{}", style(format_name(&b.device)).bold());
                device = Some(&b.device);
            }
            println!("  {}  {}", style(&b.unique_id).dim(), b.name);
        }
    }
    Ok(())
}

// === Devices ===

async fn cmd_add_device(cli: &Cli, store: &CodeStore, args: &cli::DeviceArgs) -> Result<()> {
    let created = store.create_device(&args.device)?;
    store.flush().await?;

    report(
        cli,
        serde_json::json!({ "device": args.device, "created": created, "ok": true }),
        if created {
            format!("Device '{}' created", args.device)
        } else {
            format!("Device '{}' already exists", args.device)
        },
    );
    Ok(())
}

async fn cmd_remove_device(cli: &Cli, store: &CodeStore, args: &cli::DeviceArgs) -> Result<()> {
    require_device(store, &args.device)?;
    store.delete_device(&args.device)?;
    store.flush().await?;

    report(
        cli,
        serde_json::json!({ "device": args.device, "removed": true, "ok": true }),
        format!("Device '{}' removed", args.device),
    );
    Ok(())
}

async fn cmd_rename_device(
    cli: &Cli,
    store: &CodeStore,
    args: &cli::RenameDeviceArgs,
) -> Result<()> {
    require_device(store, &args.old)?;
    if args.old != args.new && !args.force && store.device_exists(&args.new)? {
        return Err(CodesError::NameCollision {
            name: args.new.clone(),
            scope: None,
        });
    }
    store.rename_device(&args.old, &args.new)?;
    store.flush().await?;

    report(
        cli,
        serde_json::json!({ "from": args.old, "to": args.new, "ok": true }),
        format!("Device '{}' renamed to '{}'", args.old, args.new),
    );
    Ok(())
}

// === Commands ===

async fn cmd_set(cli: &Cli, store: &CodeStore, args: &cli::SetArgs) -> Result<()> {
    let value = match (&args.value, &args.from_file) {
        (Some(code), _) => code.clone(),
        (None, Some(path)) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            base64::engine::general_purpose::STANDARD.encode(bytes)
        }
        (None, None) => return Err(CodesError::Other("No code value given".to_string())),
    };

    if args.create_device {
        store.create_device(&args.device)?;
    } else {
        require_device(store, &args.device)?;
    }
    let existed = store.command_exists(&args.device, &args.command)?;
    store.update_command_value(&args.device, &args.command, Value::String(value))?;
    store.flush().await?;

    report(
        cli,
        serde_json::json!({
            "device": args.device,
            "command": args.command,
            "replaced": existed,
            "ok": true,
        }),
        format!(
            "Command '{}/{}' {}",
            args.device,
            args.command,
            if existed { "updated" } else { "stored" }
        ),
    );
    Ok(())
}

async fn cmd_remove(cli: &Cli, store: &CodeStore, args: &cli::CommandArgs) -> Result<()> {
    if !store.command_exists(&args.device, &args.command)? {
        return Err(command_not_found(&args.device, &args.command));
    }
    store.delete_command(&args.device, &args.command)?;
    store.flush().await?;

    report(
        cli,
        serde_json::json!({ "device": args.device, "command": args.command, "removed": true, "ok": true }),
        format!("Command '{}/{}' removed", args.device, args.command),
    );
    Ok(())
}

async fn cmd_rename(cli: &Cli, store: &CodeStore, args: &cli::RenameCommandArgs) -> Result<()> {
    if !store.command_exists(&args.device, &args.old)? {
        return Err(command_not_found(&args.device, &args.old));
    }
    if args.old != args.new && !args.force && store.command_exists(&args.device, &args.new)? {
        return Err(CodesError::NameCollision {
            name: args.new.clone(),
            scope: Some(args.device.clone()),
        });
    }
    store.rename_command(&args.device, &args.old, &args.new)?;
    store.flush().await?;

    report(
        cli,
        serde_json::json!({ "device": args.device, "from": args.old, "to": args.new, "ok": true }),
        format!("Command '{}/{}' renamed to '{}'", args.device, args.old, args.new),
    );
    Ok(())
}

// === Monitoring ===

async fn cmd_watch(cli: &Cli, store: &CodeStore, args: &cli::WatchArgs) -> Result<()> {
    let sync = Arc::new(EntitySync::new(store.hub(), MemoryEntityRegistry::new()));
    let initial = sync.apply(&store.snapshot()?);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let callback_sync = Arc::clone(&sync);
    store.set_change_callback(move |codes| {
        let _ = tx.send(callback_sync.apply(codes));
    });

    if !cli.quiet && !cli.use_json() {
        println!(
            "Watching {} ({} buttons, Ctrl+C to stop)...",
            store.path().display(),
            initial.added_buttons.len()
        );
    }

    let deadline = (args.timeout > 0)
        .then(|| tokio::time::Instant::now() + Duration::from_secs(args.timeout));
    loop {
        let next = tokio::select! {
            diff = rx.recv() => diff,
            () = sleep_until_deadline(deadline) => break,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(diff) = next else { break };
        if diff.is_empty() {
            continue;
        }
        print_diff(cli, &diff);
        if args.once {
            break;
        }
    }

    store.clear_change_callback();
    Ok(())
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn print_diff(cli: &Cli, diff: &EntityDiff) {
    if cli.use_json() {
        let json = serde_json::json!({
            "added_buttons": diff.added_buttons.iter().map(|b| &b.unique_id).collect::<Vec<_>>(),
            "removed_buttons": diff.removed_buttons,
            "added_devices": diff.added_devices.iter().map(|d| &d.name).collect::<Vec<_>>(),
            "removed_devices": diff.removed_devices,
        });
        // One event per line so consumers can stream it.
        println!("{json}");
        return;
    }

    for device in &diff.added_devices {
        println!("{} device {}", style("+").green(), device.name);
    }
    for device in &diff.removed_devices {
        println!("{} device {}", style("-").red(), device);
    }
    for button in &diff.added_buttons {
        println!("{} {}", style("+").green(), button.name);
    }
    for unique_id in &diff.removed_buttons {
        println!("{} {}", style("-").red(), unique_id);
    }
}

// === Utilities ===

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_version(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "version": build_info::VERSION,
                "git_sha": build_info::git_sha(),
                "git_dirty": build_info::git_dirty() == "true",
                "build_timestamp": build_info::build_timestamp(),
                "rustc_version": build_info::rustc_semver(),
                "target": build_info::target(),
            }),
        );
    } else {
        println!("brcodes {}", build_info::VERSION);
        println!(
            "git: {}{}",
            build_info::git_sha(),
            if build_info::git_dirty() == "true" {
                " (dirty)"
            } else {
                ""
            }
        );
        println!("built: {}", build_info::build_timestamp());
        println!("rustc: {}", build_info::rustc_semver());
        println!("target: {}", build_info::target());
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_completions(args: &cli::CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "brcodes", &mut io::stdout());
    Ok(())
}

fn require_device(store: &CodeStore, device: &str) -> Result<()> {
    if store.device_exists(device)? {
        Ok(())
    } else {
        Err(CodesError::DeviceNotFound {
            name: device.to_string(),
        })
    }
}

fn command_not_found(device: &str, command: &str) -> CodesError {
    CodesError::CommandNotFound {
        device: device.to_string(),
        command: command.to_string(),
    }
}

fn report(cli: &Cli, json: Value, text: String) {
    if cli.use_json() {
        output_json(cli, &json);
    } else if !cli.quiet {
        println!("{text}");
    }
}

fn output_json<T: Serialize>(cli: &Cli, data: &T) {
    let json = if cli.use_compact_json() {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    match json {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize output: {e}"),
    }
}

fn output_error(cli: &Cli, error: &CodesError) {
    if cli.use_json() {
        let json = serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        });
        eprintln!("{json:#}");
    } else {
        eprintln!("{}: {}", style("Error").red().bold(), error);
        if let Some(suggestion) = error.suggestion() {
            eprintln!("{}: {}", style("Hint").yellow(), suggestion);
        }
    }
}
