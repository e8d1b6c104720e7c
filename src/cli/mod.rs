//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// brcodes - inspect, edit, and watch captured Broadlink remote codes.
///
/// Robot Mode: Use --robot or --format=json for machine-parseable output.
#[derive(Parser, Debug)]
#[command(name = "brcodes", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (text for humans, json for scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "BRCODES_FORMAT"
    )]
    pub format: OutputFormat,

    /// Robot mode: equivalent to --format=json
    #[arg(long, global = true)]
    pub robot: bool,

    /// Verbose logging (repeat for more: -v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Settings file (TOML)
    #[arg(long, short = 'c', global = true, env = "BRCODES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the codes files (overrides the settings file)
    #[arg(long, global = true, env = "BRCODES_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// MAC address of the Broadlink hub
    #[arg(long, short = 'H', global = true, env = "BRCODES_HUB")]
    pub hub: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON (robot mode or explicit --format=json).
    pub const fn use_json(&self) -> bool {
        self.robot || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // === Inspection ===
    /// List devices stored for the hub
    Devices,

    /// List the commands of a device
    Commands(DeviceArgs),

    /// Print the stored code of a command
    Get(CommandArgs),

    /// List the button entities derived from the stored codes
    Buttons,

    // === Devices ===
    /// Add an empty device
    AddDevice(DeviceArgs),

    /// Remove a device and all its commands
    RemoveDevice(DeviceArgs),

    /// Rename a device
    RenameDevice(RenameDeviceArgs),

    // === Commands ===
    /// Store a code under a command, creating or overwriting it
    Set(SetArgs),

    /// Remove a command
    Remove(CommandArgs),

    /// Rename a command
    Rename(RenameCommandArgs),

    // === Monitoring ===
    /// Watch the codes file and report entity changes as it is edited
    Watch(WatchArgs),

    // === Utilities ===
    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// === Argument Structs ===

#[derive(Parser, Debug)]
pub struct DeviceArgs {
    /// Device name (case-sensitive)
    pub device: String,
}

#[derive(Parser, Debug)]
pub struct CommandArgs {
    /// Device name
    pub device: String,

    /// Command name
    pub command: String,
}

#[derive(Parser, Debug)]
pub struct RenameDeviceArgs {
    /// Current device name
    pub old: String,

    /// New device name
    pub new: String,

    /// Overwrite an existing device with the new name
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct RenameCommandArgs {
    /// Device name
    pub device: String,

    /// Current command name
    pub old: String,

    /// New command name
    pub new: String,

    /// Overwrite an existing command with the new name
    #[arg(long)]
    pub force: bool,
}

/// Arguments for storing a code.
///
/// # Examples
///
/// ```bash
/// # Store a base64 code captured elsewhere
/// brcodes --hub aa:bb:cc:dd:ee:ff set tv power JgBQAAABKZIUEhQ...
///
/// # Store a raw capture from a file (base64-encoded on the way in)
/// brcodes set tv power --from-file power.bin --create-device
/// ```
#[derive(Parser, Debug)]
pub struct SetArgs {
    /// Device name
    pub device: String,

    /// Command name
    pub command: String,

    /// Code value, stored as-is
    #[arg(required_unless_present = "from_file", conflicts_with = "from_file")]
    pub value: Option<String>,

    /// Read the raw code bytes from a file and store them base64-encoded
    #[arg(long, value_name = "PATH")]
    pub from_file: Option<PathBuf>,

    /// Create the device if it does not exist
    #[arg(long)]
    pub create_device: bool,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Exit after the first change
    #[arg(long)]
    pub once: bool,

    /// Timeout in seconds (0 = no timeout)
    #[arg(long, short = 't', default_value = "0")]
    pub timeout: u64,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
