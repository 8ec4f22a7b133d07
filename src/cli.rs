//! CLI argument parsing

use clap::{Parser, Subcommand};
use rkflasher_core::i18n::Lang;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u64
fn parse_hex_u64(s: &str) -> Result<u64, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u64>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a size like "128MB", "1.5GB" or "0x100000"
fn parse_size(s: &str) -> Result<u64, String> {
    rkflasher_core::units::parse_size(s).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "rkflasher")]
#[command(author, version, about = "Rockchip flashing front end for rkdeveloptool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Settings file (TOML)
    /// Defaults to ./rkflasher.toml, then /etc/rkflasher/config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend to use: rkdeveloptool[:path=<binary>] or dummy[:mode=<mode>,...]
    #[arg(short, long, global = true)]
    pub backend: Option<String>,

    /// Path to the rkdeveloptool binary
    #[arg(long, global = true)]
    pub tool: Option<PathBuf>,

    /// Message language (en, zh)
    #[arg(long, global = true)]
    pub lang: Option<Lang>,

    /// Extra chip database file (RON)
    #[arg(long, global = true)]
    pub chip_db: Option<PathBuf>,

    /// Do not ask for confirmation before modifying the device
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where to write or verify: an LBA or a partition name
#[derive(clap::Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// Start sector (hex, e.g., 0x4000)
    #[arg(short, long, value_parser = parse_hex_u64)]
    pub address: Option<u64>,

    /// Partition name
    #[arg(short, long)]
    pub partition: Option<String>,
}

/// Burn options overriding the settings file
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BurnArgs {
    /// Skip read-back verification
    #[arg(long)]
    pub no_verify: bool,

    /// Erase the whole flash before writing
    #[arg(long)]
    pub erase: bool,

    /// Do not reset the device afterwards
    #[arg(long)]
    pub no_reset: bool,

    /// Extra write attempts after a failure (0-10)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub retries: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List connected devices
    List,

    /// Watch for devices until interrupted
    Watch {
        /// Stop after this many events
        #[arg(long)]
        count: Option<usize>,
    },

    /// Show device, chip and flash information
    Info,

    /// Read the chip info block (rci)
    Chip,

    /// Read the capability block (rcb)
    Capability,

    /// Read flash info (rfi) merged with the flash ID (rid)
    FlashInfo,

    /// Read the flash ID (rid)
    FlashId,

    /// Show the partition table (ppt)
    Partitions {
        /// Export the table to a TOML file
        #[arg(long)]
        export: Option<PathBuf>,

        /// Print the table as an mtdparts string
        #[arg(long)]
        mtdparts: bool,
    },

    /// Download a loader to a maskrom device (db)
    DownloadBoot {
        /// Loader file
        loader: PathBuf,
    },

    /// Write a new loader to flash (ul)
    UpgradeLoader {
        /// Loader file
        loader: PathBuf,
    },

    /// Reset the device (rd)
    Reset,

    /// Test the device connection (td)
    Test,

    /// Read sectors to a file (rl)
    Read {
        /// Start sector (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u64)]
        start: u64,

        /// Number of sectors (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u64, conflicts_with = "length")]
        count: Option<u64>,

        /// Length in bytes (e.g., 4MB)
        #[arg(short, long, value_parser = parse_size)]
        length: Option<u64>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a file at an address or into a partition (wl / wlx)
    Burn {
        /// Image file
        image: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        options: BurnArgs,
    },

    /// Read a partition to a file
    BackupPartition {
        /// Partition name
        name: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Length in bytes, required for the last partition
        #[arg(short, long, value_parser = parse_size)]
        length: Option<u64>,
    },

    /// Back up the whole flash
    Backup {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Length in bytes (default: capacity reported by the device)
        #[arg(short, long, value_parser = parse_size)]
        length: Option<u64>,
    },

    /// Compare flash contents with a file
    Verify {
        /// Image file
        image: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Compare only this many bytes
        #[arg(short, long, value_parser = parse_size)]
        length: Option<u64>,
    },

    /// Print the MD5 digest of a file
    Md5 {
        /// File to hash
        file: PathBuf,
    },

    /// Erase the whole flash (ef)
    Erase,

    /// Storage media operations
    #[command(subcommand)]
    Storage(StorageCommands),

    /// Pack a bootloader (pack)
    Pack {
        /// Output file
        output: PathBuf,
    },

    /// Unpack a bootloader (unpack)
    Unpack {
        /// Bootloader file
        input: PathBuf,
    },

    /// Write a GPT from a parameter file (gpt)
    Gpt {
        /// Parameter file
        file: PathBuf,
    },

    /// Write a parameter file (prm)
    Prm {
        /// Parameter file
        file: PathBuf,
    },

    /// Tag an SPL image (tagspl)
    Tagspl {
        /// Tag
        tag: String,

        /// SPL file
        spl: PathBuf,
    },

    /// Show the partitions defined in a parameter file
    Parameter {
        /// Parameter file
        file: PathBuf,

        /// Export the table to a TOML file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Load the loader if needed, then write a full firmware image
    Upgrade {
        /// Loader file, used when the device is in maskrom mode
        #[arg(long)]
        loader: PathBuf,

        /// Firmware image
        #[arg(long)]
        firmware: PathBuf,

        #[command(flatten)]
        options: BurnArgs,
    },

    /// Mass production: write one image to every connected device
    #[command(subcommand)]
    Mass(MassCommands),

    /// List known chips
    ListChips,

    /// List available backends
    ListBackends,
}

/// Storage subcommands
#[derive(Subcommand)]
pub enum StorageCommands {
    /// Probe which media the loader accepts
    List,

    /// Switch to a medium (name or code: EMMC/1, SD/2, SPINOR/9)
    Set {
        /// Medium
        storage: String,
    },
}

/// Mass production subcommands
#[derive(Subcommand)]
pub enum MassCommands {
    /// List the devices a run would write to
    Scan,

    /// Write the firmware to all devices
    Run {
        /// Firmware image
        firmware: PathBuf,
    },
}
