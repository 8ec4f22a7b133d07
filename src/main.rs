//! rkflasher - Command-line front end for rkdeveloptool
//!
//! Every device operation is one rkdeveloptool invocation (or a short flow of
//! them, like burn + verify + reset). The tool's output is parsed into typed
//! records by `rkflasher-core`; `rkflasher-tool` runs the process and holds
//! the session state.
//!
//! # Backends
//!
//! - `rkdeveloptool[:path=<binary>]` runs the real binary (the default)
//! - `dummy[:mode=maskrom,...]` answers from an emulated device, for trying
//!   the CLI without hardware

mod cli;
mod commands;
mod config;

use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands, MassCommands, StorageCommands};
use commands::merge_burn_options;
use config::Settings;
use rkflasher_core::backend::Request;
use rkflasher_core::chip::ChipDatabase;
use rkflasher_core::i18n::tr;
use rkflasher_tool::{open_backend, Session, ToolError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            process::exit(1);
        }
    };

    let db = match load_chip_database(settings.chip_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load chip database: {}", e);
            process::exit(1);
        }
    };
    log::debug!("Loaded {} chip definitions", db.len());

    // Commands that never talk to a device
    match &cli.command {
        Commands::ListChips => {
            commands::list_chips(&db);
            return Ok(());
        }
        Commands::ListBackends => {
            commands::list_backends();
            return Ok(());
        }
        Commands::Md5 { file } => return commands::md5(file),
        Commands::Parameter { file, export } => {
            return commands::parameter(file, export.as_deref())
        }
        _ => {}
    }

    let backend = match open_backend(&settings.backend, settings.tool.as_deref()) {
        Ok(backend) => backend,
        Err(ToolError::NotFound(detail)) => {
            eprintln!("{}", tr(settings.lang, "tool_not_found_title"));
            eprintln!("{}", tr(settings.lang, "tool_not_found_message"));
            log::debug!("{}", detail);
            process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };
    log::debug!("Using backend {}", backend.name());

    let mut session = Session::new(backend, Arc::new(db), settings.lang)
        .with_query_timeout(settings.query_timeout());
    let yes = cli.yes;
    let burn_defaults = settings.burn.to_options();

    match cli.command {
        Commands::List => commands::list_devices(&mut session),
        Commands::Watch { count } => {
            commands::watch(&mut session, settings.poll.to_config(), count)
        }
        Commands::Info => commands::info(&mut session),
        Commands::Chip => commands::chip(&mut session),
        Commands::Capability => commands::capability(&mut session),
        Commands::FlashInfo => commands::flash_info(&mut session),
        Commands::FlashId => commands::flash_id(&mut session),
        Commands::Partitions { export, mtdparts } => {
            commands::partitions(&mut session, export.as_deref(), mtdparts)
        }
        Commands::DownloadBoot { loader } => {
            commands::run_request(&mut session, &Request::DownloadBoot { loader }, yes)
        }
        Commands::UpgradeLoader { loader } => {
            commands::run_request(&mut session, &Request::UpgradeLoader { loader }, yes)
        }
        Commands::Reset => commands::run_request(&mut session, &Request::Reset, yes),
        Commands::Test => commands::run_request(&mut session, &Request::TestDevice, yes),
        Commands::Read {
            start,
            count,
            length,
            output,
        } => commands::read(&mut session, start, count, length, &output),
        Commands::Burn {
            image,
            target,
            options,
        } => commands::burn(
            &mut session,
            &image,
            &target,
            merge_burn_options(burn_defaults, &options),
            yes,
        ),
        Commands::BackupPartition {
            name,
            output,
            length,
        } => commands::backup_partition(&mut session, &name, &output, length),
        Commands::Backup { output, length } => commands::backup(&mut session, &output, length),
        Commands::Verify {
            image,
            target,
            length,
        } => commands::verify(&mut session, &image, &target, length),
        Commands::Erase => commands::run_request(&mut session, &Request::EraseFlash, yes),
        Commands::Storage(StorageCommands::List) => commands::storage_list(&mut session),
        Commands::Storage(StorageCommands::Set { storage }) => {
            commands::storage_set(&mut session, &storage)
        }
        Commands::Pack { output } => {
            commands::run_request(&mut session, &Request::Pack { output }, yes)
        }
        Commands::Unpack { input } => {
            commands::run_request(&mut session, &Request::Unpack { input }, yes)
        }
        Commands::Gpt { file } => {
            commands::run_request(&mut session, &Request::WriteGpt { file }, yes)
        }
        Commands::Prm { file } => {
            commands::run_request(&mut session, &Request::WriteParameter { file }, yes)
        }
        Commands::Tagspl { tag, spl } => {
            commands::run_request(&mut session, &Request::TagSpl { tag, spl }, yes)
        }
        Commands::Upgrade {
            loader,
            firmware,
            options,
        } => commands::upgrade(
            &mut session,
            &loader,
            &firmware,
            merge_burn_options(burn_defaults, &options),
            yes,
        ),
        Commands::Mass(MassCommands::Scan) => commands::mass_scan(&mut session),
        Commands::Mass(MassCommands::Run { firmware }) => {
            commands::mass_run(&mut session, &firmware, yes)
        }
        Commands::ListChips
        | Commands::ListBackends
        | Commands::Md5 { .. }
        | Commands::Parameter { .. } => Ok(()),
    }
}

/// Load the settings file and apply command-line overrides
fn load_settings(cli: &Cli) -> Result<Settings, config::ConfigError> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(backend) = &cli.backend {
        settings.backend = backend.clone();
    }
    if let Some(tool) = &cli.tool {
        settings.tool = Some(tool.clone());
    }
    if let Some(lang) = cli.lang {
        settings.lang = lang;
    }
    if let Some(chip_db) = &cli.chip_db {
        settings.chip_db = Some(chip_db.clone());
    }
    Ok(settings)
}

/// Built-in chips plus the entries of an optional RON file
fn load_chip_database(path: Option<&Path>) -> Result<ChipDatabase, Box<dyn std::error::Error>> {
    let mut db = ChipDatabase::builtin();

    if let Some(path) = path {
        if !path.is_file() {
            return Err(format!("Chip database path not found: {}", path.display()).into());
        }
        let count = db.load_file(path)?;
        log::debug!("Loaded {} chips from {}", count, path.display());
    }

    Ok(db)
}
