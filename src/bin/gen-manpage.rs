//! Man page generator for rkflasher
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::PathBuf;

#[path = "../cli.rs"]
mod cli;

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    let mut pages = vec![(String::from("rkflasher.1"), clap_mangen::Man::new(cmd.clone()))];
    // Subcommand groups get their own page
    for sub in cmd.get_subcommands().filter(|s| s.has_subcommands()) {
        let file = format!("rkflasher-{}.1", sub.get_name());
        pages.push((file, clap_mangen::Man::new(sub.clone())));
    }

    for (file, man) in pages {
        let mut buffer = Vec::new();
        man.render(&mut buffer)?;
        let output_path = output_dir.join(file);
        fs::write(&output_path, buffer)?;
        println!("Man page generated at: {}", output_path.display());
    }

    println!("\nTo view the man page:");
    println!("  man -l {}", output_dir.join("rkflasher.1").display());

    Ok(())
}
