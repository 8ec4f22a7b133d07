//! Confirmation prompts for commands that modify the device

use rkflasher_core::hash::file_md5;
use rkflasher_core::i18n::{tr, Lang};
use rkflasher_core::units::format_file_size;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Whether an answer means yes
fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Ask `message` and wait for y/N. `assume_yes` skips the prompt.
pub fn confirm(assume_yes: bool, lang: Lang, message: &str) -> io::Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    println!("{}", message);
    print!("{} [y/N] ", tr(lang, "confirm_proceed"));
    io::stdout().flush()?;

    let mut answer = String::new();
    let read = io::stdin().lock().read_line(&mut answer)?;
    let accepted = read > 0 && is_yes(&answer);
    if !accepted {
        println!("{}", tr(lang, "aborted"));
    }
    Ok(accepted)
}

/// Burn details shown before writing
pub fn burn_summary(lang: Lang, image: &Path, target: &str) -> io::Result<String> {
    let size = fs::metadata(image)?.len();
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| image.display().to_string());
    Ok(format!(
        "{}\n  {}: {}\n  {}: {}\n  {}: {}\n  {}: {}",
        tr(lang, "confirm_burn_title"),
        tr(lang, "file_name"),
        name,
        tr(lang, "file_size"),
        format_file_size(size),
        tr(lang, "target_address"),
        target,
        tr(lang, "md5"),
        file_md5(image)?
    ))
}
