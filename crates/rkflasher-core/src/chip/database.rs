//! Chip database: built-in table plus RON override files

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

use super::types::{ChipEntry, ChipIdentity, IdentSource};
use crate::error::{Error, Result};
use crate::outcome::ParseOutcome;

static HEX_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"0[xX][0-9A-Fa-f]+").unwrap());

/// Fewest digits a decoded byte dump must yield to count as a signature
const MIN_SIGNATURE_DIGITS: usize = 3;

/// Chip lookup table
#[derive(Debug, Clone, Default)]
pub struct ChipDatabase {
    chips: Vec<ChipEntry>,
}

fn builtin_chips() -> Vec<ChipEntry> {
    vec![
        ChipEntry::builtin("RK3066", "RK3066 Family", &[0x300a], &["0x3066"], &["6603"]),
        ChipEntry::builtin("RK3188", "RK3188 Family", &[0x310b], &["0x3188"], &["8813"]),
        ChipEntry::builtin("RK3228", "RK322x Family", &[0x320b], &[], &["8223"]),
        ChipEntry::builtin("RK3288", "RK3288 Family", &[0x320a], &["0x3288"], &["8823"]),
        ChipEntry::builtin("RK3308", "RK3308 Family", &[0x330d], &[], &["8033"]),
        ChipEntry::builtin("RK3326", "PX30/RK3326 Family", &[0x330e], &[], &["6233"]),
        ChipEntry::builtin("RK3328", "RK3328 Family", &[0x320c], &["0x3328"], &["8233"]),
        ChipEntry::builtin("RK3368", "RK3368 Family", &[0x330a], &["0x3368"], &["8633"]),
        ChipEntry::builtin("RK3399", "RK3399 Family", &[0x330c], &["0x3399"], &["9933"]),
        ChipEntry::builtin("RK3528", "RK3528 Family", &[0x350c], &[], &["8253"]),
        ChipEntry::builtin("RK3562", "RK3562 Family", &[0x350f], &[], &["2653"]),
        ChipEntry::builtin("RK3566", "RK3566 Family", &[], &["0x3566"], &["6653"]),
        ChipEntry::builtin("RK3568", "RK3568 Family", &[0x350a], &["0x3568"], &["8653"]),
        ChipEntry::builtin("RK3576", "RK3576 Family", &[0x350e], &[], &["6753"]),
        ChipEntry::builtin("RK3588", "RK3588 Family", &[0x350b], &["0x3588"], &["8853"]),
        ChipEntry::builtin("RV1106", "RV1106 Family", &[0x110c], &[], &["6011"]),
        ChipEntry::builtin("RV1126", "RV1126 Family", &[0x110b], &[], &["6211"]),
    ]
}

/// Decode the `rci` byte dump into an ASCII digit string.
///
/// Tokens after the `:` of the `Chip Info` line are read as hex bytes, which
/// is what rkdeveloptool prints. If that gives fewer than three digits the
/// tokens are read as decimal bytes instead, which some wrappers emit.
pub fn decode_signature(text: &str) -> Option<String> {
    let dump = text
        .lines()
        .find(|line| line.to_ascii_lowercase().contains("chip info"))
        .and_then(|line| line.split_once(':').map(|(_, rest)| rest))
        .unwrap_or(text);

    let tokens: Vec<&str> = dump.split_whitespace().collect();
    let digits_with = |radix: u32| -> String {
        tokens
            .iter()
            .filter_map(|t| u8::from_str_radix(t.trim_start_matches("0x"), radix).ok())
            .filter(u8::is_ascii_digit)
            .map(char::from)
            .collect()
    };

    [16, 10]
        .into_iter()
        .map(digits_with)
        .find(|digits| digits.len() >= MIN_SIGNATURE_DIGITS)
}

impl ChipDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database holding the built-in chip table
    pub fn builtin() -> Self {
        Self {
            chips: builtin_chips(),
        }
    }

    /// Number of chips
    pub fn len(&self) -> usize {
        self.chips.len()
    }

    /// Whether the database is empty
    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }

    /// Iterate over all chips
    pub fn iter(&self) -> impl Iterator<Item = &ChipEntry> {
        self.chips.iter()
    }

    /// Add a chip, replacing any entry with the same name
    pub fn insert(&mut self, entry: ChipEntry) {
        match self
            .chips
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&entry.name))
        {
            Some(existing) => *existing = entry,
            None => self.chips.push(entry),
        }
    }

    /// Load chips from RON text. Returns the number of entries read.
    pub fn load_str(&mut self, text: &str) -> Result<usize> {
        let entries: Vec<ChipEntry> = ron::from_str(text)?;
        for entry in &entries {
            validate_entry(entry)?;
        }
        let count = entries.len();
        for entry in entries {
            self.insert(entry);
        }
        Ok(count)
    }

    /// Load chips from a RON file. Returns the number of entries read.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let text = fs::read_to_string(path)?;
        let count = self.load_str(&text)?;
        log::debug!("Loaded {} chip entries from {}", count, path.display());
        Ok(count)
    }

    /// Find a chip by name (case-insensitive)
    pub fn find_by_name(&self, name: &str) -> Option<&ChipEntry> {
        self.chips.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Find a chip by USB product ID
    pub fn find_by_pid(&self, pid: u16) -> Option<&ChipEntry> {
        self.chips.iter().find(|c| c.usb_pids.contains(&pid))
    }

    /// Find a chip by decoded `rci` signature
    pub fn find_by_signature(&self, signature: &str) -> Option<&ChipEntry> {
        self.chips
            .iter()
            .find(|c| c.signatures.iter().any(|s| s == signature))
    }

    /// Find a chip by legacy hex ID (case-insensitive)
    pub fn find_by_legacy_id(&self, id: &str) -> Option<&ChipEntry> {
        self.chips
            .iter()
            .find(|c| c.legacy_ids.iter().any(|l| l.eq_ignore_ascii_case(id)))
    }

    /// Identify a chip from its USB product ID
    pub fn identify_pid(&self, pid: u16) -> Option<ChipIdentity> {
        self.find_by_pid(pid)
            .map(|entry| ChipIdentity::from_entry(entry, IdentSource::UsbPid(pid)))
    }

    /// Identify a chip from `rci` output
    pub fn identify_rci(&self, text: &str) -> ParseOutcome<ChipIdentity> {
        if text.trim().is_empty() {
            return ParseOutcome::unrecognized(text);
        }

        if let Some(m) = HEX_ID.find(text) {
            let id = format!("0x{}", m.as_str()[2..].to_ascii_uppercase());
            if let Some(entry) = self.find_by_legacy_id(&id) {
                return ParseOutcome::Recognized(ChipIdentity::from_entry(
                    entry,
                    IdentSource::LegacyId(id),
                ));
            }
        }

        let lower = text.to_ascii_lowercase();
        if let Some(entry) = self
            .chips
            .iter()
            .find(|c| lower.contains(&c.name.to_ascii_lowercase()))
        {
            return ParseOutcome::Recognized(ChipIdentity::from_entry(entry, IdentSource::Name));
        }

        if let Some(signature) = decode_signature(text) {
            if let Some(entry) = self.find_by_signature(&signature) {
                return ParseOutcome::Recognized(ChipIdentity::from_entry(
                    entry,
                    IdentSource::Signature(signature),
                ));
            }
            return ParseOutcome::Recognized(ChipIdentity {
                name: format!("RK{}", signature),
                family: None,
                source: IdentSource::Derived(signature),
            });
        }

        ParseOutcome::unrecognized(text)
    }
}

fn validate_entry(entry: &ChipEntry) -> Result<()> {
    if entry.name.trim().is_empty() {
        return Err(Error::ChipDbValidation("chip entry with empty name".into()));
    }
    if let Some(bad) = entry
        .signatures
        .iter()
        .find(|s| s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(Error::ChipDbValidation(format!(
            "{}: signature '{}' must be ASCII digits",
            entry.name, bad
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_signature_hex() {
        assert_eq!(
            decode_signature("Chip Info:  38 38 35 33 0 0 0 0 0 0 0 0 0 0 0 0"),
            Some("8853".to_string())
        );
    }

    #[test]
    fn test_decode_signature_decimal() {
        assert_eq!(
            decode_signature("Chip Info: 54 55 53 51"),
            Some("6753".to_string())
        );
        assert_eq!(decode_signature("Chip Info: 54 55 57 3"), Some("679".to_string()));
    }

    #[test]
    fn test_decode_signature_nothing() {
        assert_eq!(decode_signature("Chip Info: 0 0 0 0"), None);
        assert_eq!(decode_signature("creating comm object failed!"), None);
    }

    #[test]
    fn test_identify_signature() {
        let db = ChipDatabase::builtin();
        let id = db.identify_rci("Chip Info:  36 37 35 33 0 0 0 0").recognized().unwrap();
        assert_eq!(id.name, "RK3576");
        assert_eq!(id.source, IdentSource::Signature("6753".to_string()));

        let id = db.identify_rci("Chip Info: 54 55 53 51").recognized().unwrap();
        assert_eq!(id.name, "RK3576");
    }

    #[test]
    fn test_identify_unmapped_signature_falls_back() {
        let db = ChipDatabase::builtin();
        let id = db.identify_rci("Chip Info: 31 32 33 34").recognized().unwrap();
        assert_eq!(id.name, "RK1234");
        assert_eq!(id.source, IdentSource::Derived("1234".to_string()));
        assert_eq!(id.family, None);
    }

    #[test]
    fn test_identify_short_decimal_dump() {
        // Hex reading gives no digits; decimal gives '6' '7' '9', the trailing 3 is dropped
        let db = ChipDatabase::builtin();
        assert_eq!(decode_signature("Chip Info: 54 55 57 3").as_deref(), Some("679"));
        let id = db.identify_rci("Chip Info: 54 55 57 3").recognized().unwrap();
        assert_eq!(id.name, "RK679");
        assert_eq!(id.source, IdentSource::Derived("679".to_string()));
    }

    #[test]
    fn test_identify_legacy_id_and_name() {
        let db = ChipDatabase::builtin();
        let id = db.identify_rci("chip id 0x3399").recognized().unwrap();
        assert_eq!(id.name, "RK3399");
        assert_eq!(id.label(), "RK3399 (0x3399)");

        let id = db.identify_rci("SoC: rk3568 rev1").recognized().unwrap();
        assert_eq!(id.name, "RK3568");
        assert_eq!(id.label(), "RK3568 Family (RK3568)");
    }

    #[test]
    fn test_identify_unrecognized() {
        let db = ChipDatabase::builtin();
        assert_eq!(
            db.identify_rci("  read chip info failed  "),
            ParseOutcome::Unrecognized("read chip info failed".to_string())
        );
        assert!(!db.identify_rci("").is_recognized());
    }

    #[test]
    fn test_identify_pid() {
        let db = ChipDatabase::builtin();
        let id = db.identify_pid(0x350b).unwrap();
        assert_eq!(id.name, "RK3588");
        assert_eq!(id.label(), "RK3588 (PID 0x350b)");
        assert!(db.identify_pid(0xffff).is_none());
    }

    #[test]
    fn test_load_ron_overrides() {
        let mut db = ChipDatabase::builtin();
        let before = db.len();
        let count = db
            .load_str(
                r#"[
                    (name: "RK3506", usb_pids: [0x350d], signatures: ["6053"]),
                    (name: "RK3588", family: Some("Flagship"), usb_pids: [0x350b]),
                ]"#,
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(db.len(), before + 1);
        assert_eq!(db.find_by_pid(0x350d).unwrap().name, "RK3506");
        assert_eq!(
            db.find_by_name("rk3588").unwrap().family.as_deref(),
            Some("Flagship")
        );
    }

    #[test]
    fn test_load_ron_rejects_bad_signature() {
        let mut db = ChipDatabase::new();
        let err = db
            .load_str(r#"[(name: "RK9999", signatures: ["99x9"])]"#)
            .unwrap_err();
        assert!(matches!(err, Error::ChipDbValidation(_)));
        assert!(db.is_empty());
    }
}
