//! Typed rkdeveloptool invocations

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::i18n::{tr, tr_fmt, Lang};
use crate::units::format_hex;

/// One rkdeveloptool command with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `ld`: list connected devices
    ListDevices,
    /// `rci`: read chip info
    ChipInfo,
    /// `rcb`: read capability
    Capability,
    /// `rfi`: read flash info
    FlashInfo,
    /// `rid`: read flash ID
    FlashId,
    /// `ppt`: print partition table
    PartitionTable,
    /// `db`: download a boot loader into a maskrom device
    DownloadBoot {
        /// Loader binary
        loader: PathBuf,
    },
    /// `ul`: upgrade the loader stored on flash
    UpgradeLoader {
        /// Loader binary
        loader: PathBuf,
    },
    /// `rd`: reset the device
    Reset,
    /// `rl`: read sectors into a file
    ReadLba {
        /// First sector
        start: u64,
        /// Number of sectors
        count: u64,
        /// Destination file
        output: PathBuf,
    },
    /// `wl`: write a file starting at a sector
    WriteLba {
        /// First sector
        start: u64,
        /// Source file
        input: PathBuf,
    },
    /// `wlx`: write a file to a named partition
    WritePartition {
        /// Partition name
        name: String,
        /// Source file
        input: PathBuf,
    },
    /// `ef`: erase the whole flash
    EraseFlash,
    /// `td`: test the device
    TestDevice,
    /// `cs`: switch storage medium
    ChangeStorage {
        /// Storage code (1 = eMMC, 2 = SD, 9 = SPI NOR)
        code: u8,
    },
    /// `pack`: pack a bootloader
    Pack {
        /// Output file
        output: PathBuf,
    },
    /// `unpack`: unpack a bootloader
    Unpack {
        /// Packed bootloader
        input: PathBuf,
    },
    /// `gpt`: write a GPT built from a parameter file
    WriteGpt {
        /// Parameter file
        file: PathBuf,
    },
    /// `prm`: write a parameter file
    WriteParameter {
        /// Parameter file
        file: PathBuf,
    },
    /// `tagspl`: tag an SPL image
    TagSpl {
        /// Tag string
        tag: String,
        /// SPL image
        spl: PathBuf,
    },
}

impl Request {
    /// rkdeveloptool subcommand word
    pub fn command(&self) -> &'static str {
        match self {
            Self::ListDevices => "ld",
            Self::ChipInfo => "rci",
            Self::Capability => "rcb",
            Self::FlashInfo => "rfi",
            Self::FlashId => "rid",
            Self::PartitionTable => "ppt",
            Self::DownloadBoot { .. } => "db",
            Self::UpgradeLoader { .. } => "ul",
            Self::Reset => "rd",
            Self::ReadLba { .. } => "rl",
            Self::WriteLba { .. } => "wl",
            Self::WritePartition { .. } => "wlx",
            Self::EraseFlash => "ef",
            Self::TestDevice => "td",
            Self::ChangeStorage { .. } => "cs",
            Self::Pack { .. } => "pack",
            Self::Unpack { .. } => "unpack",
            Self::WriteGpt { .. } => "gpt",
            Self::WriteParameter { .. } => "prm",
            Self::TagSpl { .. } => "tagspl",
        }
    }

    /// Full argument vector, subcommand first
    pub fn args(&self) -> Vec<OsString> {
        let mut args = vec![OsString::from(self.command())];
        match self {
            Self::DownloadBoot { loader } | Self::UpgradeLoader { loader } => {
                args.push(loader.into());
            }
            Self::ReadLba {
                start,
                count,
                output,
            } => {
                args.push(format_hex(*start).into());
                args.push(format_hex(*count).into());
                args.push(output.into());
            }
            Self::WriteLba { start, input } => {
                args.push(format_hex(*start).into());
                args.push(input.into());
            }
            Self::WritePartition { name, input } => {
                args.push(name.into());
                args.push(input.into());
            }
            Self::ChangeStorage { code } => args.push(code.to_string().into()),
            Self::Pack { output } => args.push(output.into()),
            Self::Unpack { input } => args.push(input.into()),
            Self::WriteGpt { file } | Self::WriteParameter { file } => args.push(file.into()),
            Self::TagSpl { tag, spl } => {
                args.push(tag.into());
                args.push(spl.into());
            }
            Self::ListDevices
            | Self::ChipInfo
            | Self::Capability
            | Self::FlashInfo
            | Self::FlashId
            | Self::PartitionTable
            | Self::Reset
            | Self::EraseFlash
            | Self::TestDevice => {}
        }
        args
    }

    /// Translation key describing the request ("burning")
    pub fn description_key(&self) -> &'static str {
        match self {
            Self::ListDevices => "listing_devices",
            Self::ChipInfo => "reading_chip_info",
            Self::Capability => "reading_device_info",
            Self::FlashInfo => "reading_flash_info",
            Self::FlashId => "reading_flash_id",
            Self::PartitionTable => "reading_partitions",
            Self::DownloadBoot { .. } => "downloading_boot",
            Self::UpgradeLoader { .. } => "loading_loader",
            Self::Reset => "rebooting",
            Self::ReadLba { .. } => "reading_flash",
            Self::WriteLba { .. } | Self::WritePartition { .. } => "burning",
            Self::EraseFlash => "erase_flash",
            Self::TestDevice => "test_connection",
            Self::ChangeStorage { .. } => "changing_storage",
            Self::Pack { .. } => "packing_bootloader",
            Self::Unpack { .. } => "unpacking_bootloader",
            Self::WriteGpt { .. } => "writing_gpt",
            Self::WriteParameter { .. } => "writing_parameter",
            Self::TagSpl { .. } => "tagging_spl",
        }
    }

    /// Translated description
    pub fn describe(&self, lang: Lang) -> &'static str {
        tr(lang, self.description_key())
    }

    /// Whether the request changes what is stored on the device
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::DownloadBoot { .. }
                | Self::UpgradeLoader { .. }
                | Self::WriteLba { .. }
                | Self::WritePartition { .. }
                | Self::EraseFlash
                | Self::WriteGpt { .. }
                | Self::WriteParameter { .. }
        )
    }

    /// Files the request reads, which must exist before it runs
    pub fn input_files(&self) -> Vec<&Path> {
        match self {
            Self::DownloadBoot { loader } | Self::UpgradeLoader { loader } => {
                vec![loader.as_path()]
            }
            Self::WriteLba { input, .. } | Self::WritePartition { input, .. } => {
                vec![input.as_path()]
            }
            Self::Unpack { input } => vec![input.as_path()],
            Self::WriteGpt { file } | Self::WriteParameter { file } => vec![file.as_path()],
            Self::TagSpl { spl, .. } => vec![spl.as_path()],
            _ => Vec::new(),
        }
    }

    /// Check preconditions without touching the device.
    /// The error is a translated message.
    pub fn validate(&self, lang: Lang) -> Result<(), String> {
        let empty_path = |p: &Path| p.as_os_str().is_empty();

        match self {
            Self::WritePartition { name, .. } if name.trim().is_empty() => {
                return Err(tr_fmt(lang, "field_required", &[&"partition name"]));
            }
            Self::TagSpl { tag, .. } if tag.trim().is_empty() => {
                return Err(tr_fmt(lang, "field_required", &[&"tag"]));
            }
            Self::ReadLba { output, .. } | Self::Pack { output }
                if empty_path(output.as_path()) =>
            {
                return Err(tr_fmt(lang, "field_required", &[&"output file"]));
            }
            Self::ReadLba { count: 0, .. } => {
                return Err(tr_fmt(lang, "field_required", &[&"sector count"]));
            }
            _ => {}
        }

        for path in self.input_files() {
            if empty_path(path) {
                let key = match self {
                    Self::DownloadBoot { .. } | Self::UpgradeLoader { .. } => "select_loader",
                    _ => "select_firmware",
                };
                return Err(tr(lang, key).to_string());
            }
            if !path.is_file() {
                return Err(tr_fmt(lang, "file_not_found", &[&path.display()]));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self
            .args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        f.write_str(&args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let req = Request::ReadLba {
            start: 0x4000,
            count: 0x1000,
            output: PathBuf::from("uboot.img"),
        };
        assert_eq!(req.to_string(), "rl 0x4000 0x1000 uboot.img");
        assert_eq!(Request::ChangeStorage { code: 9 }.to_string(), "cs 9");
        assert_eq!(Request::PartitionTable.to_string(), "ppt");
        assert_eq!(
            Request::TagSpl {
                tag: "v1".into(),
                spl: "spl.bin".into()
            }
            .args(),
            vec![
                OsString::from("tagspl"),
                OsString::from("v1"),
                OsString::from("spl.bin")
            ]
        );
    }

    #[test]
    fn test_destructive() {
        assert!(Request::EraseFlash.is_destructive());
        assert!(Request::WriteLba {
            start: 0,
            input: "fw.img".into()
        }
        .is_destructive());
        assert!(!Request::ListDevices.is_destructive());
        assert!(!Request::Reset.is_destructive());
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fw.img");
        std::fs::write(&file, b"data").unwrap();

        let ok = Request::WriteLba {
            start: 0,
            input: file.clone(),
        };
        assert!(ok.validate(Lang::En).is_ok());

        let missing = Request::WriteLba {
            start: 0,
            input: dir.path().join("missing.img"),
        };
        assert!(missing.validate(Lang::En).unwrap_err().starts_with("File not found"));

        let no_loader = Request::DownloadBoot {
            loader: PathBuf::new(),
        };
        assert_eq!(no_loader.validate(Lang::En).unwrap_err(), "Select a loader file");

        let no_name = Request::WritePartition {
            name: " ".into(),
            input: file,
        };
        assert!(no_name.validate(Lang::En).is_err());

        let zero = Request::ReadLba {
            start: 0,
            count: 0,
            output: "out.img".into(),
        };
        assert!(zero.validate(Lang::En).is_err());
        assert!(Request::ListDevices.validate(Lang::Zh).is_ok());
    }
}
