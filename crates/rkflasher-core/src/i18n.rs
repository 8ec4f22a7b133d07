//! User-facing message tables
//!
//! Messages are looked up by key in a flat per-language table. A key missing
//! from the table is returned unchanged, so an untranslated message shows up
//! as its key rather than as nothing.

use std::fmt;
use std::str::FromStr;

/// Interface language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    /// English
    #[default]
    En,
    /// Simplified Chinese
    Zh,
}

impl Lang {
    /// All supported languages
    pub const ALL: [Lang; 2] = [Lang::En, Lang::Zh];

    /// Short code ("en", "zh")
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }

    fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::En => EN,
            Self::Zh => ZH,
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Lang {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "en" | "en_us" | "en-us" | "english" => Ok(Self::En),
            "zh" | "zh_cn" | "zh-cn" | "chinese" => Ok(Self::Zh),
            _ => Err(format!("unsupported language '{}' (use en or zh)", s)),
        }
    }
}

/// Translate a key, falling back to the key itself
pub fn tr(lang: Lang, key: &str) -> &str {
    lang.table()
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
        .unwrap_or(key)
}

/// Translate a key and fill its `{}` placeholders in order
pub fn tr_fmt(lang: Lang, key: &str, args: &[&dyn fmt::Display]) -> String {
    let template = tr(lang, key);
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => out.push_str(&arg.to_string()),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

const EN: &[(&str, &str)] = &[
    // Request descriptions
    ("listing_devices", "Listing devices"),
    ("reading_chip_info", "Reading chip info"),
    ("reading_device_info", "Reading device capability"),
    ("reading_flash_info", "Reading flash info"),
    ("reading_flash_id", "Reading flash ID"),
    ("reading_partitions", "Reading partition table"),
    ("downloading_boot", "Downloading boot loader"),
    ("loading_loader", "Upgrading loader"),
    ("rebooting", "Rebooting device"),
    ("reading_flash", "Reading flash"),
    ("backing_up", "Backing up"),
    ("burning", "Burning"),
    ("verifying", "Verifying"),
    ("erase_flash", "Erasing flash"),
    ("test_connection", "Testing device"),
    ("changing_storage", "Changing storage"),
    ("packing_bootloader", "Packing bootloader"),
    ("unpacking_bootloader", "Unpacking bootloader"),
    ("writing_gpt", "Writing GPT"),
    ("writing_parameter", "Writing parameter"),
    ("tagging_spl", "Tagging SPL"),
    // Device status
    ("detecting_device", "Detecting device..."),
    ("no_device", "No device found"),
    ("connected_maskrom", "Connected (Maskrom mode)"),
    ("connected_loader", "Connected (Loader mode)"),
    ("connected_msc", "Connected (MSC mode)"),
    ("connected_unknown_mode", "Connected (unknown mode)"),
    ("device_lost", "Device disconnected"),
    ("chip", "Chip"),
    // Command lifecycle
    ("command_started", "{}..."),
    ("command_succeeded", "{} completed"),
    ("command_failed", "{} failed (exit code {})"),
    ("command_already_running", "A command is already running"),
    ("command_cancelled", "{} cancelled"),
    ("tool_not_found_title", "rkdeveloptool not found"),
    (
        "tool_not_found_message",
        "rkdeveloptool was not found. Install it or set its path with --tool or the config file.",
    ),
    // Preconditions
    ("file_not_found", "File not found: {}"),
    ("field_required", "{} must not be empty"),
    ("select_loader", "Select a loader file"),
    ("select_firmware", "Select a firmware file"),
    ("select_partition", "Partition not found: {}"),
    ("select_storage", "Unknown storage type: {}"),
    ("no_partitions", "No partitions read from the device"),
    ("no_capacity", "flash capacity unknown, give a length"),
    // Confirmations
    ("confirm_burn_title", "Confirm burn"),
    ("file_name", "File name"),
    ("file_size", "File size"),
    ("target_address", "Target address"),
    ("md5", "MD5"),
    ("confirm_proceed", "Proceed?"),
    ("erase_flash_warning_message", "This erases the whole flash. All data will be lost."),
    ("confirm_destructive", "{} modifies the device."),
    ("aborted", "Aborted"),
    // Storage
    ("storage_switched", "Storage switched to {}"),
    ("storage_supported", "supported"),
    ("storage_unsupported", "not supported"),
    // Verification
    ("verify_ok", "Verification passed"),
    ("verify_mismatch", "Verification failed: MD5 mismatch"),
    ("expected_md5", "Expected MD5"),
    ("actual_md5", "Actual MD5"),
    // Upgrade
    ("waiting_for_loader", "Waiting for loader mode..."),
    ("loader_timeout", "Device did not enter loader mode"),
    ("upgrade_complete", "Upgrade complete"),
    ("retrying", "Retrying ({}/{})"),
    // Mass production
    ("confirm_mass_production", "Start mass production"),
    ("mass_production_warning", "Firmware will be written to {} devices."),
    ("mass_production_running", "Mass production running..."),
    ("mass_production_stopped", "Mass production stopped"),
    ("mass_production_complete", "Mass production complete: {}/{} succeeded"),
    ("mass_device_scan", "Scanning devices"),
];

const ZH: &[(&str, &str)] = &[
    ("listing_devices", "正在列出设备"),
    ("reading_chip_info", "正在读取芯片信息"),
    ("reading_device_info", "正在读取设备能力"),
    ("reading_flash_info", "正在读取闪存信息"),
    ("reading_flash_id", "正在读取闪存ID"),
    ("reading_partitions", "正在读取分区表"),
    ("downloading_boot", "正在下载引导"),
    ("loading_loader", "正在升级Loader"),
    ("rebooting", "正在重启设备"),
    ("reading_flash", "正在读取闪存"),
    ("backing_up", "正在备份"),
    ("burning", "正在烧录"),
    ("verifying", "正在校验"),
    ("erase_flash", "正在擦除闪存"),
    ("test_connection", "正在测试设备"),
    ("changing_storage", "正在切换存储"),
    ("packing_bootloader", "正在打包引导"),
    ("unpacking_bootloader", "正在解包引导"),
    ("writing_gpt", "正在写入GPT"),
    ("writing_parameter", "正在写入参数"),
    ("tagging_spl", "正在标记SPL"),
    ("detecting_device", "正在检测设备..."),
    ("no_device", "未发现设备"),
    ("connected_maskrom", "已连接 (Maskrom模式)"),
    ("connected_loader", "已连接 (Loader模式)"),
    ("connected_msc", "已连接 (MSC模式)"),
    ("connected_unknown_mode", "已连接 (未知模式)"),
    ("device_lost", "设备已断开"),
    ("chip", "芯片"),
    ("command_started", "{}..."),
    ("command_succeeded", "{}完成"),
    ("command_failed", "{}失败 (退出码 {})"),
    ("command_already_running", "已有命令正在运行"),
    ("command_cancelled", "{}已取消"),
    ("tool_not_found_title", "未找到rkdeveloptool"),
    (
        "tool_not_found_message",
        "未找到rkdeveloptool。请安装，或通过--tool或配置文件指定路径。",
    ),
    ("file_not_found", "文件不存在: {}"),
    ("field_required", "{}不能为空"),
    ("select_loader", "请选择Loader文件"),
    ("select_firmware", "请选择固件文件"),
    ("select_partition", "未找到分区: {}"),
    ("select_storage", "未知存储类型: {}"),
    ("no_partitions", "未从设备读取到分区"),
    ("no_capacity", "闪存容量未知，请指定长度"),
    ("confirm_burn_title", "确认烧录"),
    ("file_name", "文件名"),
    ("file_size", "文件大小"),
    ("target_address", "目标地址"),
    ("md5", "MD5"),
    ("confirm_proceed", "是否继续?"),
    ("erase_flash_warning_message", "将擦除整个闪存，所有数据都会丢失。"),
    ("confirm_destructive", "{}会修改设备。"),
    ("aborted", "已取消"),
    ("storage_switched", "存储已切换到{}"),
    ("storage_supported", "支持"),
    ("storage_unsupported", "不支持"),
    ("verify_ok", "校验通过"),
    ("verify_mismatch", "校验失败: MD5不一致"),
    ("expected_md5", "预期MD5"),
    ("actual_md5", "实际MD5"),
    ("waiting_for_loader", "等待进入Loader模式..."),
    ("loader_timeout", "设备未进入Loader模式"),
    ("upgrade_complete", "升级完成"),
    ("retrying", "正在重试 ({}/{})"),
    ("confirm_mass_production", "开始量产"),
    ("mass_production_warning", "固件将写入{}台设备。"),
    ("mass_production_running", "量产进行中..."),
    ("mass_production_stopped", "量产已停止"),
    ("mass_production_complete", "量产完成: {}/{} 成功"),
    ("mass_device_scan", "正在扫描设备"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_fallback() {
        assert_eq!(tr(Lang::En, "burning"), "Burning");
        assert_eq!(tr(Lang::Zh, "burning"), "正在烧录");
        assert_eq!(tr(Lang::En, "no_such_key"), "no_such_key");
        assert_eq!(tr(Lang::Zh, "no_such_key"), "no_such_key");
    }

    #[test]
    fn test_tables_have_same_keys() {
        for (key, _) in EN {
            assert!(ZH.iter().any(|(k, _)| k == key), "missing zh key {}", key);
        }
        assert_eq!(EN.len(), ZH.len());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            tr_fmt(Lang::En, "command_failed", &[&"Burning", &1]),
            "Burning failed (exit code 1)"
        );
        assert_eq!(
            tr_fmt(Lang::En, "mass_production_complete", &[&2]),
            "Mass production complete: 2/{} succeeded"
        );
        assert_eq!(tr_fmt(Lang::En, "plain_{}_key", &[&"x"]), "plain_x_key");
    }

    #[test]
    fn test_parse_lang() {
        assert_eq!("zh_CN".parse::<Lang>().unwrap(), Lang::Zh);
        assert_eq!("EN".parse::<Lang>().unwrap(), Lang::En);
        assert!("fr".parse::<Lang>().is_err());
    }
}
