//! Backend registry
//!
//! Backends are selected by a specification string of the form
//! `name[:key=value,...]`, for example `rkdeveloptool:path=/opt/bin/rkdeveloptool`
//! or `dummy:mode=maskrom,devices=2`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rkflasher_core::backend::Backend;

use crate::error::{Result, ToolError};
use crate::process::RkDevelopTool;

/// Parsed backend specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendParams {
    /// Backend name
    pub name: String,
    /// `key=value` parameters
    pub params: HashMap<String, String>,
}

impl BackendParams {
    /// Get a parameter
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Parse `name[:key=value,...]`
pub fn parse_backend_params(s: &str) -> Result<BackendParams> {
    let (name, opts) = s.split_once(':').unwrap_or((s, ""));
    let name = name.trim();
    if name.is_empty() {
        return Err(ToolError::InvalidParam("empty backend name".into()));
    }

    let mut params = HashMap::new();
    for opt in opts.split(',').filter(|o| !o.trim().is_empty()) {
        let (key, value) = opt.split_once('=').ok_or_else(|| {
            ToolError::InvalidParam(format!("'{}' (expected key=value)", opt))
        })?;
        params.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(BackendParams {
        name: name.to_string(),
        params,
    })
}

/// Information about a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendInfo {
    /// Primary name
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Backends compiled into this build
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = vec![BackendInfo {
        name: "rkdeveloptool",
        aliases: &["rkdevelop"],
        description: "Runs the rkdeveloptool binary (path=<binary>, default: PATH lookup)",
    }];

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &["emulator"],
        description: "Emulated device for testing (mode=maskrom|loader, devices=<n>, latency_ms=<ms>, storage=<code>)",
    });

    backends
}

/// Open a backend from its specification string.
///
/// `default_tool` is the rkdeveloptool path from the configuration, used when
/// the specification does not give one.
pub fn open_backend(spec: &str, default_tool: Option<&Path>) -> Result<Arc<dyn Backend>> {
    let params = parse_backend_params(spec)?;
    log::debug!("Opening backend {}", params.name);

    match params.name.as_str() {
        "rkdeveloptool" | "rkdevelop" => {
            let explicit = params.get("path").map(Path::new).or(default_tool);
            Ok(Arc::new(RkDevelopTool::locate(explicit)?))
        }

        #[cfg(feature = "dummy")]
        "dummy" | "emulator" => Ok(Arc::new(open_dummy(&params)?)),

        _ => Err(ToolError::UnknownBackend(params.name)),
    }
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &BackendParams) -> Result<rkflasher_dummy::DummyTool> {
    use rkflasher_core::device::DeviceMode;
    use rkflasher_core::units::{parse_number, parse_size};
    use rkflasher_dummy::{DummyConfig, DummyTool};
    use std::time::Duration;

    let invalid = |key: &str, value: &str| ToolError::InvalidParam(format!("{}={}", key, value));
    let mut config = DummyConfig::default();

    for (key, value) in &params.params {
        match key.as_str() {
            "mode" => {
                config.mode = match value.to_ascii_lowercase().as_str() {
                    "maskrom" => DeviceMode::Maskrom,
                    "loader" => DeviceMode::Loader,
                    "msc" => DeviceMode::Msc,
                    _ => return Err(invalid(key, value)),
                }
            }
            "devices" => config.devices = value.parse().map_err(|_| invalid(key, value))?,
            "latency_ms" => {
                config.latency =
                    Duration::from_millis(value.parse().map_err(|_| invalid(key, value))?)
            }
            "storage" => config.storage = value.parse().map_err(|_| invalid(key, value))?,
            "pid" => {
                config.pid = parse_number(value)
                    .ok()
                    .and_then(|v| u16::try_from(v).ok())
                    .ok_or_else(|| invalid(key, value))?
            }
            "chip" => config.chip_signature = value.clone(),
            "size" => config.capacity = parse_size(value)?,
            _ => return Err(ToolError::InvalidParam(format!("unknown key '{}'", key))),
        }
    }

    log::info!(
        "Using emulated device ({} in {} mode)",
        config.chip_signature,
        config.mode
    );
    Ok(DummyTool::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkflasher_core::backend::Request;

    #[test]
    fn test_parse_params() {
        let p = parse_backend_params("rkdeveloptool:path=/opt/rk/rkdeveloptool").unwrap();
        assert_eq!(p.name, "rkdeveloptool");
        assert_eq!(p.get("path"), Some("/opt/rk/rkdeveloptool"));

        let p = parse_backend_params("dummy").unwrap();
        assert!(p.params.is_empty());

        assert!(matches!(
            parse_backend_params("dummy:mode"),
            Err(ToolError::InvalidParam(_))
        ));
        assert!(parse_backend_params(":a=b").is_err());
    }

    #[test]
    fn test_open_dummy() {
        let backend = open_backend("dummy:mode=maskrom,devices=2,size=8M", None).unwrap();
        assert_eq!(backend.name(), "dummy");
        let out = backend.capture(&Request::ListDevices, None).unwrap();
        assert_eq!(out.text.lines().count(), 2);
        assert!(out.text.contains("Maskrom"));

        assert!(matches!(
            open_backend("dummy:mode=sleep", None),
            Err(ToolError::InvalidParam(_))
        ));
        assert!(matches!(
            open_backend("dummy:colour=red", None),
            Err(ToolError::InvalidParam(_))
        ));
    }

    #[test]
    fn test_open_unknown_and_missing() {
        assert!(matches!(
            open_backend("ch341a", None),
            Err(ToolError::UnknownBackend(_))
        ));
        assert!(matches!(
            open_backend("rkdeveloptool:path=/nonexistent/rkdeveloptool", None),
            Err(ToolError::NotFound(_))
        ));
    }

    #[test]
    fn test_available_backends() {
        let names: Vec<&str> = available_backends().iter().map(|b| b.name).collect();
        assert!(names.contains(&"rkdeveloptool"));
        assert!(names.contains(&"dummy"));
    }
}
