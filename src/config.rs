use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::pipeline::http::EndpointPaths;
use crate::pipeline::plan::DEFAULT_UPSCALE_CAP;
use crate::session::SessionOptions;

pub const DEFAULT_BIND: &str = "127.0.0.1:8790";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

const ENDPOINT_KEYS: [&str; 10] = [
    "scratch_removal",
    "face_restore",
    "upscale",
    "colorize",
    "adjust",
    "auto_enhance",
    "background_remove",
    "inpaint",
    "generative_edit",
    "analyze",
];

/// Partially specified configuration from one layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigOverlay {
    pub bind: Option<String>,
    pub base_url: Option<String>,
    pub media_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub endpoints: BTreeMap<String, String>,
    pub log_commits_to_history: Option<bool>,
    pub upscale_cap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformConfig {
    pub base_url: Url,
    pub media_url: Url,
    pub timeout_secs: u64,
    pub endpoints: EndpointPaths,
}

impl TransformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub bind: String,
    pub transform: TransformConfig,
    pub session: SessionOptions,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("failed to read settings '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse settings JSON '{path}': {message}")]
    ParseJson { path: String, message: String },
    #[error("failed to parse settings TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("settings root must be an object")]
    RootMustBeObject,
    #[error("settings field '{field}' has invalid type")]
    InvalidFieldType { field: String },
    #[error("settings field '{field}' is not a valid URL: {message}")]
    InvalidUrl { field: String, message: String },
}

/// Reads `config/fixpix.settings.toml` (or `.json`) under `app_root`, or
/// the explicit path when one is given. Missing files yield an empty overlay.
pub fn load_file_overlay(app_root: &Path, explicit_path: Option<&str>) -> Result<ConfigOverlay, ConfigError> {
    if let Some(path) = explicit_path
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .map(|p| if p.is_absolute() { p } else { app_root.join(p) })
    {
        return load_overlay_by_extension(path.as_path());
    }

    let toml_path = app_root.join("config/fixpix.settings.toml");
    if toml_path.exists() {
        return load_overlay_from_toml_path(toml_path.as_path());
    }
    load_overlay_from_json_path(app_root.join("config/fixpix.settings.json").as_path())
}

/// `FIXPIX_*` variables, looked up through `lookup` so callers can feed
/// the real environment or a fixed map.
pub fn env_overlay<F>(lookup: F) -> Result<ConfigOverlay, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let timeout_secs = match read("FIXPIX_TRANSFORM_TIMEOUT_SECS") {
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| ConfigError::InvalidFieldType {
            field: String::from("FIXPIX_TRANSFORM_TIMEOUT_SECS"),
        })?),
        None => None,
    };
    Ok(ConfigOverlay {
        bind: read("FIXPIX_BIND"),
        base_url: read("FIXPIX_API_URL"),
        media_url: read("FIXPIX_MEDIA_URL"),
        timeout_secs,
        ..ConfigOverlay::default()
    })
}

pub fn merge_overlays(file: &ConfigOverlay, overrides: &ConfigOverlay) -> ConfigOverlay {
    let mut endpoints = file.endpoints.clone();
    endpoints.extend(overrides.endpoints.clone());
    ConfigOverlay {
        bind: overrides.bind.clone().or_else(|| file.bind.clone()),
        base_url: overrides.base_url.clone().or_else(|| file.base_url.clone()),
        media_url: overrides.media_url.clone().or_else(|| file.media_url.clone()),
        timeout_secs: overrides.timeout_secs.or(file.timeout_secs),
        endpoints,
        log_commits_to_history: overrides
            .log_commits_to_history
            .or(file.log_commits_to_history),
        upscale_cap: overrides.upscale_cap.or(file.upscale_cap),
    }
}

fn parse_url(raw: &str, field: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field: field.to_string(),
        message: e.to_string(),
    })
}

impl AppConfig {
    /// Fills every gap in `overlay` with built-in defaults. The media base
    /// falls back to the transform base URL.
    pub fn resolve(overlay: &ConfigOverlay) -> Result<Self, ConfigError> {
        let base_url = parse_url(
            overlay.base_url.as_deref().unwrap_or(DEFAULT_API_URL),
            "transform.base_url",
        )?;
        let media_url = match overlay.media_url.as_deref() {
            Some(raw) => parse_url(raw, "transform.media_url")?,
            None => base_url.clone(),
        };
        let mut endpoints = EndpointPaths::default();
        for (key, path) in &overlay.endpoints {
            let slot = match key.as_str() {
                "scratch_removal" => &mut endpoints.scratch_removal,
                "face_restore" => &mut endpoints.face_restore,
                "upscale" => &mut endpoints.upscale,
                "colorize" => &mut endpoints.colorize,
                "adjust" => &mut endpoints.adjust,
                "auto_enhance" => &mut endpoints.auto_enhance,
                "background_remove" => &mut endpoints.background_remove,
                "inpaint" => &mut endpoints.inpaint,
                "generative_edit" => &mut endpoints.generative_edit,
                "analyze" => &mut endpoints.analyze,
                other => {
                    return Err(ConfigError::InvalidFieldType {
                        field: format!("transform.endpoints.{other}"),
                    })
                }
            };
            *slot = path.clone();
        }
        Ok(Self {
            bind: overlay.bind.clone().unwrap_or_else(|| DEFAULT_BIND.to_string()),
            transform: TransformConfig {
                base_url,
                media_url,
                timeout_secs: overlay.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
                endpoints,
            },
            session: SessionOptions {
                log_commits_to_history: overlay.log_commits_to_history.unwrap_or(true),
                upscale_cap: overlay.upscale_cap.unwrap_or(DEFAULT_UPSCALE_CAP),
            },
        })
    }

    /// Defaults, then the settings file, then `FIXPIX_*` environment.
    pub fn load(app_root: &Path, explicit_path: Option<&str>) -> Result<Self, ConfigError> {
        let file = load_file_overlay(app_root, explicit_path)?;
        let env = env_overlay(|key| std::env::var(key).ok())?;
        Self::resolve(&merge_overlays(&file, &env))
    }
}

pub fn parse_overlay_json(value: &Value) -> Result<ConfigOverlay, ConfigError> {
    let root = value.as_object().ok_or(ConfigError::RootMustBeObject)?;
    let mut out = ConfigOverlay::default();

    if let Some(server) = root.get("server") {
        let server = section(server, "server")?;
        if let Some(v) = server.get("bind") {
            out.bind = Some(parse_string(v, "server.bind")?);
        }
    }
    if let Some(transform) = root.get("transform") {
        let transform = section(transform, "transform")?;
        if let Some(v) = transform.get("base_url") {
            out.base_url = Some(parse_string(v, "transform.base_url")?);
        }
        if let Some(v) = transform.get("media_url") {
            out.media_url = Some(parse_string(v, "transform.media_url")?);
        }
        if let Some(v) = transform.get("timeout_secs") {
            out.timeout_secs = Some(v.as_u64().filter(|secs| *secs > 0).ok_or_else(|| {
                ConfigError::InvalidFieldType {
                    field: String::from("transform.timeout_secs"),
                }
            })?);
        }
        if let Some(endpoints) = transform.get("endpoints") {
            for (key, v) in section(endpoints, "transform.endpoints")? {
                let field = format!("transform.endpoints.{key}");
                if !ENDPOINT_KEYS.contains(&key.as_str()) {
                    return Err(ConfigError::InvalidFieldType { field });
                }
                out.endpoints.insert(key.clone(), parse_string(v, field.as_str())?);
            }
        }
    }
    if let Some(session) = root.get("session") {
        let session = section(session, "session")?;
        if let Some(v) = session.get("log_commits_to_history") {
            out.log_commits_to_history = Some(v.as_bool().ok_or_else(|| ConfigError::InvalidFieldType {
                field: String::from("session.log_commits_to_history"),
            })?);
        }
        if let Some(v) = session.get("upscale_cap") {
            out.upscale_cap = Some(v.as_f64().filter(|cap| *cap >= 1.0).ok_or_else(|| {
                ConfigError::InvalidFieldType {
                    field: String::from("session.upscale_cap"),
                }
            })?);
        }
    }
    Ok(out)
}

fn section<'a>(value: &'a Value, field: &str) -> Result<&'a serde_json::Map<String, Value>, ConfigError> {
    value.as_object().ok_or_else(|| ConfigError::InvalidFieldType {
        field: field.to_string(),
    })
}

fn parse_string(value: &Value, field: &str) -> Result<String, ConfigError> {
    let parsed = value
        .as_str()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::InvalidFieldType {
            field: field.to_string(),
        })?;
    Ok(parsed.to_string())
}

fn load_overlay_by_extension(path: &Path) -> Result<ConfigOverlay, ConfigError> {
    match path
        .extension()
        .and_then(|v| v.to_str())
        .map(|v| v.to_ascii_lowercase())
    {
        Some(ext) if ext == "toml" => load_overlay_from_toml_path(path),
        _ => load_overlay_from_json_path(path),
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|error| ConfigError::ReadFile {
            path: path.display().to_string(),
            message: error.to_string(),
        })
}

fn load_overlay_from_json_path(path: &Path) -> Result<ConfigOverlay, ConfigError> {
    let Some(raw) = read_optional(path)? else {
        return Ok(ConfigOverlay::default());
    };
    let parsed = serde_json::from_str::<Value>(raw.as_str()).map_err(|error| ConfigError::ParseJson {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    parse_overlay_json(&parsed)
}

fn load_overlay_from_toml_path(path: &Path) -> Result<ConfigOverlay, ConfigError> {
    let Some(raw) = read_optional(path)? else {
        return Ok(ConfigOverlay::default());
    };
    let parsed = toml::from_str::<toml::Value>(raw.as_str()).map_err(|error| ConfigError::ParseToml {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    let json_value = serde_json::to_value(parsed).map_err(|error| ConfigError::ParseToml {
        path: path.display().to_string(),
        message: error.to_string(),
    })?;
    parse_overlay_json(&json_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_root(tag: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("fixpix_config_{tag}_{stamp}"))
    }

    #[test]
    fn defaults_resolve_without_any_layer() {
        let config = AppConfig::resolve(&ConfigOverlay::default()).expect("defaults");
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.transform.base_url.as_str(), "http://127.0.0.1:8000/");
        assert_eq!(config.transform.media_url, config.transform.base_url);
        assert_eq!(config.transform.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.session, SessionOptions::default());
    }

    #[test]
    fn loads_toml_settings_file() {
        let root = temp_root("toml");
        fs::create_dir_all(root.join("config")).expect("config dir");
        fs::write(
            root.join("config/fixpix.settings.toml"),
            r#"[server]
bind = "0.0.0.0:9000"

[transform]
base_url = "http://gpu.internal:8000"
timeout_secs = 30

[transform.endpoints]
colorize = "/v2/colorize"

[session]
upscale_cap = 2.0
"#,
        )
        .expect("settings write");

        let overlay = load_file_overlay(root.as_path(), None).expect("load");
        let config = AppConfig::resolve(&overlay).expect("resolve");

        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.transform.timeout_secs, 30);
        assert_eq!(config.transform.endpoints.colorize, "/v2/colorize");
        assert_eq!(config.transform.endpoints.upscale, "/api/v1/image/super-resolution");
        assert_eq!(config.session.upscale_cap, 2.0);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn falls_back_to_json_when_toml_missing() {
        let root = temp_root("json");
        fs::create_dir_all(root.join("config")).expect("config dir");
        fs::write(
            root.join("config/fixpix.settings.json"),
            r#"{"session":{"log_commits_to_history":false}}"#,
        )
        .expect("settings write");

        let overlay = load_file_overlay(root.as_path(), None).expect("load");
        assert_eq!(overlay.log_commits_to_history, Some(false));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn env_overrides_file_values() {
        let file = ConfigOverlay {
            bind: Some(String::from("0.0.0.0:9000")),
            base_url: Some(String::from("http://file:8000")),
            ..ConfigOverlay::default()
        };
        let env = env_overlay(|key| match key {
            "FIXPIX_API_URL" => Some(String::from("http://env:8000")),
            "FIXPIX_TRANSFORM_TIMEOUT_SECS" => Some(String::from("15")),
            _ => None,
        })
        .expect("env");

        let config = AppConfig::resolve(&merge_overlays(&file, &env)).expect("resolve");
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.transform.base_url.as_str(), "http://env:8000/");
        assert_eq!(config.transform.timeout_secs, 15);
    }

    #[test]
    fn rejects_wrong_field_types() {
        let err = parse_overlay_json(&serde_json::json!({ "session": { "upscale_cap": "big" } }))
            .expect_err("string cap");
        assert_eq!(
            err,
            ConfigError::InvalidFieldType {
                field: String::from("session.upscale_cap")
            }
        );

        let err = parse_overlay_json(&serde_json::json!({ "transform": { "endpoints": { "sharpen": "/x" } } }))
            .expect_err("unknown endpoint");
        assert_eq!(
            err,
            ConfigError::InvalidFieldType {
                field: String::from("transform.endpoints.sharpen")
            }
        );

        let err = env_overlay(|key| (key == "FIXPIX_TRANSFORM_TIMEOUT_SECS").then(|| String::from("soon")))
            .expect_err("non-numeric timeout");
        assert!(matches!(err, ConfigError::InvalidFieldType { .. }));
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let overlay = ConfigOverlay {
            base_url: Some(String::from("not a url")),
            ..ConfigOverlay::default()
        };
        assert!(matches!(
            AppConfig::resolve(&overlay),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
