//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `~/.talkbox/config.toml` (user)
//! 3. Merge the explicit file, if one was given
//! 4. Apply `TALKBOX_*` env var fallbacks for fields no file set
//! 5. Deserialize merged tree → `Config`
//! 6. Validate

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Environment variable → dotted field path.
const ENV_MAPPINGS: &[(&str, &str)] = &[
    ("TALKBOX_SERVER_URL", "server.url"),
    ("TALKBOX_API_PREFIX", "server.api_prefix"),
    ("TALKBOX_RECONNECT_MAX_ATTEMPTS", "reconnect.max_attempts"),
    ("TALKBOX_RECONNECT_DELAY_MS", "reconnect.delay_ms"),
    ("TALKBOX_LOG_LEVEL", "logging.level"),
    ("TALKBOX_LOG_FORMAT", "logging.format"),
];

/// Load the configuration with layered file precedence.
///
/// `home_override` replaces the user's home directory for discovery of
/// `.talkbox/config.toml`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load(explicit: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<Config> {
    let env_vars: HashMap<String, String> = std::env::vars().collect();
    let home_dir = match home_override {
        Some(h) => h.to_path_buf(),
        None => home_directory()?,
    };
    load_layers(explicit, &home_dir, &env_vars)
}

fn load_layers(
    explicit: Option<&Path>,
    home_dir: &Path,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut file_fields = HashSet::new();

    let user_path = home_dir.join(".talkbox").join("config.toml");
    if let Some(overlay) = try_load_file(&user_path)? {
        collect_leaf_paths(&overlay, "", &mut file_fields);
        deep_merge(&mut merged, &overlay);
        info!(path = %user_path.display(), "loaded user config");
    }

    if let Some(path) = explicit {
        // An explicit file that is missing is an error, unlike discovered layers.
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        collect_leaf_paths(&overlay, "", &mut file_fields);
        deep_merge(&mut merged, &overlay);
        info!(path = %path.display(), "loaded config file");
    }

    let applied = apply_env_fallbacks(&mut merged, &file_fields, env_vars);
    if applied > 0 {
        debug!(count = applied, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Load a config from a specific file path (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(oversized(path, metadata.len()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(oversized(path, content.len() as u64));
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

fn oversized(path: &Path, len: u64) -> ConfigError {
    ConfigError::ValidationError {
        field: path.display().to_string(),
        message: format!(
            "config file is {len} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit"
        ),
    }
}

/// Recursively deep-merge `overlay` into `base`.
///
/// Tables merge per-field; scalars and arrays from the overlay replace the
/// base value.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

fn collect_leaf_paths(val: &toml::Value, prefix: &str, out: &mut HashSet<String>) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            collect_leaf_paths(child, &path, out);
        }
    } else {
        out.insert(prefix.to_owned());
    }
}

/// Apply env vars to fields that no config file set. Returns the number
/// applied.
fn apply_env_fallbacks(
    merged: &mut toml::Value,
    file_fields: &HashSet<String>,
    env_vars: &HashMap<String, String>,
) -> usize {
    let mut count: usize = 0;
    for (var_name, field_path) in ENV_MAPPINGS {
        if file_fields.contains(*field_path) {
            continue;
        }
        let Some(raw) = env_vars.get(*var_name) else {
            continue;
        };
        let Some((section, leaf)) = field_path.split_once('.') else {
            continue;
        };
        let value = raw
            .parse::<i64>()
            .map_or_else(|_| toml::Value::String(raw.clone()), toml::Value::Integer);
        if let Some(table) = merged
            .as_table_mut()
            .and_then(|t| t.get_mut(section))
            .and_then(toml::Value::as_table_mut)
        {
            debug!(var = *var_name, field = *field_path, "applying env var fallback");
            table.insert(leaf.to_owned(), value);
            count = count.saturating_add(1);
        }
    }
    count
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
