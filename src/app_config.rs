//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// File-backed defaults for the `imgdl` command line.
///
/// Every field is optional; a flag given on the command line always wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    /// Default storage destination (directory or `gs://bucket/prefix`).
    pub store_path: Option<String>,
    /// Default worker count.
    pub workers: Option<usize>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<f64>,
    /// Lower bound of the wait after each fetch, in seconds.
    pub min_wait_secs: Option<f64>,
    /// Upper bound of the wait after each fetch, in seconds.
    pub max_wait_secs: Option<f64>,
    /// Proxy pool.
    pub proxies: Option<Vec<String>>,
    /// User-Agent for image requests.
    pub user_agent: Option<String>,
    /// Generate the default thumbnail sizes.
    pub thumbs: Option<bool>,
    /// Draw a progress bar.
    pub progress: Option<bool>,
    /// JSON log file path.
    pub log_file: Option<PathBuf>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            bail!("Invalid config value for `workers`: 0. Expected at least 1");
        }
        if let Some(timeout) = self.timeout_secs
            && !(timeout.is_finite() && timeout > 0.0)
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected a positive number");
        }
        validate_wait_secs("min_wait_secs", self.min_wait_secs)?;
        validate_wait_secs("max_wait_secs", self.max_wait_secs)?;
        if let (Some(min), Some(max)) = (self.min_wait_secs, self.max_wait_secs)
            && min > max
        {
            bail!("Invalid config values: `min_wait_secs` ({min}) is greater than `max_wait_secs` ({max})");
        }
        if let Some(store_path) = &self.store_path
            && store_path.is_empty()
        {
            bail!("Invalid config value for `store_path`: must not be empty");
        }
        Ok(())
    }
}

fn validate_wait_secs(field: &str, value: Option<f64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(value.is_finite() && value >= 0.0) {
        bail!("Invalid config value for `{field}`: {value}. Expected a non-negative number");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/imgdl/config.toml`
/// 2. `$HOME/.config/imgdl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("imgdl").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("imgdl")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist. The default path is optional: when it is
/// missing the result carries no config.
pub fn load_file_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = read_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(read_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "store_path" => {
                cfg.store_path = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "workers" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let workers = usize::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("workers out of range for usize"))?;
                cfg.workers = Some(workers);
            }
            "timeout_secs" => {
                cfg.timeout_secs = Some(parse_number(value).with_context(invalid)?);
            }
            "min_wait_secs" => {
                cfg.min_wait_secs = Some(parse_number(value).with_context(invalid)?);
            }
            "max_wait_secs" => {
                cfg.max_wait_secs = Some(parse_number(value).with_context(invalid)?);
            }
            "proxies" => {
                cfg.proxies = Some(parse_string_array(value).with_context(invalid)?);
            }
            "user_agent" => {
                cfg.user_agent = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "thumbs" => {
                cfg.thumbs = Some(parse_boolean(value).with_context(invalid)?);
            }
            "progress" => {
                cfg.progress = Some(parse_boolean(value).with_context(invalid)?);
            }
            "log_file" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.log_file = Some(PathBuf::from(parsed));
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_string_array(raw_value: &str) -> Result<Vec<String>> {
    let Some(inner) = raw_value
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        bail!("Expected array of double-quoted strings");
    };
    inner
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse_string_literal)
        .collect()
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_number(raw_value: &str) -> Result<f64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected numeric value");
    }
    Ok(token.parse::<f64>()?)
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
