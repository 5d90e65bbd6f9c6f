// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later tiers win:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{validate_config, ConfigError, ConfigResult, UhfConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const CONFIG_FILE_NAME: &str = "uhfscan.toml";

/// Find the configuration file
///
/// Search order:
/// 1. `UHFSCAN_CONFIG_PATH` environment variable
/// 2. Current working directory: `./uhfscan.toml`
/// 3. Parent directories (up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("UHFSCAN_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by UHFSCAN_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent.to_path_buf();
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet UHFSCAN_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from a TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the file is not found, contains invalid TOML, or fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<UhfConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: UhfConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    validate_config(&config)?;
    Ok(config)
}

fn parse_into<T: FromStr>(value: &str, slot: &mut T) {
    if let Ok(parsed) = value.trim().parse::<T>() {
        *slot = parsed;
    }
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `UHFSCAN_DEFAULT_POWER_DBM` -> `reader.default_power_dbm`
/// - `UHFSCAN_SERIAL_NODES` -> `reader.serial_nodes` (comma-separated)
/// - `UHFSCAN_BACKLOG_CAPACITY` -> `backlog.capacity`
/// - `UHFSCAN_PUSH_CHUNK` -> `push.chunk_size`
/// - `UHFSCAN_PUSH_GAP_MS` -> `push.min_gap_ms`
/// - `UHFSCAN_DEBOUNCE_MS` -> `dedup.debounce_ms`
/// - `UHFSCAN_STEADY_GATE_DBM` -> `rssi.steady_gate_dbm`
/// - `UHFSCAN_WARMUP_MS` -> `bootstrap.warmup_ms`
/// - `UHFSCAN_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut UhfConfig) {
    if let Ok(value) = env::var("UHFSCAN_DEFAULT_POWER_DBM") {
        parse_into(&value, &mut config.reader.default_power_dbm);
    }
    if let Ok(value) = env::var("UHFSCAN_SERIAL_NODES") {
        let nodes: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        if !nodes.is_empty() {
            config.reader.serial_nodes = nodes;
        }
    }
    if let Ok(value) = env::var("UHFSCAN_BACKLOG_CAPACITY") {
        parse_into(&value, &mut config.backlog.capacity);
    }
    if let Ok(value) = env::var("UHFSCAN_PUSH_CHUNK") {
        parse_into(&value, &mut config.push.chunk_size);
    }
    if let Ok(value) = env::var("UHFSCAN_PUSH_GAP_MS") {
        parse_into(&value, &mut config.push.min_gap_ms);
    }
    if let Ok(value) = env::var("UHFSCAN_DEBOUNCE_MS") {
        parse_into(&value, &mut config.dedup.debounce_ms);
    }
    if let Ok(value) = env::var("UHFSCAN_STEADY_GATE_DBM") {
        parse_into(&value, &mut config.rssi.steady_gate_dbm);
    }
    if let Ok(value) = env::var("UHFSCAN_WARMUP_MS") {
        parse_into(&value, &mut config.bootstrap.warmup_ms);
    }
    if let Ok(value) = env::var("UHFSCAN_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of CLI arguments (e.g., `{"push_chunk": "128", "log_level": "debug"}`)
pub fn apply_cli_overrides(config: &mut UhfConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("default_power_dbm") {
        parse_into(value, &mut config.reader.default_power_dbm);
    }
    if let Some(value) = cli_args.get("backlog_capacity") {
        parse_into(value, &mut config.backlog.capacity);
    }
    if let Some(value) = cli_args.get("push_chunk") {
        parse_into(value, &mut config.push.chunk_size);
    }
    if let Some(value) = cli_args.get("push_gap_ms") {
        parse_into(value, &mut config.push.min_gap_ms);
    }
    if let Some(value) = cli_args.get("debounce_ms") {
        parse_into(value, &mut config.dedup.debounce_ms);
    }
    if let Some(value) = cli_args.get("steady_gate_dbm") {
        parse_into(value, &mut config.rssi.steady_gate_dbm);
    }
    if let Some(value) = cli_args.get("warmup_ms") {
        parse_into(value, &mut config.bootstrap.warmup_ms);
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom.toml");
        File::create(&config_path).unwrap();

        env::set_var("UHFSCAN_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("UHFSCAN_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing_file() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("UHFSCAN_CONFIG_PATH", "/definitely/not/here/uhfscan.toml");
        let result = find_config_file();
        env::remove_var("UHFSCAN_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::remove_var("UHFSCAN_PUSH_CHUNK");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[push]").unwrap();
        writeln!(file, "chunk_size = 64").unwrap();
        writeln!(file, "[adaptive]").unwrap();
        writeln!(file, "max_param = 7").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.push.chunk_size, 64);
        assert_eq!(config.adaptive.max_param, 7);
        // untouched sections keep their defaults
        assert_eq!(config.backlog.capacity, 12_000);
        assert_eq!(config.dedup.debounce_ms, 4);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[push]").unwrap();
        writeln!(file, "chunk_size = 0").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = UhfConfig::default();

        env::set_var("UHFSCAN_PUSH_CHUNK", "32");
        env::set_var("UHFSCAN_SERIAL_NODES", "/dev/ttyUSB0, /dev/ttyUSB1");
        apply_environment_overrides(&mut config);
        env::remove_var("UHFSCAN_PUSH_CHUNK");
        env::remove_var("UHFSCAN_SERIAL_NODES");

        assert_eq!(config.push.chunk_size, 32);
        assert_eq!(config.reader.serial_nodes, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
    }

    #[test]
    fn test_unparsable_override_is_ignored() {
        let mut config = UhfConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("push_chunk".to_string(), "lots".to_string());

        apply_cli_overrides(&mut config, &cli_args);

        assert_eq!(config.push.chunk_size, 256);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[push]").unwrap();
        writeln!(file, "chunk_size = 100").unwrap();
        writeln!(file, "min_gap_ms = 10").unwrap();

        env::set_var("UHFSCAN_PUSH_CHUNK", "200");
        env::set_var("UHFSCAN_PUSH_GAP_MS", "5");

        let mut cli_args = HashMap::new();
        cli_args.insert("push_chunk".to_string(), "300".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("UHFSCAN_PUSH_CHUNK");
        env::remove_var("UHFSCAN_PUSH_GAP_MS");

        // CLI wins for chunk, env wins for gap (no CLI override)
        assert_eq!(config.push.chunk_size, 300);
        assert_eq!(config.push.min_gap_ms, 5);
    }
}
