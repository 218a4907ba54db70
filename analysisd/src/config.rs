// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::adapters::slurm::{SlurmConfig, SlurmPrograms};
use crate::app::types::ResourceDefaults;

const APP_DIR_NAME: &str = "analysisd";
const CONFIG_FILE_NAME: &str = "analysisd.toml";
const CONFIG_ENV_VAR: &str = "ANALYSISD_CONFIG_PATH";
const DATABASE_FILE_NAME: &str = "analysisd.sqlite";
const DEFAULT_JOB_CHECK_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database_path: Option<String>,
    partition: Option<String>,
    job_check_interval_secs: Option<u64>,
    verbose: Option<bool>,
    #[serde(default)]
    resources: ResourceDefaults,
    #[serde(default)]
    slurm: SlurmPrograms,
}

#[derive(Debug)]
pub struct Config {
    pub database_path: PathBuf,
    pub partition: Option<String>,
    pub job_check_interval_secs: u64,
    pub verbose: bool,
    pub resources: ResourceDefaults,
    pub programs: SlurmPrograms,
    pub config_path: Option<PathBuf>,
}

impl Config {
    pub fn slurm_config(&self) -> SlurmConfig {
        SlurmConfig {
            partition: self.partition.clone(),
            defaults: self.resources.clone(),
            programs: self.programs.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub database_path: ConfigValue<PathBuf>,
    pub partition: ConfigValue<Option<String>>,
    pub job_check_interval_secs: ConfigValue<u64>,
    pub verbose: ConfigValue<bool>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub partition: Option<String>,
    pub job_check_interval_secs: Option<u64>,
    pub verbose: Option<bool>,
}

/// Picks the first present value: override, then file, then default.
fn layered<T>(over: Option<T>, file: Option<T>, default: T) -> (T, ConfigSource) {
    match (over, file) {
        (Some(value), _) => (value, ConfigSource::Override),
        (None, Some(value)) => (value, ConfigSource::ConfigFile),
        (None, None) => (default, ConfigSource::Default),
    }
}

pub fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    Ok(load_with_report(config_path_override, overrides)?.config)
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path.as_deref().is_some_and(Path::exists);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };
    let config_dir = config_path.as_deref().and_then(Path::parent);

    let (database_path, database_source) = match overrides.database_path {
        Some(path) => (expand_path(path), ConfigSource::Override),
        None => match file_config.database_path.as_deref() {
            Some(raw) => (resolve_path(raw, config_dir), ConfigSource::ConfigFile),
            None => (
                default_database_path().with_context(|| {
                    "failed to resolve default database path; specify --database-path or set database_path in the config file"
                })?,
                ConfigSource::Default,
            ),
        },
    };

    let partition_file = file_config
        .partition
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let partition_over = overrides
        .partition
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let (partition, partition_source) =
        layered(partition_over.map(Some), partition_file.map(Some), None);

    let (job_check_interval_secs, job_check_interval_source) = layered(
        overrides.job_check_interval_secs,
        file_config.job_check_interval_secs,
        DEFAULT_JOB_CHECK_INTERVAL_SECS,
    );
    if job_check_interval_secs == 0 {
        anyhow::bail!("job_check_interval_secs must be at least 1");
    }

    let (verbose, verbose_source) = layered(overrides.verbose, file_config.verbose, false);

    let resources = file_config.resources;
    validate_resources(&resources)?;

    let config = Config {
        database_path,
        partition,
        job_check_interval_secs,
        verbose,
        resources,
        programs: file_config.slurm,
        config_path: config_path.clone(),
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        database_path: ConfigValue::new(config.database_path.clone(), database_source),
        partition: ConfigValue::new(config.partition.clone(), partition_source),
        job_check_interval_secs: ConfigValue::new(
            config.job_check_interval_secs,
            job_check_interval_source,
        ),
        verbose: ConfigValue::new(config.verbose, verbose_source),
    };

    Ok(LoadResult { config, report })
}

fn validate_resources(resources: &ResourceDefaults) -> Result<()> {
    if resources.nodes == Some(0) {
        anyhow::bail!("resources.nodes must be at least 1");
    }
    if resources.cores_per_node == Some(0) {
        anyhow::bail!("resources.cores_per_node must be at least 1");
    }
    if resources
        .memory
        .as_deref()
        .is_some_and(|value| value.trim().is_empty())
    {
        anyhow::bail!("resources.memory must not be empty");
    }
    if resources
        .time_limit
        .as_deref()
        .is_some_and(|value| value.trim().is_empty())
    {
        anyhow::bail!("resources.time_limit must not be empty");
    }
    Ok(())
}

pub fn ensure_database_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }
    Ok(())
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(shellexpand::tilde(raw).as_ref());
    match base_dir {
        Some(dir) if !path.is_absolute() => dir.join(path),
        _ => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) if value.is_empty() => anyhow::bail!("{CONFIG_ENV_VAR} is set but empty"),
        Some(value) => Ok(Some(PathBuf::from(value))),
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_database_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME).join(DATABASE_FILE_NAME))
}
