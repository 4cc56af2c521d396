use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::report::{OutputFmt, TextFormat};

pub const DEFAULT_CONFIG_FILE: &str = "logforge.toml";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel { Error, Warn, Info, Debug, Trace }

impl LogLevel {
    pub fn filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat { Text, Json }

/// Contents of `logforge.toml`. Every key is optional; command-line flags take precedence.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub output: Option<OutputFmt>,
    pub text_format: Option<TextFormat>,
    pub context_lines: Option<usize>,
    pub show_context: Option<bool>,
    pub warnings_as_errors: Option<bool>,
    pub progress: Option<bool>,
    pub force_color: Option<bool>,
    pub no_color: Option<bool>,
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
    pub log_path: Option<String>,
    pub report_path: Option<String>,
}

pub fn parse_config(s: &str) -> anyhow::Result<AppConfig> {
    Ok(toml::from_str::<AppConfig>(s)?)
}

/// Reads the explicit config if given, else `./logforge.toml` when present.
/// A missing default file is `Ok(None)`; a missing explicit file is an error.
pub fn read_config(path: Option<&Path>) -> anyhow::Result<Option<AppConfig>> {
    let p = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let def = Path::new(DEFAULT_CONFIG_FILE);
            if !def.exists() { return Ok(None); }
            def.to_path_buf()
        }
    };
    let s = std::fs::read_to_string(&p).with_context(|| format!("Failed to read config file {}", p.to_string_lossy()))?;
    let cfg = parse_config(&s).with_context(|| format!("Failed to parse config file {}", p.to_string_lossy()))?;
    Ok(Some(cfg))
}
