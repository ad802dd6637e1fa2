use std::{env, path::PathBuf, str::FromStr, time::Duration};

use amf::{AMF3_VERSION, ClassAliasRegistry};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, substitution::Substitution};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone)]
pub struct Config {
    pub logger: LoggerConfig,
    /// Registered in the global alias registry on startup.
    pub class_aliases: Vec<ClassAlias>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub level: String,
    pub stdio_level: String,
    pub file_level: String,
    pub format: LoggerFormat,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerFormat {
    Pretty,
    Json,
    Compact,
}

impl FromStr for LoggerFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(LoggerFormat::Json),
            "pretty" => Ok(LoggerFormat::Pretty),
            "compact" => Ok(LoggerFormat::Compact),
            _ => Err("invalid logger format"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassAlias {
    pub alias: String,
    pub class_name: String,
}

pub fn read_config() -> Config {
    read_config_from(|name| env::var(name).ok())
}

fn read_config_from(var: impl Fn(&str) -> Option<String>) -> Config {
    let level = var("AMF_SAMPLER_LOGGER_LEVEL").unwrap_or_else(|| "info".to_string());
    let stdio_level = var("AMF_SAMPLER_STDIO_LOGGER_LEVEL").unwrap_or_else(|| level.clone());
    let file_level = var("AMF_SAMPLER_FILE_LOGGER_LEVEL").unwrap_or_else(|| level.clone());

    let default_format = LoggerFormat::Compact;
    let format = match var("AMF_SAMPLER_LOGGER_FORMAT") {
        Some(format) => LoggerFormat::from_str(&format).unwrap_or(default_format),
        None => default_format,
    };
    let log_file = var("AMF_SAMPLER_LOG_FILE").map(PathBuf::from);

    let class_aliases = match var("AMF_SAMPLER_CLASS_ALIASES") {
        Some(aliases) => parse_class_aliases(&aliases),
        None => vec![],
    };

    let request_timeout = var("AMF_SAMPLER_REQUEST_TIMEOUT_MS")
        .and_then(|timeout| timeout.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

    Config {
        logger: LoggerConfig {
            level,
            stdio_level,
            file_level,
            format,
            log_file,
        },
        class_aliases,
        request_timeout,
    }
}

/// Parses `ALIAS=canonical.Type` entries separated by commas. Entries without
/// `=` or with an empty side are skipped.
fn parse_class_aliases(aliases: &str) -> Vec<ClassAlias> {
    aliases
        .split(',')
        .filter_map(|entry| {
            let (alias, class_name) = entry.split_once('=')?;
            let (alias, class_name) = (alias.trim(), class_name.trim());
            if alias.is_empty() || class_name.is_empty() {
                return None;
            }
            Some(ClassAlias {
                alias: alias.to_string(),
                class_name: class_name.to_string(),
            })
        })
        .collect()
}

pub fn register_class_aliases(aliases: &[ClassAlias]) {
    let registry = ClassAliasRegistry::global();
    for ClassAlias { alias, class_name } in aliases {
        registry.register(alias, class_name);
    }
}

/// Settings of a single AMF sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplerConfig {
    pub url: String,
    /// XML form of the request action message.
    pub amf_xml: String,
    /// Applied to `amf_xml` in order, before it is parsed.
    #[serde(default)]
    pub substitutions: Vec<Substitution>,
    #[serde(default = "default_object_encoding")]
    pub object_encoding: u16,
    /// Variable receiving the XML form of the response.
    #[serde(default)]
    pub response_var: Option<String>,
    #[serde(default)]
    pub class_aliases: Vec<ClassAlias>,
}

fn default_object_encoding() -> u16 {
    AMF3_VERSION
}

impl SamplerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SamplerConfig = serde_json::from_str(json)?;
        if config.object_encoding != AMF3_VERSION {
            return Err(ConfigError::UnsupportedObjectEncoding(
                config.object_encoding,
            ));
        }
        Ok(config)
    }
}
