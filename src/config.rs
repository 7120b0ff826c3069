use crate::pip::PipSize;
use log::warn;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8071/api/v1.0/";
pub const DEFAULT_STORAGE_DIR: &str = ".meet_room_core";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base_url: String,
    pub room_slug: Option<String>,
    pub storage_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub pip_size: PipSize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            room_slug: None,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            log_file: None,
            pip_size: PipSize::default(),
        }
    }
}

impl Config {
    pub fn from_env_variables() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Config {
            api_base_url: non_empty("API_BASE_URL").unwrap_or(defaults.api_base_url),
            room_slug: non_empty("ROOM_SLUG"),
            storage_dir: non_empty("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            log_file: non_empty("LOG_FILE").map(PathBuf::from),
            pip_size: PipSize {
                width: parse_or("PIP_WIDTH", non_empty("PIP_WIDTH"), defaults.pip_size.width),
                height: parse_or("PIP_HEIGHT", non_empty("PIP_HEIGHT"), defaults.pip_size.height),
            },
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(name: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} must be a number, got {:?}; using {}", name, raw, default);
            default
        }),
    }
}
