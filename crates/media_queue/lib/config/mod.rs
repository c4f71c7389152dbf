use std::env;
use std::num::NonZeroU32;
use std::str::FromStr;

use thiserror::Error;

use crate::queue::{DEFAULT_LOOKAHEAD_WINDOW, DEFAULT_PAGE_SIZE};
use crate::source::DEFAULT_MAX_REQUESTS_PER_SECOND;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Archive API root, e.g. `https://archive.example/api/v1`. Required.
    pub api_url: String,
    pub page_size: usize,
    pub lookahead_window: usize,
    pub max_requests_per_second: NonZeroU32,
    pub max_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds config from any variable lookup, which keeps parsing testable without touching
    /// the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("MEDIA_API_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("MEDIA_API_URL"))?;

        Ok(Self {
            api_url,
            page_size: parse_or(&lookup, "MEDIA_QUEUE_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            lookahead_window: parse_or(
                &lookup,
                "MEDIA_QUEUE_LOOKAHEAD",
                DEFAULT_LOOKAHEAD_WINDOW,
            )?,
            max_requests_per_second: parse_or(
                &lookup,
                "MEDIA_API_MAX_RPS",
                DEFAULT_MAX_REQUESTS_PER_SECOND,
            )?,
            max_attempts: parse_or(&lookup, "MEDIA_API_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: err.to_string(),
        }),
    }
}
