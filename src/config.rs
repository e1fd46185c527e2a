use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::application::LedgerPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: String,
    pub points_per_referral: u32,
    pub allow_overdraft: bool,
    pub referral_code_attempts: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = LedgerPolicy::default();

        Ok(Self {
            database: lookup("BARRIM_DATABASE").unwrap_or_else(|| "barrim.db".to_string()),
            points_per_referral: match lookup("BARRIM_POINTS_PER_REFERRAL") {
                Some(v) => parse_positive(&v)
                    .context("BARRIM_POINTS_PER_REFERRAL must be a positive whole number")?,
                None => defaults.points_per_referral,
            },
            allow_overdraft: match lookup("BARRIM_ALLOW_OVERDRAFT") {
                Some(v) => parse_flag(&v).context("BARRIM_ALLOW_OVERDRAFT must be true or false")?,
                None => defaults.allow_overdraft,
            },
            referral_code_attempts: match lookup("BARRIM_REFERRAL_CODE_ATTEMPTS") {
                Some(v) => parse_positive(&v)
                    .context("BARRIM_REFERRAL_CODE_ATTEMPTS must be a positive number")?,
                None => defaults.referral_code_attempts,
            },
        })
    }

    pub fn policy(&self) -> LedgerPolicy {
        LedgerPolicy {
            points_per_referral: self.points_per_referral,
            allow_overdraft: self.allow_overdraft,
            referral_code_attempts: self.referral_code_attempts,
        }
    }
}

fn parse_positive(value: &str) -> Result<u32> {
    match value.trim().parse::<u32>()? {
        0 => Err(anyhow::anyhow!("value must be at least 1")),
        n => Ok(n),
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("unrecognised flag value: {}", other)),
    }
}
