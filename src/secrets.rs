/// Credentials for the early-warning API and the reference database.
///
/// Values come from the process environment after loading an optional `.env`
/// file. Nothing is ever written back.

use std::collections::BTreeMap;
use std::env;

use crate::model::PipelineError;

pub const IBF_API_URL: &str = "IBF_API_URL";
pub const IBF_API_USER: &str = "IBF_API_USER";
pub const IBF_API_PASSWORD: &str = "IBF_API_PASSWORD";
pub const DATABASE_URL: &str = "DATABASE_URL";

/// Keys every publishing run needs.
pub const REQUIRED_KEYS: [&str; 3] = [IBF_API_URL, IBF_API_USER, IBF_API_PASSWORD];

#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: BTreeMap<String, String>,
}

impl Secrets {
    /// Loads `.env` (if present) and snapshots the known keys.
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenv::dotenv().ok();
        let values = REQUIRED_KEYS
            .iter()
            .chain(std::iter::once(&DATABASE_URL))
            .filter_map(|key| env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        let secrets = Secrets { values };
        secrets.check(&REQUIRED_KEYS)?;
        Ok(secrets)
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Secrets {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Result<&str, PipelineError> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PipelineError::Configuration(format!("secret {} is not set", key)))
    }

    /// Fails on the first missing or empty key.
    pub fn check(&self, keys: &[&str]) -> Result<(), PipelineError> {
        for key in keys {
            self.get(key)?;
        }
        Ok(())
    }
}
