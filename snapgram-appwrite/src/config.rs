use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const ENV_PREFIX: &str = "APPWRITE_";

#[derive(Debug, Error)]
#[error("Error reading Appwrite configuration from the environment: {0}")]
pub struct ConfigError(#[from] envy::Error);

/// Project and resource ids, read from `APPWRITE_*` variables.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct AppwriteConfig {
    /// API endpoint including the version path, e.g. `https://cloud.appwrite.io/v1`.
    pub url: Url,
    pub project_id: String,
    pub database_id: String,
    pub storage_id: String,
    pub user_collection_id: String,
    pub post_collection_id: String,
    pub saves_collection_id: String,
}

impl AppwriteConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed(ENV_PREFIX).from_env()?)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(ENV_PREFIX).from_iter(vars)?)
    }

    #[must_use]
    pub fn resources(&self) -> Resources {
        Resources {
            database_id: self.database_id.clone(),
            storage_id: self.storage_id.clone(),
            user_collection_id: self.user_collection_id.clone(),
            post_collection_id: self.post_collection_id.clone(),
            saves_collection_id: self.saves_collection_id.clone(),
        }
    }
}

/// Database, collection and bucket ids the operations work on.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Resources {
    pub database_id: String,
    pub storage_id: String,
    pub user_collection_id: String,
    pub post_collection_id: String,
    pub saves_collection_id: String,
}
