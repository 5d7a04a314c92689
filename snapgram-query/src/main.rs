use snapgram_appwrite::{Api, AppwriteClient, AppwriteConfig, AppwriteError, config::ConfigError};
use snapgram_query::{CacheConfig, QueryCache, QueryClient, QueryError};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Error reading cache configuration: {0}")]
    CacheConfig(#[from] envy::Error),
    #[error("Error building Appwrite client: {0}")]
    Client(#[from] AppwriteError),
    #[error("Query failed: {0}")]
    Query(#[from] QueryError),
    #[error("Error serializing output: {0}")]
    Output(#[from] serde_json::Error),
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "snapgram_query=debug,\
                snapgram_appwrite=debug,\
                snapgram_common=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_dotenv() -> Result<(), InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    Ok(())
}

/// Prints the recent posts, or the posts matching the search term given as
/// the first argument, as JSON.
#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    load_dotenv()?;

    let config = AppwriteConfig::from_env()?;
    let cache_config = CacheConfig::from_env()?;
    debug!(endpoint = %config.url, ?cache_config, "Loaded configuration");

    let backend = AppwriteClient::new(&config)?;
    let api = Api::new(backend, config.resources());
    let client = QueryClient::new(api, QueryCache::new(&cache_config));

    let output = match std::env::args().nth(1) {
        Some(search_term) => {
            let found = client.search_posts(&search_term).await?;
            serde_json::to_string_pretty(&found.as_deref())?
        }
        None => {
            let recent = client.recent_posts().await?;
            serde_json::to_string_pretty(&*recent)?
        }
    };
    println!("{output}");

    Ok(())
}
