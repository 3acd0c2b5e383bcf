use anyhow::{bail, Context, Result};
use camino::Utf8PathBuf;
use studysync_app_core::{ClientConfig, FileLocalStore};
use studysync_infra::{PostgrestClient, PostgrestConfig};
use studysync_pipeline::{RestRemote, TableNames};

/// Connection values given on the command line or through the environment.
#[derive(Clone, Default)]
pub struct ConnectionArgs {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub token: Option<String>,
    pub user: Option<String>,
}

/// Fully resolved connection: flags first, then the saved config.
#[derive(Clone)]
pub struct Connection {
    pub endpoint: String,
    pub api_key: String,
    pub token: Option<String>,
    pub user: Option<String>,
}

impl Connection {
    pub fn resolve(args: &ConnectionArgs, config: &ClientConfig) -> Result<Self> {
        let Some(endpoint) = args.endpoint.clone().or_else(|| config.endpoint.clone()) else {
            bail!("no endpoint configured; pass --endpoint or run `studysync config set endpoint <url>`");
        };
        let Some(api_key) = args.api_key.clone().or_else(|| config.api_key.clone()) else {
            bail!("no api key configured; pass --api-key or run `studysync config set api-key <key>`");
        };
        Ok(Self {
            endpoint,
            api_key,
            token: args.token.clone(),
            user: args.user.clone().or_else(|| config.user.clone()),
        })
    }

    pub fn remote(&self) -> Result<RestRemote> {
        let mut config = PostgrestConfig::new(&self.endpoint, &self.api_key);
        if let Some(token) = &self.token {
            config = config.with_token(token);
        }
        let client = PostgrestClient::new(config)
            .with_context(|| format!("Failed to set up client for {}", self.endpoint))?;
        Ok(RestRemote::new(client, self.user.clone(), TableNames::default()))
    }
}

pub fn local_store(flag: Option<Utf8PathBuf>, config: &ClientConfig) -> Result<FileLocalStore> {
    match flag.or_else(|| config.local_path.clone()) {
        Some(path) => Ok(FileLocalStore::new(path)),
        None => bail!("no local data file; pass --local or run `studysync config set local <file>`"),
    }
}
