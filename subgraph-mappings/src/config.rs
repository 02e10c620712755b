//! Runtime configuration loaded from `config.toml`.
//!
//! Declares the network name, the failure policy, where contract reads and
//! off-chain content come from, and the static data sources the replay
//! starts with. Relative paths are resolved against the directory holding
//! the config file.
//!
//! When no config file is present the defaults are used: network
//! `mainnet`, policy `abort`, no static sources, no content and a chain
//! client that knows no calls.

use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use subgraph::{
    ChainClient, ContentFetcher, DataSource, DataSourceContext, DirectoryContent, FailurePolicy,
    MockChainClient, NoContent, RpcChainClient,
};

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Network name exposed to handlers.
    #[serde(default = "default_network")]
    pub network: String,
    /// What to do when a handler fails.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Directory holding off-chain documents named by content id.
    pub content_dir: Option<PathBuf>,
    /// JSON file of recorded contract reads.
    pub calls: Option<PathBuf>,
    /// JSON-RPC endpoint for live contract reads. Takes precedence over
    /// [`calls`](Self::calls).
    pub rpc: Option<String>,
    /// Contracts watched from the start.
    #[serde(default)]
    pub data_sources: Vec<StaticSource>,
    /// Off-chain documents watched from the start.
    #[serde(default)]
    pub file_sources: Vec<FileSource>,
}

/// A contract watched from the start.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticSource {
    /// Handler template name.
    pub template: String,
    /// Contract address, `0x`-prefixed hex.
    pub address: String,
    /// Context handed to the handlers.
    #[serde(default)]
    pub context: DataSourceContext,
}

/// An off-chain document watched from the start.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSource {
    /// Handler template name.
    pub template: String,
    /// Content identifier.
    pub content_id: String,
}

fn default_network() -> String {
    "mainnet".to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: default_network(),
            failure_policy: FailurePolicy::default(),
            content_dir: None,
            calls: None,
            rpc: None,
            data_sources: Vec::new(),
            file_sources: Vec::new(),
        }
    }
}

impl StaticSource {
    /// Build the data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not valid hex.
    pub fn to_data_source(&self) -> Result<DataSource> {
        let address: Address = self
            .address
            .parse()
            .with_context(|| format!("invalid address `{}` for template {}", self.address, self.template))?;
        Ok(DataSource::on_chain(&self.template, address).with_context(self.context.clone()))
    }
}

impl FileSource {
    /// Build the data source.
    #[must_use]
    pub fn to_data_source(&self) -> DataSource {
        DataSource::file(&self.template, &self.content_id)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns [`Config::default`] if the file does not exist,
    /// allowing the binary to work without any config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

        if let Some(base) = path.parent() {
            config.content_dir = config.content_dir.map(|p| base.join(p));
            config.calls = config.calls.map(|p| base.join(p));
        }
        Ok(config)
    }

    /// Every static data source, contracts first.
    ///
    /// # Errors
    ///
    /// Returns an error if a contract address is invalid.
    pub fn data_sources(&self) -> Result<Vec<DataSource>> {
        let mut sources = self
            .data_sources
            .iter()
            .map(StaticSource::to_data_source)
            .collect::<Result<Vec<_>>>()?;
        sources.extend(self.file_sources.iter().map(FileSource::to_data_source));
        Ok(sources)
    }

    /// Chain client for contract reads: live RPC if configured, else the
    /// recorded calls, else a client that knows no calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC URL is invalid or the calls file cannot
    /// be read or parsed.
    pub fn chain_client(&self) -> Result<Box<dyn ChainClient>> {
        if let Some(url) = &self.rpc {
            let client = RpcChainClient::connect(url).with_context(|| format!("connecting to {url}"))?;
            return Ok(Box::new(client));
        }
        let Some(path) = &self.calls else {
            return Ok(Box::new(MockChainClient::new()));
        };
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let client =
            MockChainClient::from_json(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Box::new(client))
    }

    /// Fetcher for off-chain content.
    #[must_use]
    pub fn content_fetcher(&self) -> Box<dyn ContentFetcher> {
        match &self.content_dir {
            Some(dir) => Box::new(DirectoryContent::new(dir)),
            None => Box::new(NoContent),
        }
    }
}
