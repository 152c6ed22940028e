//! Configuration: TOML file first, then environment variables

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use tablehop_chain::{ChainConfig, ChainVerifier, EthSigner, EvmAddress, TaskLedger};
use tablehop_core::OpenAiCompatConfig;

const LOCAL_CONFIG: &str = "tablehop.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: OpenAiCompatConfig,
    /// Node and task contract; chain features are off without it
    pub chain: Option<ChainConfig>,
    pub agent: AgentSection,
    pub host: HostSection,
}

/// The food agent as an A2A server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub host: String,
    pub port: u16,
    /// URL advertised in the agent card, when it differs from host:port
    pub public_url: Option<String>,
    /// Address tasks must name as their service agent
    pub eth_address: Option<String>,
    /// Key used to send `completeTask`
    pub private_key: Option<String>,
    pub verify_signatures: bool,
    /// Check `blockchain` metadata against the task contract
    pub verify_chain: bool,
    /// Reject tasks when the chain cannot be consulted
    pub strict_chain_checks: bool,
    pub max_iterations: Option<usize>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 10002,
            public_url: None,
            eth_address: None,
            private_key: None,
            verify_signatures: true,
            verify_chain: true,
            strict_chain_checks: false,
            max_iterations: None,
        }
    }
}

/// The delegating side
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostSection {
    /// Key that signs outgoing tasks and pays bounties
    pub private_key: Option<String>,
    pub bounty_wei: u64,
    pub remote_agents: Vec<RemoteAgentEntry>,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            private_key: None,
            // 0.001 ETH
            bounty_wei: 1_000_000_000_000_000,
            remote_agents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteAgentEntry {
    pub url: String,
    /// The agent's payee address for `confirmTask`
    #[serde(default)]
    pub address: Option<String>,
}

impl RemoteAgentEntry {
    pub fn eth_address(&self) -> Result<Option<EvmAddress>> {
        parse_address(self.address.as_deref())
            .with_context(|| format!("Invalid address for remote agent {}", self.url))
    }
}

fn parse_address(value: Option<&str>) -> Result<Option<EvmAddress>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim().parse::<EvmAddress>())
        .transpose()
        .map_err(Into::into)
}

fn parse_key(value: Option<&str>, what: &str) -> Result<Option<EthSigner>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(EthSigner::from_hex)
        .transpose()
        .with_context(|| format!("Invalid {}", what))
}

impl Config {
    /// Load from `path`, else `./tablehop.toml`, else the user config dir,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::locate(path) {
            Some(file) => Self::from_file(&file)?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn locate(path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = path {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("tablehop").join("config.toml"))
            .filter(|p| p.exists())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Overlay environment variables, read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(rpc) = var("CHAIN_RPC") {
            self.chain.get_or_insert_with(ChainConfig::default).rpc_url = rpc;
        }
        if let Some(contract) = var("PIN_AI_NETWORK_TASK_CONTRACT") {
            self.chain.get_or_insert_with(ChainConfig::default).contract_address = contract;
        }
        if let Some(key) = var("ETH_PRIVATE_KEY") {
            self.host.private_key = Some(key);
        }
        if let Some(bounty) = var("BOUNTY_WEI") {
            match bounty.trim().parse() {
                Ok(wei) => self.host.bounty_wei = wei,
                Err(_) => warn!("Ignoring BOUNTY_WEI={}: not an integer", bounty),
            }
        }
        if let Some(address) = var("AGENT_ETH_ADDRESS") {
            self.agent.eth_address = Some(address);
        }
        if let Some(key) = var("AGENT_PRIVATE_KEY") {
            self.agent.private_key = Some(key);
        }
        if let Some(key) = var("GOOGLE_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = var("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm.model = model;
        }
    }

    pub fn host_signer(&self) -> Result<Option<EthSigner>> {
        parse_key(self.host.private_key.as_deref(), "host private key")
    }

    pub fn agent_signer(&self) -> Result<Option<EthSigner>> {
        parse_key(self.agent.private_key.as_deref(), "agent private key")
    }

    /// Configured agent address, else the address of the agent key
    pub fn agent_address(&self) -> Result<Option<EvmAddress>> {
        if let Some(address) = parse_address(self.agent.eth_address.as_deref())
            .context("Invalid agent address")?
        {
            return Ok(Some(address));
        }
        Ok(self.agent_signer()?.map(|s| s.address()))
    }

    /// Verifier for incoming `blockchain` metadata, or `None` when chain checks are off
    pub fn chain_verifier(&self, ledger: Option<Arc<dyn TaskLedger>>) -> Result<Option<ChainVerifier>> {
        if !self.agent.verify_chain {
            return Ok(None);
        }
        Ok(Some(ChainVerifier::new(
            ledger,
            self.agent_address()?,
            self.agent.strict_chain_checks,
        )))
    }

    /// URL the agent card advertises
    pub fn agent_url(&self) -> String {
        self.agent
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/", self.agent.host, self.agent.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.port, 10002);
        assert!(config.agent.verify_signatures);
        assert!(config.agent.verify_chain);
        assert!(!config.agent.strict_chain_checks);
        assert!(config.chain.is_none());
        assert_eq!(config.host.bounty_wei, 1_000_000_000_000_000);
        assert_eq!(config.agent_url(), "http://localhost:10002/");
        assert_eq!(config.llm.model, "gemini-2.0-flash-001");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[llm]
model = "gemini-2.5-flash"

[chain]
rpc_url = "http://10.0.0.5:8545/"

[agent]
port = 11000
verify_signatures = false
verify_chain = false
strict_chain_checks = true

[host]
bounty_wei = 42

[[host.remote_agents]]
url = "http://localhost:10002/"
address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"

[[host.remote_agents]]
url = "http://localhost:10003/"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        let chain = config.chain.as_ref().unwrap();
        assert_eq!(chain.rpc_url, "http://10.0.0.5:8545/");
        assert_eq!(chain.receipt_attempts, 60);
        assert_eq!(config.agent.port, 11000);
        assert_eq!(config.agent.host, "localhost");
        assert!(!config.agent.verify_signatures);
        assert!(!config.agent.verify_chain);
        assert!(config.agent.strict_chain_checks);
        assert_eq!(config.host.bounty_wei, 42);
        assert_eq!(config.host.remote_agents.len(), 2);
        assert!(config.host.remote_agents[0].eth_address().unwrap().is_some());
        assert!(config.host.remote_agents[1].eth_address().unwrap().is_none());
    }

    #[test]
    fn test_chain_verifier_toggle() {
        let mut config = Config::default();
        assert!(config.chain_verifier(None).unwrap().is_some());

        config.agent.verify_chain = false;
        assert!(config.chain_verifier(None).unwrap().is_none());

        config.agent.verify_chain = true;
        config.agent.eth_address = Some("not an address".into());
        assert!(config.chain_verifier(None).is_err());
    }

    #[test]
    fn test_bad_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[agent\nport = 1").unwrap();
        assert!(Config::from_file(file.path()).is_err());
        assert!(Config::from_file(Path::new("/nonexistent/tablehop.toml")).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        let signer = EthSigner::random();
        let key = signer.private_key_hex();
        config.apply_env(env(&[
            ("CHAIN_RPC", "http://chain:8545/"),
            ("ETH_PRIVATE_KEY", key.as_str()),
            ("BOUNTY_WEI", "7"),
            ("AGENT_ETH_ADDRESS", "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"),
            ("GOOGLE_API_KEY", "key-123"),
            ("LLM_MODEL", "other-model"),
            ("LLM_BASE_URL", ""),
        ]));

        let chain = config.chain.as_ref().unwrap();
        assert_eq!(chain.rpc_url, "http://chain:8545/");
        assert_eq!(chain.contract_address, "0x5FbDB2315678afecb367f032d93F642f64180aa3");
        assert_eq!(config.host.bounty_wei, 7);
        assert_eq!(config.llm.api_key.as_deref(), Some("key-123"));
        assert_eq!(config.llm.model, "other-model");
        // empty values do not override
        assert!(config.llm.base_url.starts_with("https://"));
        assert_eq!(
            config.host_signer().unwrap().unwrap().address(),
            signer.address()
        );
        assert_eq!(
            config.agent_address().unwrap().unwrap().to_lower_hex(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_bad_bounty_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("BOUNTY_WEI", "lots")]));
        assert_eq!(config.host.bounty_wei, 1_000_000_000_000_000);
    }

    #[test]
    fn test_agent_address_from_key() {
        let signer = EthSigner::random();
        let key = signer.private_key_hex();
        let mut config = Config::default();
        config.apply_env(env(&[("AGENT_PRIVATE_KEY", key.as_str())]));
        assert_eq!(config.agent_address().unwrap(), Some(signer.address()));
    }

    #[test]
    fn test_invalid_key_is_error() {
        let mut config = Config::default();
        config.host.private_key = Some("0x1234".into());
        assert!(config.host_signer().is_err());
        config.agent.eth_address = Some("not-an-address".into());
        assert!(config.agent_address().is_err());
    }
}
