mod card;
mod config;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tablehop_a2a::{A2aServer, HostAgent, TaskManager, host_tool_agent};
use tablehop_chain::{EthSigner, EvmAddress, TaskContract, TaskLedger};
use tablehop_core::food::FoodAgentBuilder;
use tablehop_core::{AgentContent, AgentRuntime, LlmProvider, OpenAiCompatProvider};

use config::Config;

#[derive(Parser)]
#[command(name = "tablehop", version, about = "A2A food-ordering agents with on-chain task anchoring")]
struct Cli {
    /// Config file (defaults to ./tablehop.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the food-ordering agent as an A2A server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Accept tasks without a signed auth block
        #[arg(long)]
        no_verify_signatures: bool,
        /// Ignore `blockchain` metadata on incoming tasks
        #[arg(long)]
        no_verify_chain: bool,
        /// Reject tasks when the chain cannot be consulted
        #[arg(long)]
        strict_chain: bool,
    },
    /// Send one message to a remote agent
    Send {
        /// Base URL of the remote agent
        #[arg(long)]
        agent: String,
        /// The agent's payee address, for --confirm
        #[arg(long)]
        address: Option<EvmAddress>,
        /// Anchor the task on chain with a bounty before sending
        #[arg(long)]
        confirm: bool,
        #[arg(required = true)]
        message: Vec<String>,
    },
    /// Talk to the LLM host agent, which delegates to remote agents
    Chat {
        /// Extra remote agent URLs, on top of the configured ones
        #[arg(long = "agent")]
        agents: Vec<String>,
    },
    /// Generate a fresh Ethereum key
    Keygen,
    /// Print the food agent's card
    Card {
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve {
            host,
            port,
            no_verify_signatures,
            no_verify_chain,
            strict_chain,
        } => {
            let mut config = config;
            if let Some(host) = host {
                config.agent.host = host;
            }
            if let Some(port) = port {
                config.agent.port = port;
            }
            if no_verify_signatures {
                config.agent.verify_signatures = false;
            }
            if no_verify_chain {
                config.agent.verify_chain = false;
            }
            if strict_chain {
                config.agent.strict_chain_checks = true;
            }
            cmd_serve(config).await
        }
        Command::Send {
            agent,
            address,
            confirm,
            message,
        } => cmd_send(&config, &agent, address, confirm, &message.join(" ")).await,
        Command::Chat { agents } => cmd_chat(&config, agents).await,
        Command::Keygen => {
            let signer = EthSigner::random();
            println!("Address:     {}", signer.address().to_checksum());
            println!("Private key: {}", signer.private_key_hex());
            println!();
            println!("export ETH_PRIVATE_KEY={}", signer.private_key_hex());
            Ok(())
        }
        Command::Card { url } => {
            let card = card::food_agent_card(url.unwrap_or_else(|| config.agent_url()));
            println!("{}", serde_json::to_string_pretty(&card)?);
            Ok(())
        }
    }
}

fn llm_provider(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    if config.llm.api_key.is_none() {
        bail!("GOOGLE_API_KEY environment variable not set");
    }
    Ok(Arc::new(OpenAiCompatProvider::new(config.llm.clone())?))
}

fn task_ledger(config: &Config, signer: Option<EthSigner>) -> Result<Option<Arc<dyn TaskLedger>>> {
    match &config.chain {
        Some(chain) => {
            let contract = TaskContract::new(chain, signer).context("Failed to set up task contract")?;
            info!("Task contract at {}", contract.address().to_checksum());
            let ledger: Arc<dyn TaskLedger> = Arc::new(contract);
            Ok(Some(ledger))
        }
        None => Ok(None),
    }
}

async fn cmd_serve(config: Config) -> Result<()> {
    let provider = llm_provider(&config)?;
    let agent_address = config.agent_address()?;
    let ledger = task_ledger(&config, config.agent_signer()?)?;
    if ledger.is_some() && agent_address.is_none() {
        warn!("No agent address configured; on-chain tasks will not be matched to this agent");
    }

    let mut builder = FoodAgentBuilder::new(provider).ledger(ledger.clone());
    if let Some(max) = config.agent.max_iterations {
        builder = builder.max_iterations(max);
    }
    let agent = builder.build();

    let mut manager = TaskManager::new(Arc::new(agent))
        .with_signature_verification(config.agent.verify_signatures);
    match config.chain_verifier(ledger)? {
        Some(verifier) => manager = manager.with_chain_verifier(verifier),
        None => warn!("Chain verification disabled; blockchain metadata is ignored"),
    }
    let server = A2aServer::new(card::food_agent_card(config.agent_url()), manager);

    let listener = TcpListener::bind((config.agent.host.as_str(), config.agent.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.agent.host, config.agent.port))?;
    info!(
        "Food agent listening on {} (signatures: {}, chain: {}, strict chain: {})",
        listener.local_addr()?,
        config.agent.verify_signatures,
        config.agent.verify_chain,
        config.agent.strict_chain_checks
    );

    tokio::select! {
        result = server.serve_listener(listener) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}

fn host_agent(config: &Config) -> Result<HostAgent> {
    let signer = config.host_signer()?;
    let ledger = task_ledger(config, signer.clone())?;
    let mut host = HostAgent::new();
    match signer {
        Some(signer) => host = host.with_signer(signer),
        None => warn!("No host private key; outgoing tasks will be unsigned"),
    }
    if let Some(ledger) = ledger {
        host = host.with_ledger(ledger, u128::from(config.host.bounty_wei));
    }
    Ok(host)
}

async fn cmd_send(
    config: &Config,
    url: &str,
    address: Option<EvmAddress>,
    confirm: bool,
    message: &str,
) -> Result<()> {
    let host = host_agent(config)?;
    let card = host.connect(url, address).await?;
    // the CLI uses one conversation per invocation
    let conversation_id = uuid::Uuid::new_v4().to_string();

    let response = if confirm {
        host.confirm_task(&conversation_id, &card.name, message).await?
    } else {
        host.send_task(&conversation_id, &card.name, message).await?
    };

    println!("{}", response.render());
    eprintln!();
    eprintln!("[{}] task {} is {}", response.agent, response.task_id, response.state);
    if let Some(tx) = &response.confirm_task_tx {
        eprintln!("confirmTask tx: {}", tx);
    }
    Ok(())
}

async fn cmd_chat(config: &Config, extra_agents: Vec<String>) -> Result<()> {
    let provider = llm_provider(config)?;
    let host = host_agent(config)?;

    for entry in &config.host.remote_agents {
        match host.connect(&entry.url, entry.eth_address()?).await {
            Ok(card) => info!("Connected to {} at {}", card.name, entry.url),
            Err(e) => warn!("Skipping {}: {:#}", entry.url, e),
        }
    }
    for url in &extra_agents {
        match host.connect(url, None).await {
            Ok(card) => info!("Connected to {} at {}", card.name, url),
            Err(e) => warn!("Skipping {}: {:#}", url, e),
        }
    }
    if host.list_remote_agents().is_empty() {
        bail!("No remote agents reachable; add [[host.remote_agents]] or pass --agent");
    }

    let agent = host_tool_agent(Arc::new(host), provider);
    let conversation_id = uuid::Uuid::new_v4().to_string();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match agent.invoke(line, &conversation_id).await {
            Ok(AgentContent::Text(text)) => println!("{}", text),
            Ok(AgentContent::Data(data)) => println!("{}", serde_json::to_string_pretty(&data)?),
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }
    Ok(())
}
