mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use omni_types::{AgentMessage, AgentMessageKind};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "omni-engine")]
#[command(about = "Headless agent orchestration runtime")]
struct Cli {
    /// YAML configuration file, layered under built-in defaults and
    /// `OMNI_`-prefixed environment overrides.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    host: Option<String>,
    #[arg(long, global = true)]
    port: Option<u16>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the dual-port server: message channel on `port`,
    /// health/config on `port + 1`.
    Serve,
    /// Run a single prompt through the context agent and print the reply.
    Run { prompt: String },
    /// Interactive chat loop over stdin/stdout.
    Chat,
    /// Boots the engine with its in-memory, offline-only providers (echo
    /// LLM, in-memory vector store, no-op scanner) and serves as usual —
    /// no network calls are made, so this is safe for smoke tests and CI.
    /// An optional workspace is scanned once at startup to warm the cache.
    Demo {
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("omni-engine: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut runtime_config = config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        runtime_config.server.host = host;
    }
    if let Some(port) = cli.port {
        runtime_config.server.port = port;
    }

    let logs_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("omni-engine").join("logs");
    let _log_guard = omni_observability::init_logging(&logs_dir, "omni-engine")?;

    let server_config = omni_server::RedactedConfig {
        host: runtime_config.server.host.clone(),
        port: runtime_config.server.port,
        log_level: runtime_config.logging.level.clone(),
        enable_streaming: runtime_config.features.enable_streaming,
        enable_rag: runtime_config.features.enable_rag,
        default_agents: runtime_config.agents.default_agents.clone(),
    };

    match cli.command {
        Command::Serve => {
            let state = omni_server::build_state(server_config).await?;
            info!(host = %runtime_config.server.host, port = runtime_config.server.port, "starting omni-engine");
            omni_server::serve(&runtime_config.server.host, runtime_config.server.port, state).await?;
        }
        Command::Run { prompt } => {
            let state = omni_server::build_state(server_config).await?;
            let response = state
                .orchestrator
                .send_to_agent("context", AgentMessage::new(AgentMessageKind::Text, "cli", prompt))
                .await?;
            println!("{}", response.content);
        }
        Command::Chat => {
            let state = omni_server::build_state(server_config).await?;
            chat_loop(&state).await?;
        }
        Command::Demo { workspace } => {
            let state = omni_server::build_state(server_config).await?;
            info!("demo mode: all providers are in-memory, no network calls will be made");
            if let Some(workspace) = workspace {
                let result = state.workflow.analyze_workspace(&workspace, None, None).await;
                info!(issues = result.total_issues, "demo warm-up scan complete");
            }
            omni_server::serve(&runtime_config.server.host, runtime_config.server.port, state).await?;
        }
    }

    Ok(())
}

async fn chat_loop(state: &omni_server::AppState) -> anyhow::Result<()> {
    use std::io::Write;
    use tokio::io::{AsyncBufReadExt, BufReader};

    println!("omni-engine chat (context agent). Ctrl-D to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await? else { break };
        if line.trim().is_empty() {
            continue;
        }
        let response = state
            .orchestrator
            .send_to_agent("context", AgentMessage::new(AgentMessageKind::Text, "cli", line))
            .await;
        match response {
            Ok(message) => println!("{}", message.content),
            Err(err) => eprintln!("error: {}", err.message),
        }
    }
    Ok(())
}
