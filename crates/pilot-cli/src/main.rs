use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, CommandFactory, Parser};
use console::style;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pilot::agent::{Agent, FollowUp};
use pilot::config::McpConfig;
use pilot::mcp::{Connector, CredentialPrompt, Credentials, LaunchSpec};
use pilot::providers::bedrock::BedrockProvider;
use pilot::providers::configs::BedrockProviderConfig;

mod prompt;
mod session;

use prompt::credentials::TerminalCredentials;
use prompt::rustyline::RustylinePrompt;
use session::{Session, TranscriptScope};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("target").required(true).args(["local", "remote"])))]
struct Cli {
    /// Launch a local tool server script (.py or .js)
    #[arg(long, value_name = "SCRIPT_PATH")]
    local: Option<String>,

    /// Connect to a server entry from the MCP config file
    #[arg(long, value_name = "NAME")]
    remote: Option<String>,

    /// Config file to read instead of the default locations
    #[arg(long, value_name = "PATH", requires = "remote", conflicts_with = "local")]
    config: Option<String>,

    /// Username for a remote url entry (prompted for when missing)
    #[arg(long, requires = "remote", conflicts_with = "local")]
    username: Option<String>,

    /// Password for a remote url entry (prompted for when missing)
    #[arg(long, requires = "remote", conflicts_with = "local")]
    password: Option<String>,

    /// Carry the conversation over from one query to the next
    #[arg(long)]
    keep_history: bool,

    /// Run every tool a response asks for before going back to the model
    #[arg(long)]
    batch_tools: bool,
}

impl Cli {
    fn follow_up(&self) -> FollowUp {
        if self.batch_tools {
            FollowUp::Batched
        } else {
            FollowUp::PerTool
        }
    }

    fn transcript_scope(&self) -> TranscriptScope {
        if self.keep_history {
            TranscriptScope::Session
        } else {
            TranscriptScope::PerQuery
        }
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Turn the command line into the process to launch
fn launch_spec(cli: &Cli, prompt: &dyn CredentialPrompt) -> Result<LaunchSpec> {
    if let Some(script) = &cli.local {
        return Ok(LaunchSpec::for_script(&expand_path(script))?);
    }

    let name = cli
        .remote
        .as_deref()
        .context("either --local or --remote is required")?;
    let config_path = cli.config.as_deref().map(expand_path);
    let config = McpConfig::load(config_path.as_deref())?;
    let entry = config.server(name)?;
    let credentials = Credentials {
        username: cli.username.clone(),
        password: cli.password.clone(),
    };
    Ok(LaunchSpec::for_entry(name, entry, &credentials, prompt)?)
}

async fn run(cli: &Cli, connector: &mut Connector) -> Result<()> {
    let spec = launch_spec(cli, &TerminalCredentials)?;
    connector.connect(&spec).await?;

    let provider = BedrockProvider::new(BedrockProviderConfig::from_env())?;
    let agent = Agent::new(Box::new(provider)).with_follow_up(cli.follow_up());
    let prompt = RustylinePrompt::new()?;

    let mut session = Session::new(agent, Box::new(prompt), &*connector, cli.transcript_scope());
    session.start().await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args_os().len() <= 1 {
        Cli::command().print_help()?;
        return Ok(());
    }
    let cli = Cli::parse();

    init_tracing();

    let mut connector = Connector::new();
    if let Err(e) = run(&cli, &mut connector).await {
        error!("{:#}", e);
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
    }
    connector.close().await;

    Ok(())
}
