//! Runs one bot-agent host process through a judge protocol session.
//!
//! Run with: cargo run -p bot-runner -- --config bot-runner.toml
//!
//! or pass the host command directly:
//! cargo run -p bot-runner -- --command "python3 host.py" -- --seed 7

mod command;
mod config;

use std::{path::PathBuf, process::Stdio, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use judge_session::{
    AgentDescriptor, Handshake, LineWriter, Outbound, RawJson, SessionController, SessionHandler,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{command::CommandBuilder, config::RunnerConfig};

#[derive(Debug, Parser)]
#[command(name = "bot-runner", about = "Run a bot-agent host under a judge session", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host command line; overrides `[agent].command`.
    #[arg(long)]
    command: Option<String>,

    /// Extra arguments for the host command.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

/// Logs every value from the host and acknowledges it with a `Log` envelope.
struct EventLogger {
    outbound: Outbound<LineWriter>,
    agents: Vec<AgentDescriptor>,
    events: u64,
}

#[async_trait]
impl SessionHandler for EventLogger {
    async fn on_handshake(&mut self, handshake: Handshake) -> anyhow::Result<()> {
        for agent in &handshake.agents {
            tracing::info!(
                id = agent.id,
                version = agent.version,
                nickname = %agent.nickname,
                "Agent connected"
            );
        }
        self.agents = handshake.agents;
        self.outbound
            .emit_log(format!("judge ready for {} agents", self.agents.len()))
            .await?;
        Ok(())
    }

    async fn on_event(&mut self, event: RawJson) -> anyhow::Result<()> {
        self.events += 1;
        tracing::info!(seq = self.events, event = event.get(), "Agent event");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };

    let base = cli
        .command
        .or(config.agent.command)
        .context("no host command given (use --command or [agent].command)")?;
    let (program, args) = CommandBuilder::new(base)
        .extend_params(config.agent.params)
        .extend_params(cli.args)
        .build()?
        .into_resolved()
        .await?;

    tracing::info!(program = %program.display(), ?args, "Spawning bot-agent host");
    let mut child = tokio::process::Command::new(&program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {}", program.display()))?;
    let stdin = child.stdin.take().context("child stdin not captured")?;
    let stdout = child.stdout.take().context("child stdout not captured")?;

    let outbound = Outbound::new(LineWriter::new(stdin));
    let controller = Arc::new(SessionController::new(config.session));

    {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, stopping session");
                controller.stop();
            }
        });
    }

    let mut handler = EventLogger {
        outbound: outbound.clone(),
        agents: Vec::new(),
        events: 0,
    };
    let outcome = controller.start(stdout, &mut handler, &outbound).await?;
    tracing::info!(?outcome, events = handler.events, "Session finished");

    if let Err(e) = outbound.emit_finish().await {
        tracing::warn!("Failed to send finish: {e}");
    }
    drop(handler);
    drop(outbound);

    let status = child.wait().await?;
    tracing::info!(%status, "Bot-agent host exited");
    Ok(())
}
