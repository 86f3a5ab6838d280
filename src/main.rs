//! Command-line entry point.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skiff::agent::runner::{Policy, RunError, Runner};
use skiff::agent::{build_system_prompt, new_correlation_id, EnvelopeDispatcher};
use skiff::config;
use skiff::error::{Result, SkiffError};
use skiff::provider::OpenAiCompatibleProvider;
use skiff::session::{default_session_id, JsonFileStore, SessionStore};
use skiff::tools::default_registry;
use skiff::types::Message;

#[derive(Debug, Parser)]
#[command(name = "skiff", version, about = "A tool-calling agent for the terminal")]
struct Cli {
    /// Prompt to run. Required unless --interactive is set.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Persist history under this session id. Pass without a value to use a
    /// timestamp-derived id.
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    session: Option<String>,

    /// Read prompts from stdin until :exit or :quit.
    #[arg(long)]
    interactive: bool,

    /// Overall timeout per prompt, in seconds.
    #[arg(long, default_value_t = 300)]
    turn_timeout: u64,

    /// Timeout per tool invocation, in seconds.
    #[arg(long, default_value_t = 30)]
    tool_timeout: u64,

    /// Maximum completion turns per prompt. Zero disables the limit.
    #[arg(long, default_value_t = 40)]
    max_turns: u32,

    /// Maximum tool calls per prompt. Zero disables the limit.
    #[arg(long, default_value_t = 0)]
    max_tool_calls: u32,

    /// Log filter, e.g. "info" or "skiff=debug".
    #[arg(long, default_value = "info", env = "SKIFF_LOG")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    config::load_env_files_if_present()?;

    if cli.prompt.is_none() && !cli.interactive {
        return Err(SkiffError::Configuration(
            "either --prompt or --interactive is required".into(),
        ));
    }

    let llm = config::resolve_llm_config()?;
    let registry = Arc::new(default_registry(
        config::resolve_command_policy()?,
        config::resolve_network_policy(),
        config::resolve_web_search_config(),
    ));

    let workdir = std::env::current_dir()?
        .to_str()
        .ok_or_else(|| SkiffError::Configuration("working directory is not valid UTF-8".into()))?
        .to_string();
    let dispatcher = Arc::new(EnvelopeDispatcher::new(
        registry.clone(),
        workdir.clone(),
        workdir,
        Duration::from_secs(cli.tool_timeout),
    ));

    let provider = Arc::new(OpenAiCompatibleProvider::new(
        llm.model.clone(),
        llm.api_key,
        llm.base_url,
    ));
    let runner = Runner::new(
        provider,
        llm.model,
        registry.definitions(),
        dispatcher,
        Policy {
            max_turns: cli.max_turns,
            max_tool_calls: cli.max_tool_calls,
        },
    );

    let session_id = match &cli.session {
        None => String::new(),
        Some(id) if id.trim().is_empty() => default_session_id(chrono::Local::now()),
        Some(id) => id.trim().to_string(),
    };
    let store = JsonFileStore::default();

    let mut history = store.load(&session_id)?;
    if history.is_empty() {
        history.push(Message::system(build_system_prompt(chrono::Local::now())));
    }
    if !session_id.is_empty() {
        info!(%session_id, restored = history.len(), "session active");
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            signal_cancel.cancel();
        }
    });

    let turn_timeout = Duration::from_secs(cli.turn_timeout);

    if let Some(prompt) = &cli.prompt {
        run_one(&runner, &cancel, &mut history, prompt, turn_timeout).await?;
        store.save(&session_id, &history)?;
    }

    if cli.interactive {
        interactive_loop(
            &runner,
            &cancel,
            &mut history,
            turn_timeout,
            &store,
            &session_id,
        )
        .await?;
    }

    Ok(())
}

async fn run_one(
    runner: &Runner,
    cancel: &CancellationToken,
    history: &mut Vec<Message>,
    prompt: &str,
    turn_timeout: Duration,
) -> Result<()> {
    let correlation_id = new_correlation_id();
    let outcome = tokio::time::timeout(
        turn_timeout,
        runner.run_prompt(cancel, history, prompt, &correlation_id),
    )
    .await;

    match outcome {
        Ok(Ok(answer)) => {
            println!("{answer}");
            Ok(())
        }
        Ok(Err(RunError { partial, source })) => {
            if !partial.is_empty() {
                println!("{partial}");
            }
            Err(source)
        }
        Err(_) => Err(SkiffError::Timeout(turn_timeout)),
    }
}

async fn interactive_loop(
    runner: &Runner,
    cancel: &CancellationToken,
    history: &mut Vec<Message>,
    turn_timeout: Duration,
    store: &JsonFileStore,
    session_id: &str,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":exit" || line == ":quit" {
            return Ok(());
        }

        // One failed prompt should not end the whole session.
        if let Err(err) = run_one(runner, cancel, history, line, turn_timeout).await {
            if err.is_cancellation() {
                return Ok(());
            }
            eprintln!("error: {err}");
        }
        store.save(session_id, history)?;
    }
}
