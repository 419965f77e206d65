use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use coordination::{ContextGatherer, DebateService, FileSessionStore, NodeContext, WorkflowExecutor};
use roundtable::app::{App, Flow};
use roundtable::cli::{self, Cli};
use roundtable::config::RoundtableConfig;
use roundtable::provider::{self, OpenAiCompatProvider};
use roundtable::telemetry;
use roundtable::workspace::LocalWorkspace;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // a missing .env is normal
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: could not load .env: {e}");
        }
    }
    telemetry::init();

    let mut config = RoundtableConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let api_key = config
        .provider
        .api_key()
        .map(str::to_string)
        .context("no API key: set ROUNDTABLE_API_KEY (or GOOGLE_API_KEY) in the environment or .env")?;

    if args.check {
        let reachable = provider::check_endpoint(&config.provider.base_url, &api_key).await;
        if !reachable {
            anyhow::bail!("provider endpoint {} is not reachable", config.provider.base_url);
        }
        println!("provider endpoint {} is reachable", config.provider.base_url);
        return Ok(());
    }

    info!(
        model = %config.provider.model,
        base_url = %config.provider.base_url,
        max_rounds = config.debate.max_rounds,
        session = %config.session,
        "roundtable starting"
    );

    let store = Arc::new(
        FileSessionStore::open(config.store_dir.clone())
            .await
            .with_context(|| format!("Failed to open session store {}", config.store_dir.display()))?,
    );
    if args.break_lock && store.break_lock(&config.session).await? {
        warn!(session = %config.session, "removed stale session lock");
    }

    let workspace = Arc::new(match &config.workspace {
        Some(path) => LocalWorkspace::from_file(path).await?,
        None => LocalWorkspace::demo(Utc::now()),
    });

    let completion = Arc::new(
        OpenAiCompatProvider::new(&config.provider, api_key)
            .context("Failed to build HTTP client")?,
    );
    let (retry_tx, retry_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let ctx = NodeContext::new(
        completion,
        config.retry_policy().with_sink(Arc::new(retry_tx)),
        config.debate.max_rounds,
    )
    .with_temperatures(config.debate.temperatures);
    let gatherer = ContextGatherer::new(Some(workspace.clone()), Some(workspace.clone()));
    let executor = WorkflowExecutor::new(ctx, gatherer)
        .with_events(event_tx)
        .with_question_timeout(config.debate.question_timeout());
    let service =
        DebateService::new(store, executor).with_history_policy(config.debate.history_policy());

    let mut app = App::new(
        service,
        workspace,
        config.session.clone(),
        event_rx,
        retry_rx,
        std::io::stdout(),
    );
    app.greet().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nYou: ");
        std::io::Write::flush(&mut std::io::stdout())?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        // EOF or Ctrl-C at the prompt
        let Some(line) = line else {
            println!();
            break;
        };

        let command = match cli::parse_line(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        let cancel = CancellationToken::new();
        let handled = app.handle(command, cancel.clone());
        tokio::pin!(handled);
        let flow = loop {
            tokio::select! {
                flow = &mut handled => break flow?,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("stopping after the current call...");
                    cancel.cancel();
                }
            }
        };
        if flow == Flow::Exit {
            break;
        }
    }

    println!("Goodbye.");
    info!(session = %app.session(), "roundtable exiting");
    Ok(())
}
