//! Command-line front-end for the deduplicating uploader.
//!
//! Synchronous control surface over the background upload loop: starts
//! runs, cancels on Ctrl-C, prints one log line per outcome and a
//! summary at the end. All config and ledger I/O goes through the
//! bridge so it is serialized with the run's own writes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use teledrop_bridge::AsyncBridge;
use teledrop_engine::{BatchScheduler, RunConfig, UploadEvent, UploadPolicy};
use teledrop_ledger::FingerprintLedger;
use teledrop_transport::{BotClient, DocumentSink};

/// Grace period for the background loop to drain on exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "teledrop",
    about = "Upload a directory tree as bot-delivered documents, skipping content already sent",
    version
)]
struct Opts {
    /// Path of the configuration record.
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload every file under a directory, skipping known content.
    Upload {
        /// Directory to upload; defaults to the saved selection.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Destination chat or user id; defaults to the saved value.
        #[arg(long)]
        chat: Option<String>,

        /// Concurrent transfers (1-10); defaults to the saved value.
        #[arg(long)]
        concurrency: Option<u32>,
    },
    /// Forget every recorded fingerprint.
    Reset,
    /// Save credentials and defaults into the configuration record.
    SetConfig {
        /// Bot token.
        #[arg(long)]
        token: Option<String>,

        /// Destination chat or user id.
        #[arg(long)]
        chat: Option<String>,

        /// Default directory to upload.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Default concurrent transfers (1-10).
        #[arg(long)]
        concurrency: Option<u32>,
    },
    /// Print the saved configuration, token redacted.
    ShowConfig,
}

fn init_tracing(verbose: u8, quiet: u8) {
    let level = match verbose.saturating_sub(quiet) {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    init_tracing(opts.verbose, opts.quiet);

    let bridge = AsyncBridge::start().context("starting background loop")?;
    let ledger = Arc::new(FingerprintLedger::new(&opts.config));

    let result = match opts.command {
        Command::Upload {
            dir,
            chat,
            concurrency,
        } => run_upload(&bridge, ledger, dir, chat, concurrency),
        Command::Reset => run_reset(&bridge, ledger),
        Command::SetConfig {
            token,
            chat,
            dir,
            concurrency,
        } => run_set_config(&bridge, ledger, token, chat, dir, concurrency),
        Command::ShowConfig => run_show_config(&bridge, ledger),
    };

    bridge.shutdown(SHUTDOWN_TIMEOUT);
    result
}

fn run_upload(
    bridge: &AsyncBridge,
    ledger: Arc<FingerprintLedger>,
    dir: Option<PathBuf>,
    chat: Option<String>,
    concurrency: Option<u32>,
) -> anyhow::Result<()> {
    // Fold the flags into the record and persist the choices, the same
    // way the saved directory and thread count always follow the last
    // run. Serialized through the loop with everything else.
    let record = {
        let ledger = Arc::clone(&ledger);
        bridge.run(async move {
            ledger
                .update(move |config| {
                    if let Some(dir) = dir {
                        config.selected_directory = dir.to_string_lossy().into_owned();
                    }
                    if let Some(chat) = chat {
                        config.user_id = chat;
                    }
                    if let Some(n) = concurrency {
                        config.thread_count = n;
                    }
                })
                .await
        })?
    }
    .context("updating configuration record")?;

    if record.token.is_empty() {
        anyhow::bail!("no bot token configured; run `teledrop set-config --token <TOKEN>` first");
    }
    if record.user_id.is_empty() {
        anyhow::bail!("no destination configured; pass --chat or run `teledrop set-config --chat <ID>`");
    }
    if record.selected_directory.is_empty() {
        anyhow::bail!("no directory selected; pass --dir or run `teledrop set-config --dir <PATH>`");
    }

    let sink: Arc<dyn DocumentSink> =
        Arc::new(BotClient::new(&record.token).context("building API client")?);

    let mut scheduler = BatchScheduler::with_cancel_token(bridge.cancel_token().child_token());
    let mut events = scheduler
        .take_events()
        .context("scheduler events already taken")?;
    let cancel = scheduler.cancel_token();

    // First Ctrl-C cancels cooperatively; the watcher also exits on
    // shutdown so the loop can drain.
    {
        let cancel = cancel.clone();
        bridge.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        tracing::info!("cancellation requested");
                        cancel.cancel();
                    }
                }
            }
        });
    }

    let run_config = RunConfig {
        root: PathBuf::from(&record.selected_directory),
        destination: record.user_id.clone(),
        concurrency: record.thread_count as usize,
        policy: UploadPolicy::default(),
    };

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    bridge.spawn(async move {
        let result = scheduler.run(sink, ledger, run_config).await;
        let _ = done_tx.send(result);
    });

    // Drain events on this thread until the terminal signal.
    while let Some(event) = events.blocking_recv() {
        match event {
            UploadEvent::Log(line) => println!("{line}"),
            UploadEvent::Progress { percent } => tracing::info!(percent, "progress"),
            UploadEvent::Completed => break,
        }
    }

    let summary = done_rx
        .recv()
        .context("upload loop dropped its result")?
        .context("upload run failed")?;
    println!(
        "done: {} uploaded, {} skipped, {} failed ({} files total)",
        summary.uploaded, summary.skipped, summary.failed, summary.total
    );
    Ok(())
}

fn run_reset(bridge: &AsyncBridge, ledger: Arc<FingerprintLedger>) -> anyhow::Result<()> {
    bridge
        .run(async move { ledger.reset().await })?
        .context("clearing fingerprint history")?;
    println!("fingerprint history cleared");
    Ok(())
}

fn run_set_config(
    bridge: &AsyncBridge,
    ledger: Arc<FingerprintLedger>,
    token: Option<String>,
    chat: Option<String>,
    dir: Option<PathBuf>,
    concurrency: Option<u32>,
) -> anyhow::Result<()> {
    bridge
        .run(async move {
            ledger
                .update(move |config| {
                    if let Some(token) = token {
                        config.token = token;
                    }
                    if let Some(chat) = chat {
                        config.user_id = chat;
                    }
                    if let Some(dir) = dir {
                        config.selected_directory = dir.to_string_lossy().into_owned();
                    }
                    if let Some(n) = concurrency {
                        config.thread_count = n;
                    }
                })
                .await
        })?
        .context("saving configuration record")?;
    println!("configuration saved");
    Ok(())
}

fn run_show_config(bridge: &AsyncBridge, ledger: Arc<FingerprintLedger>) -> anyhow::Result<()> {
    let record = bridge
        .run(async move { ledger.load().await })?
        .context("loading configuration record")?;

    println!("token: {}", redact(&record.token));
    println!("chat: {}", record.user_id);
    println!("directory: {}", record.selected_directory);
    println!("concurrency: {}", record.thread_count);
    println!("fingerprints recorded: {}", record.hash_string.len());
    Ok(())
}

/// Keeps only the last four characters visible.
fn redact(token: &str) -> String {
    if token.is_empty() {
        return "(not set)".into();
    }
    let visible: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{visible}")
}
