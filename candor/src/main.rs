// candor/src/main.rs
//
// candor — interview antifraud aggregation daemon
//
// Reads ingest commands (JSONL, one `{"op": ...}` object per line) produced by
// the interview backend and provider callbacks, applies them to the fraud
// records, and writes audit / transition / review-queue files.
//
// Two operational modes:
//   tail    — follow a live JSONL command log (production)
//   replay  — replay a captured log, paced by heartbeat timestamps (testing)
//
// Usage:
//   candor --mode tail --path /var/log/interviews/antifraud.jsonl
//   candor --mode replay --path captured.jsonl --speed 20 --config antifraud.json

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use candor::engine::dispatcher::{AuditItem, Dispatcher};
use candor::events::{FraudStatus, IngestCommand, StatusTransition};
use candor::state::snapshot::Checkpointer;
use candor::{AntifraudConfig, AntifraudService};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "candor",
    about   = "Interview antifraud signal aggregation",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "tail")]
    mode: Mode,

    #[arg(long, default_value = "/tmp/candor_commands.jsonl",
          help = "JSONL ingest command log")]
    path: PathBuf,

    #[arg(long, help = "Antifraud config (JSON); defaults apply when omitted")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "1.0", help = "Replay speed multiplier")]
    speed: f64,

    #[arg(long, default_value = "/tmp/candor_output",
          help = "Audit / transition output directory")]
    output: PathBuf,

    #[arg(long, help = "Checkpoint file; restored on start, saved periodically")]
    snapshot: Option<PathBuf>,

    #[arg(long, default_value = "300", help = "Seconds between checkpoints")]
    checkpoint_secs: u64,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    Tail,   // follow a live JSONL command log
    Replay, // replay a static JSONL file at scaled speed
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct PipelineStats {
    applied:  AtomicU64,
    rejected: AtomicU64,
}

struct Pipeline {
    service:  Arc<AntifraudService>,
    audit_tx: mpsc::Sender<AuditItem>,
    stats:    Arc<PipelineStats>,
}

impl Pipeline {
    /// Commands apply in arrival order. Audit output is queued to the single
    /// dispatcher task, which writes it in the same order.
    async fn process(&self, command: IngestCommand) {
        let verdict = match self.service.apply(&command) {
            Ok(v) => v,
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(interview_id = command.interview_id(), op = command.op(), "rejected: {}", e);
                return;
            }
        };
        self.stats.applied.fetch_add(1, Ordering::Relaxed);

        if verdict.transitioned() && verdict.status >= FraudStatus::ManualReview {
            if let Ok(report) = self.service.report(&verdict.interview_id) {
                info!(
                    interview_id = %report.interview_id,
                    status = %report.fraud_status,
                    contributors = ?report.top_contributors,
                    "escalated for review"
                );
            }
        }

        if self.audit_tx.send((command.op(), verdict)).await.is_err() {
            error!("audit dispatcher has stopped");
        }
    }
}

// ── Terminal output ───────────────────────────────────────────────────────────

fn print_transition(t: &StatusTransition) {
    let color = match t.to {
        FraudStatus::FraudDetected => "\x1b[91;1m",
        FraudStatus::ManualReview  => "\x1b[93;1m",
        FraudStatus::Suspicious    => "\x1b[96m",
        FraudStatus::Clean         => "\x1b[92m",
    };
    let reset = "\x1b[0m";
    println!("\n{}{} → {}{}", color, t.from, t.to, reset);
    println!("  Interview: {}{}{}", color, t.interview_id, reset);
    println!("  Score    : {}{:.4}{}", color, t.overall_fraud_score, reset);
    println!("  Trigger  : {}", t.trigger);
}

async fn stats_loop(service: Arc<AntifraudService>, stats: Arc<PipelineStats>, start: Instant) {
    loop {
        tokio::time::sleep(Duration::from_secs(30)).await;
        let store = service.store();
        info!(
            uptime_s = start.elapsed().as_secs(),
            records  = store.n_records(),
            applied  = stats.applied.load(Ordering::Relaxed),
            rejected = stats.rejected.load(Ordering::Relaxed),
            updates  = store.total_updates.load(Ordering::Relaxed),
            invalid  = store.total_rejected.load(Ordering::Relaxed),
            "stats"
        );
    }
}

// ── Command sources ───────────────────────────────────────────────────────────

fn parse_line(line: &str) -> Option<IngestCommand> {
    let line = line.trim();
    if line.is_empty() { return None; }
    match serde_json::from_str::<IngestCommand>(line) {
        Ok(cmd) => Some(cmd),
        Err(e) => { warn!("Parse error: {}", e); None }
    }
}

async fn tail_jsonl(path: PathBuf, tx: mpsc::Sender<IngestCommand>) -> Result<()> {
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    info!("Tailing {}", path.display());
    loop {
        match lines.next_line().await? {
            Some(line) => {
                if let Some(cmd) = parse_line(&line) {
                    if tx.send(cmd).await.is_err() { break; }
                }
            }
            None => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    Ok(())
}

fn replay_delay(prev: DateTime<Utc>, next: DateTime<Utc>, speed: f64) -> Duration {
    let gap_ms = (next - prev).num_milliseconds().max(0) as f64;
    Duration::from_secs_f64((gap_ms / speed / 1000.0).min(5.0))
}

/// Replays commands in file order. Gaps between consecutive heartbeat
/// timestamps are reproduced, divided by `speed` and capped at 5s.
async fn replay_jsonl(path: PathBuf, tx: mpsc::Sender<IngestCommand>, speed: f64) -> Result<()> {
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let speed = if speed > 0.0 { speed } else { 1.0 };
    let mut last_ts: Option<DateTime<Utc>> = None;

    for cmd in content.lines().filter_map(parse_line) {
        if let IngestCommand::Heartbeat { heartbeat, .. } = &cmd {
            if let Some(prev) = last_ts {
                tokio::time::sleep(replay_delay(prev, heartbeat.timestamp, speed)).await;
            }
            last_ts = Some(heartbeat.timestamp);
        }
        if tx.send(cmd).await.is_err() { break; }
    }
    info!("Replay of {} complete", path.display());
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("candor=info".parse()?))
        .compact().init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AntifraudConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AntifraudConfig::default(),
    };
    info!(
        weight_sum = config.weights.sum(),
        review     = config.thresholds.review,
        reject     = config.thresholds.reject,
        escalation = ?config.escalation,
        "antifraud config loaded"
    );

    let service = Arc::new(AntifraudService::new(config));

    let checkpointer = cli.snapshot.as_ref().map(|p| {
        Arc::new(Checkpointer::new(p, Duration::from_secs(cli.checkpoint_secs.max(1)), Arc::clone(&service)))
    });
    if let Some(cp) = &checkpointer {
        cp.restore()
            .await
            .with_context(|| format!("restoring checkpoint {}", cp.path().display()))?;
        tokio::spawn(Arc::clone(cp).checkpoint_loop());
    }

    let dispatcher = Dispatcher::new(cli.output.clone())?;
    let (audit_tx, audit_rx) = mpsc::channel::<AuditItem>(16384);
    let dispatch_task = tokio::spawn(dispatcher.run(audit_rx, print_transition));

    let stats = Arc::new(PipelineStats::default());
    tokio::spawn(stats_loop(Arc::clone(&service), Arc::clone(&stats), Instant::now()));
    let pipeline = Pipeline { service, audit_tx, stats };

    let (tx, mut rx) = mpsc::channel::<IngestCommand>(16384);
    let path = cli.path.clone();
    match cli.mode {
        Mode::Tail => {
            info!(path = %path.display(), output = %cli.output.display(), "mode: tail");
            tokio::spawn(async move {
                if let Err(e) = tail_jsonl(path, tx).await { error!("tail stopped: {:#}", e); }
            });
        }
        Mode::Replay => {
            info!(path = %path.display(), speed = cli.speed, "mode: replay");
            let speed = cli.speed;
            tokio::spawn(async move {
                if let Err(e) = replay_jsonl(path, tx, speed).await { error!("replay stopped: {:#}", e); }
            });
        }
    }

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(cmd) => pipeline.process(cmd).await,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    // Closing the audit channel lets the dispatcher finish what is queued.
    drop(pipeline);
    let written = dispatch_task.await.context("audit dispatcher")?;
    info!(written, "audit log flushed");

    if let Some(cp) = &checkpointer {
        let n = cp.save_checkpoint().await.context("final checkpoint")?;
        info!(records = n, path = %cp.path().display(), "final checkpoint written");
    }
    Ok(())
}
