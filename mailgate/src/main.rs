// mailgate/src/main.rs
//
// mailgate: signup-fraud risk scoring from the command line.
//
// Three operational modes:
//   score  score a single address (--email)
//   batch  score every request in a JSONL file, then print a summary
//   tail   follow a JSONL file of signup requests as the host appends to it
//
// Usage:
//   mailgate --mode score --email user123@gmail.com --artifacts ./artifacts
//   mailgate --mode batch --path signups.jsonl --config scoring.json
//   mailgate --mode tail  --path /var/log/signup/requests.jsonl --output ./out

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mailgate::collab::{
    ConfigStore, DirModelStore, FileConfigStore, LocaleMatcher, NameMatcher, StaticConfigStore,
    StaticDomainReputation, StaticMxTable,
};
use mailgate::engine::dispatcher::Dispatcher;
use mailgate::engine::{RiskEngine, ScoreOutcome};
use mailgate::events::{DecisionKind, RequestContext, SignupRequest};
use mailgate::{ArtifactCache, ArtifactSnapshot, ScoringConfig};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "mailgate",
    about   = "Real-time signup-fraud risk scoring for email addresses",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[arg(long, value_enum, default_value = "score")]
    mode: Mode,

    #[arg(long, help = "Address to score (score mode)")]
    email: Option<String>,

    #[arg(long, default_value = "/tmp/mailgate_requests.jsonl",
          help = "JSONL request file (batch/tail modes)")]
    path: PathBuf,

    #[arg(long, default_value = "./artifacts",
          help = "Directory holding forest.json, tree.json and the character models")]
    artifacts: PathBuf,

    #[arg(long, help = "Scoring config JSON (defaults built in when omitted)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Metrics output directory (JSONL); nothing is written when omitted")]
    output: Option<PathBuf>,

    #[arg(long, help = "JSON map of domain -> MX hosts used instead of live resolution")]
    mx_table: Option<PathBuf>,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    Score, // one address, printed
    Batch, // whole file, in order
    Tail,  // follow a growing file
}

// ── Host ──────────────────────────────────────────────────────────────────────

struct Host {
    engine:     Arc<RiskEngine>,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl Host {
    fn new(cli: &Cli) -> Result<Self> {
        let config: Arc<dyn ConfigStore> = match &cli.config {
            Some(p) => Arc::new(FileConfigStore::new(p)),
            None    => Arc::new(StaticConfigStore(ScoringConfig::default())),
        };
        let initial = config.load().unwrap_or_else(|e| {
            warn!("config unusable, starting from defaults: {}", e);
            ScoringConfig::default()
        });
        // Starting TTL only; each accepted reload applies its own artifactTtlSecs.
        let ttl = Duration::from_secs(initial.artifact_ttl_secs);

        let cache  = Arc::new(ArtifactCache::new(
            ArtifactSnapshot::new(initial, Default::default(), None), ttl));
        let models = Arc::new(DirModelStore::new(&cli.artifacts));

        let mut engine = RiskEngine::new(cache, models, config)
            .with_domain_reputation(Arc::new(StaticDomainReputation::default()))
            .with_identity(Arc::new(NameMatcher))
            .with_geo(Arc::new(LocaleMatcher));

        if let Some(p) = &cli.mx_table {
            let raw = std::fs::read(p)?;
            let table: std::collections::HashMap<String, Vec<String>> = serde_json::from_slice(&raw)?;
            engine = engine.with_mx_lookup(Arc::new(StaticMxTable::new(table)));
        }
        engine.refresh();

        let dispatcher = match &cli.output {
            Some(dir) => Some(Arc::new(Dispatcher::new(dir.clone())?)),
            None      => None,
        };

        Ok(Self { engine: Arc::new(engine), dispatcher })
    }

    async fn process(&self, req: SignupRequest) -> ScoreOutcome {
        let outcome = self.engine.evaluate(&req).await;
        if let Some(d) = &self.dispatcher {
            if let Err(e) = d.dispatch(&outcome.metrics).await {
                error!("Dispatch failed: {}", e);
            }
        }
        print_decision(&req, &outcome);
        outcome
    }
}

// ── Terminal output ───────────────────────────────────────────────────────────

fn print_banner() {
    println!("\x1b[1m");
    println!("  ┌┬┐┌─┐┬┬  ┌─┐┌─┐┌┬┐┌─┐");
    println!("  │││├─┤││  │ ┬├─┤ │ ├┤ ");
    println!("  ┴ ┴┴ ┴┴┴─┘└─┘┴ ┴ ┴ └─┘");
    println!("\x1b[0m");
    println!("  \x1b[90mSignup-fraud risk scoring | n-gram OOD + tree ensembles\x1b[0m\n");
}

fn print_decision(req: &SignupRequest, outcome: &ScoreOutcome) {
    let d = &outcome.decision;
    let color = match d.decision {
        DecisionKind::Block => "\x1b[91;1m",
        DecisionKind::Warn  => "\x1b[93;1m",
        DecisionKind::Allow => "\x1b[92m",
    };
    let reset = "\x1b[0m";
    let label = req.label.as_deref().map(|l| format!(" \x1b[90m[{}]{}", l, reset)).unwrap_or_default();
    let overridden = if d.is_overridden() {
        format!(" (computed {})", d.original_decision)
    } else {
        String::new()
    };

    println!("\n{}{}{}{} {}", color, d.decision.to_string().to_uppercase(), overridden, reset, req.email);
    println!("  Score   : {}{:.4}{}{}", color, d.score, reset, label);
    println!("  Reason  : {}", d.reason);
    println!("  Source  : {}", d.source);
    if !d.applied_heuristics.is_empty() {
        let rules = d.applied_heuristics.iter().map(|h| h.reason.as_str()).collect::<Vec<_>>().join(" | ");
        println!("  Rules   : {}", rules);
    }
    if let Some(a) = &d.assignment {
        println!("  Variant : {} {} (bucket {})", a.experiment_id, a.variant, a.bucket);
    }
}

fn print_summary(counts: &BTreeMap<DecisionKind, usize>, total: usize) {
    let n = |k| counts.get(&k).copied().unwrap_or(0);
    println!(
        "\n\x1b[1m── summary  total={}  allow={}  warn={}  block={} ──\x1b[0m",
        total, n(DecisionKind::Allow), n(DecisionKind::Warn), n(DecisionKind::Block)
    );
}

// ── Request sources ───────────────────────────────────────────────────────────

fn parse_request(line: &str) -> Option<SignupRequest> {
    let line = line.trim();
    if line.is_empty() { return None; }
    match serde_json::from_str::<SignupRequest>(line) {
        Ok(req) => Some(req),
        Err(e)  => { warn!("Parse error: {}", e); None }
    }
}

async fn tail_jsonl(path: PathBuf, tx: mpsc::Sender<SignupRequest>) -> Result<()> {
    let file   = tokio::fs::File::open(&path).await?;
    let mut lines = BufReader::new(file).lines();

    while lines.next_line().await?.is_some() {}  // consume existing

    info!("Tailing {}", path.display());
    loop {
        match lines.next_line().await? {
            Some(line) => {
                if let Some(req) = parse_request(&line) {
                    if tx.send(req).await.is_err() { break; }
                }
            }
            None => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    Ok(())
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("mailgate=info".parse()?))
        .compact().init();

    let cli  = Cli::parse();
    let host = Arc::new(Host::new(&cli)?);

    match cli.mode {
        Mode::Score => {
            let Some(email) = cli.email.clone() else {
                bail!("--email is required in score mode");
            };
            let req = SignupRequest { email, context: RequestContext::default(), label: None };
            let outcome = host.process(req).await;
            println!("\n{}", serde_json::to_string_pretty(&outcome.decision)?);
        }

        Mode::Batch => {
            print_banner();
            println!("  Mode: \x1b[93mBATCH\x1b[0m  |  {}\n", cli.path.display());
            let content = tokio::fs::read_to_string(&cli.path).await?;
            let mut counts = BTreeMap::new();
            let mut total  = 0usize;
            for req in content.lines().filter_map(parse_request) {
                let outcome = host.process(req).await;
                *counts.entry(outcome.decision.decision).or_insert(0) += 1;
                total += 1;
            }
            print_summary(&counts, total);
        }

        Mode::Tail => {
            print_banner();
            println!("  Mode: \x1b[96mTAIL\x1b[0m  |  {}", cli.path.display());
            if let Some(out) = &cli.output {
                println!("  Output: \x1b[90m{}\x1b[0m", out.display());
            }
            println!("  Press Ctrl+C to stop.\n");

            let (tx, mut rx) = mpsc::channel::<SignupRequest>(16384);
            let path = cli.path.clone();
            tokio::spawn(async move {
                if let Err(e) = tail_jsonl(path, tx).await {
                    error!("tail stopped: {}", e);
                }
            });

            // One task per request; the engine is shared and lock-free on the hot path.
            while let Some(req) = rx.recv().await {
                let h = Arc::clone(&host);
                tokio::spawn(async move { h.process(req).await; });
            }
        }
    }

    Ok(())
}
