use std::{
    fs,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use referral_ledger::{
    Address, ErrorKind, Genesis, LedgerConfig, Operation, Query, QueryResponse, Receipt,
    ReferralLedger,
};

#[derive(Parser)]
#[command(name = "referral-ledger", version, about = "Replay transactions against a referral-reward ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a JSON-lines script of transactions and queries to a fresh ledger.
    Replay {
        /// Genesis document (JSON).
        #[arg(long)]
        genesis: PathBuf,
        /// One `{"caller": .., "op": ..}` or `{"query": ..}` object per line.
        #[arg(long)]
        script: PathBuf,
        /// Write the final snapshot here.
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Stop at the first rejected transaction.
        #[arg(long)]
        fail_fast: bool,
    },
    /// Print an example genesis document.
    Template,
}

#[derive(Deserialize)]
struct ScriptLine {
    caller: Option<Address>,
    op: Option<Operation>,
    query: Option<Query>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum LineResult {
    Ok { line: usize, receipt: Receipt },
    Error { line: usize, kind: ErrorKind, error: String },
    Query { line: usize, response: QueryResponse },
}

fn read_genesis(path: &Path) -> Result<Genesis> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let genesis: Genesis =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    Ok(genesis)
}

fn replay_cmd(genesis: &Path, script: &Path, snapshot: Option<&Path>, fail_fast: bool) -> Result<()> {
    let mut ledger = ReferralLedger::from_genesis(read_genesis(genesis)?)?;
    let file = fs::File::open(script).with_context(|| format!("open {}", script.display()))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let (mut applied, mut rejected) = (0usize, 0usize);
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("read line {line_no}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let entry: ScriptLine = serde_json::from_str(trimmed)
            .with_context(|| format!("parse line {line_no}"))?;
        let result = match (entry.caller, entry.op, entry.query) {
            (Some(caller), Some(op), None) => match ledger.apply(caller, op) {
                Ok(receipt) => {
                    applied += 1;
                    LineResult::Ok {
                        line: line_no,
                        receipt,
                    }
                }
                Err(err) => {
                    rejected += 1;
                    let result = LineResult::Error {
                        line: line_no,
                        kind: err.kind(),
                        error: err.to_string(),
                    };
                    if fail_fast {
                        writeln!(out, "{}", serde_json::to_string(&result)?)?;
                        bail!("line {line_no} rejected: {err}");
                    }
                    result
                }
            },
            (None, None, Some(query)) => LineResult::Query {
                line: line_no,
                response: ledger.query(&query),
            },
            _ => bail!("line {line_no}: expected either caller+op or query"),
        };
        writeln!(out, "{}", serde_json::to_string(&result)?)?;
    }

    if let Err(violation) = ledger.verify_invariants() {
        bail!("ledger aggregates inconsistent after replay: {violation}");
    }
    info!(
        applied,
        rejected,
        height = ledger.height(),
        state_root = %hex::encode(ledger.state_root()),
        "replay finished"
    );

    if let Some(path) = snapshot {
        let json = serde_json::to_vec_pretty(&ledger.snapshot())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), "snapshot written");
    }
    Ok(())
}

fn template_cmd() -> Result<()> {
    let admin = Address::repeat_byte(0xad);
    let mut genesis = Genesis::new(Address::repeat_byte(0xee), admin);
    genesis.config = LedgerConfig {
        min_claim_amount: 100,
        max_reward_per_user: 1_000,
        max_referrals_per_user: 5,
    };
    genesis.token_balances.insert(admin, 1_000_000);
    println!("{}", serde_json::to_string_pretty(&genesis)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Replay {
            genesis,
            script,
            snapshot,
            fail_fast,
        } => replay_cmd(&genesis, &script, snapshot.as_deref(), fail_fast),
        Command::Template => template_cmd(),
    }
}
