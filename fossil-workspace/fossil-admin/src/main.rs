use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fossil_core::{
    CanonicalCategory, CreateOutcome, FossilPatch, FossilStore, FossilType, NewFossil, QueryFilter,
};

#[derive(Parser)]
#[command(
    name = "fossil-admin",
    about = "Read and write a fossil store from scripts"
)]
struct Cli {
    /// Fossil root directory
    #[arg(long, env = "FOSSIL_ROOT", default_value = ".fossils", global = true)]
    root: PathBuf,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create the directory layout and a default fossil.toml
    Init,
    /// Create an entry, deduplicated against existing ones
    Create {
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        title: String,
        /// Entry content; read from stdin when omitted
        #[arg(long)]
        content: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        created_by: Option<String>,
        /// Dedup threshold (0-100); defaults to the configured value
        #[arg(long, conflicts_with = "no_dedup")]
        threshold: Option<f64>,
        /// Skip the similarity check
        #[arg(long)]
        no_dedup: bool,
    },
    /// Print one entry
    Get { id: String },
    /// Patch an entry; title/content changes bump its version
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// Replaces the tag set when given at least once
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Delete an entry permanently
    Delete { id: String },
    /// Filter and page through entries
    Query {
        #[arg(long = "type")]
        kind: Option<FossilType>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_parser = parse_ts)]
        from: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_ts)]
        to: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        oldest_first: bool,
    },
    /// Rank existing entries against a title and content
    Similar {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Counts by type and tag
    Stats,
    /// Archive and replace a canonical category from a JSON file (or stdin)
    CanonicalUpdate {
        category: CanonicalCategory,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print the live payload of a canonical category
    CanonicalGet { category: CanonicalCategory },
    /// List archived copies of a canonical category, oldest first
    Archives { category: CanonicalCategory },
    /// Make an archived copy live again
    Restore {
        category: CanonicalCategory,
        archive: PathBuf,
    },
    /// Regenerate the aggregate context snapshot
    Snapshot,
    /// Record fossil-path changes from git
    Trace,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let store = FossilStore::open_at(&cli.root)
        .with_context(|| format!("open fossil store at {}", cli.root.display()))?;
    tracing::debug!(
        root = %store.root().display(),
        created = store.init_report().created.len(),
        "fossil store opened"
    );

    match cli.cmd {
        Cmd::Init => {
            let report = store.init_report();
            print_json(&json!({
                "root": report.root,
                "created": report.created,
                "existed": report.existed,
            }))
        }
        Cmd::Create {
            kind,
            title,
            content,
            tags,
            source,
            created_by,
            threshold,
            no_dedup,
        } => {
            let content = match content {
                Some(c) => c,
                None => read_stdin()?,
            };
            let mut candidate = NewFossil::new(kind, title, content).with_tags(tags);
            candidate.source = source;
            candidate.created_by = created_by;
            let threshold = if no_dedup {
                None
            } else {
                Some(threshold.unwrap_or(store.config().dedup.threshold))
            };
            let outcome = store.create(&candidate, threshold).context("create entry")?;
            match outcome {
                CreateOutcome::Created(entry) => print_json(&json!({ "created": entry })),
                CreateOutcome::Deduplicated { existing, score } => {
                    print_json(&json!({ "deduplicated": existing, "score": score }))
                }
            }
        }
        Cmd::Get { id } => match store.get(&id)? {
            Some(entry) => print_json(&entry),
            None => anyhow::bail!("entry {id} not found"),
        },
        Cmd::Update {
            id,
            title,
            content,
            tags,
        } => {
            let patch = FossilPatch {
                title,
                content,
                tags: (!tags.is_empty()).then_some(tags),
                metadata: None,
            };
            let entry = store
                .update(&id, &patch)
                .with_context(|| format!("update entry {id}"))?;
            print_json(&entry)
        }
        Cmd::Delete { id } => {
            store.delete(&id).with_context(|| format!("delete entry {id}"))?;
            print_json(&json!({ "deleted": id }))
        }
        Cmd::Query {
            kind,
            tags,
            search,
            from,
            to,
            limit,
            offset,
            oldest_first,
        } => {
            let mut filter = QueryFilter {
                kind,
                tags,
                search,
                ..Default::default()
            }
            .page(limit, offset);
            if from.is_some() || to.is_some() {
                filter = filter.created_between(from, to);
            }
            if oldest_first {
                filter = filter.oldest_first();
            }
            print_json(&store.query(&filter)?)
        }
        Cmd::Similar {
            title,
            content,
            threshold,
        } => {
            let hits: Vec<Value> = store
                .find_similar(&title, &content, threshold)?
                .into_iter()
                .map(|m| json!({ "score": m.score, "entry": m.entry }))
                .collect();
            print_json(&hits)
        }
        Cmd::Stats => print_json(&store.stats()?),
        Cmd::CanonicalUpdate { category, file } => {
            let text = match &file {
                Some(path) => read_file(path)?,
                None => read_stdin()?,
            };
            let payload: Value = serde_json::from_str(&text).context("payload is not valid JSON")?;
            tracing::debug!(%category, bytes = text.len(), "canonical payload read");
            let write = store
                .update_category(category, payload)
                .with_context(|| format!("update canonical {category}"))?;
            print_json(&write)
        }
        Cmd::CanonicalGet { category } => match store.get_category(category)? {
            Some(doc) => print_json(&doc),
            None => anyhow::bail!("no live {category} file"),
        },
        Cmd::Archives { category } => print_json(&store.list_archives(category)?),
        Cmd::Restore { category, archive } => {
            let write = store
                .restore(category, &archive)
                .with_context(|| format!("restore {category} from {}", archive.display()))?;
            print_json(&write)
        }
        Cmd::Snapshot => print_json(&store.generate_aggregate_snapshot()?),
        Cmd::Trace => match store.record_traceability().context("record traceability")? {
            Some(report) => print_json(&json!({ "record": report.record, "write": report.write })),
            None => {
                tracing::info!("no fossil changes; nothing recorded");
                print_json(&json!({ "recorded": false, "reason": "no fossil changes" }))
            }
        },
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("read stdin")?;
    Ok(buf)
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}
