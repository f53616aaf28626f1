use std::{
    collections::HashSet,
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use gbx_rs::{
    Body, Chunk, DiagnosticKind, Gbx, Node, NodeIndex, NodeRef, Record, Registry, Value,
};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing_subscriber::EnvFilter;

mod config;
mod error;

use config::Config;
use error::Mismatch;

#[derive(Parser)]
#[command(name = "gbx_tool", about = "Batch reader and writer for Gbx files")]
struct Cli {
    /// TOML file with [read], [write] and [jobs] tables.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the class, chunks and diagnostics of each file.
    Inspect { paths: Vec<PathBuf> },
    /// Write each file back out, read the result and compare.
    Roundtrip { paths: Vec<PathBuf> },
    /// Discover every skippable chunk and report leftovers.
    Discover { paths: Vec<PathBuf> },
}

#[derive(Debug, Clone, Copy, strum::Display)]
#[strum(serialize_all = "lowercase")]
enum Mode {
    Inspect,
    Roundtrip,
    Discover,
}

impl Command {
    fn split(self) -> (Mode, Vec<PathBuf>) {
        match self {
            Command::Inspect { paths } => (Mode::Inspect, paths),
            Command::Roundtrip { paths } => (Mode::Roundtrip, paths),
            Command::Discover { paths } => (Mode::Discover, paths),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::load(cli.config.as_deref())?);
    let (mode, paths) = cli.command.split();
    let files = collect_files(&paths, &config.jobs.extension)?;
    tracing::info!("{} {} files, {} at a time", mode, files.len(), config.jobs.max_concurrent);

    let semaphore = Arc::new(Semaphore::new(config.jobs.max_concurrent));
    let mut tasks = JoinSet::new();
    let total = files.len();
    for path in files {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .context("Waiting for a free job")?;
        let config = Arc::clone(&config);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let result = process(mode, &path, &config);
            (path, result)
        });
    }

    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        let (path, result) = joined.context("Joining job")?;
        match result {
            Ok(summary) => tracing::info!("{}: {}", path.display(), summary),
            Err(err) => {
                failed += 1;
                tracing::error!("{}: {:#}", path.display(), err);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} files failed", failed, total);
    }
    Ok(())
}

/// Files named directly are always taken, directories are walked for
/// files with `extension`.
fn collect_files(paths: &[PathBuf], extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut queue: Vec<PathBuf> = paths.iter().rev().cloned().collect();
    while let Some(next) = queue.pop() {
        let metadata = std::fs::metadata(&next)
            .with_context(|| format!("Reading metadata of {}", next.display()))?;
        if !metadata.is_dir() {
            files.push(next);
            continue;
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&next)
            .with_context(|| format!("Reading directory {}", next.display()))?
        {
            let path = entry.context("Reading directory entry")?.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if path.is_dir() || matches {
                entries.push(path);
            }
        }
        entries.sort();
        queue.extend(entries.into_iter().rev());
    }
    Ok(files)
}

fn process(mode: Mode, path: &Path, config: &Config) -> anyhow::Result<String> {
    let data = std::fs::read(path).context("Reading file")?;
    let size = data.len();
    let mut gbx = Gbx::read_with(data, config.read_settings()).context("Parsing file")?;

    match mode {
        Mode::Inspect => {
            println!("{}", describe(path, &gbx));
            Ok(format!(
                "{} nodes, {} diagnostics",
                gbx.body.len(),
                gbx.diagnostics().count()
            ))
        }

        Mode::Discover => {
            let discovered = gbx.body.discover_all();
            let leftovers = gbx
                .diagnostics()
                .filter(|d| matches!(d.kind, DiagnosticKind::NotFullyParsed { .. }))
                .count();
            let failed = gbx
                .diagnostics()
                .filter(|d| matches!(d.kind, DiagnosticKind::ChunkFailed { .. }))
                .count();
            for diagnostic in gbx.diagnostics() {
                tracing::debug!("{}: {}", path.display(), diagnostic);
            }
            Ok(format!(
                "discovered {} chunks, {} with leftovers, {} failed",
                discovered, leftovers, failed
            ))
        }

        Mode::Roundtrip => {
            let written = gbx
                .write_with(config.write_settings()?)
                .context("Writing file")?;
            let written_size = written.len();
            let again = Gbx::read_with(written, config.read_settings())
                .context("Parsing written file")?;
            compare(&gbx, &again)?;
            Ok(format!("round trip ok, {} bytes -> {} bytes", size, written_size))
        }
    }
}

fn describe(path: &Path, gbx: &Gbx) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}: {} ({}), version {}",
        path.display(),
        gbx.header.class_name().unwrap_or("unknown class"),
        gbx.header.class_id,
        gbx.header.version
    );
    for chunk in &gbx.header.chunks {
        let state = if chunk.is_discovered() { "parsed" } else { "raw" };
        let _ = writeln!(out, "  header {} {} bytes, {}", chunk.id, chunk.data().len(), state);
    }
    for (index, node) in gbx.body.nodes() {
        let _ = writeln!(
            out,
            "  node {} {}",
            index,
            node.class_name().unwrap_or("unknown class")
        );
        for chunk in node.chunks() {
            let state = match chunk {
                Chunk::Regular(chunk) if chunk.is_truncated() => "truncated",
                Chunk::Regular(_) => "regular",
                Chunk::Skippable(chunk) if !chunk.is_known() => "unknown",
                Chunk::Skippable(chunk) if chunk.record().is_some() => "discovered",
                Chunk::Skippable(_) => "skippable",
            };
            let _ = writeln!(out, "    {} {}", chunk.id(), state);
        }
    }
    for diagnostic in gbx.diagnostics() {
        let _ = writeln!(out, "  {}", diagnostic);
    }
    out
}

/// Nodes reachable from the main node, in the order their references are
/// met.
fn walk(body: &Body) -> Vec<NodeIndex> {
    let mut order = vec![NodeIndex::MAIN];
    let mut seen = HashSet::from([NodeIndex::MAIN]);
    let mut next = 0;
    while let Some(&index) = order.get(next) {
        next += 1;
        let Some(node) = body.node(index) else {
            continue;
        };
        for record in node.chunks().iter().filter_map(Chunk::record) {
            node_refs(record, &mut |found| {
                if seen.insert(found) {
                    order.push(found);
                }
            });
        }
    }
    order
}

fn node_refs(record: &Record, found: &mut impl FnMut(NodeIndex)) {
    for (_, value) in record.iter() {
        match value {
            Value::NodeRef(NodeRef::Internal(index)) => found(*index),
            Value::Array(elements) => {
                for element in elements {
                    node_refs(element, found);
                }
            }
            _ => {}
        }
    }
}

/// Any two internal references are equal here. Where they point is checked
/// by [`walk`].
fn same_fields(a: &Record, b: &Record) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((name_a, a), (name_b, b))| name_a == name_b && same_value(a, b))
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::NodeRef(NodeRef::Internal(_)), Value::NodeRef(NodeRef::Internal(_))) => true,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| same_fields(a, b))
        }
        _ => a == b,
    }
}

fn compare(before: &Gbx, after: &Gbx) -> Result<(), Mismatch> {
    for (a, b) in before.header.chunks.iter().zip(&after.header.chunks) {
        if a.record() != b.record() || (a.record().is_none() && a.data() != b.data()) {
            return Err(Mismatch::HeaderFields { chunk_id: a.id });
        }
    }

    let nodes_before = walk(&before.body);
    let nodes_after = walk(&after.body);
    if nodes_before.len() != nodes_after.len() {
        return Err(Mismatch::NodeCount {
            before: nodes_before.len(),
            after: nodes_after.len(),
        });
    }

    for (&index, &index_after) in nodes_before.iter().zip(&nodes_after) {
        if let (Some(a), Some(b)) = (before.body.node(index), after.body.node(index_after)) {
            compare_nodes(index, a, b)?;
        }
    }
    Ok(())
}

fn compare_nodes(node: NodeIndex, a: &Node, b: &Node) -> Result<(), Mismatch> {
    if a.chunks().len() != b.chunks().len() {
        return Err(Mismatch::ChunkCount {
            node,
            before: a.chunks().len(),
            after: b.chunks().len(),
        });
    }

    let remap = Registry::get().remap_table();
    for (position, (chunk_a, chunk_b)) in a.chunks().iter().zip(b.chunks()).enumerate() {
        let (id_a, id_b) = (
            remap.remap_chunk(chunk_a.id()),
            remap.remap_chunk(chunk_b.id()),
        );
        if id_a != id_b {
            return Err(Mismatch::ChunkOrder {
                node,
                position,
                before: id_a,
                after: id_b,
            });
        }

        let same = match (chunk_a, chunk_b) {
            (Chunk::Skippable(a), Chunk::Skippable(b)) if a.record().is_none() => {
                b.record().is_none() && a.data() == b.data()
            }
            _ => match (chunk_a.record(), chunk_b.record()) {
                (Some(a), Some(b)) => same_fields(a, b),
                _ => false,
            },
        };
        if !same {
            return Err(Mismatch::Fields {
                node,
                chunk_id: id_a,
            });
        }
    }
    Ok(())
}
