use anyhow::{bail, Context, Result};
use clap::Parser;
use mrkit::io::{expand_inputs, open_writer, part_file_name, read_lines};
use mrkit::{map_fn, reduce_fn, Emitter, Engine, EngineConfig, RunStats};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
struct Args {
    /// Search entries, JSONL files or directories
    #[arg(long, num_args = 1.., required = true)]
    searches: Vec<PathBuf>,
    /// Pages, JSONL files or directories
    #[arg(long, num_args = 1.., required = true)]
    pages: Vec<PathBuf>,
    /// Output directory, one part-NNNNN.jsonl per reducer
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    mappers: Option<usize>,
    #[arg(long)]
    reducers: Option<usize>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct SearchEntry {
    query: String,
    page_uuid: Uuid,
    position: u8,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct Page {
    page_uuid: Uuid,
    body: String,
}

/// Value emitted under a page id. Both sides share one key space, so the
/// reducer sees them interleaved in no particular order.
#[derive(Serialize, Deserialize, Clone, Debug)]
enum JoinVal {
    Search { query: String, position: u8 },
    PageBody(String),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct Joined {
    query: String,
    page_uuid: Uuid,
    position: u8,
    body: String,
}

const SEARCH_PREFIX: &str = "search:";
const PAGE_PREFIX: &str = "page:";

fn tagged_units(args: &Args) -> Result<Vec<String>> {
    let mut units: Vec<String> = expand_inputs(&args.searches)?
        .into_iter()
        .map(|p| format!("{SEARCH_PREFIX}{p}"))
        .collect();
    units.extend(expand_inputs(&args.pages)?.into_iter().map(|p| format!("{PAGE_PREFIX}{p}")));
    Ok(units)
}

fn map_unit(unit: &str, emitter: &Emitter<'_>) -> Result<()> {
    let (is_search, path) = if let Some(path) = unit.strip_prefix(SEARCH_PREFIX) {
        (true, path)
    } else if let Some(path) = unit.strip_prefix(PAGE_PREFIX) {
        (false, path)
    } else {
        bail!("unit {unit:?} has no input tag");
    };
    for line in read_lines(path)? {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (page_uuid, value) = if is_search {
            let s: SearchEntry = serde_json::from_str(&line).with_context(|| format!("search entry in {path}"))?;
            (s.page_uuid, JoinVal::Search { query: s.query, position: s.position })
        } else {
            let p: Page = serde_json::from_str(&line).with_context(|| format!("page in {path}"))?;
            (p.page_uuid, JoinVal::PageBody(p.body))
        };
        emitter.emit(page_uuid.as_bytes(), serde_json::to_vec(&value)?);
    }
    Ok(())
}

fn join_group(key: &[u8], values: impl Iterator<Item = Vec<u8>>) -> Result<Vec<Joined>> {
    let page_uuid = Uuid::from_slice(key)?;
    let mut body: Option<String> = None;
    let mut searches = Vec::new();
    for raw in values {
        match serde_json::from_slice::<JoinVal>(&raw)? {
            JoinVal::PageBody(b) => {
                if body.is_some() {
                    warn!(%page_uuid, "duplicate page body, keeping the last one");
                }
                body = Some(b);
            }
            JoinVal::Search { query, position } => searches.push((query, position)),
        }
    }
    let Some(body) = body else {
        return Ok(Vec::new());
    };
    Ok(searches
        .into_iter()
        .map(|(query, position)| Joined { query, page_uuid, position, body: body.clone() })
        .collect())
}

fn join(args: &Args) -> Result<RunStats> {
    let mut config = EngineConfig::from_env();
    if let Some(n) = args.mappers {
        config.num_mappers = n;
    }
    if let Some(n) = args.reducers {
        config.num_reducers = n;
    }
    let units = tagged_units(args)?;
    let writers = (0..config.num_partitions())
        .map(|p| open_writer(args.output.join(part_file_name(p, "jsonl"))).map(Mutex::new))
        .collect::<Result<Vec<Mutex<BufWriter<File>>>>>()?;
    let failure: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    let record = |err: anyhow::Error| {
        error!(error = %err, "join callback failed");
        failure.lock().unwrap_or_else(PoisonError::into_inner).get_or_insert(err);
    };

    let mapper = map_fn(|unit, emitter| {
        if let Err(err) = map_unit(unit, emitter) {
            record(err);
        }
    });
    let reducer = reduce_fn(|key, values, partition| {
        let written = join_group(key, values.map(<[u8]>::to_vec)).and_then(|rows| {
            let mut writer = writers[partition].lock().unwrap_or_else(PoisonError::into_inner);
            for row in rows {
                serde_json::to_writer(&mut *writer, &row)?;
                writer.write_all(b"\n")?;
            }
            Ok(())
        });
        if let Err(err) = written {
            record(err);
        }
    });

    let stats = Engine::new(config).run(&units, &mapper, &reducer)?;
    if let Some(err) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(err);
    }
    for writer in writers {
        writer.into_inner().unwrap_or_else(PoisonError::into_inner).flush()?;
    }
    Ok(stats)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let stats = join(&args).context("join failed")?;
    info!(
        output = %args.output.display(),
        records = stats.map.total_emits,
        pages = stats.reduce.total_groups,
        wall_ms = stats.wall_ms,
        "join done"
    );
    Ok(())
}
