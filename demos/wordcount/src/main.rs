use anyhow::{Context, Result};
use clap::Parser;
use mrkit::io::{expand_inputs, open_writer, part_file_name, read_lines, write_tsv};
use mrkit::{map_fn, reduce_fn, Engine, EngineConfig, RunStats};
use regex::Regex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Input files or directories
    #[arg(long, num_args = 1.., required = true)]
    input: Vec<PathBuf>,
    /// Output directory, one part-NNNNN.tsv per reducer
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    mappers: Option<usize>,
    #[arg(long)]
    reducers: Option<usize>,
    /// JSON engine config. Without it MRKIT_* environment variables apply.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn engine_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::from_env(),
    };
    if let Some(n) = args.mappers {
        config.num_mappers = n;
    }
    if let Some(n) = args.reducers {
        config.num_reducers = n;
    }
    Ok(config)
}

/// First failure raised inside a map or reduce callback.
#[derive(Default)]
struct FirstError(Mutex<Option<anyhow::Error>>);

impl FirstError {
    fn record(&self, context: &str, err: anyhow::Error) {
        error!(context, error = %err, "wordcount callback failed");
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err.context(context.to_string()));
        }
    }

    fn into_result(self) -> Result<()> {
        match self.0.into_inner().unwrap_or_else(PoisonError::into_inner) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn count_words(args: &Args) -> Result<RunStats> {
    let config = engine_config(args)?;
    let units = expand_inputs(&args.input)?;
    let writers = (0..config.num_partitions())
        .map(|p| open_writer(args.output.join(part_file_name(p, "tsv"))).map(Mutex::new))
        .collect::<Result<Vec<Mutex<BufWriter<File>>>>>()?;
    let word_re = Regex::new(r"[A-Za-z0-9_']+")?;
    let failures = FirstError::default();

    let mapper = map_fn(|unit, emitter| {
        let lines = match read_lines(unit) {
            Ok(lines) => lines,
            Err(err) => return failures.record(unit, err),
        };
        for line in lines {
            match line {
                Ok(line) => {
                    for m in word_re.find_iter(&line) {
                        emitter.emit(m.as_str().to_lowercase(), "1");
                    }
                }
                Err(err) => return failures.record(unit, err),
            }
        }
    });
    let reducer = reduce_fn(|key, values, partition| {
        let count = values.count();
        let word = String::from_utf8_lossy(key);
        let mut writer = writers[partition].lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = write_tsv(&mut *writer, &*word, &count) {
            failures.record(&word, err);
        }
    });

    let stats = Engine::new(config).run(&units, &mapper, &reducer)?;
    failures.into_result()?;
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
    let stats = count_words(&args).context("wordcount failed")?;
    info!(
        output = %args.output.display(),
        words = stats.map.total_emits,
        distinct = stats.reduce.total_groups,
        wall_ms = stats.wall_ms,
        "wordcount done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;

    fn read_counts(dir: &std::path::Path, partitions: usize) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for p in 0..partitions {
            for line in read_lines(dir.join(part_file_name(p, "tsv"))).unwrap() {
                let line = line.unwrap();
                let (word, count) = line.split_once('\t').unwrap();
                let word = word.trim_matches('"').to_string();
                assert!(counts.insert(word, count.parse().unwrap()).is_none(), "word in two partitions");
            }
        }
        counts
    }

    #[test]
    fn counts_words_across_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("a.txt"), "The cat sat\non the mat\n").unwrap();
        fs::write(input.join("b.txt"), "the dog\nsat on the cat's mat\n").unwrap();
        let output = dir.path().join("out");

        let args = Args {
            input: vec![input],
            output: output.clone(),
            mappers: Some(2),
            reducers: Some(3),
            config: None,
        };
        let stats = count_words(&args).unwrap();
        assert_eq!(stats.map.total_emits, 13);

        let counts = read_counts(&output, 3);
        let expected: BTreeMap<String, u64> = [
            ("cat", 1),
            ("cat's", 1),
            ("dog", 1),
            ("mat", 2),
            ("on", 2),
            ("sat", 2),
            ("the", 4),
        ]
        .into_iter()
        .map(|(w, n)| (w.to_string(), n))
        .collect();
        assert_eq!(counts, expected);
    }

    #[test]
    fn config_file_is_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{"num_mappers": 8, "num_reducers": 8}"#).unwrap();
        let args = Args {
            input: vec![],
            output: dir.path().to_path_buf(),
            mappers: None,
            reducers: Some(2),
            config: Some(path),
        };
        let config = engine_config(&args).unwrap();
        assert_eq!((config.num_mappers, config.num_reducers), (8, 2));
    }

    #[test]
    fn missing_input_fails_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args {
            input: vec![dir.path().join("absent")],
            output: dir.path().join("out"),
            mappers: Some(1),
            reducers: Some(1),
            config: None,
        };
        assert!(count_words(&args).is_err());
    }
}
