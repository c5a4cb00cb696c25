//! File helpers for map functions and job drivers. The engine itself never
//! touches the filesystem: input units are opaque strings resolved by the
//! caller's map function.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(path.as_ref()).with_context(|| format!("create_dir_all {}", path.as_ref().display()))
}

pub fn list_files_recursive(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path.as_ref()) {
        let entry = entry.with_context(|| format!("walk {}", path.as_ref().display()))?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

/// Turns a mix of files and directories into input units: directories are
/// expanded recursively and sorted, files are kept in the order given.
pub fn expand_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<String>> {
    let mut units = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            let mut files = list_files_recursive(path)?;
            files.sort();
            units.extend(files.into_iter().map(|p| p.display().to_string()));
        } else if path.is_file() {
            units.push(path.display().to_string());
        } else {
            anyhow::bail!("input {} does not exist", path.display());
        }
    }
    Ok(units)
}

pub fn read_lines(path: impl AsRef<Path>) -> Result<impl Iterator<Item = Result<String>>> {
    let file = File::open(path.as_ref()).with_context(|| format!("open {}", path.as_ref().display()))?;
    let reader = BufReader::new(file);
    Ok(reader.lines().map(|l| l.map_err(anyhow::Error::from)))
}

pub fn write_tsv<K, V>(writer: &mut impl Write, key: &K, value: &V) -> Result<()>
where
    K: Serialize + ?Sized,
    V: Serialize + ?Sized,
{
    let key_str = serde_json::to_string(key)?;
    let value_str = serde_json::to_string(value)?;
    writeln!(writer, "{}\t{}", key_str, value_str)?;
    Ok(())
}

pub fn open_writer(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    if let Some(parent) = path.as_ref().parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(path.as_ref()).with_context(|| format!("create {}", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

/// Output file name for a partition, `part-00003.tsv` style.
pub fn part_file_name(partition: usize, extension: &str) -> String {
    format!("part-{:05}.{}", partition, extension)
}
