//! Splitting raw trace files into records.
//!
//! [`parse`] walks one file's bytes front to back in record-sized steps,
//! decodes each slice, and stamps the decoded record with wall-clock times.
//! Leftover bytes that do not form a whole record are reported as a trailing
//! fragment. [`FileSet`] groups the files of a run directory by engine and
//! orders each group the way the agent wrote it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use log::debug;
use regex::Regex;
use thiserror::Error;

use crate::decode::{Decoder, EngineTag, TimedRecord};
use crate::error::DecodeError;
use crate::timebase::{DataQualityWarning, TimeBaseReconciler};

/// Pattern: `<prefix>.data.<device>.slice_<n>`
static SLICE_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z_]+)\.data\.(\d+)\.slice_(\d+)$").expect("Invalid slice file regex pattern")
});

/// Result of parsing one file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub records: Vec<TimedRecord>,
    pub trailing_fragment: usize,
    pub warnings: Vec<DataQualityWarning>,
}

/// Parse failure with the offset of the record that could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("offset {offset}: {error}")]
pub struct ParseFailure {
    pub offset: usize,
    #[source]
    pub error: DecodeError,
    /// Records decoded before the failing offset.
    pub decoded: usize,
}

/// Decode every whole record in `bytes`, in file order, tagging each with
/// the `device` the file belongs to.
///
/// The scan is sequential on purpose: a record is only meaningful once the
/// records before it have been read.
pub fn parse(
    bytes: &[u8],
    device: u32,
    decoder: Decoder,
    reconciler: &TimeBaseReconciler,
) -> Result<ParsedFile, ParseFailure> {
    let record_size = decoder.record_size();
    let chunks = bytes.chunks_exact(record_size);
    let trailing_fragment = chunks.remainder().len();

    let mut parsed = ParsedFile {
        records: Vec::with_capacity(bytes.len() / record_size),
        trailing_fragment,
        warnings: Vec::new(),
    };

    for (index, raw) in chunks.enumerate() {
        let record = decoder.decode(raw).map_err(|error| ParseFailure {
            offset: index * record_size,
            error,
            decoded: parsed.records.len(),
        })?;
        let timed = stamp(record, device, reconciler, &mut parsed.warnings);
        parsed.records.push(timed);
    }

    if trailing_fragment > 0 {
        debug!(
            "{}: {} trailing bytes after {} records",
            decoder,
            trailing_fragment,
            parsed.records.len()
        );
    }

    Ok(parsed)
}

/// Attach wall-clock times to a record, collecting any bound violations.
pub fn stamp(
    record: crate::decode::Record,
    device: u32,
    reconciler: &TimeBaseReconciler,
    warnings: &mut Vec<DataQualityWarning>,
) -> TimedRecord {
    let mut convert = |cycle: u64| {
        let (ns, warning) = reconciler.reconcile(cycle);
        warnings.extend(warning);
        ns
    };
    let start_ns = record.start_cycle().map(&mut convert);
    let end_ns = record.end_cycle().map(&mut convert);
    TimedRecord {
        record,
        device,
        start_ns,
        end_ns,
    }
}

/// One file belonging to an engine stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceFile {
    pub path: PathBuf,
    pub device: u32,
    pub slice: u32,
}

/// The files of one engine, in the order their records were written.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileSet {
    pub files: Vec<SliceFile>,
}

impl FileSet {
    /// Group the slice files in `dir` by engine.
    ///
    /// Names that do not follow the slice naming convention, or whose prefix
    /// is not a known engine, are skipped. Each group is ordered by device
    /// then by slice index, numerically.
    pub fn discover(dir: &Path) -> Result<BTreeMap<EngineTag, FileSet>> {
        let mut sets: BTreeMap<EngineTag, FileSet> = BTreeMap::new();

        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read trace directory {}", dir.display()))?;
        for entry in entries {
            let entry = entry.context("Failed to read directory entry")?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some((tag, device, slice)) = parse_slice_name(name) else {
                debug!("skipping {}", name);
                continue;
            };
            sets.entry(tag).or_default().files.push(SliceFile {
                path: entry.path(),
                device,
                slice,
            });
        }

        for set in sets.values_mut() {
            set.sort();
        }
        Ok(sets)
    }

    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut set = FileSet {
            files: paths
                .into_iter()
                .enumerate()
                .map(|(index, path)| {
                    let parsed = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .and_then(parse_slice_name);
                    let (device, slice) = match parsed {
                        Some((_, device, slice)) => (device, slice),
                        None => (0, index as u32),
                    };
                    SliceFile {
                        path,
                        device,
                        slice,
                    }
                })
                .collect(),
        };
        set.sort();
        set
    }

    fn sort(&mut self) {
        self.files.sort_by_key(|f| (f.device, f.slice));
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn parse_slice_name(name: &str) -> Option<(EngineTag, u32, u32)> {
    let caps = SLICE_FILE_RE.captures(name)?;
    let tag = EngineTag::from_file_prefix(&caps[1])?;
    let device = caps[2].parse().ok()?;
    let slice = caps[3].parse().ok()?;
    Some((tag, device, slice))
}
