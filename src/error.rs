//! Error taxonomy for the ingestion pipeline.
//!
//! Record- and file-local problems ([`DecodeError`]) fail a single task,
//! dispatch problems ([`DispatchError`]) skip a task, storage problems
//! ([`StorageError`]) fail a task after retries, and a broken support matrix
//! ([`ConfigurationDefect`]) aborts the run before any file is read.

use std::path::PathBuf;

use thiserror::Error;

use crate::chip::ChipGeneration;
use crate::decode::EngineTag;

/// A record could not be decoded from its raw bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{layout}: expected {expected} bytes, got {actual}")]
    WrongLength {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{layout}: record declares {declared} bytes but the layout is {expected} bytes")]
    DeclaredLengthMismatch {
        layout: &'static str,
        declared: usize,
        expected: usize,
    },
}

/// A [`DecodeError`] pinned to the file and byte offset it happened at.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: offset {offset}: {source}", .path.display())]
pub struct FileDecodeError {
    pub path: PathBuf,
    pub offset: usize,
    #[source]
    pub source: DecodeError,
}

/// No decoder is registered for the requested combination.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no decoder registered for {engine} on {chip}")]
    UnsupportedCombination {
        chip: ChipGeneration,
        engine: EngineTag,
    },
}

/// The static decoder tables are inconsistent. Fatal for the whole run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationDefect {
    #[error("{engine} on {chip} is declared supported but has no decoder")]
    MissingDecoder {
        chip: ChipGeneration,
        engine: EngineTag,
    },

    #[error("{engine} on {chip} has {count} decoders registered")]
    DuplicateDecoder {
        chip: ChipGeneration,
        engine: EngineTag,
        count: usize,
    },

    #[error("{engine} on {chip} has a decoder but is not declared supported")]
    UndeclaredDecoder {
        chip: ChipGeneration,
        engine: EngineTag,
    },

    #[error("decoder for {engine} on {chip} handles {actual} records")]
    EngineMismatch {
        chip: ChipGeneration,
        engine: EngineTag,
        actual: EngineTag,
    },

    #[error("layout {layout}: {reason}")]
    BadLayout { layout: &'static str, reason: String },

    #[error("cycle frequency must be positive and finite, got {0}")]
    BadFrequency(f64),
}

/// A batch could not be committed to the run store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("table {table}: commit failed after {attempts} attempts: {source}")]
    CommitFailed {
        table: &'static str,
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("table {table}: {source}")]
    Sqlite {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create store directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open store {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("record of table {actual} handed to table {expected}")]
    TableMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Why a single task did not succeed.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Decode(#[from] FileDecodeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker panicked: {0}")]
    Panicked(String),
}
