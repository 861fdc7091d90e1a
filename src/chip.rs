//! Chip generations and the decoder support matrix.
//!
//! The matrix is two static tables: which engines each chip generation is
//! declared to support, and which decoder is registered for each pair.
//! [`ChipDispatcher::new`] cross-checks them once at startup so that a
//! missing or doubled registration is a [`ConfigurationDefect`] before any
//! file is touched. After that, [`ChipDispatcher::resolve`] is a plain lookup.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::decode::{Decoder, EngineTag};
use crate::error::{ConfigurationDefect, DispatchError};

/// Hardware and firmware generation whose binary layouts apply.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChipGeneration {
    Gen1,
    Gen2,
    Gen3,
    Gen4,
}

impl ChipGeneration {
    pub const ALL: [ChipGeneration; 4] = [
        ChipGeneration::Gen1,
        ChipGeneration::Gen2,
        ChipGeneration::Gen3,
        ChipGeneration::Gen4,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChipGeneration::Gen1 => "gen1",
            ChipGeneration::Gen2 => "gen2",
            ChipGeneration::Gen3 => "gen3",
            ChipGeneration::Gen4 => "gen4",
        }
    }
}

impl fmt::Display for ChipGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChipGeneration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gen1" | "1" => Ok(ChipGeneration::Gen1),
            "gen2" | "2" => Ok(ChipGeneration::Gen2),
            "gen3" | "3" => Ok(ChipGeneration::Gen3),
            "gen4" | "4" => Ok(ChipGeneration::Gen4),
            other => bail!("unknown chip generation '{}'", other),
        }
    }
}

/// Engines each chip generation claims to support.
pub const DECLARED_SUPPORT: &[(ChipGeneration, &[EngineTag])] = &[
    (
        ChipGeneration::Gen1,
        &[EngineTag::TaskTrack, EngineTag::AiCpu, EngineTag::NpuMem],
    ),
    (
        ChipGeneration::Gen2,
        &[
            EngineTag::TaskTrack,
            EngineTag::AiCpu,
            EngineTag::Qos,
            EngineTag::Hccl,
            EngineTag::NpuMem,
        ],
    ),
    (
        ChipGeneration::Gen3,
        &[EngineTag::TaskTrack, EngineTag::AiCpu, EngineTag::NpuMem],
    ),
    (
        ChipGeneration::Gen4,
        &[
            EngineTag::StarsLog,
            EngineTag::AiCpu,
            EngineTag::Qos,
            EngineTag::Hccl,
            EngineTag::NpuMem,
        ],
    ),
];

/// Decoder registered for each supported pair.
pub const REGISTRATIONS: &[(ChipGeneration, EngineTag, Decoder)] = &[
    (ChipGeneration::Gen1, EngineTag::TaskTrack, Decoder::BlockLog),
    (ChipGeneration::Gen1, EngineTag::AiCpu, Decoder::AiCpuV1),
    (ChipGeneration::Gen1, EngineTag::NpuMem, Decoder::NpuMem),
    (ChipGeneration::Gen2, EngineTag::TaskTrack, Decoder::BlockLog),
    (ChipGeneration::Gen2, EngineTag::AiCpu, Decoder::AiCpuV1),
    (ChipGeneration::Gen2, EngineTag::Qos, Decoder::Qos),
    (ChipGeneration::Gen2, EngineTag::Hccl, Decoder::Hccl),
    (ChipGeneration::Gen2, EngineTag::NpuMem, Decoder::NpuMem),
    (ChipGeneration::Gen3, EngineTag::TaskTrack, Decoder::BlockLog),
    (ChipGeneration::Gen3, EngineTag::AiCpu, Decoder::AiCpuV1),
    (ChipGeneration::Gen3, EngineTag::NpuMem, Decoder::NpuMem),
    (ChipGeneration::Gen4, EngineTag::StarsLog, Decoder::StarsLogV4),
    (ChipGeneration::Gen4, EngineTag::AiCpu, Decoder::AiCpuV4),
    (ChipGeneration::Gen4, EngineTag::Qos, Decoder::Qos),
    (ChipGeneration::Gen4, EngineTag::Hccl, Decoder::Hccl),
    (ChipGeneration::Gen4, EngineTag::NpuMem, Decoder::NpuMem),
];

/// Resolves (chip, engine) pairs to decoders.
#[derive(Debug, Clone)]
pub struct ChipDispatcher {
    table: HashMap<(ChipGeneration, EngineTag), Decoder>,
}

impl ChipDispatcher {
    /// Build the dispatcher from the built-in tables.
    pub fn new() -> Result<Self, ConfigurationDefect> {
        Self::from_tables(DECLARED_SUPPORT, REGISTRATIONS)
    }

    /// Build and validate a dispatcher from explicit tables.
    ///
    /// Every declared pair must have exactly one registration, every
    /// registration must be declared, each registered decoder must handle
    /// the engine it is registered for, and every layout in use must be
    /// internally consistent.
    pub fn from_tables(
        declared: &[(ChipGeneration, &[EngineTag])],
        registrations: &[(ChipGeneration, EngineTag, Decoder)],
    ) -> Result<Self, ConfigurationDefect> {
        let mut counts: HashMap<(ChipGeneration, EngineTag), usize> = HashMap::new();
        let mut table = HashMap::new();

        for &(chip, engine, decoder) in registrations {
            if decoder.engine() != engine {
                return Err(ConfigurationDefect::EngineMismatch {
                    chip,
                    engine,
                    actual: decoder.engine(),
                });
            }
            decoder.layout().validate()?;
            *counts.entry((chip, engine)).or_default() += 1;
            table.insert((chip, engine), decoder);
        }

        for (&(chip, engine), &count) in counts.iter() {
            if count > 1 {
                return Err(ConfigurationDefect::DuplicateDecoder {
                    chip,
                    engine,
                    count,
                });
            }
            let is_declared = declared
                .iter()
                .any(|(c, engines)| *c == chip && engines.contains(&engine));
            if !is_declared {
                return Err(ConfigurationDefect::UndeclaredDecoder { chip, engine });
            }
        }

        for &(chip, engines) in declared {
            for &engine in engines {
                if !table.contains_key(&(chip, engine)) {
                    return Err(ConfigurationDefect::MissingDecoder { chip, engine });
                }
            }
        }

        Ok(Self { table })
    }

    /// Look up the decoder for a pair.
    pub fn resolve(
        &self,
        chip: ChipGeneration,
        engine: EngineTag,
    ) -> Result<Decoder, DispatchError> {
        self.table
            .get(&(chip, engine))
            .copied()
            .ok_or(DispatchError::UnsupportedCombination { chip, engine })
    }

    /// Engines with a registered decoder for `chip`, in tag order.
    pub fn supported_engines(&self, chip: ChipGeneration) -> Vec<EngineTag> {
        EngineTag::ALL
            .into_iter()
            .filter(|engine| self.table.contains_key(&(chip, *engine)))
            .collect()
    }
}
