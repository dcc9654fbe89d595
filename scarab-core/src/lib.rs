//! Password-corpus analysis and constrained candidate generation.
//!
//! This crate implements the SCARAB/EntropySmith pipeline:
//! - Deterministic tokenization of passwords into typed segments
//! - Structural analysis of a corpus into an immutable, versioned
//!   `ModelBundle` (length/charset/mask distributions, per-kind token
//!   statistics, a token-kind transition matrix, an optional
//!   token-sequence grammar)
//! - Constrained candidate generation over a bundle through four
//!   engines (sampling, grammar expansion, hybrid, exhaustive mask
//!   enumeration), bounded by count, attempts, wall clock, and a
//!   probability-mass cutoff
//!
//! Analysis and generation are decoupled by the bundle contract: any
//! generator consuming a bundle of a supported schema version can be
//! substituted. The corpus itself never survives analysis; only
//! aggregate statistics do.

/// Structural analysis: corpus → `ModelBundle`.
pub mod analyze;

/// The `ModelBundle` data contract: distributions, serialization,
/// schema versioning and migrations.
pub mod bundle;

/// Corpus container and newline-delimited UTF-8 decoding.
pub mod corpus;

/// Error taxonomy for analysis, bundle I/O and generation.
pub mod error;

/// Candidate generation engines, policy filtering and budgets.
pub mod generate;

/// Token-sequence grammar (flat PCFG) inference structures.
pub mod grammar;

/// Character classes, positional masks and mask-notation parsing.
pub mod mask;

/// Password tokenizer/classifier.
pub mod token;

pub use analyze::{AnalyzerConfig, analyze};
pub use bundle::{Distribution, ModelBundle, SCHEMA_VERSION, TokenStats, TransitionNode};
pub use corpus::Corpus;
pub use error::{AnalyzeError, BundleError, GenerateError};
pub use generate::{
	Candidate, CandidateStream, GenerationConfig, GenerationOutcome, StreamStatus, Strategy, generate,
};
pub use token::{Token, TokenKind, tokenize};
