use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GenerateError;
use crate::mask::{CharClass, parse_mask};

/// Candidate generation strategy.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
	/// Independent draws from the length/mask/character distributions.
	Sampling,
	/// Best-first expansion of the token-sequence grammar.
	Grammar,
	/// Interleaved sampling and grammar expansion, deduplicated.
	Hybrid,
	/// Lexicographic enumeration of one fixed mask.
	Exhaustive,
}

impl Strategy {
	/// Registry name of the engine implementing this strategy.
	pub fn name(self) -> &'static str {
		match self {
			Self::Sampling => "sampling",
			Self::Grammar => "grammar",
			Self::Hybrid => "hybrid",
			Self::Exhaustive => "exhaustive",
		}
	}
}

impl FromStr for Strategy {
	type Err = GenerateError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"sampling" => Ok(Self::Sampling),
			"grammar" => Ok(Self::Grammar),
			"hybrid" => Ok(Self::Hybrid),
			"exhaustive" => Ok(Self::Exhaustive),
			other => Err(GenerateError::InvalidConfiguration(format!(
				"unknown strategy '{other}' (expected sampling, grammar, hybrid or exhaustive)"
			))),
		}
	}
}

/// Flat option set of one generation run.
///
/// Validated eagerly by `validate`; a run never starts on an invalid
/// configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GenerationConfig {
	/// How many candidates to emit.
	pub target_count: usize,
	/// Internal attempt quota: raw synthesis attempts (including filtered
	/// and deduplicated ones) before the run gives up. Guards against
	/// spinning forever on constraints the model cannot satisfy.
	pub max_candidates_attempted: usize,
	/// Optional wall-clock budget for the run.
	pub time_budget_ms: Option<u64>,
	pub min_length: usize,
	pub max_length: usize,
	/// Character classes every emitted candidate must contain.
	pub required_classes: BTreeSet<CharClass>,
	pub strategy: Strategy,
	/// Probability-mass cutoff in `(0, 1]`: enumerative engines halt once
	/// the cumulative mass of emitted candidates reaches this fraction.
	/// `1.0` disables the early halt.
	pub cutoff_threshold: f64,
	/// Seed for the run's RNG. A fixed seed makes the run reproducible;
	/// `None` seeds from the OS.
	pub seed: Option<u64>,
	/// Drop candidates already emitted in this run.
	pub dedupe: bool,
	/// Fixed mask for the exhaustive engine (`?l?u?d?s` or `LUDS`
	/// notation). Required by that engine, ignored by the others.
	pub mask: Option<String>,
	/// Fraction of hybrid attempts served by the sampling side.
	pub hybrid_ratio: f64,
}

impl Default for GenerationConfig {
	fn default() -> Self {
		Self {
			target_count: 100,
			max_candidates_attempted: 10_000,
			time_budget_ms: None,
			min_length: 1,
			max_length: 64,
			required_classes: BTreeSet::new(),
			strategy: Strategy::Sampling,
			cutoff_threshold: 1.0,
			seed: None,
			dedupe: false,
			mask: None,
			hybrid_ratio: 0.5,
		}
	}
}

impl GenerationConfig {
	/// Eager validation, before any generation work begins.
	///
	/// # Errors
	/// `InvalidConfiguration` naming the offending option.
	pub fn validate(&self) -> Result<(), GenerateError> {
		if self.target_count == 0 {
			return Err(GenerateError::InvalidConfiguration("target_count must be positive".into()));
		}
		if self.max_candidates_attempted < self.target_count {
			return Err(GenerateError::InvalidConfiguration(format!(
				"max_candidates_attempted ({}) must be at least target_count ({})",
				self.max_candidates_attempted, self.target_count
			)));
		}
		if self.min_length > self.max_length {
			return Err(GenerateError::InvalidConfiguration(format!(
				"min_length ({}) exceeds max_length ({})",
				self.min_length, self.max_length
			)));
		}
		if !(self.cutoff_threshold > 0.0 && self.cutoff_threshold <= 1.0) {
			return Err(GenerateError::InvalidConfiguration(format!(
				"cutoff_threshold ({}) must lie in (0, 1]",
				self.cutoff_threshold
			)));
		}
		if !(0.0..=1.0).contains(&self.hybrid_ratio) {
			return Err(GenerateError::InvalidConfiguration(format!(
				"hybrid_ratio ({}) must lie in [0, 1]",
				self.hybrid_ratio
			)));
		}
		match (&self.strategy, &self.mask) {
			(Strategy::Exhaustive, None) => {
				return Err(GenerateError::InvalidConfiguration(
					"exhaustive strategy requires a mask".into(),
				));
			}
			(_, Some(mask)) => {
				parse_mask(mask)?;
			}
			_ => {}
		}
		Ok(())
	}
}
