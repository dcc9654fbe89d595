//! EntropySmith: constrained candidate generation over a `ModelBundle`.
//!
//! Four engines share one contract: a synthesizer produces raw attempts,
//! and `CandidateStream` drives it through the policy filter and the
//! budget, deadline and probability-mass accounting. Streams are lazy,
//! finite, and reproducible for a fixed seed.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::bundle::ModelBundle;
use crate::error::GenerateError;

pub mod config;
pub mod filter;
pub mod registry;

mod exhaustive;
mod expansion;
mod hybrid;
mod sampling;

pub use config::{GenerationConfig, Strategy};
pub use filter::PolicyFilter;
pub use registry::{AnalyzerEngine, AnalyzerRegistry, Engine, EngineRegistry};

/// A generated candidate: the string, its estimated probability under the
/// model, and the strategy that produced it. Ephemeral; persistence is an
/// exporter concern.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
	pub text: String,
	pub score: f64,
	pub origin: Strategy,
}

/// One raw candidate per call; `None` means the engine's space is
/// exhausted. Implementations must not loop internally: the stream owns
/// all budget accounting, and every call is one attempt.
pub trait Synthesizer {
	fn synthesize(&mut self, rng: &mut ChaCha8Rng) -> Option<Candidate>;

	/// Whether the probability-mass cutoff applies to this engine's
	/// output (true for the enumerative engines, whose scores partition
	/// the modeled space).
	fn tracks_mass(&self) -> bool {
		false
	}
}

/// Terminal state of a candidate stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamStatus {
	/// Still producing.
	Active,
	/// Target count reached.
	Completed,
	/// Cumulative emitted probability mass reached the cutoff threshold.
	CutoffReached,
	/// The engine's candidate space ran out before the target.
	SpaceExhausted,
	/// The wall-clock budget ran out before the target.
	TimeBudgetExceeded,
	/// The attempt quota ran out before the target: the constraints are
	/// too narrow for the model. Reported, never silently truncated.
	BudgetExhaustedWithoutTarget,
}

impl fmt::Display for StreamStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			Self::Active => "active",
			Self::Completed => "completed",
			Self::CutoffReached => "probability-mass cutoff reached",
			Self::SpaceExhausted => "candidate space exhausted",
			Self::TimeBudgetExceeded => "time budget exceeded",
			Self::BudgetExhaustedWithoutTarget => "attempt budget exhausted without reaching target",
		};
		f.write_str(text)
	}
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct GenerationOutcome {
	pub candidates: Vec<Candidate>,
	pub status: StreamStatus,
	pub attempted: usize,
	pub emitted_mass: f64,
}

/// Lazy, bounded stream of policy-filtered candidates.
///
/// Per step, in order: target check, mass-cutoff check, deadline check,
/// attempt-quota check, then one synthesis attempt. Rejected and
/// deduplicated candidates consume attempt quota but not emit quota, so a
/// narrow constraint over a sparse model terminates with
/// `BudgetExhaustedWithoutTarget` instead of spinning forever.
///
/// Cancellation is cooperative: every bound is re-checked at each
/// candidate-production step, and the iterator is fused once a terminal
/// status is set.
pub struct CandidateStream {
	synth: Box<dyn Synthesizer>,
	rng: ChaCha8Rng,
	filter: PolicyFilter,
	target: usize,
	max_attempted: usize,
	cutoff: f64,
	track_mass: bool,
	deadline: Option<Instant>,
	dedupe: bool,
	seen: HashSet<String>,
	emitted: usize,
	attempted: usize,
	emitted_mass: f64,
	status: StreamStatus,
}

impl CandidateStream {
	fn new(synth: Box<dyn Synthesizer>, config: &GenerationConfig) -> Self {
		let rng = match config.seed {
			Some(seed) => ChaCha8Rng::seed_from_u64(seed),
			None => ChaCha8Rng::from_os_rng(),
		};
		// Hybrid output always deduplicates across its two sides.
		let dedupe = config.dedupe || config.strategy == Strategy::Hybrid;
		let track_mass = synth.tracks_mass() && config.cutoff_threshold < 1.0;

		Self {
			synth,
			rng,
			filter: PolicyFilter::from_config(config),
			target: config.target_count,
			max_attempted: config.max_candidates_attempted,
			cutoff: config.cutoff_threshold,
			track_mass,
			deadline: config.time_budget_ms.map(|ms| Instant::now() + Duration::from_millis(ms)),
			dedupe,
			seen: HashSet::new(),
			emitted: 0,
			attempted: 0,
			emitted_mass: 0.0,
			status: StreamStatus::Active,
		}
	}

	/// Terminal status; `Active` while candidates may still come.
	pub fn status(&self) -> StreamStatus {
		self.status
	}

	pub fn emitted(&self) -> usize {
		self.emitted
	}

	/// Raw synthesis attempts so far, including filtered ones.
	pub fn attempted(&self) -> usize {
		self.attempted
	}

	/// Cumulative score mass of emitted candidates.
	pub fn emitted_mass(&self) -> f64 {
		self.emitted_mass
	}

	/// Runs the stream to its end and collects the outcome.
	pub fn drain(mut self) -> GenerationOutcome {
		let mut candidates = Vec::new();
		while let Some(candidate) = self.next() {
			candidates.push(candidate);
		}
		GenerationOutcome {
			candidates,
			status: self.status,
			attempted: self.attempted,
			emitted_mass: self.emitted_mass,
		}
	}
}

impl Iterator for CandidateStream {
	type Item = Candidate;

	fn next(&mut self) -> Option<Candidate> {
		if self.status != StreamStatus::Active {
			return None;
		}

		loop {
			if self.emitted >= self.target {
				self.status = StreamStatus::Completed;
				return None;
			}
			if self.track_mass && self.emitted_mass >= self.cutoff {
				self.status = StreamStatus::CutoffReached;
				return None;
			}
			if let Some(deadline) = self.deadline {
				if Instant::now() >= deadline {
					self.status = StreamStatus::TimeBudgetExceeded;
					return None;
				}
			}
			if self.attempted >= self.max_attempted {
				self.status = StreamStatus::BudgetExhaustedWithoutTarget;
				return None;
			}

			self.attempted += 1;
			let Some(candidate) = self.synth.synthesize(&mut self.rng) else {
				self.status = StreamStatus::SpaceExhausted;
				return None;
			};

			if !self.filter.accepts(&candidate.text) {
				continue;
			}
			if self.dedupe && !self.seen.insert(candidate.text.clone()) {
				continue;
			}

			self.emitted += 1;
			self.emitted_mass += candidate.score;
			return Some(candidate);
		}
	}
}

/// Opens a candidate stream over a bundle.
///
/// Validates the configuration eagerly, resolves the strategy through the
/// built-in engine registry, and seeds the run's RNG (fixed seed →
/// reproducible stream; no seed → OS entropy). The bundle is only read;
/// any number of streams may run concurrently over the same `Arc`.
///
/// # Errors
/// `InvalidConfiguration` before any work begins; `GrammarUnavailable`
/// when the grammar or hybrid engine is requested on a grammarless
/// bundle; `UnknownEngine` for unregistered strategy names.
pub fn generate(bundle: &Arc<ModelBundle>, config: &GenerationConfig) -> Result<CandidateStream, GenerateError> {
	config.validate()?;
	let registry = EngineRegistry::builtin();
	let engine = registry.get(config.strategy.name())?;
	let synth = engine.build(bundle, config)?;
	Ok(CandidateStream::new(synth, config))
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;

	use super::*;
	use crate::analyze::{AnalyzerConfig, analyze};
	use crate::corpus::Corpus;
	use crate::mask::CharClass;

	fn bundle_from(entries: &[&str]) -> Arc<ModelBundle> {
		let corpus = Corpus::from_entries(entries.iter().map(|s| s.to_string()).collect());
		Arc::new(analyze(&corpus, &AnalyzerConfig::default()).unwrap())
	}

	fn small_bundle() -> Arc<ModelBundle> {
		bundle_from(&["password123", "admin2024", "qwerty!", "letmein99", "Sunshine1"])
	}

	#[test]
	fn exhaustive_four_digit_mask_is_exact() {
		let config = GenerationConfig {
			strategy: Strategy::Exhaustive,
			mask: Some("?d?d?d?d".into()),
			target_count: 10_000,
			max_candidates_attempted: 20_000,
			..GenerationConfig::default()
		};
		let outcome = generate(&small_bundle(), &config).unwrap().drain();

		assert_eq!(outcome.status, StreamStatus::Completed);
		assert_eq!(outcome.candidates.len(), 10_000);
		for (i, candidate) in outcome.candidates.iter().enumerate() {
			assert_eq!(candidate.text, format!("{i:04}"));
		}
		let unique: BTreeSet<&str> = outcome.candidates.iter().map(|c| c.text.as_str()).collect();
		assert_eq!(unique.len(), 10_000);
	}

	#[test]
	fn exhaustive_truncates_at_target() {
		let config = GenerationConfig {
			strategy: Strategy::Exhaustive,
			mask: Some("?d?d?d?d".into()),
			target_count: 100,
			max_candidates_attempted: 1_000,
			..GenerationConfig::default()
		};
		let outcome = generate(&small_bundle(), &config).unwrap().drain();
		assert_eq!(outcome.status, StreamStatus::Completed);
		assert_eq!(outcome.candidates.last().unwrap().text, "0099");
	}

	#[test]
	fn emitted_candidates_respect_constraints() {
		let config = GenerationConfig {
			strategy: Strategy::Sampling,
			target_count: 40,
			max_candidates_attempted: 50_000,
			min_length: 6,
			max_length: 10,
			required_classes: [CharClass::Lower, CharClass::Digit].into_iter().collect(),
			seed: Some(11),
			..GenerationConfig::default()
		};
		let outcome = generate(&small_bundle(), &config).unwrap().drain();

		for candidate in &outcome.candidates {
			let len = candidate.text.chars().count();
			assert!((6..=10).contains(&len), "length violation: {:?}", candidate.text);
			assert!(candidate.text.chars().any(|c| c.is_ascii_lowercase()));
			assert!(candidate.text.chars().any(|c| c.is_ascii_digit()));
		}
	}

	#[test]
	fn unsatisfiable_constraints_exhaust_budget_not_time() {
		// Model max length is 11; a 50-char floor can never be met.
		let config = GenerationConfig {
			strategy: Strategy::Sampling,
			target_count: 10,
			max_candidates_attempted: 500,
			min_length: 50,
			max_length: 60,
			seed: Some(1),
			..GenerationConfig::default()
		};
		let outcome = generate(&small_bundle(), &config).unwrap().drain();

		assert_eq!(outcome.status, StreamStatus::BudgetExhaustedWithoutTarget);
		assert!(outcome.candidates.is_empty());
		assert_eq!(outcome.attempted, 500);
	}

	#[test]
	fn fixed_seed_reproduces_the_stream() {
		let bundle = small_bundle();
		let config = GenerationConfig {
			strategy: Strategy::Sampling,
			target_count: 25,
			seed: Some(99),
			..GenerationConfig::default()
		};

		let a: Vec<String> = generate(&bundle, &config).unwrap().map(|c| c.text).collect();
		let b: Vec<String> = generate(&bundle, &config).unwrap().map(|c| c.text).collect();
		assert_eq!(a, b);
		assert_eq!(a.len(), 25);
	}

	#[test]
	fn mass_cutoff_halts_grammar_expansion() {
		// One shape, 4 x 4 uniform expansions of mass 1/16 each.
		let bundle = bundle_from(&["aa1", "bb2", "cc3", "dd4"]);
		let config = GenerationConfig {
			strategy: Strategy::Grammar,
			target_count: 1_000,
			max_candidates_attempted: 10_000,
			cutoff_threshold: 0.9,
			..GenerationConfig::default()
		};
		let outcome = generate(&bundle, &config).unwrap().drain();

		assert_eq!(outcome.status, StreamStatus::CutoffReached);
		// 15 * (1/16) = 0.9375 is the first prefix reaching 0.9.
		assert_eq!(outcome.candidates.len(), 15);
		assert!(outcome.emitted_mass >= 0.9);
	}

	#[test]
	fn grammar_space_exhaustion_is_soft() {
		let bundle = bundle_from(&["aa1", "bb2", "cc3", "dd4"]);
		let config = GenerationConfig {
			strategy: Strategy::Grammar,
			target_count: 1_000,
			max_candidates_attempted: 10_000,
			..GenerationConfig::default()
		};
		let outcome = generate(&bundle, &config).unwrap().drain();
		assert_eq!(outcome.status, StreamStatus::SpaceExhausted);
		assert_eq!(outcome.candidates.len(), 16);
	}

	#[test]
	fn dedupe_removes_repeats() {
		let bundle = bundle_from(&["ab1", "ab1", "ab1", "cd2"]);
		let config = GenerationConfig {
			strategy: Strategy::Sampling,
			target_count: 4,
			max_candidates_attempted: 100_000,
			dedupe: true,
			seed: Some(5),
			..GenerationConfig::default()
		};
		let outcome = generate(&bundle, &config).unwrap().drain();
		let unique: BTreeSet<&str> = outcome.candidates.iter().map(|c| c.text.as_str()).collect();
		assert_eq!(unique.len(), outcome.candidates.len());
	}

	#[test]
	fn hybrid_requires_grammar_and_dedupes() {
		let corpus = Corpus::from_entries(vec!["abc1".into(), "def2".into()]);
		let grammarless = Arc::new(
			analyze(
				&corpus,
				&AnalyzerConfig { infer_grammar: false, ..AnalyzerConfig::default() },
			)
			.unwrap(),
		);
		let config = GenerationConfig {
			strategy: Strategy::Hybrid,
			seed: Some(2),
			..GenerationConfig::default()
		};
		assert!(matches!(generate(&grammarless, &config), Err(GenerateError::GrammarUnavailable)));

		let bundle = bundle_from(&["abc1", "def2", "ghi3"]);
		let config = GenerationConfig {
			strategy: Strategy::Hybrid,
			target_count: 20,
			max_candidates_attempted: 100_000,
			seed: Some(2),
			..GenerationConfig::default()
		};
		let outcome = generate(&bundle, &config).unwrap().drain();
		let unique: BTreeSet<&str> = outcome.candidates.iter().map(|c| c.text.as_str()).collect();
		assert_eq!(unique.len(), outcome.candidates.len());
	}

	#[test]
	fn invalid_configuration_refuses_to_start() {
		let config = GenerationConfig {
			min_length: 9,
			max_length: 3,
			..GenerationConfig::default()
		};
		assert!(matches!(
			generate(&small_bundle(), &config),
			Err(GenerateError::InvalidConfiguration(_))
		));
	}

	#[test]
	fn time_budget_terminates_the_stream() {
		let config = GenerationConfig {
			strategy: Strategy::Sampling,
			target_count: usize::MAX - 1,
			max_candidates_attempted: usize::MAX,
			time_budget_ms: Some(0),
			seed: Some(3),
			..GenerationConfig::default()
		};
		let outcome = generate(&small_bundle(), &config).unwrap().drain();
		assert_eq!(outcome.status, StreamStatus::TimeBudgetExceeded);
	}
}
