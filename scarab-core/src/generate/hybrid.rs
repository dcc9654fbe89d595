use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::bundle::ModelBundle;
use crate::error::GenerateError;

use super::expansion::GrammarExpander;
use super::sampling::DistributionSampler;
use super::{Candidate, Synthesizer};

/// Hybrid engine: interleaves distribution sampling and grammar expansion
/// at a configurable ratio.
///
/// Each attempt flips a weighted coin (`ratio` = sampling share). Once the
/// finite expansion space runs dry, all remaining attempts go to the
/// sampler. Candidates keep the origin of the side that produced them;
/// cross-strategy deduplication is enforced by the stream, which always
/// runs hybrid output with dedupe on.
pub(super) struct HybridSynthesizer {
	sampler: DistributionSampler,
	expander: GrammarExpander,
	ratio: f64,
	expander_done: bool,
}

impl HybridSynthesizer {
	pub(super) fn new(bundle: Arc<ModelBundle>, ratio: f64) -> Result<Self, GenerateError> {
		let expander = GrammarExpander::new(&bundle)?;
		Ok(Self {
			sampler: DistributionSampler::new(bundle),
			expander,
			ratio,
			expander_done: false,
		})
	}
}

impl Synthesizer for HybridSynthesizer {
	fn synthesize(&mut self, rng: &mut ChaCha8Rng) -> Option<Candidate> {
		let use_sampler = self.expander_done || rng.random::<f64>() < self.ratio;
		if !use_sampler {
			if let Some(candidate) = self.expander.synthesize(rng) {
				return Some(candidate);
			}
			self.expander_done = true;
		}
		self.sampler.synthesize(rng)
	}
}

#[cfg(test)]
mod tests {
	use rand::SeedableRng;

	use super::*;
	use crate::analyze::{AnalyzerConfig, analyze};
	use crate::corpus::Corpus;
	use crate::generate::config::Strategy;

	fn bundle() -> Arc<ModelBundle> {
		let corpus = Corpus::from_entries(vec![
			"admin123".into(),
			"root456".into(),
			"guest789".into(),
			"qwerty!".into(),
		]);
		Arc::new(analyze(&corpus, &AnalyzerConfig::default()).unwrap())
	}

	#[test]
	fn draws_from_both_sides() {
		let mut hybrid = HybridSynthesizer::new(bundle(), 0.5).unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(3);

		let mut origins = std::collections::BTreeSet::new();
		for _ in 0..100 {
			let candidate = hybrid.synthesize(&mut rng).unwrap();
			origins.insert(candidate.origin);
		}
		assert!(origins.contains(&Strategy::Sampling));
		assert!(origins.contains(&Strategy::Grammar));
	}

	#[test]
	fn ratio_one_is_pure_sampling() {
		let mut hybrid = HybridSynthesizer::new(bundle(), 1.0).unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(3);
		for _ in 0..30 {
			assert_eq!(hybrid.synthesize(&mut rng).unwrap().origin, Strategy::Sampling);
		}
	}

	#[test]
	fn survives_expansion_exhaustion() {
		// Ratio 0 prefers the expander until its finite space is drained,
		// then the sampler takes over instead of ending the stream.
		let mut hybrid = HybridSynthesizer::new(bundle(), 0.0).unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(3);
		for _ in 0..200 {
			assert!(hybrid.synthesize(&mut rng).is_some());
		}
	}

	#[test]
	fn requires_a_grammar() {
		let corpus = Corpus::from_entries(vec!["abc".into()]);
		let bundle = Arc::new(
			analyze(
				&corpus,
				&AnalyzerConfig { infer_grammar: false, ..AnalyzerConfig::default() },
			)
			.unwrap(),
		);
		assert!(matches!(
			HybridSynthesizer::new(bundle, 0.5),
			Err(GenerateError::GrammarUnavailable)
		));
	}
}
