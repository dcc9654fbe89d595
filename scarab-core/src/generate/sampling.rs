use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::bundle::ModelBundle;
use crate::mask::{CharClass, parse_mask};

use super::config::Strategy;
use super::{Candidate, Synthesizer};

/// Per-class character pools derived from the bundle's token statistics.
///
/// Every token kind's character histogram contributes; a class the corpus
/// never exhibited falls back to a uniform pool over its full alphabet so
/// mask positions of that class stay synthesizable.
pub(super) struct CharPools {
	pools: [Vec<(char, f64)>; 4],
}

impl CharPools {
	pub(super) fn from_bundle(bundle: &ModelBundle) -> Self {
		let mut merged: BTreeMap<char, u64> = BTreeMap::new();
		for stats in bundle.token_stats().values() {
			for (c, n) in &stats.char_histogram {
				*merged.entry(*c).or_insert(0) += n;
			}
		}

		let pools = [CharClass::Lower, CharClass::Upper, CharClass::Digit, CharClass::Symbol]
			.map(|class| Self::pool_for(class, &merged));
		Self { pools }
	}

	fn pool_for(class: CharClass, merged: &BTreeMap<char, u64>) -> Vec<(char, f64)> {
		let observed: Vec<(char, u64)> = merged
			.iter()
			.filter(|(c, _)| CharClass::of_char(**c) == class)
			.map(|(c, n)| (*c, *n))
			.collect();

		if observed.is_empty() {
			let alphabet = class.alphabet();
			let uniform = 1.0 / alphabet.len() as f64;
			return alphabet.iter().map(|c| (*c, uniform)).collect();
		}

		let total: u64 = observed.iter().map(|(_, n)| n).sum();
		observed
			.into_iter()
			.map(|(c, n)| (c, n as f64 / total as f64))
			.collect()
	}

	/// Weighted draw of one character of the given class, returning the
	/// character and its pool probability.
	pub(super) fn sample(&self, class: CharClass, rng: &mut ChaCha8Rng) -> (char, f64) {
		let pool = &self.pools[class as usize];
		let mut r = rng.random::<f64>();
		let mut fallback = pool[pool.len() - 1];
		for (c, p) in pool {
			if r < *p {
				return (*c, *p);
			}
			r -= p;
			fallback = (*c, *p);
		}
		fallback
	}
}

/// Distribution-sampling engine: draws a length, a mask conditioned on
/// that length, then one character per mask position.
///
/// When no mask of the drawn length was ever observed, the draw falls back
/// to the unconditioned mask distribution and the mask's own length wins.
/// Duplicates across draws are possible by design; the stream deduplicates
/// only when asked to.
pub(super) struct DistributionSampler {
	bundle: Arc<ModelBundle>,
	pools: CharPools,
}

impl DistributionSampler {
	pub(super) fn new(bundle: Arc<ModelBundle>) -> Self {
		let pools = CharPools::from_bundle(&bundle);
		Self { bundle, pools }
	}
}

impl Synthesizer for DistributionSampler {
	fn synthesize(&mut self, rng: &mut ChaCha8Rng) -> Option<Candidate> {
		let lengths = self.bundle.length_distribution();
		let masks = self.bundle.mask_distribution();

		let length = *lengths.sample(rng)?;
		let p_length = lengths.mass(&length);

		let conditional_mass: f64 = masks
			.iter()
			.filter(|(mask, _)| mask.chars().count() == length)
			.map(|(_, p)| p)
			.sum();

		let (mask, p_structure) = if conditional_mass > 0.0 {
			let mask = masks.sample_where(rng, |m| m.chars().count() == length)?.clone();
			let p_conditional = masks.mass(&mask) / conditional_mass;
			(mask, p_length * p_conditional)
		} else {
			// Zero-mass (length, mask) pair: fall back to the
			// unconditioned mask distribution.
			let mask = masks.sample(rng)?.clone();
			let p = masks.mass(&mask);
			(mask, p)
		};

		// Masks produced by analysis are always parseable.
		let classes = parse_mask(&mask).ok()?;

		let mut text = String::with_capacity(mask.len());
		let mut score = p_structure;
		for class in classes {
			let (c, p) = self.pools.sample(class, rng);
			text.push(c);
			score *= p;
		}

		Some(Candidate { text, score, origin: Strategy::Sampling })
	}
}
