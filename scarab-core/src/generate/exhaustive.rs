use rand_chacha::ChaCha8Rng;

use crate::error::GenerateError;
use crate::mask::parse_mask;

use super::config::Strategy;
use super::{Candidate, Synthesizer};

/// Exhaustive mask engine: enumerates every string matching one fixed
/// mask, in lexicographic order over the per-class alphabets.
///
/// Used when completeness over a small space matters more than sampling.
/// Every candidate carries the same score, `1 / |space|`, so the emitted
/// probability mass tracks the fraction of the space already covered.
pub(super) struct MaskEnumerator {
	positions: Vec<&'static [char]>,
	indices: Vec<usize>,
	score: f64,
	done: bool,
}

impl MaskEnumerator {
	pub(super) fn new(mask: &str) -> Result<Self, GenerateError> {
		let positions: Vec<&'static [char]> = parse_mask(mask)?
			.into_iter()
			.map(|class| class.alphabet())
			.collect();

		let space: f64 = positions.iter().map(|p| p.len() as f64).product();
		Ok(Self {
			indices: vec![0; positions.len()],
			positions,
			score: 1.0 / space,
			done: false,
		})
	}
}

impl Synthesizer for MaskEnumerator {
	fn synthesize(&mut self, _rng: &mut ChaCha8Rng) -> Option<Candidate> {
		if self.done {
			return None;
		}

		let text: String = self
			.positions
			.iter()
			.zip(&self.indices)
			.map(|(alphabet, index)| alphabet[*index])
			.collect();

		// Odometer advance, rightmost position fastest.
		self.done = true;
		for slot in (0..self.indices.len()).rev() {
			self.indices[slot] += 1;
			if self.indices[slot] < self.positions[slot].len() {
				self.done = false;
				break;
			}
			self.indices[slot] = 0;
		}

		Some(Candidate { text, score: self.score, origin: Strategy::Exhaustive })
	}

	fn tracks_mass(&self) -> bool {
		true
	}
}

#[cfg(test)]
mod tests {
	use rand::SeedableRng;

	use super::*;

	fn drain(mask: &str, limit: usize) -> Vec<String> {
		let mut enumerator = MaskEnumerator::new(mask).unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(0);
		let mut out = Vec::new();
		while out.len() < limit {
			match enumerator.synthesize(&mut rng) {
				Some(c) => out.push(c.text),
				None => break,
			}
		}
		out
	}

	#[test]
	fn digit_mask_counts_in_ascending_order() {
		let all = drain("?d?d", usize::MAX);
		assert_eq!(all.len(), 100);
		assert_eq!(all.first().unwrap(), "00");
		assert_eq!(all.last().unwrap(), "99");
		for (i, text) in all.iter().enumerate() {
			assert_eq!(*text, format!("{i:02}"));
		}
	}

	#[test]
	fn truncation_keeps_the_prefix() {
		let first = drain("?d?d?d?d", 10);
		let expected: Vec<String> = (0..10).map(|i| format!("{i:04}")).collect();
		assert_eq!(first, expected);
	}

	#[test]
	fn mixed_mask_is_lexicographic_and_uniform() {
		let mut enumerator = MaskEnumerator::new("?l?d").unwrap();
		let mut rng = ChaCha8Rng::seed_from_u64(0);
		let first = enumerator.synthesize(&mut rng).unwrap();
		assert_eq!(first.text, "a0");
		assert!((first.score - 1.0 / 260.0).abs() < 1e-15);
	}

	#[test]
	fn empty_mask_enumerates_the_empty_string_once() {
		let all = drain("", usize::MAX);
		assert_eq!(all, vec![String::new()]);
	}
}
