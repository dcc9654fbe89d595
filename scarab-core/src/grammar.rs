use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BundleError;
use crate::token::TokenKind;

/// One production of the token-sequence grammar: a concrete token-kind
/// shape observed in the corpus, with its support count and normalized
/// probability.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Production {
	pub sequence: Vec<TokenKind>,
	pub count: u64,
	pub probability: f64,
}

/// Probabilistic grammar over token-kind sequences.
///
/// This is a deliberately flat PCFG: one start symbol, one production per
/// observed sequence shape, probabilities proportional to observed
/// frequency. Shapes below the configured minimum support are pruned at
/// inference time so the grammar stays bounded, and probabilities are
/// renormalized over the survivors.
///
/// ## Invariants
/// - `productions` is sorted probability-descending (ties broken by
///   sequence order), so expansion can start from the most likely shapes.
/// - Production probabilities are non-negative and sum to 1.0.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Grammar {
	productions: Vec<Production>,
}

impl Grammar {
	/// Builds a grammar from observed sequence-shape counts.
	///
	/// Shapes with support below `min_support` are dropped. Returns `None`
	/// when nothing survives pruning; the bundle then simply carries no
	/// grammar.
	pub(crate) fn from_counts(counts: &BTreeMap<Vec<TokenKind>, u64>, min_support: u64) -> Option<Self> {
		let retained: Vec<(&Vec<TokenKind>, u64)> = counts
			.iter()
			.filter(|(_, count)| **count >= min_support)
			.map(|(sequence, count)| (sequence, *count))
			.collect();

		let total: u64 = retained.iter().map(|(_, count)| count).sum();
		if total == 0 {
			return None;
		}

		let mut productions: Vec<Production> = retained
			.into_iter()
			.map(|(sequence, count)| Production {
				sequence: sequence.clone(),
				count,
				probability: count as f64 / total as f64,
			})
			.collect();

		// Highest probability first; sequence order keeps ties deterministic.
		productions.sort_by(|a, b| {
			b.probability
				.total_cmp(&a.probability)
				.then_with(|| a.sequence.cmp(&b.sequence))
		});

		Some(Self { productions })
	}

	pub fn productions(&self) -> &[Production] {
		&self.productions
	}

	pub fn len(&self) -> usize {
		self.productions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.productions.is_empty()
	}

	/// Checks the grammar invariants (used by bundle validation).
	pub(crate) fn validate(&self, tolerance: f64) -> Result<(), BundleError> {
		if self.productions.is_empty() {
			return Err(BundleError::Malformed("grammar present but has no productions".into()));
		}

		let mut sum = 0.0;
		for production in &self.productions {
			if production.probability < 0.0 {
				return Err(BundleError::Malformed("grammar production with negative probability".into()));
			}
			sum += production.probability;
		}
		if (sum - 1.0).abs() > tolerance {
			return Err(BundleError::Malformed(format!(
				"grammar probabilities sum to {sum}, expected 1.0"
			)));
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::token::TokenKind::*;

	#[test]
	fn pruning_and_renormalization() {
		let mut counts = BTreeMap::new();
		counts.insert(vec![Word, Digits], 6u64);
		counts.insert(vec![Word, Year], 3u64);
		counts.insert(vec![Symbols], 1u64);

		let grammar = Grammar::from_counts(&counts, 2).unwrap();
		assert_eq!(grammar.len(), 2);
		// Renormalized over the survivors: 6/9 and 3/9.
		assert!((grammar.productions()[0].probability - 6.0 / 9.0).abs() < 1e-12);
		assert_eq!(grammar.productions()[0].sequence, vec![Word, Digits]);
		grammar.validate(1e-6).unwrap();
	}

	#[test]
	fn everything_pruned_yields_none() {
		let mut counts = BTreeMap::new();
		counts.insert(vec![Word], 1u64);
		assert!(Grammar::from_counts(&counts, 5).is_none());
	}

	#[test]
	fn sorted_probability_descending() {
		let mut counts = BTreeMap::new();
		counts.insert(vec![Word], 1u64);
		counts.insert(vec![Word, Digits], 10u64);
		counts.insert(vec![Digits], 5u64);

		let grammar = Grammar::from_counts(&counts, 1).unwrap();
		let probs: Vec<f64> = grammar.productions().iter().map(|p| p.probability).collect();
		assert!(probs.windows(2).all(|w| w[0] >= w[1]));
	}
}
