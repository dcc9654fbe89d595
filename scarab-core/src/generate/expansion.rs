use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashSet};

use rand_chacha::ChaCha8Rng;

use crate::bundle::ModelBundle;
use crate::error::GenerateError;
use crate::token::TokenKind;

use super::config::Strategy;
use super::{Candidate, Synthesizer};

/// One concrete value a grammar slot can take, with its normalized
/// probability within the kind's retained top values.
struct SlotValue {
	text: String,
	p: f64,
}

/// A pending expansion: one production with one value index per slot.
struct State {
	score: f64,
	production: usize,
	indices: Vec<usize>,
}

impl PartialEq for State {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for State {}

impl PartialOrd for State {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for State {
	fn cmp(&self, other: &Self) -> Ordering {
		// Max-heap on score; equal scores resolve to the earlier
		// production / lower indices so expansion order is deterministic.
		self.score
			.total_cmp(&other.score)
			.then_with(|| other.production.cmp(&self.production))
			.then_with(|| other.indices.cmp(&self.indices))
	}
}

/// Grammar-expansion engine: a global best-first traversal over
/// `production x value-tuple` space.
///
/// Every production starts with the most frequent value in each slot; each
/// emitted expansion enqueues its single-step successors (one slot bumped
/// to the next value). Scores are `p(production) * prod p(value)`, and
/// successors never outscore their parent, so candidates come out in
/// non-increasing score order and a budget or mass cutoff can stop early
/// with the best prefix of the space already emitted.
///
/// The traversal is fully deterministic; the rng is unused.
pub(super) struct GrammarExpander {
	productions: Vec<(f64, Vec<TokenKind>)>,
	pools: BTreeMap<TokenKind, Vec<SlotValue>>,
	heap: BinaryHeap<State>,
	visited: HashSet<(usize, Vec<usize>)>,
}

impl GrammarExpander {
	pub(super) fn new(bundle: &ModelBundle) -> Result<Self, GenerateError> {
		let grammar = bundle.grammar().ok_or(GenerateError::GrammarUnavailable)?;

		let mut pools: BTreeMap<TokenKind, Vec<SlotValue>> = BTreeMap::new();
		for (kind, stats) in bundle.token_stats() {
			let total: u64 = stats.top_values.iter().map(|v| v.count).sum();
			if total == 0 {
				continue;
			}
			let values = stats
				.top_values
				.iter()
				.map(|v| SlotValue { text: v.value.clone(), p: v.count as f64 / total as f64 })
				.collect();
			pools.insert(*kind, values);
		}

		// Productions referencing a kind with no retained values cannot be
		// expanded and are skipped up front.
		let productions: Vec<(f64, Vec<TokenKind>)> = grammar
			.productions()
			.iter()
			.filter(|p| p.sequence.iter().all(|kind| pools.contains_key(kind)))
			.map(|p| (p.probability, p.sequence.clone()))
			.collect();

		let mut expander = Self {
			productions,
			pools,
			heap: BinaryHeap::new(),
			visited: HashSet::new(),
		};
		for index in 0..expander.productions.len() {
			let indices = vec![0; expander.productions[index].1.len()];
			expander.push_state(index, indices);
		}
		Ok(expander)
	}

	fn score_of(&self, production: usize, indices: &[usize]) -> f64 {
		let (p_production, sequence) = &self.productions[production];
		let mut score = *p_production;
		for (slot, index) in sequence.iter().zip(indices) {
			score *= self.pools[slot][*index].p;
		}
		score
	}

	fn push_state(&mut self, production: usize, indices: Vec<usize>) {
		if self.visited.insert((production, indices.clone())) {
			let score = self.score_of(production, &indices);
			self.heap.push(State { score, production, indices });
		}
	}
}

impl Synthesizer for GrammarExpander {
	fn synthesize(&mut self, _rng: &mut ChaCha8Rng) -> Option<Candidate> {
		let state = self.heap.pop()?;
		let (_, sequence) = &self.productions[state.production];

		let text: String = sequence
			.iter()
			.zip(&state.indices)
			.map(|(kind, index)| self.pools[kind][*index].text.as_str())
			.collect();

		// Enqueue one-step successors before handing the candidate out.
		for slot in 0..state.indices.len() {
			let kind = self.productions[state.production].1[slot];
			if state.indices[slot] + 1 < self.pools[&kind].len() {
				let mut next = state.indices.clone();
				next[slot] += 1;
				self.push_state(state.production, next);
			}
		}

		Some(Candidate { text, score: state.score, origin: Strategy::Grammar })
	}

	fn tracks_mass(&self) -> bool {
		true
	}
}

#[cfg(test)]
mod tests {
	use rand::SeedableRng;

	use super::*;
	use crate::analyze::{AnalyzerConfig, analyze};
	use crate::corpus::Corpus;

	fn expander_for(entries: &[&str]) -> GrammarExpander {
		let corpus = Corpus::from_entries(entries.iter().map(|s| s.to_string()).collect());
		let bundle = analyze(&corpus, &AnalyzerConfig::default()).unwrap();
		GrammarExpander::new(&bundle).unwrap()
	}

	#[test]
	fn scores_are_non_increasing() {
		let mut expander = expander_for(&[
			"password1", "password1", "admin99", "root2024", "qwerty!", "letmein7",
		]);
		let mut rng = ChaCha8Rng::seed_from_u64(0);

		let mut last = f64::INFINITY;
		let mut count = 0;
		while let Some(candidate) = expander.synthesize(&mut rng) {
			assert!(candidate.score <= last + 1e-12, "score went up: {} -> {}", last, candidate.score);
			last = candidate.score;
			count += 1;
		}
		assert!(count > 4, "expected a real expansion space, got {count}");
	}

	#[test]
	fn best_candidate_combines_top_values() {
		// "admin" dominates words, "123" dominates digit runs, and
		// Word+Digits dominates shapes.
		let mut expander = expander_for(&[
			"admin123", "admin123", "admin456", "root123", "zzz!",
		]);
		let mut rng = ChaCha8Rng::seed_from_u64(0);
		let first = expander.synthesize(&mut rng).unwrap();
		assert_eq!(first.text, "admin123");
		assert_eq!(first.origin, Strategy::Grammar);
	}

	#[test]
	fn no_duplicate_expansions() {
		let mut expander = expander_for(&["aa1", "bb2", "cc3", "dd4"]);
		let mut rng = ChaCha8Rng::seed_from_u64(0);

		let mut seen = HashSet::new();
		while let Some(candidate) = expander.synthesize(&mut rng) {
			assert!(seen.insert(candidate.text.clone()), "duplicate {}", candidate.text);
		}
		// 4 words x 4 digit runs for the Word+Digits shape.
		assert_eq!(seen.len(), 16);
	}

	#[test]
	fn missing_grammar_is_reported() {
		let corpus = Corpus::from_entries(vec!["abc".into()]);
		let bundle = analyze(
			&corpus,
			&AnalyzerConfig { infer_grammar: false, ..AnalyzerConfig::default() },
		)
		.unwrap();
		assert!(matches!(GrammarExpander::new(&bundle), Err(GenerateError::GrammarUnavailable)));
	}
}
