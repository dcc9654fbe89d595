use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;

use crate::bundle::{Distribution, ModelBundle, TokenStats, TransitionNode, ValueCount};
use crate::corpus::Corpus;
use crate::error::AnalyzeError;
use crate::grammar::Grammar;
use crate::mask::{charset_combo, mask_of};
use crate::token::{TokenKind, tokenize};

/// Configuration of one analysis run.
#[derive(Clone, Debug)]
pub struct AnalyzerConfig {
	/// Whether to infer the token-sequence grammar.
	pub infer_grammar: bool,
	/// Minimum observations for a sequence shape to survive grammar
	/// pruning.
	pub grammar_min_support: u64,
	/// How many top observed values to retain per token kind.
	pub top_values: usize,
	/// Number of corpus shards to analyze in parallel. `1` runs inline;
	/// `0` picks one shard per CPU. The reduction is a fixed-order
	/// summation, so the result is identical for any shard count.
	pub shards: usize,
}

impl Default for AnalyzerConfig {
	fn default() -> Self {
		Self {
			infer_grammar: true,
			grammar_min_support: 1,
			top_values: 32,
			shards: 1,
		}
	}
}

/// Per-kind raw counters accumulated during the pass.
#[derive(Default, Clone)]
struct KindCounts {
	count: u64,
	lengths: BTreeMap<usize, u64>,
	values: BTreeMap<String, u64>,
	chars: BTreeMap<char, u64>,
}

impl KindCounts {
	fn merge(&mut self, other: &Self) {
		self.count += other.count;
		for (len, n) in &other.lengths {
			*self.lengths.entry(*len).or_insert(0) += n;
		}
		for (value, n) in &other.values {
			*self.values.entry(value.clone()).or_insert(0) += n;
		}
		for (c, n) in &other.chars {
			*self.chars.entry(*c).or_insert(0) += n;
		}
	}
}

/// All raw count tables for one (partial) analysis pass.
///
/// Partial tables produced by shards merge by plain summation, which is
/// commutative over integer counts; normalization happens exactly once,
/// after the final merge.
#[derive(Default, Clone)]
struct CountTables {
	passwords: u64,
	lengths: BTreeMap<usize, u64>,
	charsets: BTreeMap<String, u64>,
	masks: BTreeMap<String, u64>,
	kinds: BTreeMap<TokenKind, KindCounts>,
	transitions: BTreeMap<TransitionNode, BTreeMap<TransitionNode, u64>>,
	sequences: BTreeMap<Vec<TokenKind>, u64>,
}

impl CountTables {
	/// Folds one password into the tables.
	fn observe(&mut self, password: &str) {
		self.passwords += 1;
		*self.lengths.entry(password.chars().count()).or_insert(0) += 1;
		*self.charsets.entry(charset_combo(password)).or_insert(0) += 1;
		*self.masks.entry(mask_of(password)).or_insert(0) += 1;

		let tokens = tokenize(password);

		let mut previous = TransitionNode::Start;
		for token in &tokens {
			let counts = self.kinds.entry(token.kind).or_default();
			counts.count += 1;
			*counts.lengths.entry(token.len()).or_insert(0) += 1;
			*counts.values.entry(token.text.clone()).or_insert(0) += 1;
			for c in token.text.chars() {
				*counts.chars.entry(c).or_insert(0) += 1;
			}

			let node = TransitionNode::from(token.kind);
			*self.transitions.entry(previous).or_default().entry(node).or_insert(0) += 1;
			previous = node;
		}
		*self.transitions.entry(previous).or_default().entry(TransitionNode::End).or_insert(0) += 1;

		if !tokens.is_empty() {
			let sequence: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
			*self.sequences.entry(sequence).or_insert(0) += 1;
		}
	}

	fn merge(&mut self, other: &Self) {
		self.passwords += other.passwords;
		for (len, n) in &other.lengths {
			*self.lengths.entry(*len).or_insert(0) += n;
		}
		for (combo, n) in &other.charsets {
			*self.charsets.entry(combo.clone()).or_insert(0) += n;
		}
		for (mask, n) in &other.masks {
			*self.masks.entry(mask.clone()).or_insert(0) += n;
		}
		for (kind, counts) in &other.kinds {
			self.kinds.entry(*kind).or_default().merge(counts);
		}
		for (from, row) in &other.transitions {
			let target = self.transitions.entry(*from).or_default();
			for (to, n) in row {
				*target.entry(*to).or_insert(0) += n;
			}
		}
		for (sequence, n) in &other.sequences {
			*self.sequences.entry(sequence.clone()).or_insert(0) += n;
		}
	}

	/// Normalizes every table and assembles the bundle. Consumes the
	/// tables; this is the single normalization point of the run.
	fn finalize(self, corpus_id: &str, config: &AnalyzerConfig) -> ModelBundle {
		let token_stats: BTreeMap<TokenKind, TokenStats> = self
			.kinds
			.into_iter()
			.map(|(kind, counts)| {
				let mut top_values: Vec<ValueCount> = counts
					.values
					.into_iter()
					.map(|(value, count)| ValueCount { value, count })
					.collect();
				top_values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
				top_values.truncate(config.top_values);

				let stats = TokenStats {
					count: counts.count,
					length_histogram: counts.lengths,
					top_values,
					char_histogram: counts.chars,
				};
				(kind, stats)
			})
			.collect();

		let transitions = self
			.transitions
			.into_iter()
			.map(|(from, row)| (from, Distribution::from_counts(row)))
			.collect();

		let grammar = if config.infer_grammar {
			Grammar::from_counts(&self.sequences, config.grammar_min_support)
		} else {
			None
		};

		ModelBundle::new(
			corpus_id.to_owned(),
			format!("scarab/{}", env!("CARGO_PKG_VERSION")),
			Distribution::from_counts(self.lengths),
			Distribution::from_counts(self.charsets),
			Distribution::from_counts(self.masks),
			token_stats,
			transitions,
			grammar,
		)
	}
}

/// Analyzes a corpus into a `ModelBundle`.
///
/// Single batch pass: per password the length, charset-combination and
/// mask histograms, per-kind token statistics and START/END-framed
/// transition counts are updated; everything is normalized once at the
/// end. Re-analysis is a fresh run over the full corpus; there is no
/// incremental update path.
///
/// With `config.shards > 1` the corpus is chunked across worker threads
/// producing partial count tables, reduced by summation in shard-index
/// order. Counts are integers, so the result is bit-identical to the
/// single-threaded pass.
///
/// # Errors
/// `EmptyCorpus` when the corpus has zero entries.
pub fn analyze(corpus: &Corpus, config: &AnalyzerConfig) -> Result<ModelBundle, AnalyzeError> {
	if corpus.is_empty() {
		return Err(AnalyzeError::EmptyCorpus);
	}

	let shards = match config.shards {
		0 => num_cpus::get().max(1),
		n => n,
	};

	let tables = if shards <= 1 || corpus.len() <= 1 {
		let mut tables = CountTables::default();
		for password in corpus.iter() {
			tables.observe(password);
		}
		tables
	} else {
		analyze_sharded(corpus, shards)
	};

	Ok(tables.finalize(corpus.id(), config))
}

/// Sharded counting pass with a deterministic index-ordered reduction.
fn analyze_sharded(corpus: &Corpus, shards: usize) -> CountTables {
	let entries = corpus.entries();
	let chunk_size = entries.len().div_ceil(shards);

	let (tx, rx) = mpsc::channel();
	for (index, chunk) in entries.chunks(chunk_size).enumerate() {
		let tx = tx.clone();
		let chunk: Vec<String> = chunk.to_vec();

		thread::spawn(move || {
			let mut partial = CountTables::default();
			for password in &chunk {
				partial.observe(password);
			}
			// Receiver outlives all senders; a send failure is unreachable.
			let _ = tx.send((index, partial));
		});
	}
	drop(tx);

	let mut partials: Vec<(usize, CountTables)> = rx.iter().collect();
	partials.sort_by_key(|(index, _)| *index);

	let mut tables = CountTables::default();
	for (_, partial) in &partials {
		tables.merge(partial);
	}
	tables
}
