use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::BundleError;
use crate::grammar::Grammar;
use crate::token::TokenKind;

/// Schema version produced and consumed by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Tolerance used when checking that probability masses sum to 1.0.
pub const MASS_TOLERANCE: f64 = 1e-6;

/// A normalized probability table over an ordered key domain.
///
/// Backed by a `BTreeMap` so iteration order, serialization, and weighted
/// sampling are all deterministic.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(transparent)]
pub struct Distribution<K: Ord> {
	mass: BTreeMap<K, f64>,
}

impl<K: Ord> Distribution<K> {
	/// Normalizes raw counts into probability mass.
	///
	/// An empty count table yields an empty distribution; validation
	/// rejects those, so analysis never produces one for a non-empty
	/// corpus.
	pub(crate) fn from_counts(counts: BTreeMap<K, u64>) -> Self {
		let total: u64 = counts.values().sum();
		let mass = counts
			.into_iter()
			.map(|(key, count)| {
				let p = if total == 0 { 0.0 } else { count as f64 / total as f64 };
				(key, p)
			})
			.collect();
		Self { mass }
	}

	/// Probability mass of a single key (0.0 when unobserved).
	pub fn mass(&self, key: &K) -> f64 {
		self.mass.get(key).copied().unwrap_or(0.0)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&K, f64)> {
		self.mass.iter().map(|(k, v)| (k, *v))
	}

	pub fn len(&self) -> usize {
		self.mass.len()
	}

	pub fn is_empty(&self) -> bool {
		self.mass.is_empty()
	}

	/// Weighted sample over the whole domain.
	///
	/// Performs a cumulative scan in key order, so a given rng state always
	/// selects the same key. Returns `None` on an empty distribution.
	pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<&K> {
		self.sample_where(rng, |_| true)
	}

	/// Weighted sample restricted to keys matching `keep`, renormalizing
	/// on the fly. Returns `None` when no key matches or the matching mass
	/// is zero.
	pub fn sample_where<R: Rng, F: Fn(&K) -> bool>(&self, rng: &mut R, keep: F) -> Option<&K> {
		let total: f64 = self
			.mass
			.iter()
			.filter(|(k, _)| keep(k))
			.map(|(_, p)| *p)
			.sum();
		if total <= 0.0 {
			return None;
		}

		let mut r = rng.random::<f64>() * total;
		let mut fallback = None;
		for (key, p) in &self.mass {
			if !keep(key) {
				continue;
			}
			if r < *p {
				return Some(key);
			}
			r -= p;
			fallback = Some(key);
		}

		// Floating rounding can walk past the last bucket.
		fallback
	}

	/// Checks non-negativity and unit mass.
	fn validate(&self, name: &str, tolerance: f64) -> Result<(), BundleError> {
		if self.mass.is_empty() {
			return Err(BundleError::Malformed(format!("{name} is empty")));
		}

		let mut sum = 0.0;
		for p in self.mass.values() {
			if *p < 0.0 || !p.is_finite() {
				return Err(BundleError::Malformed(format!("{name} contains an invalid mass value")));
			}
			sum += p;
		}
		if (sum - 1.0).abs() > tolerance {
			return Err(BundleError::Malformed(format!("{name} sums to {sum}, expected 1.0")));
		}

		Ok(())
	}
}

/// Node of the token-kind transition matrix. `Start` and `End` are
/// synthetic markers so the matrix captures sequence-initial and
/// sequence-final behavior.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionNode {
	Start,
	Word,
	Digits,
	Symbols,
	Year,
	Mixed,
	End,
}

impl From<TokenKind> for TransitionNode {
	fn from(kind: TokenKind) -> Self {
		match kind {
			TokenKind::Word => Self::Word,
			TokenKind::Digits => Self::Digits,
			TokenKind::Symbols => Self::Symbols,
			TokenKind::Year => Self::Year,
			TokenKind::Mixed => Self::Mixed,
		}
	}
}

/// One observed token value with its occurrence count.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ValueCount {
	pub value: String,
	pub count: u64,
}

/// Aggregate statistics for a single token kind.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TokenStats {
	/// Total number of tokens of this kind seen across the corpus.
	pub count: u64,
	/// Token length (characters) → occurrences.
	pub length_histogram: BTreeMap<usize, u64>,
	/// Most frequent observed values, count-descending (ties by value),
	/// truncated to the analyzer's `top_values` setting.
	pub top_values: Vec<ValueCount>,
	/// Per-character occurrences across all tokens of this kind; the raw
	/// material for mask-directed character synthesis.
	pub char_histogram: BTreeMap<char, u64>,
}

/// The immutable, versioned statistical model produced by analysis and
/// consumed by generation.
///
/// ## Invariants
/// - `schema_version` is set exactly once at construction.
/// - Every probability table is non-negative and sums to 1.0 within
///   `MASS_TOLERANCE`.
/// - No corpus content survives here beyond aggregate statistics and the
///   per-kind top values.
///
/// A bundle is never mutated after construction; share it behind an `Arc`
/// across concurrent generation runs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelBundle {
	// Field order matters for the serialized document: schema_version
	// leads so consumers can check compatibility before a full parse.
	schema_version: u32,
	corpus_id: String,
	engine: String,
	length_distribution: Distribution<usize>,
	charset_distribution: Distribution<String>,
	mask_distribution: Distribution<String>,
	token_stats: BTreeMap<TokenKind, TokenStats>,
	transitions: BTreeMap<TransitionNode, Distribution<TransitionNode>>,
	// Always serialized (as null when absent): postcard reads fields
	// positionally, so an omitted Option cannot be decoded back.
	#[serde(default)]
	grammar: Option<Grammar>,
}

/// Minimal probe used to read `schema_version` before the full parse.
#[derive(Deserialize)]
struct SchemaProbe {
	schema_version: u32,
}

impl ModelBundle {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		corpus_id: String,
		engine: String,
		length_distribution: Distribution<usize>,
		charset_distribution: Distribution<String>,
		mask_distribution: Distribution<String>,
		token_stats: BTreeMap<TokenKind, TokenStats>,
		transitions: BTreeMap<TransitionNode, Distribution<TransitionNode>>,
		grammar: Option<Grammar>,
	) -> Self {
		Self {
			schema_version: SCHEMA_VERSION,
			corpus_id,
			engine,
			length_distribution,
			charset_distribution,
			mask_distribution,
			token_stats,
			transitions,
			grammar,
		}
	}

	pub fn schema_version(&self) -> u32 {
		self.schema_version
	}

	pub fn corpus_id(&self) -> &str {
		&self.corpus_id
	}

	pub fn engine(&self) -> &str {
		&self.engine
	}

	pub fn length_distribution(&self) -> &Distribution<usize> {
		&self.length_distribution
	}

	pub fn charset_distribution(&self) -> &Distribution<String> {
		&self.charset_distribution
	}

	pub fn mask_distribution(&self) -> &Distribution<String> {
		&self.mask_distribution
	}

	pub fn token_stats(&self) -> &BTreeMap<TokenKind, TokenStats> {
		&self.token_stats
	}

	pub fn stats_for(&self, kind: TokenKind) -> Option<&TokenStats> {
		self.token_stats.get(&kind)
	}

	pub fn transitions(&self) -> &BTreeMap<TransitionNode, Distribution<TransitionNode>> {
		&self.transitions
	}

	pub fn grammar(&self) -> Option<&Grammar> {
		self.grammar.as_ref()
	}

	/// Largest observed password length (used for fast infeasibility
	/// checks before generation starts).
	pub fn max_observed_length(&self) -> usize {
		self.length_distribution
			.iter()
			.map(|(len, _)| *len)
			.max()
			.unwrap_or(0)
	}

	/// Serializes the bundle to its contract document (JSON, with
	/// `schema_version` as the first field).
	pub fn serialize(&self) -> Result<Vec<u8>, BundleError> {
		serde_json::to_vec(self).map_err(BundleError::Encode)
	}

	/// Deserializes a contract document produced by `serialize`.
	///
	/// # Errors
	/// - `SchemaVersion` when the document declares a version other than
	///   `SCHEMA_VERSION` (use `deserialize_with_migrations` for older
	///   documents).
	/// - `Decode` when the document is not valid JSON for the schema.
	/// - `Malformed` when structural invariants do not hold.
	pub fn deserialize(bytes: &[u8]) -> Result<Self, BundleError> {
		let found = Self::probe_version(bytes)?;
		if found != SCHEMA_VERSION {
			return Err(BundleError::SchemaVersion { found, supported: SCHEMA_VERSION });
		}
		Self::parse_and_validate(bytes)
	}

	/// Deserializes a contract document, migrating older schema versions
	/// through the registered migration chain.
	pub fn deserialize_with_migrations(
		bytes: &[u8],
		migrations: &MigrationRegistry,
	) -> Result<Self, BundleError> {
		let found = Self::probe_version(bytes)?;
		if found == SCHEMA_VERSION {
			return Self::parse_and_validate(bytes);
		}
		if found > SCHEMA_VERSION {
			return Err(BundleError::SchemaVersion { found, supported: SCHEMA_VERSION });
		}

		let value: serde_json::Value = serde_json::from_slice(bytes).map_err(BundleError::Decode)?;
		let migrated = migrations.migrate(value, found)?;
		let bundle: Self = serde_json::from_value(migrated).map_err(BundleError::Decode)?;
		bundle.validate()?;
		Ok(bundle)
	}

	/// Encodes the bundle into the compact binary cache format.
	pub fn to_cache_bytes(&self) -> Result<Vec<u8>, BundleError> {
		Ok(postcard::to_stdvec(self)?)
	}

	/// Decodes a binary cache produced by `to_cache_bytes`.
	pub fn from_cache_bytes(bytes: &[u8]) -> Result<Self, BundleError> {
		let bundle: Self = postcard::from_bytes(bytes)?;
		if bundle.schema_version != SCHEMA_VERSION {
			return Err(BundleError::SchemaVersion {
				found: bundle.schema_version,
				supported: SCHEMA_VERSION,
			});
		}
		bundle.validate()?;
		Ok(bundle)
	}

	fn probe_version(bytes: &[u8]) -> Result<u32, BundleError> {
		let probe: SchemaProbe = serde_json::from_slice(bytes).map_err(BundleError::Decode)?;
		Ok(probe.schema_version)
	}

	fn parse_and_validate(bytes: &[u8]) -> Result<Self, BundleError> {
		let bundle: Self = serde_json::from_slice(bytes).map_err(BundleError::Decode)?;
		bundle.validate()?;
		Ok(bundle)
	}

	/// Checks every structural invariant of the bundle.
	pub fn validate(&self) -> Result<(), BundleError> {
		self.length_distribution.validate("length_distribution", MASS_TOLERANCE)?;
		self.charset_distribution.validate("charset_distribution", MASS_TOLERANCE)?;
		self.mask_distribution.validate("mask_distribution", MASS_TOLERANCE)?;

		for (node, row) in &self.transitions {
			row.validate(&format!("transitions[{node:?}]"), MASS_TOLERANCE)?;
		}

		if let Some(grammar) = &self.grammar {
			grammar.validate(MASS_TOLERANCE)?;
		}

		Ok(())
	}
}

/// Migration step applied to the raw JSON document of an older bundle.
pub type Migration = fn(serde_json::Value) -> Result<serde_json::Value, BundleError>;

/// Registry of schema migrations, keyed by source version.
///
/// Breaking schema changes register an explicit `(old → new)` step here;
/// `migrate` walks the chain until the current version is reached. The
/// registry rewrites `schema_version` after each step, so migration
/// functions only transform payload fields.
#[derive(Default)]
pub struct MigrationRegistry {
	steps: BTreeMap<u32, (u32, Migration)>,
}

impl MigrationRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a migration from `from` to `to`. Later registrations for
	/// the same source version replace earlier ones.
	pub fn register(&mut self, from: u32, to: u32, migration: Migration) {
		self.steps.insert(from, (to, migration));
	}

	/// Applies registered steps until `SCHEMA_VERSION` is reached.
	///
	/// # Errors
	/// `SchemaVersion` when the chain has a gap (no step registered for an
	/// intermediate version).
	fn migrate(&self, mut value: serde_json::Value, mut version: u32) -> Result<serde_json::Value, BundleError> {
		while version < SCHEMA_VERSION {
			let Some((to, migration)) = self.steps.get(&version) else {
				return Err(BundleError::SchemaVersion { found: version, supported: SCHEMA_VERSION });
			};
			value = migration(value)?;
			if let Some(object) = value.as_object_mut() {
				object.insert("schema_version".into(), serde_json::json!(*to));
			}
			version = *to;
		}
		Ok(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::analyze::{AnalyzerConfig, analyze};
	use crate::corpus::Corpus;

	fn sample_bundle() -> ModelBundle {
		let corpus = Corpus::from_entries(vec![
			"password123".into(),
			"admin2024!".into(),
			"letmein".into(),
		]);
		analyze(&corpus, &AnalyzerConfig::default()).unwrap()
	}

	#[test]
	fn distribution_from_counts_normalizes() {
		let mut counts = BTreeMap::new();
		counts.insert("a", 3u64);
		counts.insert("b", 1u64);
		let dist = Distribution::from_counts(counts);
		assert!((dist.mass(&"a") - 0.75).abs() < 1e-12);
		assert!((dist.mass(&"b") - 0.25).abs() < 1e-12);
		dist.validate("test", MASS_TOLERANCE).unwrap();
	}

	#[test]
	fn sample_is_deterministic_for_fixed_rng() {
		use rand::SeedableRng;
		let mut counts = BTreeMap::new();
		for key in ["a", "b", "c", "d"] {
			counts.insert(key, 1u64);
		}
		let dist = Distribution::from_counts(counts);

		let mut rng_a = rand_chacha::ChaCha8Rng::seed_from_u64(7);
		let mut rng_b = rand_chacha::ChaCha8Rng::seed_from_u64(7);
		for _ in 0..32 {
			assert_eq!(dist.sample(&mut rng_a), dist.sample(&mut rng_b));
		}
	}

	#[test]
	fn serialize_round_trip_is_identity() {
		let bundle = sample_bundle();
		let bytes = bundle.serialize().unwrap();
		let restored = ModelBundle::deserialize(&bytes).unwrap();
		assert_eq!(bundle, restored);
	}

	#[test]
	fn schema_version_is_first_field() {
		let bytes = sample_bundle().serialize().unwrap();
		let text = String::from_utf8(bytes).unwrap();
		assert!(text.starts_with("{\"schema_version\":"), "got: {}", &text[..40.min(text.len())]);
	}

	#[test]
	fn newer_schema_is_rejected() {
		let bundle = sample_bundle();
		let mut value: serde_json::Value = serde_json::from_slice(&bundle.serialize().unwrap()).unwrap();
		value["schema_version"] = serde_json::json!(SCHEMA_VERSION + 1);
		let bytes = serde_json::to_vec(&value).unwrap();
		match ModelBundle::deserialize(&bytes) {
			Err(BundleError::SchemaVersion { found, supported }) => {
				assert_eq!(found, SCHEMA_VERSION + 1);
				assert_eq!(supported, SCHEMA_VERSION);
			}
			other => panic!("expected SchemaVersion error, got {other:?}"),
		}
	}

	#[test]
	fn tampered_mass_is_malformed() {
		let bundle = sample_bundle();
		let mut value: serde_json::Value = serde_json::from_slice(&bundle.serialize().unwrap()).unwrap();
		let lengths = value["length_distribution"].as_object_mut().unwrap();
		let first_key = lengths.keys().next().unwrap().clone();
		lengths.insert(first_key, serde_json::json!(5.0));
		let bytes = serde_json::to_vec(&value).unwrap();
		assert!(matches!(ModelBundle::deserialize(&bytes), Err(BundleError::Malformed(_))));
	}

	#[test]
	fn cache_round_trip() {
		let bundle = sample_bundle();
		let bytes = bundle.to_cache_bytes().unwrap();
		let restored = ModelBundle::from_cache_bytes(&bytes).unwrap();
		assert_eq!(bundle, restored);
	}

	#[test]
	fn grammarless_bundle_round_trips_both_codecs() {
		let corpus = Corpus::from_entries(vec!["password123".into(), "admin2024!".into()]);
		let bundle = analyze(
			&corpus,
			&AnalyzerConfig { infer_grammar: false, ..AnalyzerConfig::default() },
		)
		.unwrap();
		assert!(bundle.grammar().is_none());

		let restored = ModelBundle::deserialize(&bundle.serialize().unwrap()).unwrap();
		assert_eq!(bundle, restored);

		let restored = ModelBundle::from_cache_bytes(&bundle.to_cache_bytes().unwrap()).unwrap();
		assert_eq!(bundle, restored);
	}

	#[test]
	fn migration_chain_is_applied() {
		let bundle = sample_bundle();
		let mut value: serde_json::Value = serde_json::from_slice(&bundle.serialize().unwrap()).unwrap();
		value["schema_version"] = serde_json::json!(0);
		let bytes = serde_json::to_vec(&value).unwrap();

		// Without a registered step the old version is unsupported.
		let empty = MigrationRegistry::new();
		assert!(matches!(
			ModelBundle::deserialize_with_migrations(&bytes, &empty),
			Err(BundleError::SchemaVersion { found: 0, .. })
		));

		// An identity step from 0 to 1 makes it loadable again.
		let mut registry = MigrationRegistry::new();
		registry.register(0, 1, Ok);
		let restored = ModelBundle::deserialize_with_migrations(&bytes, &registry).unwrap();
		assert_eq!(restored.schema_version(), SCHEMA_VERSION);
	}
}
