use std::collections::BTreeMap;
use std::sync::Arc;

use crate::analyze::{AnalyzerConfig, analyze};
use crate::bundle::ModelBundle;
use crate::corpus::Corpus;
use crate::error::{AnalyzeError, GenerateError};

use super::config::GenerationConfig;
use super::exhaustive::MaskEnumerator;
use super::expansion::GrammarExpander;
use super::hybrid::HybridSynthesizer;
use super::sampling::DistributionSampler;
use super::Synthesizer;

/// A candidate-generation engine, installable under a name.
///
/// Engines are registered explicitly at process start; there is no
/// runtime discovery. `build` validates engine-specific requirements
/// (grammar presence, mask presence) and returns a ready synthesizer
/// holding a shared reference to the bundle.
pub trait Engine: Send + Sync {
	fn name(&self) -> &'static str;
	fn build(
		&self,
		bundle: &Arc<ModelBundle>,
		config: &GenerationConfig,
	) -> Result<Box<dyn Synthesizer>, GenerateError>;
}

struct SamplingEngine;

impl Engine for SamplingEngine {
	fn name(&self) -> &'static str {
		"sampling"
	}

	fn build(
		&self,
		bundle: &Arc<ModelBundle>,
		_config: &GenerationConfig,
	) -> Result<Box<dyn Synthesizer>, GenerateError> {
		Ok(Box::new(DistributionSampler::new(bundle.clone())))
	}
}

struct GrammarEngine;

impl Engine for GrammarEngine {
	fn name(&self) -> &'static str {
		"grammar"
	}

	fn build(
		&self,
		bundle: &Arc<ModelBundle>,
		_config: &GenerationConfig,
	) -> Result<Box<dyn Synthesizer>, GenerateError> {
		Ok(Box::new(GrammarExpander::new(bundle)?))
	}
}

struct HybridEngine;

impl Engine for HybridEngine {
	fn name(&self) -> &'static str {
		"hybrid"
	}

	fn build(
		&self,
		bundle: &Arc<ModelBundle>,
		config: &GenerationConfig,
	) -> Result<Box<dyn Synthesizer>, GenerateError> {
		Ok(Box::new(HybridSynthesizer::new(bundle.clone(), config.hybrid_ratio)?))
	}
}

struct ExhaustiveEngine;

impl Engine for ExhaustiveEngine {
	fn name(&self) -> &'static str {
		"exhaustive"
	}

	fn build(
		&self,
		_bundle: &Arc<ModelBundle>,
		config: &GenerationConfig,
	) -> Result<Box<dyn Synthesizer>, GenerateError> {
		let mask = config
			.mask
			.as_deref()
			.ok_or_else(|| GenerateError::InvalidConfiguration("exhaustive strategy requires a mask".into()))?;
		Ok(Box::new(MaskEnumerator::new(mask)?))
	}
}

/// Name → engine mapping for candidate generators.
#[derive(Default)]
pub struct EngineRegistry {
	engines: BTreeMap<&'static str, Box<dyn Engine>>,
}

impl EngineRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry with the four built-in engines installed.
	pub fn builtin() -> Self {
		let mut registry = Self::new();
		registry.register(Box::new(SamplingEngine));
		registry.register(Box::new(GrammarEngine));
		registry.register(Box::new(HybridEngine));
		registry.register(Box::new(ExhaustiveEngine));
		registry
	}

	/// Installs an engine under its own name, replacing any previous
	/// registration.
	pub fn register(&mut self, engine: Box<dyn Engine>) {
		self.engines.insert(engine.name(), engine);
	}

	pub fn get(&self, name: &str) -> Result<&dyn Engine, GenerateError> {
		self.engines
			.get(name)
			.map(|e| e.as_ref())
			.ok_or_else(|| GenerateError::UnknownEngine(name.to_owned()))
	}

	pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
		self.engines.keys().copied()
	}
}

/// A corpus analyzer, installable under a name (mirror of
/// `EngineRegistry` for the analysis side).
pub trait AnalyzerEngine: Send + Sync {
	fn name(&self) -> &'static str;
	fn analyze(&self, corpus: &Corpus, config: &AnalyzerConfig) -> Result<ModelBundle, AnalyzeError>;
}

struct ScarabAnalyzer;

impl AnalyzerEngine for ScarabAnalyzer {
	fn name(&self) -> &'static str {
		"scarab"
	}

	fn analyze(&self, corpus: &Corpus, config: &AnalyzerConfig) -> Result<ModelBundle, AnalyzeError> {
		analyze(corpus, config)
	}
}

/// Name → analyzer mapping.
#[derive(Default)]
pub struct AnalyzerRegistry {
	analyzers: BTreeMap<&'static str, Box<dyn AnalyzerEngine>>,
}

impl AnalyzerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn builtin() -> Self {
		let mut registry = Self::new();
		registry.register(Box::new(ScarabAnalyzer));
		registry
	}

	pub fn register(&mut self, analyzer: Box<dyn AnalyzerEngine>) {
		self.analyzers.insert(analyzer.name(), analyzer);
	}

	pub fn get(&self, name: &str) -> Option<&dyn AnalyzerEngine> {
		self.analyzers.get(name).map(|a| a.as_ref())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builtin_engines_are_registered() {
		let registry = EngineRegistry::builtin();
		let names: Vec<&str> = registry.names().collect();
		assert_eq!(names, vec!["exhaustive", "grammar", "hybrid", "sampling"]);
	}

	#[test]
	fn unknown_engine_is_an_error() {
		let registry = EngineRegistry::builtin();
		assert!(matches!(registry.get("markov"), Err(GenerateError::UnknownEngine(_))));
	}

	#[test]
	fn builtin_analyzer_is_registered() {
		let registry = AnalyzerRegistry::builtin();
		assert!(registry.get("scarab").is_some());
		assert!(registry.get("other").is_none());
	}
}
