use thiserror::Error;

/// Errors raised by corpus analysis.
///
/// Analysis errors are always fatal to the run; no partial model is ever
/// returned.
#[derive(Error, Debug)]
pub enum AnalyzeError {
	/// The corpus had zero entries, so no distribution can be built.
	#[error("corpus contains no entries")]
	EmptyCorpus,
}

/// Errors raised when loading or storing a `ModelBundle`.
#[derive(Error, Debug)]
pub enum BundleError {
	/// The bundle declares a schema version this build cannot consume and
	/// no migration path is registered for it.
	#[error("unsupported bundle schema version {found} (supported: {supported})")]
	SchemaVersion { found: u32, supported: u32 },

	/// A structural invariant does not hold (negative mass, distribution
	/// not summing to 1.0, ...). The message names the offending field,
	/// never corpus content.
	#[error("malformed bundle: {0}")]
	Malformed(String),

	/// JSON encoding failed.
	#[error("bundle encode failed: {0}")]
	Encode(#[source] serde_json::Error),

	/// JSON decoding failed before invariants could even be checked.
	#[error("bundle decode failed: {0}")]
	Decode(#[source] serde_json::Error),

	/// Binary cache (postcard) encode/decode failed.
	#[error("bundle cache codec failed: {0}")]
	Cache(#[from] postcard::Error),
}

/// Hard generation errors: the run refuses to start.
///
/// Soft underproduction (budget exhausted before the target count) is not
/// an error; it is reported through the stream status so partial output
/// stays available.
#[derive(Error, Debug)]
pub enum GenerateError {
	/// The configuration is rejected eagerly, before any work begins.
	#[error("invalid generation configuration: {0}")]
	InvalidConfiguration(String),

	/// The grammar strategy was requested but the bundle carries no
	/// grammar (analysis ran without inference, or every shape was
	/// pruned).
	#[error("model bundle carries no grammar; re-analyze with grammar inference enabled")]
	GrammarUnavailable,

	/// No engine is registered under the requested name.
	#[error("no engine registered under '{0}'")]
	UnknownEngine(String),
}
