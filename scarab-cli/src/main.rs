use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{info, warn};

use scarab_core::generate::{GenerationConfig, Strategy, generate};
use scarab_core::mask::CharClass;
use scarab_core::{AnalyzerConfig, Corpus, ModelBundle, StreamStatus, analyze};

mod io;

#[derive(Parser)]
#[command(name = "scarab", version, about = "Password-corpus analysis and candidate generation")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Analyze a newline-delimited password corpus into a model bundle.
	Analyze {
		/// Corpus file (UTF-8, one password per line).
		corpus: PathBuf,
		/// Output path for the bundle document (default: corpus path with
		/// a .json extension). A binary cache (.sbc) is written alongside.
		#[arg(short, long)]
		output: Option<PathBuf>,
		/// Skip grammar inference.
		#[arg(long)]
		no_grammar: bool,
		/// Minimum observations for a sequence shape to survive grammar
		/// pruning.
		#[arg(long, default_value_t = 1)]
		min_support: u64,
		/// Top observed values retained per token kind.
		#[arg(long, default_value_t = 32)]
		top_values: usize,
		/// Analysis shards (0 = one per CPU).
		#[arg(long, default_value_t = 0)]
		shards: usize,
	},
	/// Generate candidates from a model bundle.
	Generate {
		/// Bundle file (.json document or .sbc binary cache).
		bundle: PathBuf,
		/// Strategy: sampling, grammar, hybrid or exhaustive.
		#[arg(short, long, default_value = "sampling")]
		strategy: String,
		/// Number of candidates to emit.
		#[arg(short = 'n', long, default_value_t = 100)]
		count: usize,
		/// Attempt quota (default: 100x the target count).
		#[arg(long)]
		attempts: Option<usize>,
		/// Wall-clock budget in milliseconds.
		#[arg(long)]
		time_budget_ms: Option<u64>,
		#[arg(long, default_value_t = 1)]
		min_length: usize,
		#[arg(long, default_value_t = 64)]
		max_length: usize,
		/// Required character classes (lower, upper, digit, symbol);
		/// repeatable.
		#[arg(long = "require")]
		required: Vec<String>,
		/// Probability-mass cutoff in (0, 1]; 1.0 disables the early halt.
		#[arg(long, default_value_t = 1.0)]
		cutoff: f64,
		/// RNG seed for a reproducible run.
		#[arg(long)]
		seed: Option<u64>,
		/// Drop duplicate candidates within the run.
		#[arg(long)]
		dedupe: bool,
		/// Fixed mask for the exhaustive strategy (?l?u?d?s or LUDS).
		#[arg(long)]
		mask: Option<String>,
		/// Sampling share of hybrid attempts.
		#[arg(long, default_value_t = 0.5)]
		hybrid_ratio: f64,
		/// Emit tab-separated scores next to each candidate.
		#[arg(long)]
		scores: bool,
		/// Output file (default: stdout).
		#[arg(short, long)]
		output: Option<PathBuf>,
	},
	/// Print a summary of a model bundle.
	Inspect {
		/// Bundle file (.json document or .sbc binary cache).
		bundle: PathBuf,
	},
}

fn main() -> Result<()> {
	env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

	match Cli::parse().command {
		Command::Analyze { corpus, output, no_grammar, min_support, top_values, shards } => {
			run_analyze(&corpus, output, no_grammar, min_support, top_values, shards)
		}
		Command::Generate {
			bundle,
			strategy,
			count,
			attempts,
			time_budget_ms,
			min_length,
			max_length,
			required,
			cutoff,
			seed,
			dedupe,
			mask,
			hybrid_ratio,
			scores,
			output,
		} => {
			let config = GenerationConfig {
				target_count: count,
				max_candidates_attempted: attempts.unwrap_or(count.saturating_mul(100)),
				time_budget_ms,
				min_length,
				max_length,
				required_classes: parse_required(&required)?,
				strategy: strategy.parse::<Strategy>()?,
				cutoff_threshold: cutoff,
				seed,
				dedupe,
				mask,
				hybrid_ratio,
			};
			run_generate(&bundle, &config, scores, output)
		}
		Command::Inspect { bundle } => run_inspect(&bundle),
	}
}

fn run_analyze(
	corpus_path: &Path,
	output: Option<PathBuf>,
	no_grammar: bool,
	min_support: u64,
	top_values: usize,
	shards: usize,
) -> Result<()> {
	let bytes = fs::read(corpus_path)
		.with_context(|| format!("failed to read corpus {}", corpus_path.display()))?;
	let (corpus, skipped) = Corpus::from_utf8_lines(&bytes);
	if skipped > 0 {
		warn!("skipped {skipped} invalid line(s) in {}", corpus_path.display());
	}
	info!("loaded {} password(s), corpus id {}", corpus.len(), corpus.id());

	let config = AnalyzerConfig {
		infer_grammar: !no_grammar,
		grammar_min_support: min_support,
		top_values,
		shards,
	};
	let bundle = analyze(&corpus, &config)?;

	let output = match output {
		Some(path) => path,
		None => io::build_output_path(corpus_path, "json")?,
	};
	fs::write(&output, bundle.serialize()?)
		.with_context(|| format!("failed to write bundle {}", output.display()))?;
	info!("wrote bundle document {}", output.display());

	let cache_path = io::build_output_path(&output, "sbc")?;
	fs::write(&cache_path, bundle.to_cache_bytes()?)
		.with_context(|| format!("failed to write bundle cache {}", cache_path.display()))?;
	info!("wrote bundle cache {}", cache_path.display());

	info!(
		"{} length(s), {} mask(s), {} token kind(s), grammar: {}",
		bundle.length_distribution().len(),
		bundle.mask_distribution().len(),
		bundle.token_stats().len(),
		bundle.grammar().map_or("none".to_owned(), |g| format!("{} production(s)", g.len())),
	);
	Ok(())
}

fn run_generate(
	bundle_path: &Path,
	config: &GenerationConfig,
	scores: bool,
	output: Option<PathBuf>,
) -> Result<()> {
	let bundle = Arc::new(load_bundle(bundle_path)?);
	let mut stream = generate(&bundle, config)?;

	let mut writer: BufWriter<Box<dyn Write>> = BufWriter::new(match &output {
		Some(path) => Box::new(
			fs::File::create(path)
				.with_context(|| format!("failed to create {}", path.display()))?,
		),
		None => Box::new(std::io::stdout()),
	});

	for candidate in stream.by_ref() {
		if scores {
			writeln!(writer, "{}\t{:e}", candidate.text, candidate.score)?;
		} else {
			writeln!(writer, "{}", candidate.text)?;
		}
	}
	writer.flush()?;

	let status = stream.status();
	info!(
		"emitted {} candidate(s) in {} attempt(s): {status}",
		stream.emitted(),
		stream.attempted(),
	);
	if status == StreamStatus::BudgetExhaustedWithoutTarget {
		bail!(
			"generation stopped after {} attempt(s) with {} of {} candidate(s): constraints are too narrow for this model",
			stream.attempted(),
			stream.emitted(),
			config.target_count,
		);
	}
	Ok(())
}

fn run_inspect(bundle_path: &Path) -> Result<()> {
	let bundle = load_bundle(bundle_path)?;

	println!("schema version : {}", bundle.schema_version());
	println!("engine         : {}", bundle.engine());
	println!("corpus id      : {}", bundle.corpus_id());
	println!("max length     : {}", bundle.max_observed_length());

	println!("lengths        :");
	for (length, mass) in bundle.length_distribution().iter() {
		println!("  {length:>3}  {mass:.4}");
	}

	println!("top masks      :");
	let mut masks: Vec<(&String, f64)> = bundle.mask_distribution().iter().collect();
	masks.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
	for (mask, mass) in masks.iter().take(10) {
		println!("  {mask:<16} {mass:.4}");
	}

	println!("token kinds    :");
	for (kind, stats) in bundle.token_stats() {
		println!("  {kind:?}: {} token(s), {} distinct length(s)", stats.count, stats.length_histogram.len());
	}

	match bundle.grammar() {
		Some(grammar) => println!("grammar        : {} production(s)", grammar.len()),
		None => println!("grammar        : none"),
	}
	Ok(())
}

/// Loads a bundle, preferring the binary cache when one is available.
///
/// A `.sbc` path decodes the cache directly. For a document path, the
/// sibling `.sbc` written by `analyze` is tried first; a missing or
/// unreadable cache falls back to the document itself.
fn load_bundle(path: &Path) -> Result<ModelBundle> {
	if path.extension().is_some_and(|ext| ext == "sbc") {
		let bytes = fs::read(path).with_context(|| format!("failed to read bundle cache {}", path.display()))?;
		return Ok(ModelBundle::from_cache_bytes(&bytes)?);
	}

	let cache_path = io::build_output_path(path, "sbc")?;
	if let Ok(bytes) = fs::read(&cache_path) {
		match ModelBundle::from_cache_bytes(&bytes) {
			Ok(bundle) => return Ok(bundle),
			Err(e) => warn!("ignoring bundle cache {}: {e}", cache_path.display()),
		}
	}

	let bytes = fs::read(path).with_context(|| format!("failed to read bundle {}", path.display()))?;
	Ok(ModelBundle::deserialize(&bytes)?)
}

fn parse_required(names: &[String]) -> Result<std::collections::BTreeSet<CharClass>> {
	let mut classes = std::collections::BTreeSet::new();
	for name in names {
		let class = match name.to_ascii_lowercase().as_str() {
			"lower" => CharClass::Lower,
			"upper" => CharClass::Upper,
			"digit" => CharClass::Digit,
			"symbol" => CharClass::Symbol,
			other => bail!("unknown character class '{other}' (expected lower, upper, digit or symbol)"),
		};
		classes.insert(class);
	}
	Ok(classes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn analyze_then_generate_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let corpus_path = dir.path().join("corpus.txt");
		fs::write(&corpus_path, "password123\nadmin2024\nqwerty!\n").unwrap();

		run_analyze(&corpus_path, None, false, 1, 32, 1).unwrap();

		let bundle_path = dir.path().join("corpus.json");
		let cache_path = dir.path().join("corpus.sbc");
		let from_json = load_bundle(&bundle_path).unwrap();
		let from_cache = load_bundle(&cache_path).unwrap();
		assert_eq!(from_json, from_cache);

		let out_path = dir.path().join("candidates.txt");
		let config = GenerationConfig {
			target_count: 10,
			max_candidates_attempted: 10_000,
			seed: Some(1),
			..GenerationConfig::default()
		};
		run_generate(&bundle_path, &config, false, Some(out_path.clone())).unwrap();
		let lines = fs::read_to_string(&out_path).unwrap();
		assert_eq!(lines.lines().count(), 10);
	}

	#[test]
	fn document_path_prefers_the_sibling_cache() {
		let dir = tempfile::tempdir().unwrap();
		let corpus_path = dir.path().join("corpus.txt");
		fs::write(&corpus_path, "password123\nadmin2024\nqwerty!\n").unwrap();
		run_analyze(&corpus_path, None, false, 1, 32, 1).unwrap();

		let bundle_path = dir.path().join("corpus.json");
		let cache_path = dir.path().join("corpus.sbc");
		let document = fs::read(&bundle_path).unwrap();

		// With a valid sibling cache the document is never parsed.
		fs::write(&bundle_path, b"not json").unwrap();
		load_bundle(&bundle_path).unwrap();

		// A corrupt cache falls back to the document.
		fs::write(&bundle_path, &document).unwrap();
		fs::write(&cache_path, b"junk").unwrap();
		load_bundle(&bundle_path).unwrap();
	}

	#[test]
	fn grammarless_analysis_cache_loads_back() {
		let dir = tempfile::tempdir().unwrap();
		let corpus_path = dir.path().join("corpus.txt");
		fs::write(&corpus_path, "password123\nadmin2024\n").unwrap();
		run_analyze(&corpus_path, None, true, 1, 32, 1).unwrap();

		let bundle = load_bundle(&dir.path().join("corpus.sbc")).unwrap();
		assert!(bundle.grammar().is_none());
	}

	#[test]
	fn required_class_parsing() {
		let classes = parse_required(&["digit".into(), "Symbol".into()]).unwrap();
		assert_eq!(classes.len(), 2);
		assert!(parse_required(&["vowel".into()]).is_err());
	}
}
