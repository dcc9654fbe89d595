use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, middleware, put, web};
use log::info;
use serde::{Deserialize, Serialize};

use scarab_core::generate::{GenerationConfig, Strategy, generate};
use scarab_core::mask::CharClass;
use scarab_core::{ModelBundle, StreamStatus};

/// Query parameters for the `/v1/generate` endpoint.
#[derive(Deserialize)]
struct GenerateParams {
	strategy: Option<String>,
	count: Option<usize>,
	attempts: Option<usize>,
	time_budget_ms: Option<u64>,
	min_length: Option<usize>,
	max_length: Option<usize>,
	/// Comma-separated list of lower/upper/digit/symbol.
	require: Option<String>,
	cutoff: Option<f64>,
	seed: Option<u64>,
	dedupe: Option<bool>,
	mask: Option<String>,
	hybrid_ratio: Option<f64>,
	scores: Option<bool>,
}

impl GenerateParams {
	/// Builds the generation configuration, rejecting unknown names early.
	fn config(&self) -> Result<GenerationConfig, String> {
		let strategy = match &self.strategy {
			Some(name) => name.parse::<Strategy>().map_err(|e| e.to_string())?,
			None => Strategy::Sampling,
		};

		let mut required = std::collections::BTreeSet::new();
		if let Some(list) = &self.require {
			for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
				let class = match name.to_ascii_lowercase().as_str() {
					"lower" => CharClass::Lower,
					"upper" => CharClass::Upper,
					"digit" => CharClass::Digit,
					"symbol" => CharClass::Symbol,
					other => return Err(format!("unknown character class '{other}'")),
				};
				required.insert(class);
			}
		}

		let count = self.count.unwrap_or(100);
		Ok(GenerationConfig {
			target_count: count,
			max_candidates_attempted: self.attempts.unwrap_or(count.saturating_mul(100)),
			time_budget_ms: self.time_budget_ms,
			min_length: self.min_length.unwrap_or(1),
			max_length: self.max_length.unwrap_or(64),
			required_classes: required,
			strategy,
			cutoff_threshold: self.cutoff.unwrap_or(1.0),
			seed: self.seed,
			dedupe: self.dedupe.unwrap_or(false),
			mask: self.mask.clone(),
			hybrid_ratio: self.hybrid_ratio.unwrap_or(0.5),
		})
	}
}

struct SharedData {
	bundle: Option<Arc<ModelBundle>>,
}

/// Summary of the loaded bundle for `/v1/bundle`.
#[derive(Serialize)]
struct BundleSummary {
	schema_version: u32,
	engine: String,
	corpus_id: String,
	lengths: usize,
	masks: usize,
	token_kinds: usize,
	grammar_productions: usize,
	max_observed_length: usize,
}

/// HTTP PUT endpoint `/v1/bundle`
///
/// Loads a serialized bundle document into the server. The document is
/// validated (schema version, distribution invariants) before replacing
/// the current bundle.
#[put("/v1/bundle")]
async fn put_bundle(data: web::Data<Mutex<SharedData>>, body: web::Bytes) -> impl Responder {
	let bundle = match ModelBundle::deserialize(&body) {
		Ok(bundle) => bundle,
		Err(e) => return HttpResponse::BadRequest().body(format!("rejected bundle: {e}")),
	};

	let mut shared_data = match data.lock() {
		Ok(m) => m,
		Err(_) => return HttpResponse::InternalServerError().body("State lock failed"),
	};
	info!("loaded bundle for corpus {}", bundle.corpus_id());
	shared_data.bundle = Some(Arc::new(bundle));
	HttpResponse::Ok().body("Bundle loaded successfully")
}

/// HTTP GET endpoint `/v1/bundle`
///
/// Returns a summary of the currently loaded bundle.
#[get("/v1/bundle")]
async fn get_bundle(data: web::Data<Mutex<SharedData>>) -> impl Responder {
	let shared_data = match data.lock() {
		Ok(m) => m,
		Err(_) => return HttpResponse::InternalServerError().body("State lock failed"),
	};
	match &shared_data.bundle {
		Some(bundle) => HttpResponse::Ok().json(BundleSummary {
			schema_version: bundle.schema_version(),
			engine: bundle.engine().to_owned(),
			corpus_id: bundle.corpus_id().to_owned(),
			lengths: bundle.length_distribution().len(),
			masks: bundle.mask_distribution().len(),
			token_kinds: bundle.token_stats().len(),
			grammar_productions: bundle.grammar().map_or(0, |g| g.len()),
			max_observed_length: bundle.max_observed_length(),
		}),
		None => HttpResponse::Conflict().body("No bundle loaded"),
	}
}

/// HTTP GET endpoint `/v1/generate`
///
/// Runs one bounded generation over the loaded bundle and returns the
/// candidates as newline-delimited text (optionally with tab-separated
/// scores). Soft underproduction is reported in the `X-Stream-Status`
/// header; configuration errors are a 400 before any work starts.
#[get("/v1/generate")]
async fn get_generated(data: web::Data<Mutex<SharedData>>, query: web::Query<GenerateParams>) -> impl Responder {
	let config = match query.config() {
		Ok(config) => config,
		Err(e) => return HttpResponse::BadRequest().body(e),
	};

	let bundle = {
		let shared_data = match data.lock() {
			Ok(m) => m,
			Err(_) => return HttpResponse::InternalServerError().body("State lock failed"),
		};
		match &shared_data.bundle {
			Some(bundle) => bundle.clone(),
			None => return HttpResponse::Conflict().body("No bundle loaded"),
		}
	};

	// The bundle is read-only; generation runs outside the lock.
	let stream = match generate(&bundle, &config) {
		Ok(stream) => stream,
		Err(e) => return HttpResponse::BadRequest().body(e.to_string()),
	};
	let outcome = stream.drain();

	let with_scores = query.scores.unwrap_or(false);
	let mut body = String::new();
	for candidate in &outcome.candidates {
		if with_scores {
			body.push_str(&format!("{}\t{:e}\n", candidate.text, candidate.score));
		} else {
			body.push_str(&candidate.text);
			body.push('\n');
		}
	}

	let status_text = match outcome.status {
		StreamStatus::BudgetExhaustedWithoutTarget => "budget-exhausted-without-target",
		StreamStatus::CutoffReached => "cutoff-reached",
		StreamStatus::SpaceExhausted => "space-exhausted",
		StreamStatus::TimeBudgetExceeded => "time-budget-exceeded",
		_ => "completed",
	};
	HttpResponse::Ok()
		.insert_header(("X-Stream-Status", status_text))
		.body(body)
}

/// Main entry point for the server.
///
/// Holds at most one bundle at a time behind a `Mutex`; generation runs
/// clone the inner `Arc` and work lock-free on the immutable model.
///
/// # Notes
/// - The server binds to 127.0.0.1:5000.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
	env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

	let shared_data = SharedData { bundle: None };
	let shared_model = web::Data::new(Mutex::new(shared_data));

	HttpServer::new(move || {
		App::new()
			.wrap(middleware::Logger::default())
			.wrap(Cors::permissive())
			.app_data(shared_model.clone())
			.service(put_bundle)
			.service(get_bundle)
			.service(get_generated)
	})
		.bind(("127.0.0.1", 5000))?
		.run()
		.await
}
