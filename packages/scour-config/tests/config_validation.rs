use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use scour_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_with<F>(edit: F) -> String
where
	F: FnOnce(&mut toml::Table),
{
	let mut value: Value =
		toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let root = value.as_table_mut().expect("Sample config must be a table.");

	edit(root);

	toml::to_string(&value).expect("Failed to render sample config.")
}

fn table<'a>(root: &'a mut toml::Table, path: &[&str]) -> &'a mut toml::Table {
	let mut current = root;

	for key in path {
		current = current
			.get_mut(*key)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Sample config must include [{key}]."));
	}

	current
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("scour_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> scour_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = scour_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse test config.")
}

#[test]
fn sample_config_loads() {
	let cfg = load_payload(SAMPLE_CONFIG_TOML.to_string()).expect("Sample config must load.");

	assert_eq!(cfg.fanout.batch_size, 10);
	assert_eq!(cfg.rate_limit.max_requests, 30);
	assert_eq!(cfg.persistence.poll_max_attempts, 60);
	assert_eq!(cfg.planner.tiers.len(), 3);
}

#[test]
fn tuning_sections_fall_back_to_defaults() {
	let payload = sample_with(|root| {
		for section in ["planner", "fanout", "rate_limit", "persistence", "scoring"] {
			root.remove(section);
		}
	});
	let cfg = load_payload(payload).expect("Config without tuning sections must load.");

	assert_eq!(cfg.fanout.batch_delay_ms, 5_000);
	assert_eq!(cfg.fanout.max_retries, 2);
	assert_eq!(cfg.fanout.retry_delay_ms, 3_000);
	assert_eq!(cfg.rate_limit.window_ms, 60_000);
	assert_eq!(cfg.persistence.poll_interval_ms, 1_000);
	assert_eq!(cfg.planner.min_queries, 6);
	assert_eq!(cfg.planner.max_queries, 10);
}

#[test]
fn search_provider_requires_credentials() {
	let payload = sample_with(|root| {
		table(root, &["providers", "search"])
			.insert("api_key".to_string(), Value::String("  ".to_string()));
	});
	let err = load_payload(payload).expect_err("Expected missing credential error.");

	assert!(
		err.to_string().contains("Provider search requires either api_key or a token endpoint."),
		"Unexpected error: {err}"
	);
}

#[test]
fn token_endpoint_satisfies_search_credentials() {
	let payload = sample_with(|root| {
		let search = table(root, &["providers", "search"]);
		let mut token = toml::Table::new();

		token.insert("url".to_string(), Value::String("http://127.0.0.1:9000/token".to_string()));
		token.insert("client_id".to_string(), Value::String("client".to_string()));
		token.insert("client_secret".to_string(), Value::String("secret".to_string()));
		token.insert("scope".to_string(), Value::String(" ".to_string()));
		search.remove("api_key");
		search.insert("token".to_string(), Value::Table(token));
	});
	let cfg = load_payload(payload).expect("Token-only search config must load.");
	let token = cfg.providers.search.token.expect("Expected token endpoint.");

	assert!(cfg.providers.search.api_key.is_none());
	assert!(token.scope.is_none());
	assert_eq!(token.refresh_margin_secs, 60);
}

#[test]
fn tier_shares_must_sum_to_one() {
	let mut cfg = base_config();

	cfg.planner.tiers[0].share = 0.6;

	let err = scour_config::validate(&cfg).expect_err("Expected share validation error.");

	assert!(matches!(err, Error::Validation { .. }));
	assert!(err.to_string().contains("must sum to 1.0"), "Unexpected error: {err}");
}

#[test]
fn target_queries_must_be_within_bounds() {
	let mut cfg = base_config();

	cfg.planner.target_queries = 12;

	assert!(scour_config::validate(&cfg).is_err());

	cfg.planner.target_queries = 6;

	assert!(scour_config::validate(&cfg).is_ok());
}

#[test]
fn notify_channel_must_be_identifier() {
	let mut cfg = base_config();

	cfg.persistence.notify_channel = "scour-status; DROP".to_string();

	let err = scour_config::validate(&cfg).expect_err("Expected channel validation error.");

	assert!(err.to_string().contains("persistence.notify_channel"), "Unexpected error: {err}");
}

#[test]
fn scoring_weights_must_be_finite() {
	let mut cfg = base_config();

	cfg.scoring.rerank_weight = f32::NAN;

	let err = scour_config::validate(&cfg).expect_err("Expected weight validation error.");

	assert!(err.to_string().contains("scoring.rerank_weight must be a finite number."));
}

#[test]
fn missing_file_reports_path() {
	let path = env::temp_dir().join("scour_config_missing.toml");
	let err = scour_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
}
