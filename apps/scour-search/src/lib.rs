//! Runs the search pipeline once for a single chat message and prints the outcome as JSON.

use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use scour_service::{PgResultStore, Providers, ScourService, SearchOutcome, SearchRequest};
use scour_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = scour_cli::VERSION,
	rename_all = "kebab",
	styles = scour_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
	/// Chat the message belongs to. Reuse it to answer a clarification prompt.
	#[arg(long, value_name = "UUID")]
	pub chat_id: Option<Uuid>,
	#[arg(long, short = 'm', value_name = "TEXT")]
	pub message: String,
	/// Restrict every sub-query to one language, e.g. `ja`.
	#[arg(long, value_name = "CODE")]
	pub language: Option<String>,
}

#[derive(Serialize)]
struct Output<'a> {
	chat_id: Uuid,
	outcome: &'a SearchOutcome,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = scour_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.providers.embedding.dimensions).await?;

	let store = PgResultStore::with_listener(db, &config.persistence.notify_channel).await?;
	let providers = Providers::from_config(&config)?;
	let chat_id = args.chat_id.unwrap_or_else(Uuid::new_v4);

	tracing::info!(chat_id = %chat_id, "Running search.");

	let service = ScourService::new(config, Arc::new(store), providers);
	let req =
		SearchRequest { chat_id, message_id: None, query: args.message, language: args.language };
	let outcome = service
		.search_with_progress(req, |progress| {
			tracing::info!(
				completed = progress.completed,
				total = progress.total,
				index = progress.index,
				posts = progress.post_count,
				failed = progress.failed,
				"Sub-query settled."
			);
		})
		.await?;

	println!("{}", serde_json::to_string_pretty(&Output { chat_id, outcome: &outcome })?);

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_message_and_optional_scope() {
		let args = Args::try_parse_from([
			"scour-search",
			"-c",
			"scour.toml",
			"--chat-id",
			"6f1c7f2e-8d3b-4f7a-9a55-0d7c1b2e3f40",
			"-m",
			"AI regulation",
			"--language",
			"ja",
		])
		.expect("Arguments must parse.");

		assert_eq!(args.message, "AI regulation");
		assert_eq!(args.language.as_deref(), Some("ja"));
		assert!(args.chat_id.is_some());
		assert!(Args::try_parse_from(["scour-search", "-c", "scour.toml"]).is_err());
	}
}
