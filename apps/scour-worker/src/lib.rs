//! Companion indexer: embeds and stores the posts that search sessions hand over through the
//! result outbox, then flips each session to `results_saved`.

pub mod worker;

mod error;

pub use error::{Error, Result};

use clap::Parser;
use tracing_subscriber::EnvFilter;

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
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = scour_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.providers.embedding.dimensions).await?;

	let state = worker::WorkerState {
		db,
		embedding: config.providers.embedding,
		notify_channel: config.persistence.notify_channel,
	};

	worker::run_worker(state).await
}
