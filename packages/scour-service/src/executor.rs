//! Batched fan-out of sub-queries to the search provider.
//!
//! Sub-queries run in batches of `fanout.batch_size`; every call inside a batch runs
//! concurrently and batches are separated by `fanout.batch_delay_ms`. Each call first passes the
//! rate gate, then retries transient failures. A failed sub-query is recorded and never cancels
//! its siblings.

use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde::Serialize;
use tokio::time::Instant;

use crate::SearchProvider;
use scour_config::Fanout;
use scour_domain::{post::Post, rate_gate::RateGate};
use scour_providers::stream::ResponseMetadata;

const MIN_GATE_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Serialize)]
pub struct PerQueryResult {
	pub index: usize,
	pub query: String,
	#[serde(skip)]
	pub posts: Vec<Post>,
	pub post_count: usize,
	pub metadata: Option<ResponseMetadata>,
	pub attempts: u32,
	pub error: Option<String>,
	pub elapsed_ms: u64,
}
impl PerQueryResult {
	pub fn is_empty(&self) -> bool {
		self.error.is_none() && self.post_count == 0
	}
}

/// Reported after each sub-query settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
	pub completed: usize,
	pub total: usize,
	pub index: usize,
	pub post_count: usize,
	pub failed: bool,
}

pub struct ParallelExecutor {
	search: Arc<dyn SearchProvider>,
	gate: Arc<RateGate>,
	batch_size: usize,
	batch_delay: Duration,
	max_retries: u32,
	retry_delay: Duration,
}
impl ParallelExecutor {
	pub fn new(search: Arc<dyn SearchProvider>, gate: Arc<RateGate>, cfg: &Fanout) -> Self {
		Self {
			search,
			gate,
			batch_size: (cfg.batch_size as usize).max(1),
			batch_delay: Duration::from_millis(cfg.batch_delay_ms),
			max_retries: cfg.max_retries,
			retry_delay: Duration::from_millis(cfg.retry_delay_ms),
		}
	}

	/// Runs every sub-query and returns one result per input, in input order.
	pub async fn execute_all<F>(&self, queries: &[String], progress: F) -> Vec<PerQueryResult>
	where
		F: Fn(Progress) + Send + Sync,
	{
		let total = queries.len();
		let completed = AtomicUsize::new(0);
		let mut out = Vec::with_capacity(total);
		let batches: Vec<_> = queries.chunks(self.batch_size).collect();
		let batch_count = batches.len();

		for (batch_index, batch) in batches.into_iter().enumerate() {
			let offset = batch_index * self.batch_size;
			let runs = batch.iter().enumerate().map(|(position, query)| {
				let index = offset + position;
				let completed = &completed;
				let progress = &progress;

				async move {
					let result = self.run_one(index, query).await;
					let done = completed.fetch_add(1, Ordering::SeqCst) + 1;

					progress(Progress {
						completed: done,
						total,
						index,
						post_count: result.post_count,
						failed: result.error.is_some(),
					});

					result
				}
			});

			out.extend(futures::future::join_all(runs).await);

			if batch_index + 1 < batch_count && !self.batch_delay.is_zero() {
				tracing::debug!(
					batch = batch_index + 1,
					batch_count,
					delay_ms = self.batch_delay.as_millis() as u64,
					"Waiting before the next sub-query batch."
				);
				tokio::time::sleep(self.batch_delay).await;
			}
		}

		out
	}

	async fn run_one(&self, index: usize, query: &str) -> PerQueryResult {
		let started = Instant::now();
		let mut attempts = 0;

		loop {
			self.wait_for_gate().await;

			attempts += 1;

			match self.search.search(query).await {
				Ok(response) => {
					let post_count = response.posts.len();

					tracing::info!(index, post_count, attempts, "Sub-query finished.");

					return PerQueryResult {
						index,
						query: query.to_string(),
						posts: response.posts,
						post_count,
						metadata: Some(response.metadata),
						attempts,
						error: None,
						elapsed_ms: started.elapsed().as_millis() as u64,
					};
				},
				Err(err) if err.is_transient() && attempts <= self.max_retries => {
					tracing::warn!(
						error = %err,
						index,
						attempt = attempts,
						"Sub-query failed. Retrying."
					);
					tokio::time::sleep(self.retry_delay).await;
				},
				Err(err) => {
					tracing::error!(error = %err, index, attempts, "Sub-query failed.");

					return PerQueryResult {
						index,
						query: query.to_string(),
						posts: Vec::new(),
						post_count: 0,
						metadata: None,
						attempts,
						error: Some(err.to_string()),
						elapsed_ms: started.elapsed().as_millis() as u64,
					};
				},
			}
		}
	}

	async fn wait_for_gate(&self) {
		while !self.gate.admit() {
			let wait = self.gate.retry_after().max(MIN_GATE_WAIT);

			tracing::info!(
				wait_ms = wait.as_millis() as u64,
				max_requests = self.gate.max_requests(),
				window_ms = self.gate.window().as_millis() as u64,
				"Rate gate is full. Waiting."
			);
			tokio::time::sleep(wait).await;
		}
	}
}
