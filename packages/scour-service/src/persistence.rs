//! Links a session's posts to the stored search results once the companion indexer has saved
//! them.

use std::{collections::HashMap, time::Duration};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::{Error, Result, ResultStore};
use scour_config::Persistence;
use scour_domain::{post::Post, session::SessionStatus};
use scour_storage::models::NewLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
	/// Every row went in with one statement.
	Bulk,
	/// The bulk statement failed and rows were written one at a time.
	PerRow,
	/// Nothing to write.
	None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRowError {
	pub result_id: Uuid,
	pub external_id: String,
	pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkReport {
	pub session_id: Uuid,
	pub write_mode: WriteMode,
	pub inserted: usize,
	/// Rows skipped because the same result was already linked to the session.
	pub duplicates: usize,
	pub failed: usize,
	/// Posts with no stored search result.
	pub unresolved: usize,
	/// The wait for `results_saved` ran out of attempts.
	pub timed_out: bool,
	pub errors: Vec<LinkRowError>,
}

pub async fn link_results(
	store: &dyn ResultStore,
	cfg: &Persistence,
	message_id: Uuid,
	posts: &[Post],
) -> Result<LinkReport> {
	let Some(session) = store.session_by_message(message_id).await? else {
		return Err(Error::NotFound {
			message: format!("No search session for message {message_id}."),
		});
	};
	let session_id = session.session_id;
	let saved = wait_for_results_saved(store, cfg, session_id).await?;

	if !saved {
		tracing::warn!(
			session_id = %session_id,
			attempts = cfg.poll_max_attempts,
			"Search results were not saved in time. Linking what is available."
		);
	}

	let external_ids: Vec<String> = posts.iter().map(|post| post.id.clone()).collect();
	let resolved: HashMap<String, Uuid> =
		store.resolve_external_ids(&external_ids).await?.into_iter().collect();
	let mut rows = Vec::with_capacity(resolved.len());
	let mut row_external_ids = Vec::with_capacity(resolved.len());
	let mut unresolved = 0;

	for external_id in external_ids {
		match resolved.get(&external_id) {
			Some(result_id) => {
				rows.push(NewLink {
					link_id: Uuid::new_v4(),
					result_id: *result_id,
					session_id,
					message_id,
				});
				row_external_ids.push(external_id);
			},
			None => unresolved += 1,
		}
	}

	let mut report = LinkReport {
		session_id,
		write_mode: WriteMode::None,
		inserted: 0,
		duplicates: 0,
		failed: 0,
		unresolved,
		timed_out: !saved,
		errors: Vec::new(),
	};

	if rows.is_empty() {
		tracing::info!(session_id = %session_id, unresolved, "No search results to link.");

		return Ok(report);
	}

	let now = OffsetDateTime::now_utc();

	match store.insert_links_bulk(&rows, now).await {
		Ok(inserted) => {
			let inserted = inserted as usize;

			report.write_mode = WriteMode::Bulk;
			report.inserted = inserted;
			report.duplicates = rows.len().saturating_sub(inserted);
		},
		Err(err) => {
			tracing::warn!(
				error = %err,
				session_id = %session_id,
				rows = rows.len(),
				"Bulk link insert failed. Falling back to per-row inserts."
			);

			report.write_mode = WriteMode::PerRow;

			for (row, external_id) in rows.iter().zip(row_external_ids) {
				match store.insert_link(row, now).await {
					Ok(true) => report.inserted += 1,
					Ok(false) => report.duplicates += 1,
					Err(err) => {
						report.failed += 1;
						report.errors.push(LinkRowError {
							result_id: row.result_id,
							external_id,
							message: err.to_string(),
						});
					},
				}
			}
		},
	}

	tracing::info!(
		session_id = %session_id,
		write_mode = ?report.write_mode,
		inserted = report.inserted,
		duplicates = report.duplicates,
		failed = report.failed,
		unresolved = report.unresolved,
		"Linked search results to the session."
	);

	Ok(report)
}

/// Returns whether the session reached `results_saved` within the attempt budget.
///
/// Subscribes before the first check so a notification sent in between is not missed.
pub async fn wait_for_results_saved(
	store: &dyn ResultStore,
	cfg: &Persistence,
	session_id: Uuid,
) -> Result<bool> {
	let mut signal = store.completion_signal();
	let interval = Duration::from_millis(cfg.poll_interval_ms);
	let max_attempts = cfg.poll_max_attempts.max(1);

	for attempt in 1..=max_attempts {
		match store.session_status(session_id).await? {
			Some(SessionStatus::Pending) => {},
			Some(_) => return Ok(true),
			None => {
				return Err(Error::NotFound { message: format!("Session {session_id} vanished.") });
			},
		}

		if attempt == max_attempts {
			break;
		}

		tracing::debug!(session_id = %session_id, attempt, "Session is still pending.");

		match signal.as_mut() {
			Some(rx) => {
				let _ = tokio::time::timeout(interval, notified(rx, session_id)).await;
			},
			None => tokio::time::sleep(interval).await,
		}
	}

	Ok(false)
}

/// Resolves when `session_id` is announced, or when announcements may have been dropped.
async fn notified(rx: &mut broadcast::Receiver<Uuid>, session_id: Uuid) {
	loop {
		match rx.recv().await {
			Ok(id) if id == session_id => return,
			Ok(_) => {},
			Err(RecvError::Lagged(_)) => return,
			Err(RecvError::Closed) => std::future::pending::<()>().await,
		}
	}
}
