use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use scour_config::Postgres;
use scour_domain::session::{MessageRole, SessionStatus};
use scour_storage::{
	db::Db,
	links, messages,
	models::{NewLink, NewSearchResult},
	outbox, results, sessions, sub_queries,
};
use scour_testkit::TestDatabase;

const VECTOR_DIM: u32 = 3;

async fn open(test_db: &TestDatabase) -> Db {
	open_dsn(test_db.dsn()).await
}

async fn open_dsn(dsn: &str) -> Db {
	let cfg = Postgres { dsn: dsn.to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(VECTOR_DIM).await.expect("Failed to ensure schema.");

	db
}

fn result(external_id: &str, content: &str, embedding: Option<Vec<f32>>) -> NewSearchResult {
	NewSearchResult {
		external_id: external_id.to_string(),
		content: content.to_string(),
		source_title: "@scour".to_string(),
		source_url: format!("https://x.com/scour/status/{external_id}"),
		metadata: json!({ "id": external_id }),
		embedding,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SCOUR_PG_DSN to run."]
async fn upserting_twice_keeps_one_row() {
	let Some(base_dsn) = scour_testkit::env_dsn() else {
		eprintln!("Skipping upserting_twice_keeps_one_row; set SCOUR_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = open(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let first = results::upsert_search_result(
		&db.pool,
		&result("1790000000000000001", "first", Some(vec![0.1, 0.2, 0.3])),
		now,
	)
	.await
	.expect("Failed to upsert result.");
	let second = results::upsert_search_result(
		&db.pool,
		&result("1790000000000000001", "second", None),
		now,
	)
	.await
	.expect("Failed to upsert result.");
	let count: i64 = sqlx::query_scalar("SELECT count(*) FROM search_results")
		.fetch_one(&db.pool)
		.await
		.expect("Failed to count results.");
	let stored = results::get_by_external_id(&db.pool, "1790000000000000001")
		.await
		.expect("Failed to load result.")
		.expect("Expected stored result.");

	assert_eq!(first, second);
	assert_eq!(count, 1);
	assert_eq!(stored.content, "second");
	assert_eq!(stored.embedding, Some(vec![0.1, 0.2, 0.3]));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SCOUR_PG_DSN to run."]
async fn session_status_only_moves_forward() {
	let Some(base_dsn) = scour_testkit::env_dsn() else {
		eprintln!("Skipping session_status_only_moves_forward; set SCOUR_PG_DSN to run this test.");

		return;
	};

	scour_testkit::with_test_db(&base_dsn, |test_db| {
		let dsn = test_db.dsn().to_string();

		async move {
			let db = open_dsn(&dsn).await;
			let now = OffsetDateTime::now_utc();
			let session_id = Uuid::new_v4();
			let message_id = Uuid::new_v4();

			sessions::insert_session(&db.pool, session_id, message_id, "AI regulation", now)
				.await
				.expect("Failed to insert session.");

			assert!(
				sessions::advance_status(&db.pool, session_id, SessionStatus::ResultsSaved, now)
					.await
					.expect("Failed to advance session.")
			);
			assert!(
				!sessions::advance_status(&db.pool, session_id, SessionStatus::ResultsSaved, now)
					.await
					.expect("Failed to advance session.")
			);
			assert!(
				sessions::advance_status(&db.pool, session_id, SessionStatus::Completed, now)
					.await
					.expect("Failed to advance session.")
			);

			let row = sessions::get_session_by_message(&db.pool, message_id)
				.await
				.expect("Failed to load session.")
				.expect("Expected session.");

			assert_eq!(row.status, "completed");

			sessions::notify_status(&db.pool, "scour_session_status", session_id)
				.await
				.expect("Failed to notify.");

			db.pool.close().await;

			Ok::<_, scour_testkit::Error>(())
		}
	})
	.await
	.expect("Test database run failed.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SCOUR_PG_DSN to run."]
async fn links_resolve_in_bulk_and_skip_duplicates() {
	let Some(base_dsn) = scour_testkit::env_dsn() else {
		eprintln!(
			"Skipping links_resolve_in_bulk_and_skip_duplicates; set SCOUR_PG_DSN to run this test."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = open(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let chat_id = Uuid::new_v4();
	let message_id = Uuid::new_v4();
	let session_id = Uuid::new_v4();

	messages::insert_message(&db.pool, message_id, chat_id, MessageRole::User, "AI regulation", now)
		.await
		.expect("Failed to insert message.");
	sub_queries::insert_sub_queries(
		&db.pool,
		chat_id,
		Some(message_id),
		&["a min_faves:10 lang:en".to_string(), "b min_faves:50 lang:ja".to_string()],
		now,
	)
	.await
	.expect("Failed to insert sub-queries.");
	sessions::insert_session(&db.pool, session_id, message_id, "AI regulation", now)
		.await
		.expect("Failed to insert session.");

	for id in ["10", "11"] {
		results::upsert_search_result(&db.pool, &result(id, id, None), now)
			.await
			.expect("Failed to upsert result.");
	}

	let resolved = results::resolve_external_ids(
		&db.pool,
		&["10".to_string(), "11".to_string(), "missing".to_string()],
	)
	.await
	.expect("Failed to resolve ids.");

	assert_eq!(resolved.len(), 2);

	let rows: Vec<NewLink> = resolved
		.iter()
		.map(|(_, result_id)| NewLink {
			link_id: Uuid::new_v4(),
			result_id: *result_id,
			session_id,
			message_id,
		})
		.collect();

	assert_eq!(links::insert_links_bulk(&db.pool, &rows, now).await.expect("Bulk failed."), 2);
	assert!(!links::insert_link(&db.pool, &rows[0], now).await.expect("Insert failed."));

	links::update_link_scores(&db.pool, rows[1].link_id, 0.5, 0.5, 0.5)
		.await
		.expect("Failed to update scores.");

	let linked = links::list_linked_results(&db.pool, session_id, message_id)
		.await
		.expect("Failed to list links.");

	assert_eq!(linked.len(), 2);
	assert_eq!(linked[0].link_id, rows[1].link_id);
	assert_eq!(
		sub_queries::count_for_chat(&db.pool, chat_id).await.expect("Failed to count."),
		2
	);
	assert_eq!(
		messages::list_chat_messages(&db.pool, chat_id).await.expect("Failed to list.").len(),
		1
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SCOUR_PG_DSN to run."]
async fn outbox_jobs_are_claimed_once() {
	let Some(base_dsn) = scour_testkit::env_dsn() else {
		eprintln!("Skipping outbox_jobs_are_claimed_once; set SCOUR_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = open(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let session_id = Uuid::new_v4();

	sessions::insert_session(&db.pool, session_id, Uuid::new_v4(), "q", now)
		.await
		.expect("Failed to insert session.");

	let outbox_id =
		outbox::enqueue_result_outbox(&db.pool, session_id, &json!({ "posts": [] }), now)
			.await
			.expect("Failed to enqueue job.");
	let claimed = outbox::claim_next_result_outbox_job(&db, now, 30)
		.await
		.expect("Failed to claim job.")
		.expect("Expected a job.");

	assert_eq!(claimed.outbox_id, outbox_id);
	assert!(
		outbox::claim_next_result_outbox_job(&db, now, 30)
			.await
			.expect("Failed to claim job.")
			.is_none()
	);

	outbox::mark_result_outbox_failed(
		&db,
		outbox_id,
		1,
		"embedding failed",
		now,
		now,
	)
	.await
	.expect("Failed to mark job failed.");

	let retried = outbox::claim_next_result_outbox_job(&db, now, 30)
		.await
		.expect("Failed to claim job.")
		.expect("Expected the failed job again.");

	assert_eq!(retried.attempts, 1);
	assert_eq!(retried.last_error.as_deref(), Some("embedding failed"));

	outbox::mark_result_outbox_done(&db.pool, outbox_id, now)
		.await
		.expect("Failed to mark job done.");

	assert!(
		outbox::claim_next_result_outbox_job(&db, now + time::Duration::minutes(5), 30)
			.await
			.expect("Failed to claim job.")
			.is_none()
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
