use serde_json::json;
use time::macros::{date, datetime};

use scour_config::Planner;
use scour_domain::{
	plan::{self, DateWindow},
	post::{self, NormalizeReject, PostBatch},
	session::SessionStatus,
};

#[test]
fn tweet_shape_normalizes() {
	let raw = json!({
		"id": "1790000000000000001",
		"text": "EU AI Act passes final vote",
		"created_at": "2024-05-21T09:30:00Z",
		"lang": "en",
		"author": { "id": "42", "username": "eu_commission", "name": "EU", "verified": true },
		"public_metrics": { "reply_count": 3, "like_count": "120", "retweet_count": 40 },
		"entities": { "urls": [{ "expanded_url": "https://europa.eu/act" }] },
		"conversation_id": "1790000000000000001"
	});
	let post = post::normalize(&raw).expect("Tweet-like record must normalize.");

	assert_eq!(post.id, "1790000000000000001");
	assert_eq!(post.author.handle.as_deref(), Some("eu_commission"));
	assert!(post.author.verified);
	assert_eq!(post.engagement.like_count, 120);
	assert_eq!(post.engagement.repost_count, 40);
	assert_eq!(post.created_at, datetime!(2024-05-21 09:30:00 UTC));
	assert_eq!(post.links, vec!["https://europa.eu/act".to_string()]);
	assert_eq!(post.lang.as_deref(), Some("en"));
	assert_eq!(post.url(), "https://x.com/eu_commission/status/1790000000000000001");
}

#[test]
fn rest_id_shape_normalizes() {
	let raw = json!({
		"rest_id": "1790000000000000002",
		"core": {
			"user_results": {
				"result": {
					"rest_id": "7",
					"legacy": { "screen_name": "chipwatch", "name": "Chip Watch" }
				}
			}
		},
		"legacy": {
			"full_text": "New export controls announced",
			"created_at": "Wed Oct 10 20:19:24 +0000 2018",
			"favorite_count": 55,
			"retweet_count": 9,
			"lang": "en"
		},
		"views": { "count": "1000" }
	});
	let post = post::normalize(&raw).expect("Rest-id record must normalize.");

	assert_eq!(post.id, "1790000000000000002");
	assert_eq!(post.text, "New export controls announced");
	assert_eq!(post.author.id.as_deref(), Some("7"));
	assert_eq!(post.source_title(), "Chip Watch (@chipwatch)");
	assert_eq!(post.engagement.like_count, 55);
	assert_eq!(post.engagement.impression_count, 1_000);
	assert_eq!(post.created_at, datetime!(2018-10-10 20:19:24 UTC));
}

#[test]
fn tweet_fields_win_over_rest_fields() {
	let raw = json!({
		"id": "1790000000000000003",
		"rest_id": "1790000000000000999",
		"text": "tweet text",
		"legacy": { "full_text": "legacy text", "favorite_count": 1 },
		"public_metrics": { "like_count": 10 }
	});
	let post = post::normalize(&raw).expect("Merged record must normalize.");

	assert_eq!(post.id, "1790000000000000003");
	assert_eq!(post.text, "tweet text");
	assert_eq!(post.engagement.like_count, 10);
}

#[test]
fn records_without_an_id_are_rejected() {
	assert_eq!(post::normalize(&json!({ "text": "no id" })), Err(NormalizeReject::MissingId));
	assert_eq!(post::normalize(&json!({ "id": "  " })), Err(NormalizeReject::MissingId));
	assert_eq!(post::normalize(&json!(["1"])), Err(NormalizeReject::NotAnObject));
}

#[test]
fn batch_keeps_the_first_occurrence() {
	let mut batch = PostBatch::new();
	let first = post::normalize(&json!({ "id": "100", "text": "first" })).expect("Must normalize.");
	let again = post::normalize(&json!({ "id": "100", "text": "again" })).expect("Must normalize.");
	let newer =
		post::normalize(&json!({ "id": "1000", "text": "newer" })).expect("Must normalize.");

	assert!(batch.push(first));
	assert!(!batch.push(again));
	assert!(batch.push(newer));
	assert_eq!(batch.newest_id(), Some("1000"));
	assert_eq!(batch.oldest_id(), Some("100"));

	let posts = batch.into_posts();

	assert_eq!(posts.len(), 2);
	assert_eq!(posts[0].text, "first");
}

#[test]
fn default_tiers_split_ten_queries_four_three_three() {
	let cfg = Planner::default();
	let tiers = plan::resolve_tiers(&cfg, None);
	let allocation = plan::allocate(10, &tiers);
	let summary: Vec<(&str, u32, u32)> = allocation
		.iter()
		.map(|slot| (slot.language.as_str(), slot.min_engagement, slot.count))
		.collect();

	assert_eq!(summary, vec![("en", 10, 4), ("ja", 50, 3), ("zh", 100, 3)]);

	let keywords: Vec<String> = (0..10).map(|index| format!("AI regulation {index}")).collect();
	let window = plan::infer_date_window("latest on AI regulation", date!(2025 - 03 - 15));
	let queries = plan::scope_keywords(&keywords, &allocation, window);

	assert_eq!(window, Some(DateWindow { since: date!(2025 - 03 - 13), until: None }));
	assert_eq!(queries.len(), 10);
	assert_eq!(queries[0].render(), "AI regulation 0 min_faves:10 lang:en since:2025-03-13");
	assert_eq!(queries[9].render(), "AI regulation 9 min_faves:100 lang:zh since:2025-03-13");
}

#[test]
fn sessions_never_move_backward() {
	assert!(!SessionStatus::Completed.can_advance_to(SessionStatus::Pending));
	assert!(!SessionStatus::ResultsSaved.can_advance_to(SessionStatus::Pending));
	assert_eq!(SessionStatus::Pending.predecessors(), &[] as &[&str]);
}
