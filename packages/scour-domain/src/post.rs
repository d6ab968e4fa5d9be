//! Canonical post model and the boundary decode from upstream record shapes.
//!
//! The search workflow returns records in two shapes: a tweet-like shape (`id`, `author`,
//! `public_metrics`) and a GraphQL rest-id shape (`rest_id`, `legacy`, `core.user_results`).
//! Both are decoded leniently into typed structs and merged field by field, preferring the
//! tweet-like value. Nothing past this module sees raw JSON.

use std::{cmp::Ordering, collections::HashSet};

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;
use time::{
	Date, OffsetDateTime, PrimitiveDateTime, format_description::well_known::Rfc3339,
	macros::format_description,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeReject {
	NotAnObject,
	MissingId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
	pub id: String,
	pub text: String,
	pub author: Author,
	pub engagement: Engagement,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	pub links: Vec<String>,
	pub media: Vec<Media>,
	pub lang: Option<String>,
	pub thread: ThreadRefs,
}
impl Post {
	pub fn url(&self) -> String {
		let handle = self.author.handle.as_deref().unwrap_or("i");

		format!("https://x.com/{handle}/status/{}", self.id)
	}

	pub fn source_title(&self) -> String {
		match (self.author.display_name.as_deref(), self.author.handle.as_deref()) {
			(Some(name), Some(handle)) => format!("{name} (@{handle})"),
			(None, Some(handle)) => format!("@{handle}"),
			(Some(name), None) => name.to_string(),
			(None, None) => format!("Post {}", self.id),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
	pub id: Option<String>,
	pub handle: Option<String>,
	pub display_name: Option<String>,
	pub verified: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
	pub reply_count: u64,
	pub like_count: u64,
	pub repost_count: u64,
	pub quote_count: u64,
	pub impression_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
	pub kind: String,
	pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRefs {
	pub conversation_id: Option<String>,
	pub in_reply_to_id: Option<String>,
	pub quoted_id: Option<String>,
}

/// Posts from one stream, deduplicated by external id with first occurrence winning.
#[derive(Debug, Default)]
pub struct PostBatch {
	seen: HashSet<String>,
	posts: Vec<Post>,
	newest_id: Option<String>,
	oldest_id: Option<String>,
}
impl PostBatch {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns false when a post with the same id was already accepted.
	pub fn push(&mut self, post: Post) -> bool {
		if !self.seen.insert(post.id.clone()) {
			return false;
		}

		if self.newest_id.as_deref().map(|id| compare_ids(&post.id, id).is_gt()).unwrap_or(true) {
			self.newest_id = Some(post.id.clone());
		}
		if self.oldest_id.as_deref().map(|id| compare_ids(&post.id, id).is_lt()).unwrap_or(true) {
			self.oldest_id = Some(post.id.clone());
		}

		self.posts.push(post);

		true
	}

	pub fn len(&self) -> usize {
		self.posts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.posts.is_empty()
	}

	pub fn newest_id(&self) -> Option<&str> {
		self.newest_id.as_deref()
	}

	pub fn oldest_id(&self) -> Option<&str> {
		self.oldest_id.as_deref()
	}

	pub fn into_posts(self) -> Vec<Post> {
		self.posts
	}
}

/// Body of a result-outbox job: the merged posts of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
	pub posts: Vec<Post>,
}

/// Orders external ids the way snowflake ids sort: a longer numeric id is newer.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
	a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

pub fn normalize(raw: &Value) -> Result<Post, NormalizeReject> {
	normalize_at(raw, OffsetDateTime::now_utc())
}

pub fn normalize_at(raw: &Value, now: OffsetDateTime) -> Result<Post, NormalizeReject> {
	if !raw.is_object() {
		return Err(NormalizeReject::NotAnObject);
	}

	let tweet: TweetShape = serde_json::from_value(raw.clone()).unwrap_or_default();
	let rest: RestShape = serde_json::from_value(raw.clone()).unwrap_or_default();

	merge_shapes(tweet, rest, now)
}

/// Converts a raw timestamp to UTC, substituting `now` when it is absent or unparseable.
pub fn coerce_timestamp(raw: Option<&Value>, now: OffsetDateTime) -> OffsetDateTime {
	let parsed = match raw {
		Some(Value::Number(number)) => number
			.as_i64()
			.or_else(|| number.as_f64().filter(|value| value.is_finite()).map(|value| value as i64))
			.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok()),
		Some(Value::String(text)) => parse_timestamp_text(text.trim()),
		_ => None,
	};

	parsed.map(|ts| ts.to_offset(time::UtcOffset::UTC)).unwrap_or(now)
}

fn parse_timestamp_text(text: &str) -> Option<OffsetDateTime> {
	if text.is_empty() {
		return None;
	}
	if text.chars().all(|ch| ch.is_ascii_digit()) {
		return text
			.parse::<i64>()
			.ok()
			.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());
	}
	if let Ok(ts) = OffsetDateTime::parse(text, &Rfc3339) {
		return Some(ts);
	}

	let twitter = format_description!(
		"[weekday repr:short] [month repr:short] [day] [hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute] [year]"
	);

	if let Ok(ts) = OffsetDateTime::parse(text, twitter) {
		return Some(ts);
	}

	let naive = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

	if let Ok(ts) = PrimitiveDateTime::parse(text, naive) {
		return Some(ts.assume_utc());
	}

	let date_only = format_description!("[year]-[month]-[day]");

	Date::parse(text, date_only).ok().map(|date| date.midnight().assume_utc())
}

fn merge_shapes(
	tweet: TweetShape,
	rest: RestShape,
	now: OffsetDateTime,
) -> Result<Post, NormalizeReject> {
	let legacy = rest.legacy.unwrap_or_default();
	let rest_user = rest
		.core
		.and_then(|core| core.user_results)
		.and_then(|results| results.result)
		.unwrap_or_default();
	let rest_user_legacy = rest_user.legacy.unwrap_or_default();
	let author = tweet.author.unwrap_or_default();
	let metrics = tweet.public_metrics.unwrap_or_default();
	let id = tweet
		.id
		.or(tweet.id_str)
		.or(rest.rest_id)
		.filter(|id| !id.trim().is_empty())
		.ok_or(NormalizeReject::MissingId)?;
	let text = tweet.text.or(tweet.full_text).or(legacy.full_text).unwrap_or_default();
	let created_at =
		coerce_timestamp(tweet.created_at.as_ref().or(legacy.created_at.as_ref()), now);
	let author = Author {
		id: author.id.or(tweet.author_id).or(rest_user.rest_id).or(legacy.user_id_str),
		handle: author.username.or(author.screen_name).or(rest_user_legacy.screen_name),
		display_name: author.name.or(rest_user_legacy.name),
		verified: author
			.verified
			.or(author.is_blue_verified)
			.or(rest_user_legacy.verified)
			.or(rest_user.is_blue_verified)
			.unwrap_or(false),
	};
	let engagement = Engagement {
		reply_count: metrics.reply_count.or(tweet.reply_count).or(legacy.reply_count).unwrap_or(0),
		like_count: metrics
			.like_count
			.or(tweet.like_count)
			.or(tweet.favorite_count)
			.or(legacy.favorite_count)
			.unwrap_or(0),
		repost_count: metrics
			.retweet_count
			.or(metrics.repost_count)
			.or(tweet.retweet_count)
			.or(legacy.retweet_count)
			.unwrap_or(0),
		quote_count: metrics.quote_count.or(tweet.quote_count).or(legacy.quote_count).unwrap_or(0),
		impression_count: metrics
			.impression_count
			.or(tweet.view_count)
			.or(rest.views.and_then(|views| views.count))
			.unwrap_or(0),
	};
	let tweet_entities = tweet.entities.unwrap_or_default();
	let legacy_entities = legacy.entities.unwrap_or_default();
	let urls =
		if tweet_entities.urls.is_empty() { legacy_entities.urls } else { tweet_entities.urls };
	let mut links = Vec::with_capacity(urls.len());

	for url in urls {
		if let Some(link) = url.expanded_url.or(url.url)
			&& !links.contains(&link)
		{
			links.push(link);
		}
	}

	let media = [
		tweet.media,
		tweet_entities.media,
		legacy.extended_entities.unwrap_or_default().media,
		legacy_entities.media,
	]
	.into_iter()
	.find(|media| !media.is_empty())
	.unwrap_or_default()
	.into_iter()
	.filter_map(|item| {
		let url = item.media_url_https.or(item.media_url).or(item.url)?;

		Some(Media { kind: item.kind.unwrap_or_else(|| "photo".to_string()), url })
	})
	.collect();
	let thread = ThreadRefs {
		conversation_id: tweet.conversation_id.or(legacy.conversation_id_str),
		in_reply_to_id: tweet
			.in_reply_to_status_id
			.or(tweet.in_reply_to_id)
			.or(legacy.in_reply_to_status_id_str),
		quoted_id: tweet.quoted_status_id.or(tweet.quoted_tweet_id).or(legacy.quoted_status_id_str),
	};

	Ok(Post {
		id,
		text,
		author,
		engagement,
		created_at,
		links,
		media,
		lang: tweet.lang.or(legacy.lang).filter(|lang| !lang.trim().is_empty()),
		thread,
	})
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TweetShape {
	#[serde(deserialize_with = "lenient_string")]
	id: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	id_str: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	text: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	full_text: Option<String>,
	created_at: Option<Value>,
	#[serde(deserialize_with = "lenient")]
	author: Option<TweetAuthor>,
	#[serde(deserialize_with = "lenient_string")]
	author_id: Option<String>,
	#[serde(deserialize_with = "lenient")]
	public_metrics: Option<TweetMetrics>,
	#[serde(deserialize_with = "lenient_u64")]
	reply_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	like_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	favorite_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	retweet_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	quote_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	view_count: Option<u64>,
	#[serde(deserialize_with = "lenient_string")]
	lang: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	conversation_id: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	in_reply_to_status_id: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	in_reply_to_id: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	quoted_status_id: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	quoted_tweet_id: Option<String>,
	#[serde(deserialize_with = "lenient")]
	entities: Option<Entities>,
	#[serde(deserialize_with = "lenient_vec")]
	media: Vec<MediaEntity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TweetAuthor {
	#[serde(deserialize_with = "lenient_string")]
	id: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	username: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	screen_name: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	name: Option<String>,
	#[serde(deserialize_with = "lenient")]
	verified: Option<bool>,
	#[serde(deserialize_with = "lenient")]
	is_blue_verified: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TweetMetrics {
	#[serde(deserialize_with = "lenient_u64")]
	reply_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	like_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	retweet_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	repost_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	quote_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	impression_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RestShape {
	#[serde(deserialize_with = "lenient_string")]
	rest_id: Option<String>,
	#[serde(deserialize_with = "lenient")]
	legacy: Option<RestLegacy>,
	#[serde(deserialize_with = "lenient")]
	core: Option<RestCore>,
	#[serde(deserialize_with = "lenient")]
	views: Option<RestViews>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RestLegacy {
	#[serde(deserialize_with = "lenient_string")]
	full_text: Option<String>,
	created_at: Option<Value>,
	#[serde(deserialize_with = "lenient_u64")]
	favorite_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	reply_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	retweet_count: Option<u64>,
	#[serde(deserialize_with = "lenient_u64")]
	quote_count: Option<u64>,
	#[serde(deserialize_with = "lenient_string")]
	lang: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	user_id_str: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	conversation_id_str: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	in_reply_to_status_id_str: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	quoted_status_id_str: Option<String>,
	#[serde(deserialize_with = "lenient")]
	entities: Option<Entities>,
	#[serde(deserialize_with = "lenient")]
	extended_entities: Option<Entities>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RestCore {
	#[serde(deserialize_with = "lenient")]
	user_results: Option<RestUserResults>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RestUserResults {
	#[serde(deserialize_with = "lenient")]
	result: Option<RestUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RestUser {
	#[serde(deserialize_with = "lenient_string")]
	rest_id: Option<String>,
	#[serde(deserialize_with = "lenient")]
	is_blue_verified: Option<bool>,
	#[serde(deserialize_with = "lenient")]
	legacy: Option<RestUserLegacy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RestUserLegacy {
	#[serde(deserialize_with = "lenient_string")]
	screen_name: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	name: Option<String>,
	#[serde(deserialize_with = "lenient")]
	verified: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RestViews {
	#[serde(deserialize_with = "lenient_u64")]
	count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Entities {
	#[serde(deserialize_with = "lenient_vec")]
	urls: Vec<UrlEntity>,
	#[serde(deserialize_with = "lenient_vec")]
	media: Vec<MediaEntity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UrlEntity {
	#[serde(deserialize_with = "lenient_string")]
	expanded_url: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaEntity {
	#[serde(rename = "type", deserialize_with = "lenient_string")]
	kind: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	media_url_https: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	media_url: Option<String>,
	#[serde(deserialize_with = "lenient_string")]
	url: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
	D: Deserializer<'de>,
	T: DeserializeOwned,
{
	let value = Option::<Value>::deserialize(deserializer)?;

	Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
	D: Deserializer<'de>,
	T: DeserializeOwned,
{
	let value = Option::<Value>::deserialize(deserializer)?;
	let Some(Value::Array(items)) = value else {
		return Ok(Vec::new());
	};

	Ok(items.into_iter().filter_map(|item| serde_json::from_value(item).ok()).collect())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Option::<Value>::deserialize(deserializer)?;

	Ok(match value {
		Some(Value::String(text)) if !text.is_empty() => Some(text),
		Some(Value::Number(number)) => Some(number.to_string()),
		_ => None,
	})
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Option::<Value>::deserialize(deserializer)?;

	Ok(match value {
		Some(Value::Number(number)) => number.as_u64().or_else(|| {
			number
				.as_f64()
				.filter(|value| value.is_finite() && *value >= 0.0)
				.map(|value| value as u64)
		}),
		Some(Value::String(text)) => text.trim().replace(',', "").parse::<u64>().ok(),
		_ => None,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fixed_now() -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("Valid timestamp.")
	}

	#[test]
	fn numeric_timestamp_is_unix_seconds() {
		let value = serde_json::json!(1_600_000_000);
		let ts = coerce_timestamp(Some(&value), fixed_now());

		assert_eq!(ts.unix_timestamp(), 1_600_000_000);
	}

	#[test]
	fn twitter_style_timestamp_parses() {
		let value = serde_json::json!("Wed Oct 10 20:19:24 +0000 2018");
		let ts = coerce_timestamp(Some(&value), fixed_now());

		assert_eq!(ts.year(), 2018);
		assert_eq!(ts.hour(), 20);
	}

	#[test]
	fn date_only_and_naive_timestamps_parse_as_utc() {
		let date = serde_json::json!("2024-03-01");
		let naive = serde_json::json!("2024-03-01 12:30:00");

		assert_eq!(coerce_timestamp(Some(&date), fixed_now()).unix_timestamp(), 1_709_251_200);
		assert_eq!(coerce_timestamp(Some(&naive), fixed_now()).unix_timestamp(), 1_709_296_200);
	}

	#[test]
	fn malformed_or_missing_timestamp_falls_back_to_now() {
		let garbage = serde_json::json!("yesterday-ish");
		let object = serde_json::json!({ "nested": true });

		assert_eq!(coerce_timestamp(Some(&garbage), fixed_now()), fixed_now());
		assert_eq!(coerce_timestamp(Some(&object), fixed_now()), fixed_now());
		assert_eq!(coerce_timestamp(None, fixed_now()), fixed_now());
	}

	#[test]
	fn lenient_counts_accept_numeric_strings() {
		let raw = serde_json::json!({
			"rest_id": "42",
			"views": { "count": "1,204" },
			"legacy": { "favorite_count": "17" }
		});
		let post = normalize_at(&raw, fixed_now()).expect("Expected post.");

		assert_eq!(post.engagement.impression_count, 1_204);
		assert_eq!(post.engagement.like_count, 17);
	}

	#[test]
	fn snowflake_ordering_prefers_longer_ids() {
		assert!(compare_ids("1000", "999").is_gt());
		assert!(compare_ids("1001", "1000").is_gt());
		assert!(compare_ids("12", "12").is_eq());
	}
}
