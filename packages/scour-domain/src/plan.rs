//! Deterministic parts of sub-query planning: tier allocation, language and time scoping, and
//! rendering of the scoped query strings sent to the search workflow.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, Month, macros::format_description};
use whatlang::Lang;

use scour_config::{LanguageTier, Planner};

const LANG_OPERATOR: &str = r"(?i)\blang:([a-z]{2})\b";
const LANG_PHRASE: &str = r"(?i)\b(?:in|only)\s+(english|japanese|chinese|korean|spanish|french|german|portuguese|russian|italian)\b";
const PAST_DAYS: &str = r"(?i)\b(?:past|last)\s+(\d{1,3})\s+days?\b";
const LATEST_DAYS: i64 = 2;
const WEEK_DAYS: i64 = 7;
const MONTH_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAllocation {
	pub language: String,
	pub min_engagement: u32,
	pub count: u32,
}

/// Inclusive `since`, exclusive `until`, matching the workflow's search operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
	pub since: Date,
	pub until: Option<Date>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedQuery {
	pub keyword: String,
	pub language: String,
	pub min_engagement: u32,
	pub window: Option<DateWindow>,
}
impl ScopedQuery {
	pub fn render(&self) -> String {
		let mut out = format!(
			"{} min_faves:{} lang:{}",
			self.keyword.trim(),
			self.min_engagement,
			self.language
		);

		if let Some(window) = self.window {
			out.push_str(&format!(" since:{}", format_date(window.since)));

			if let Some(until) = window.until {
				out.push_str(&format!(" until:{}", format_date(until)));
			}
		}

		out
	}
}

/// Tiers the planner fans out over. An explicit language collapses them to one tier that
/// takes every sub-query, using that language's configured floor.
pub fn resolve_tiers(cfg: &Planner, explicit_language: Option<&str>) -> Vec<LanguageTier> {
	let Some(language) = explicit_language else {
		return cfg.tiers.clone();
	};
	let language = language.trim().to_lowercase();
	let min_engagement = cfg
		.tiers
		.iter()
		.find(|tier| tier.language == language)
		.map(|tier| tier.min_engagement)
		.unwrap_or(cfg.default_min_engagement);

	vec![LanguageTier { language, min_engagement, share: 1.0 }]
}

/// Splits `total` across tiers by share using largest-remainder rounding.
///
/// Counts always sum to `total`. Ties on the remainder go to the earlier tier.
pub fn allocate(total: u32, tiers: &[LanguageTier]) -> Vec<TierAllocation> {
	if tiers.is_empty() {
		return Vec::new();
	}

	let share_sum: f64 = tiers.iter().map(|tier| f64::from(tier.share.max(0.0))).sum();
	let share_sum = if share_sum > 0.0 { share_sum } else { 1.0 };
	let mut out = Vec::with_capacity(tiers.len());
	let mut remainders = Vec::with_capacity(tiers.len());
	let mut assigned = 0_u32;

	for (index, tier) in tiers.iter().enumerate() {
		let exact = f64::from(total) * f64::from(tier.share.max(0.0)) / share_sum;
		let floor = (exact + 1e-9).floor();

		assigned += floor as u32;
		remainders.push((index, exact - floor));
		out.push(TierAllocation {
			language: tier.language.clone(),
			min_engagement: tier.min_engagement,
			count: floor as u32,
		});
	}

	remainders.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

	for (index, _) in remainders.into_iter().cycle().take(total.saturating_sub(assigned) as usize) {
		out[index].count += 1;
	}

	out
}

/// Assigns keywords to tier slots in order and renders the scoped queries.
pub fn scope_keywords(
	keywords: &[String],
	allocations: &[TierAllocation],
	window: Option<DateWindow>,
) -> Vec<ScopedQuery> {
	let mut out = Vec::new();
	let mut keywords = keywords.iter();

	for allocation in allocations {
		for _ in 0..allocation.count {
			let Some(keyword) = keywords.next() else {
				return out;
			};

			out.push(ScopedQuery {
				keyword: keyword.trim().to_string(),
				language: allocation.language.clone(),
				min_engagement: allocation.min_engagement,
				window,
			});
		}
	}

	out
}

/// Finds a language the user asked for explicitly, either as a `lang:xx` operator or a phrase
/// such as "in Japanese".
pub fn explicit_language(text: &str) -> Option<String> {
	if let Some(captures) = captures(LANG_OPERATOR, text) {
		return captures.get(1).map(|code| code.as_str().to_lowercase());
	}
	if let Some(captures) = captures(LANG_PHRASE, text) {
		let name = captures.get(1)?.as_str().to_lowercase();

		return language_code_for_name(&name).map(str::to_string);
	}

	[("日本語", "ja"), ("中文", "zh"), ("한국어", "ko")]
		.into_iter()
		.find(|(marker, _)| text.contains(marker))
		.map(|(_, code)| code.to_string())
}

/// Best-effort ISO 639-1 code of the query text.
pub fn detect_language(text: &str) -> Option<&'static str> {
	let info = whatlang::detect(text)?;

	match info.lang() {
		Lang::Eng => Some("en"),
		Lang::Jpn => Some("ja"),
		Lang::Cmn => Some("zh"),
		Lang::Kor => Some("ko"),
		Lang::Spa => Some("es"),
		Lang::Fra => Some("fr"),
		Lang::Deu => Some("de"),
		Lang::Por => Some("pt"),
		Lang::Rus => Some("ru"),
		Lang::Ita => Some("it"),
		_ => None,
	}
}

/// Maps relative time phrases to a date window ending today.
pub fn infer_date_window(text: &str, today: Date) -> Option<DateWindow> {
	let lower = text.to_lowercase();

	if let Some(captures) = captures(PAST_DAYS, &lower) {
		let days = captures.get(1)?.as_str().parse::<i64>().ok()?;

		return Some(DateWindow { since: today - Duration::days(days), until: None });
	}
	if lower.contains("yesterday") || text.contains("昨日") {
		return Some(DateWindow { since: today - Duration::days(1), until: Some(today) });
	}
	if lower.contains("today") || text.contains("今日") {
		return Some(DateWindow { since: today, until: None });
	}
	if ["this week", "past week", "last week"].iter().any(|phrase| lower.contains(phrase))
		|| text.contains("今週")
	{
		return Some(DateWindow { since: today - Duration::days(WEEK_DAYS), until: None });
	}
	if ["this month", "past month", "last month"].iter().any(|phrase| lower.contains(phrase))
		|| text.contains("今月")
	{
		return Some(DateWindow { since: today - Duration::days(MONTH_DAYS), until: None });
	}
	if lower.contains("this year") || text.contains("今年") {
		let since = Date::from_calendar_date(today.year(), Month::January, 1).ok()?;

		return Some(DateWindow { since, until: None });
	}
	if ["latest", "newest", "recent", "breaking"].iter().any(|phrase| lower.contains(phrase))
		|| text.contains("最新")
	{
		return Some(DateWindow { since: today - Duration::days(LATEST_DAYS), until: None });
	}

	None
}

pub fn format_date(date: Date) -> String {
	date.format(format_description!("[year]-[month]-[day]"))
		.unwrap_or_else(|_| date.to_string())
}

fn captures<'a>(pattern: &str, text: &'a str) -> Option<Captures<'a>> {
	Regex::new(pattern).ok()?.captures(text)
}

fn language_code_for_name(name: &str) -> Option<&'static str> {
	match name {
		"english" => Some("en"),
		"japanese" => Some("ja"),
		"chinese" => Some("zh"),
		"korean" => Some("ko"),
		"spanish" => Some("es"),
		"french" => Some("fr"),
		"german" => Some("de"),
		"portuguese" => Some("pt"),
		"russian" => Some("ru"),
		"italian" => Some("it"),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use time::macros::date;

	use super::*;

	fn tier(language: &str, min_engagement: u32, share: f32) -> LanguageTier {
		LanguageTier { language: language.to_string(), min_engagement, share }
	}

	#[test]
	fn allocation_sums_to_total_for_every_size() {
		let tiers = vec![tier("en", 10, 0.4), tier("ja", 50, 0.3), tier("zh", 100, 0.3)];

		for total in 6..=10 {
			let allocation = allocate(total, &tiers);
			let sum: u32 = allocation.iter().map(|item| item.count).sum();

			assert_eq!(sum, total);
			assert!(allocation[0].count >= allocation[1].count);
		}
	}

	#[test]
	fn allocation_of_ten_is_four_three_three() {
		let tiers = vec![tier("en", 10, 0.4), tier("ja", 50, 0.3), tier("zh", 100, 0.3)];
		let counts: Vec<u32> = allocate(10, &tiers).into_iter().map(|item| item.count).collect();

		assert_eq!(counts, vec![4, 3, 3]);
	}

	#[test]
	fn rendered_query_carries_every_scope() {
		let query = ScopedQuery {
			keyword: "AI regulation".to_string(),
			language: "en".to_string(),
			min_engagement: 10,
			window: Some(DateWindow {
				since: date!(2025 - 01 - 01),
				until: Some(date!(2025 - 01 - 08)),
			}),
		};

		assert_eq!(
			query.render(),
			"AI regulation min_faves:10 lang:en since:2025-01-01 until:2025-01-08"
		);
	}

	#[test]
	fn relative_phrases_map_to_windows() {
		let today = date!(2025 - 03 - 15);

		assert_eq!(
			infer_date_window("latest news on chips", today),
			Some(DateWindow { since: date!(2025 - 03 - 13), until: None })
		);
		assert_eq!(
			infer_date_window("what happened this week", today),
			Some(DateWindow { since: date!(2025 - 03 - 08), until: None })
		);
		assert_eq!(
			infer_date_window("past 3 days", today),
			Some(DateWindow { since: date!(2025 - 03 - 12), until: None })
		);
		assert_eq!(infer_date_window("AI regulation", today), None);
	}

	#[test]
	fn explicit_language_from_operator_or_phrase() {
		assert_eq!(explicit_language("chip export rules lang:JA"), Some("ja".to_string()));
		assert_eq!(explicit_language("only in Korean please"), Some("ko".to_string()));
		assert_eq!(explicit_language("AI regulation"), None);
	}

	#[test]
	fn explicit_language_uses_its_tier_floor() {
		let cfg = Planner::default();
		let tiers = resolve_tiers(&cfg, Some("ja"));

		assert_eq!(tiers.len(), 1);
		assert_eq!(tiers[0].min_engagement, 50);

		let unknown = resolve_tiers(&cfg, Some("fr"));

		assert_eq!(unknown[0].min_engagement, cfg.default_min_engagement);
	}
}
