use serde::{Deserialize, Serialize};

/// Lifecycle of a search session. Transitions only move forward.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	Pending,
	ResultsSaved,
	Completed,
}
impl SessionStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::ResultsSaved => "results_saved",
			Self::Completed => "completed",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"pending" => Some(Self::Pending),
			"results_saved" => Some(Self::ResultsSaved),
			"completed" => Some(Self::Completed),
			_ => None,
		}
	}

	pub fn can_advance_to(self, next: Self) -> bool {
		next.rank() > self.rank()
	}

	/// States a session may be in for a transition to `self` to apply.
	pub fn predecessors(self) -> &'static [&'static str] {
		match self {
			Self::Pending => &[],
			Self::ResultsSaved => &["pending"],
			Self::Completed => &["pending", "results_saved"],
		}
	}

	fn rank(self) -> u8 {
		match self {
			Self::Pending => 0,
			Self::ResultsSaved => 1,
			Self::Completed => 2,
		}
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
	User,
	Assistant,
}
impl MessageRole {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Assistant => "assistant",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_only_moves_forward() {
		assert!(SessionStatus::Pending.can_advance_to(SessionStatus::ResultsSaved));
		assert!(SessionStatus::Pending.can_advance_to(SessionStatus::Completed));
		assert!(SessionStatus::ResultsSaved.can_advance_to(SessionStatus::Completed));
		assert!(!SessionStatus::Completed.can_advance_to(SessionStatus::ResultsSaved));
		assert!(!SessionStatus::ResultsSaved.can_advance_to(SessionStatus::ResultsSaved));
	}

	#[test]
	fn predecessors_match_forward_transitions() {
		for next in [SessionStatus::ResultsSaved, SessionStatus::Completed] {
			for raw in next.predecessors() {
				let prev = SessionStatus::parse(raw).expect("Predecessor must parse.");

				assert!(prev.can_advance_to(next));
			}
		}
	}

	#[test]
	fn status_strings_round_trip() {
		for status in
			[SessionStatus::Pending, SessionStatus::ResultsSaved, SessionStatus::Completed]
		{
			assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
		}

		assert_eq!(SessionStatus::parse("done"), None);
	}
}
