//! Rolling-window admission for calls to the search workflow.
//!
//! The gate is process-local. A window opens on the first admission after the previous one
//! elapsed, and at most `max_requests` calls are admitted inside it. Time is read from the tokio
//! clock, so a paused test runtime drives the window.

use std::{sync::Mutex, time::Duration};

use tokio::time::Instant;

use scour_config::RateLimit;

#[derive(Debug)]
pub struct RateGate {
	max_requests: u32,
	window: Duration,
	state: Mutex<WindowState>,
}
impl RateGate {
	pub fn new(max_requests: u32, window: Duration) -> Self {
		Self { max_requests, window, state: Mutex::new(WindowState::default()) }
	}

	pub fn from_config(cfg: &RateLimit) -> Self {
		Self::new(cfg.max_requests, Duration::from_millis(cfg.window_ms))
	}

	pub fn max_requests(&self) -> u32 {
		self.max_requests
	}

	pub fn window(&self) -> Duration {
		self.window
	}

	pub fn admit(&self) -> bool {
		self.admit_at(Instant::now())
	}

	pub fn admit_at(&self, now: Instant) -> bool {
		let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		state.roll(now, self.window);

		if state.count >= self.max_requests {
			tracing::debug!(
				count = state.count,
				max_requests = self.max_requests,
				"Rate gate rejected a call."
			);

			return false;
		}

		state.count += 1;

		if state.window_start.is_none() {
			state.window_start = Some(now);
		}

		true
	}

	/// Time left until the current window closes. Zero when a call would be admitted now.
	pub fn retry_after(&self) -> Duration {
		self.retry_after_at(Instant::now())
	}

	pub fn retry_after_at(&self, now: Instant) -> Duration {
		let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		state.roll(now, self.window);

		if state.count < self.max_requests {
			return Duration::ZERO;
		}

		state
			.window_start
			.map(|start| (start + self.window).saturating_duration_since(now))
			.unwrap_or(Duration::ZERO)
	}
}

#[derive(Debug, Default)]
struct WindowState {
	count: u32,
	window_start: Option<Instant>,
}
impl WindowState {
	fn roll(&mut self, now: Instant, window: Duration) {
		let Some(start) = self.window_start else {
			return;
		};

		if now.saturating_duration_since(start) >= window {
			self.count = 0;
			self.window_start = None;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn admissions_never_exceed_the_ceiling_inside_a_window() {
		let gate = RateGate::new(30, Duration::from_secs(60));
		let start = Instant::now();
		let admitted = (0..100)
			.filter(|offset| gate.admit_at(start + Duration::from_millis(*offset * 100)))
			.count();

		assert_eq!(admitted, 30);
	}

	#[test]
	fn window_reset_admits_again() {
		let gate = RateGate::new(2, Duration::from_secs(60));
		let start = Instant::now();

		assert!(gate.admit_at(start));
		assert!(gate.admit_at(start + Duration::from_secs(1)));
		assert!(!gate.admit_at(start + Duration::from_secs(59)));
		assert!(gate.admit_at(start + Duration::from_secs(60)));
	}

	#[test]
	fn retry_after_reports_the_rest_of_the_window() {
		let gate = RateGate::new(1, Duration::from_secs(60));
		let start = Instant::now();

		assert_eq!(gate.retry_after_at(start), Duration::ZERO);
		assert!(gate.admit_at(start));
		assert_eq!(gate.retry_after_at(start + Duration::from_secs(15)), Duration::from_secs(45));
		assert_eq!(gate.retry_after_at(start + Duration::from_secs(60)), Duration::ZERO);
	}

	#[test]
	fn concurrent_admissions_respect_the_ceiling() {
		let gate = std::sync::Arc::new(RateGate::new(25, Duration::from_secs(60)));
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let gate = gate.clone();

				std::thread::spawn(move || (0..10).filter(|_| gate.admit()).count())
			})
			.collect();
		let admitted: usize =
			handles.into_iter().map(|handle| handle.join().expect("Thread panicked.")).sum();

		assert_eq!(admitted, 25);
	}
}
