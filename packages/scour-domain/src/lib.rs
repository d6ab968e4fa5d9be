pub mod plan;
pub mod post;
pub mod rate_gate;
pub mod session;
pub mod time_serde;
