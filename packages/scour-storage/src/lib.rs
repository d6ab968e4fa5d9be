pub mod db;
pub mod links;
pub mod messages;
pub mod models;
pub mod outbox;
pub mod results;
pub mod schema;
pub mod sessions;
pub mod sub_queries;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
