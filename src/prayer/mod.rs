//! Prayer time tables and the derived temporal state.

pub mod api_types;
mod cached_provider;
mod provider;
pub mod resolver;
mod store;
pub mod types;

pub use cached_provider::CachedTimetableClient;
pub use provider::TimetableClient;
pub use store::TimetableStore;
