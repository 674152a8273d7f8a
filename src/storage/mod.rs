//! Glucoscope Reading Store
//!
//! Durable, deduplicated, append-only storage for CGM readings:
//!
//! - **types**: Core data structures (`Reading`, `TimeRange`)
//! - **store**: SQLite-backed `ReadingStore`
//! - **error**: Error types
//!
//! # Contract
//!
//! ```text
//! total_count()              -> number of stored rows
//! insert_if_absent(reading)  -> true if new
//! query(range)               -> readings ascending by time, sgv > 0 only
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use glucoscope::storage::{Reading, ReadingStore, TimeRange};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ReadingStore::open(std::path::Path::new("./cgm_data.db"))?;
//!     store.insert_if_absent(&Reading::at("abc123", 118, 1_705_314_600_000))?;
//!
//!     let week = store.query(TimeRange::last_days(7))?;
//!     println!("{} readings this week", week.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod store;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use store::ReadingStore;
pub use types::{Reading, TimeRange};
