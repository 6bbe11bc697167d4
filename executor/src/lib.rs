//! Execution of dynaq query plans: each planned index query is rendered into
//! the store's request syntax, dispatched with pagination and retries, and the
//! merged result stream is deduplicated behind an opaque continuation cursor.

pub mod bloom;
pub mod builder;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod features;

pub use cursor::Cursor;
pub use error::ExecError;
pub use executor::{Count, ExecutorConfig, QueryExecutor, ReadOptions, ResultPage, RetryPolicy};
pub use features::ops;
