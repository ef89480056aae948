use std::time::Duration;

/// Maximum time to wait when acquiring the metrics inbox lock.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Listen address used when none is given on the command line.
pub const DEFAULT_ADDR: &str = "127.0.0.1:3210";

/// Documents returned by a list query that does not specify `limit`.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Upper bound on `limit` for list queries.
pub const MAX_LIST_LIMIT: usize = 1_000;

/// Upper bound on documents accepted by one batch create.
pub const MAX_BATCH_SIZE: usize = 1_000;

/// Number of most recent report payloads retained for inspection.
pub const RETAINED_REPORTS: usize = 64;
