/// Patient and alert identifiers are 64-bit integers end to end.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
