//! Row structs for the tables the repositories read back.
//!
//! Write-only tables (alerts, dead letters) have no row struct here; the
//! repositories return scalars or tuples for them.

pub mod template;
