//! Router and state for the pg-mysql-migrate HTTP frontend.
//!
//! Split out of the binary so handler tests can drive the router directly.

pub mod app;
