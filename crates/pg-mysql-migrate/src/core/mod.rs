//! Core abstractions shared by both database drivers.

pub mod identifier;
pub mod traits;
pub mod value;

pub use traits::DatabaseHandle;
pub use value::{Row, SqlNullType, SqlValue};
