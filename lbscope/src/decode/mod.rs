//! Reconstruction of log records from scalar queries against a stopped target.

mod cpumask;
mod enums;
pub mod progress;
pub mod ring;
pub mod schema;
pub mod value;

pub use ring::RingWalker;
pub use schema::SchemaDecoder;
pub use value::ValueChannel;
