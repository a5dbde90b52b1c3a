//! Digital input chip drivers

pub mod max22190;

pub use max22190::{crc5, InputBank};
