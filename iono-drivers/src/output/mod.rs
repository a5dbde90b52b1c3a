//! Protected digital output driver chips

pub mod max14912;

pub use max14912::{crc7, OutputBank};
