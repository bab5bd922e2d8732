//! Result-side data from the scanning service: count snapshots and pagination,
//! intelligence and secret rows, and tolerant decoding of the service's payloads.

mod counts;
mod decode;
mod models;

pub use counts::*;
pub use decode::*;
pub use models::*;
