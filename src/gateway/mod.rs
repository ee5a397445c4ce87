//! Caller-facing operations
//!
//! [`SensorGate`] is what a request layer talks to: access resolution,
//! plan execution, aggregate parsing, and tuple ingest. Ingest accepts
//! JSON tuples and CSV uploads, conforms values to the stream's channel
//! types, stores them, and widens the channel statistics used for noise
//! calibration.

mod errors;
mod facade;
mod ingest;

pub use errors::{IngestError, IngestResult};
pub use facade::SensorGate;
pub use ingest::{detect_delimiter, parse_csv, parse_json_tuples, RawTuple};
