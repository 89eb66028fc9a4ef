//! Record model, framing and materialization.
//!
//! - [`structures`]: parts, entities, fetch windows, schemas and rows
//! - [`framer`]: turns raw fetch windows into complete logical records
//! - [`materialize`]: turns complete records into [`UniformRow`]s
//!
//! Framing is the only place that knows about window boundaries. Everything
//! downstream sees whole records.

pub mod framer;
pub mod materialize;
mod structures;

pub use structures::*;
