//! Core engine for partitioned as-of joins and windowed summaries.
//!
//! This crate provides the foundational pieces for `timeseries-asof`:
//!
//! - Canonical time units and duration parsing (`time_unit` module).
//! - A schema adapter that turns integral ticks, Arrow timestamps and Arrow
//!   dates into one canonical `Int64` tick column (`schema` module).
//! - An immutable, partitioned [`TimeSeries`] of Arrow record batches
//!   (`series` module).
//! - An explicit [`ExecutionContext`] owning the worker pool
//!   (`context` module).
//! - As-of joins with direction, tolerance, key and strictness policies
//!   (`join` module).
//! - Past/future window, cumulative, grouped and cycle summaries
//!   (`summarize` module).
//! - Deferred, execute-once operations (`plan` module).
//!
//! Every operation runs per partition. A boundary exchange between
//! partitions makes the result identical to running on a single partition,
//! whatever the partitioning.
#![deny(missing_docs)]

mod accumulator;
mod assemble;
pub mod context;
pub mod error;
mod exchange;
pub mod join;
mod key;
pub mod plan;
pub mod schema;
pub mod series;
pub mod summarize;
pub mod time_unit;

pub use context::{EngineConfig, ExecutionContext};
pub use error::{EngineError, EngineResult};
pub use join::{JoinDirection, JoinSpec, asof_join};
pub use plan::{LazySeries, Operation};
pub use schema::SchemaError;
pub use series::{SourceOptions, TimeSeries};
pub use summarize::{AggregateKind, SummarizeSpec, WindowSpec, summarize, summarize_cycles};
pub use time_unit::{TimeUnit, parse_duration};
