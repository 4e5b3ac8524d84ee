//! # timeseries-asof
//!
//! As-of joins and windowed summaries over partitioned Arrow time series.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust,ignore
//! use timeseries_asof::prelude::*;
//!
//! let ctx = ExecutionContext::with_defaults()?;
//! let options = SourceOptions::new("ts", TimeUnit::Milliseconds);
//! let trades = TimeSeries::from_batches(trade_batches, &options)?;
//! let quotes = TimeSeries::from_batches(quote_batches, &options)?;
//! let spec = JoinSpec::backward().with_tolerance_str("5s")?;
//! let joined = asof_join(&ctx, &trades, &quotes, &spec)?;
//! println!("{}", pretty::pretty_format_series(&joined)?);
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Human-facing rendering of results.
pub mod pretty;

pub use timeseries_asof_core::context::resolve_worker_threads;
pub use timeseries_asof_core::schema::{SchemaError, TimeColumnKind};
pub use timeseries_asof_core::time_unit::{ParseDurationError, ParseTimeUnitError};
pub use timeseries_asof_core::{
    AggregateKind, EngineConfig, EngineError, EngineResult, ExecutionContext, JoinDirection,
    JoinSpec, LazySeries, Operation, SourceOptions, SummarizeSpec, TimeSeries, TimeUnit,
    WindowSpec, asof_join, parse_duration, summarize, summarize_cycles,
};
