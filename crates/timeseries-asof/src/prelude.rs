//! Wrapper prelude.
//!
//! The `timeseries-asof` crate is the supported public entry point.
//! Downstream code should prefer importing from this prelude instead of
//! depending on internal core module paths.

pub use crate::pretty;
pub use crate::{
    AggregateKind, EngineConfig, EngineError, ExecutionContext, JoinDirection, JoinSpec,
    LazySeries, Operation, SourceOptions, SummarizeSpec, TimeSeries, TimeUnit, WindowSpec,
    asof_join, summarize, summarize_cycles,
};
