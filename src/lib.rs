//! Third-pass feature preparation for hourly regional load histories.
//!
//! Implemented scope:
//! - column-oriented observation table with CSV persistence
//! - the seven-stage feature pipeline (hour normalization, holiday repair,
//!   ISO week-of-year, cyclical encoding, pruning, warm-up trimming,
//!   reordering)
//! - region/city mapping and second/third-pass file resolution
//! - downstream OLS training and evaluation over a third-pass table

mod model;
mod observability;
mod pipeline;
mod regions;
mod table;

pub use model::{
    evaluate, extract_dataset, fit_linear, Dataset, DatasetConfig, LinearModel, ModelError,
    RegressionMetrics,
};
pub use observability::{
    init_logging, log_app_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use pipeline::{
    add_week_of_year, assert_schema_compatible, build_output_schema, encode_cyclical,
    normalize_hour_column, prune_columns, repair_holiday_flags, run_pipeline, trim_warmup,
    verify_no_nulls, CyclicalField, OutputSchema, PeriodPolicy, PipelineConfig, PipelineError,
    PipelineReport, PIPELINE_SCHEMA_VERSION,
};
pub use regions::{Region, ALL_REGIONS};
pub use table::{Column, Table, TableError, Value};
