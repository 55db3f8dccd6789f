//! Integration tests exercising the full ingest and query pipeline.

pub mod support;

mod concurrency;
mod pipeline;
