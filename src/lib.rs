//! Sales dataset aggregation service.
//!
//! A dataset is uploaded once (`data`), then aggregations over it are queued
//! (`jobs`) and computed by `analysis`. `app` exposes both over HTTP.

pub mod analysis;
pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod jobs;
pub mod state;
