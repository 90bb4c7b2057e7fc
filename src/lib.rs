//! technique-rag: HTTP front-end for the TechniqueRAG analysis pipeline.
//!
//! One endpoint, POST /api/analyze, takes `{ "text": string }`, runs the
//! external CTI pipeline over it, and returns the pipeline's JSON enriched
//! with an input echo, a summary sentence, and a timestamp. The analytical
//! model itself lives in the pipeline script and is opaque to this crate.

pub mod config;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod schemas;
