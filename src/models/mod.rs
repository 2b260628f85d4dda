//! Core data models for the edge delivery pipeline.
//!
//! These types describe what flows between the pipeline stages: the object
//! key and its metadata, requested and served byte ranges, validated
//! transformation options and the assembled response envelope.

pub mod envelope;
pub mod object;
pub mod range;
pub mod transform;
