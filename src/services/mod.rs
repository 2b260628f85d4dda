//! Edge delivery services: the pipeline stages and the capabilities they
//! are built on (object store, transformation service, edge cache).

pub mod deferred;
pub mod delivery_pipeline;
pub mod edge_cache;
pub mod range_negotiator;
pub mod rate_limiter;
pub mod response_assembler;
pub mod storage_service;
pub mod transform_resolver;
pub mod transformer;

#[cfg(test)]
pub mod testing;
