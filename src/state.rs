//! Shared handler state.

use crate::services::delivery_pipeline::DeliveryPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: DeliveryPipeline,
    /// Name reported by the health endpoint.
    pub worker: String,
    pub region: Option<String>,
}
