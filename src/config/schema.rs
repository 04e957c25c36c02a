//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files;
//! every field has a default so a minimal config stays minimal.

use serde::{Deserialize, Serialize};

/// Root configuration for the tracing agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Identity reported with every segment.
    pub service: ServiceConfig,

    /// Request-pipeline instrumentation settings.
    pub pipeline: PipelineTracingConfig,

    /// Sampling behavior.
    pub sampling: SamplingConfig,

    /// Observability settings for the agent itself.
    pub observability: ObservabilityConfig,
}

/// Service identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Logical service name.
    pub name: String,

    /// Instance identifier (host, pod, or similar).
    pub instance: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-service".to_string(),
            instance: "default".to_string(),
        }
    }
}

/// Request-pipeline instrumentation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineTracingConfig {
    /// HTTP verbs excluded from tracing entirely, at both request start
    /// and request end.
    pub excluded_methods: Vec<String>,

    /// Header carrying the per-request correlation ID.
    pub request_id_header: String,
}

impl Default for PipelineTracingConfig {
    fn default() -> Self {
        Self {
            excluded_methods: vec!["OPTIONS".to_string()],
            request_id_header: "x-request-id".to_string(),
        }
    }
}

/// Sampling behavior.
///
/// Only the boolean decision carried by an incoming carrier is honored;
/// rate configuration lives outside this core.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Whether entry contexts inherit the upstream sampling decision.
    pub follow_upstream: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            follow_upstream: true,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Whether to expose agent metrics.
    pub metrics_enabled: bool,

    /// Bind address for the Prometheus scrape endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9099".to_string(),
        }
    }
}
