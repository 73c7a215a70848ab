//! Run metrics
//!
//! [`MetricsObserver`] turns run events into `metrics` counters, gauges and
//! histograms. Without an installed recorder the macros are no-ops.
//!
//! # Metrics
//!
//! - `stratum_runs_total`: Counter of finished runs by status
//! - `stratum_runs_active`: Gauge of runs in progress
//! - `stratum_run_steps`: Histogram of model turns per run
//! - `stratum_run_duration_seconds`: Histogram of run wall time
//! - `stratum_model_calls_total`: Counter of model calls by outcome
//! - `stratum_model_call_duration_seconds`: Histogram of model call latency
//! - `stratum_model_tokens_total`: Counter of tokens reported by the provider
//! - `stratum_tool_calls_total`: Counter of tool calls by tool and outcome
//! - `stratum_tool_call_duration_seconds`: Histogram of tool latency by tool
//!
//! # Examples
//!
//! ```
//! use stratum::agent::metrics::MetricsObserver;
//! use stratum::agent::{RunEvent, RunObserver};
//!
//! let observer = MetricsObserver::new();
//! observer
//!     .on_event("run-1", &RunEvent::RunStarted { goal: "load", step_budget: 5 })
//!     .unwrap();
//! ```

use crate::agent::observer::{RunEvent, RunObserver};
use crate::config::MetricsConfig;
use crate::error::Result;
use metrics::{counter, decrement_gauge, histogram, increment_counter, increment_gauge};

/// Observer that records run metrics
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl MetricsObserver {
    /// Creates the observer
    pub fn new() -> Self {
        Self
    }
}

impl RunObserver for MetricsObserver {
    fn name(&self) -> &str {
        "metrics"
    }

    fn on_event(&self, _run_id: &str, event: &RunEvent<'_>) -> Result<()> {
        match event {
            RunEvent::RunStarted { .. } => {
                increment_gauge!("stratum_runs_active", 1.0);
            }
            RunEvent::ModelCallStarted { .. } | RunEvent::ToolCallStarted { .. } => {}
            RunEvent::ModelCallFinished { usage, elapsed, .. } => {
                increment_counter!("stratum_model_calls_total", "outcome" => "success");
                histogram!("stratum_model_call_duration_seconds", elapsed.as_secs_f64());
                if let Some(usage) = usage {
                    counter!("stratum_model_tokens_total", usage.prompt_tokens as u64, "kind" => "prompt");
                    counter!(
                        "stratum_model_tokens_total",
                        usage.completion_tokens as u64,
                        "kind" => "completion"
                    );
                }
            }
            RunEvent::ModelCallFailed { elapsed, .. } => {
                increment_counter!("stratum_model_calls_total", "outcome" => "failure");
                histogram!("stratum_model_call_duration_seconds", elapsed.as_secs_f64());
            }
            RunEvent::ToolCallFinished {
                call,
                result,
                elapsed,
            } => {
                let outcome = if result.success { "success" } else { "failure" };
                increment_counter!(
                    "stratum_tool_calls_total",
                    "tool" => call.name.clone(),
                    "outcome" => outcome
                );
                histogram!(
                    "stratum_tool_call_duration_seconds",
                    elapsed.as_secs_f64(),
                    "tool" => call.name.clone()
                );
            }
            RunEvent::RunFinished {
                status,
                steps,
                elapsed,
                ..
            } => {
                increment_counter!("stratum_runs_total", "status" => status.as_str());
                histogram!("stratum_run_steps", *steps as f64);
                histogram!("stratum_run_duration_seconds", elapsed.as_secs_f64());
                decrement_gauge!("stratum_runs_active", 1.0);
            }
        }
        Ok(())
    }
}

/// Installs the Prometheus exporter when enabled in configuration
///
/// Only has an effect when compiled with the `prometheus` feature; the
/// exporter then serves metrics on its default listen address.
///
/// # Examples
///
/// ```
/// use stratum::agent::metrics::init_metrics_exporter;
/// use stratum::config::MetricsConfig;
///
/// init_metrics_exporter(&MetricsConfig::default());
/// ```
pub fn init_metrics_exporter(config: &MetricsConfig) {
    if !config.prometheus {
        return;
    }

    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        if let Err(e) = PrometheusBuilder::new().install() {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        }
    }

    #[cfg(not(feature = "prometheus"))]
    tracing::warn!("metrics.prometheus is set but stratum was built without the prometheus feature");
}
