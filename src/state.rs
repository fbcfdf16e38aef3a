use std::env;

use crate::metrics::Metrics;

const DEFAULT_NAMESPACE: &str = "ExampleInvocations";
const DEFAULT_SERVICE: &str = "ExampleLambdaFunction";

/// Process-lifetime state, constructed once at startup and passed into the
/// handler by reference.
pub struct AppState {
    pub metrics: Metrics,
}

impl AppState {
    pub fn new() -> Self {
        let namespace =
            env::var("METRICS_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let service = env::var("SERVICE_NAME")
            .or_else(|_| env::var("AWS_LAMBDA_FUNCTION_NAME"))
            .unwrap_or_else(|_| DEFAULT_SERVICE.to_string());

        tracing::info!("Emitting metrics under namespace {namespace} as service {service}");

        Self {
            metrics: Metrics::new(namespace, service),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
