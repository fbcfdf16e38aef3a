use chrono::Utc;
use lambda_runtime::{Error, LambdaEvent};
use serde_json::Value;
use tracing::info;

use crate::metrics::MetricUnit;
use crate::response::ResponseEnvelope;
use crate::state::AppState;

pub const SUCCESSFUL_INVOCATIONS: &str = "SuccessfulInvocations";
pub const EVENT_TIME_KEY: &str = "EventTime";

const RESPONSE_MESSAGE: &str = "Hello from Lambda!";

/// Telemetry wrapper composed around [`handle`]: records the cold-start
/// metric on the first invocation of the process and flushes the metric
/// buffer once the core handler has produced its response.
pub async fn handle_with_telemetry(
    state: &AppState,
    event: LambdaEvent<Value>,
) -> Result<ResponseEnvelope, Error> {
    state.metrics.capture_cold_start();
    let response = handle(state, event).await;
    state.metrics.flush()?;
    response
}

/// Core handler: log the inbound event, count the invocation, and return
/// the fixed success payload. The event is passed through to the log record
/// opaquely; its contents never affect the response.
pub async fn handle(
    state: &AppState,
    event: LambdaEvent<Value>,
) -> Result<ResponseEnvelope, Error> {
    let (payload, context) = event.into_parts();
    info!(request_id = %context.request_id, event = %payload, "Received event");

    state
        .metrics
        .add_metric(SUCCESSFUL_INVOCATIONS, MetricUnit::Count, 1.0);
    state.metrics.add_metadata(EVENT_TIME_KEY, epoch_seconds());

    ResponseEnvelope::ok(RESPONSE_MESSAGE)
}

/// Wall-clock time as fractional seconds since the Unix epoch.
fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
