use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use lambda_runtime::Error;
use serde_json::{json, Map, Value};

pub const COLD_START: &str = "ColdStart";

/// CloudWatch metric unit, limited to the units this function emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricUnit {
    Count,
    Seconds,
    Milliseconds,
}

impl MetricUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricUnit::Count => "Count",
            MetricUnit::Seconds => "Seconds",
            MetricUnit::Milliseconds => "Milliseconds",
        }
    }
}

struct Buffer {
    values: Vec<(String, MetricUnit, f64)>,
    metadata: Vec<(String, Value)>,
    sink: Box<dyn Write + Send>,
}

/// Buffering metrics collector that serializes each flush as one CloudWatch
/// Embedded Metric Format line on the injected sink.
///
/// Metric values and metadata accumulate between flushes; a flush empties the
/// buffer, so one flush per invocation yields exactly one EMF blob carrying
/// that invocation's values. The blob declares `service` as its only
/// dimension and carries metadata entries as plain top-level members.
pub struct Metrics {
    namespace: String,
    service: String,
    cold_start: AtomicBool,
    buffer: Mutex<Buffer>,
}

impl Metrics {
    /// Collector writing to stdout, where the Lambda log stream picks EMF up.
    pub fn new(namespace: impl Into<String>, service: impl Into<String>) -> Self {
        Self::with_sink(namespace, service, Box::new(io::stdout()))
    }

    pub fn with_sink(
        namespace: impl Into<String>,
        service: impl Into<String>,
        sink: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            service: service.into(),
            cold_start: AtomicBool::new(true),
            buffer: Mutex::new(Buffer {
                values: Vec::new(),
                metadata: Vec::new(),
                sink,
            }),
        }
    }

    /// Buffer one metric value for the next flush.
    pub fn add_metric(&self, name: &str, unit: MetricUnit, value: f64) {
        let mut buffer = self.lock();
        buffer.values.push((name.to_string(), unit, value));
    }

    /// Buffer one metadata entry; it is emitted alongside the metric values
    /// but not declared in the CloudWatch metric directive.
    pub fn add_metadata(&self, key: &str, value: impl Into<Value>) {
        let mut buffer = self.lock();
        buffer.metadata.push((key.to_string(), value.into()));
    }

    /// Record the cold-start metric. Only the first call in the process
    /// lifetime buffers anything; later calls are no-ops.
    pub fn capture_cold_start(&self) {
        if self.cold_start.swap(false, Ordering::Relaxed) {
            self.add_metric(COLD_START, MetricUnit::Count, 1.0);
            self.add_metadata("function_name", self.service.as_str());
        }
    }

    /// Serialize the buffered values as a single EMF line and clear the
    /// buffer. A flush with no buffered metrics writes nothing.
    pub fn flush(&self) -> Result<(), Error> {
        let mut buffer = self.lock();
        if buffer.values.is_empty() {
            if !buffer.metadata.is_empty() {
                tracing::warn!("metadata buffered without any metric values, discarding");
                buffer.metadata.clear();
            }
            return Ok(());
        }

        let directives: Vec<Value> = buffer
            .values
            .iter()
            .map(|(name, unit, _)| json!({"Name": name, "Unit": unit.as_str()}))
            .collect();

        let mut blob = Map::new();
        blob.insert(
            "_aws".to_string(),
            json!({
                "Timestamp": Utc::now().timestamp_millis(),
                "CloudWatchMetrics": [{
                    "Namespace": self.namespace,
                    "Dimensions": [["service"]],
                    "Metrics": directives,
                }],
            }),
        );
        blob.insert("service".to_string(), Value::from(self.service.clone()));

        // Repeated names within one flush serialize as an array of values.
        for (name, _, value) in buffer.values.drain(..) {
            match blob.get_mut(&name) {
                Some(Value::Array(existing)) => existing.push(Value::from(value)),
                Some(existing) => {
                    let first = existing.take();
                    blob.insert(name, Value::Array(vec![first, Value::from(value)]));
                }
                None => {
                    blob.insert(name, Value::from(value));
                }
            }
        }
        for (key, value) in buffer.metadata.drain(..) {
            blob.insert(key, value);
        }

        writeln!(buffer.sink, "{}", Value::Object(blob))?;
        buffer.sink.flush()?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn lines(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8(bytes.clone())
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn test_metrics() -> (Metrics, SharedSink) {
        let sink = SharedSink::default();
        let metrics = Metrics::with_sink("TestNamespace", "test-service", Box::new(sink.clone()));
        (metrics, sink)
    }

    #[test]
    fn test_flush_writes_one_emf_line() {
        let (metrics, sink) = test_metrics();
        metrics.add_metric("Requests", MetricUnit::Count, 1.0);
        metrics.add_metadata("Source", "unit-test");
        metrics.flush().unwrap();

        let blobs = sink.lines();
        assert_eq!(blobs.len(), 1);
        let blob = &blobs[0];
        assert_eq!(blob["Requests"], 1.0);
        assert_eq!(blob["Source"], "unit-test");
        assert_eq!(blob["service"], "test-service");
        assert_eq!(
            blob["_aws"]["CloudWatchMetrics"][0]["Namespace"],
            "TestNamespace"
        );
        assert_eq!(
            blob["_aws"]["CloudWatchMetrics"][0]["Dimensions"][0][0],
            "service"
        );
        assert_eq!(
            blob["_aws"]["CloudWatchMetrics"][0]["Metrics"][0]["Name"],
            "Requests"
        );
        assert_eq!(
            blob["_aws"]["CloudWatchMetrics"][0]["Metrics"][0]["Unit"],
            "Count"
        );
        assert!(blob["_aws"]["Timestamp"].is_i64());
    }

    #[test]
    fn test_flush_clears_the_buffer() {
        let (metrics, sink) = test_metrics();
        metrics.add_metric("Requests", MetricUnit::Count, 1.0);
        metrics.flush().unwrap();

        metrics.add_metric("Requests", MetricUnit::Count, 1.0);
        metrics.flush().unwrap();

        let blobs = sink.lines();
        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[1]["Requests"], 1.0);
    }

    #[test]
    fn test_flush_without_metrics_writes_nothing() {
        let (metrics, sink) = test_metrics();
        metrics.add_metadata("Orphan", "value");
        metrics.flush().unwrap();
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_repeated_metric_names_serialize_as_array() {
        let (metrics, sink) = test_metrics();
        metrics.add_metric("Requests", MetricUnit::Count, 1.0);
        metrics.add_metric("Requests", MetricUnit::Count, 2.0);
        metrics.flush().unwrap();

        let blobs = sink.lines();
        assert_eq!(blobs[0]["Requests"], serde_json::json!([1.0, 2.0]));
    }

    #[test]
    fn test_cold_start_captured_once() {
        let (metrics, sink) = test_metrics();
        metrics.capture_cold_start();
        metrics.flush().unwrap();
        metrics.capture_cold_start();
        metrics.flush().unwrap();

        let blobs = sink.lines();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0][COLD_START], 1.0);
        assert_eq!(blobs[0]["function_name"], "test-service");
    }

    #[test]
    fn test_metric_unit_names() {
        assert_eq!(MetricUnit::Count.as_str(), "Count");
        assert_eq!(MetricUnit::Seconds.as_str(), "Seconds");
        assert_eq!(MetricUnit::Milliseconds.as_str(), "Milliseconds");
    }
}
