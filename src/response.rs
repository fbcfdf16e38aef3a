use lambda_runtime::Error;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Response contract of the function: a `statusCode` plus a string body
/// holding a JSON-encoded `{"message": ...}` object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl ResponseEnvelope {
    /// Fresh 200 envelope wrapping the given message.
    pub fn ok(message: &str) -> Result<Self, Error> {
        Ok(Self {
            status_code: 200,
            body: serde_json::to_string(&json!({"message": message}))?,
        })
    }
}
