//! Timestamp tool: reports the current time.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use orcha_core::tool::{ParameterKind, ParameterSpec, Tool, ToolParameters};
use serde_json::{Value, json};

const FORMATS: [&str; 4] = ["rfc3339", "unix", "unix_ms", "human"];

/// Current time in a choice of formats and UTC offsets.
#[derive(Default)]
pub struct TimestampTool {
    /// Pinned clock for deterministic output.
    fixed: Option<DateTime<Utc>>,
}

impl TimestampTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always report the given instant.
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self { fixed: Some(at) }
    }

    fn now(&self) -> DateTime<Utc> {
        self.fixed.unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl Tool for TimestampTool {
    fn name(&self) -> &str {
        "timestamp"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Optionally choose the output format \
         and a UTC offset in minutes."
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::new()
            .with(
                "format",
                ParameterSpec::new(ParameterKind::String, "Output format (default rfc3339)")
                    .one_of(FORMATS),
            )
            .with(
                "utc_offset_minutes",
                ParameterSpec::new(
                    ParameterKind::Number,
                    "Offset from UTC in minutes, e.g. 120 for UTC+2 (default 0)",
                ),
            )
    }

    async fn execute(&self, arguments: Value) -> anyhow::Result<Value> {
        let format = arguments["format"].as_str().unwrap_or("rfc3339");
        let offset_minutes = arguments["utc_offset_minutes"].as_i64().unwrap_or(0);

        let offset = i32::try_from(offset_minutes * 60)
            .ok()
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| anyhow::anyhow!("utc_offset_minutes out of range: {offset_minutes}"))?;

        let now = self.now().with_timezone(&offset);

        let timestamp = match format {
            "unix" => json!(now.timestamp()),
            "unix_ms" => json!(now.timestamp_millis()),
            "human" => json!(now.format("%A, %B %-d, %Y %H:%M:%S %:z").to_string()),
            _ => json!(now.to_rfc3339()),
        };

        Ok(json!({
            "timestamp": timestamp,
            "format": format,
            "utc_offset_minutes": offset_minutes,
        }))
    }
}
