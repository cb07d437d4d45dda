//! Built-in capabilities offered to every agent.

use chrono::{Local, SecondsFormat, Utc};
use serde_json::json;

use super::wrapper::CapabilityWrapper;
use crate::mcp::schema::SchemaBuilder;

pub const CURRENT_TIME: &str = "get_current_time";

/// `get_current_time`: the current date and time as RFC 3339.
///
/// Local time by default; `utc: true` switches to UTC.
pub fn current_time_capability() -> CapabilityWrapper {
    let schema = SchemaBuilder::new()
        .description("Current date and time")
        .property(
            "utc",
            json!({ "type": "boolean", "description": "Report UTC instead of local time", "default": false }),
            false,
        )
        .build();

    CapabilityWrapper::from_fn(
        CURRENT_TIME,
        "Get the current date and time. Use this whenever the answer depends on today's date.",
        schema,
        |args| async move {
            let utc = args.get("utc").and_then(|v| v.as_bool()).unwrap_or(false);
            let now = if utc {
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            } else {
                Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
            };
            Ok(now)
        },
    )
    .always_available()
}

/// Every built-in capability, in exposure order.
pub fn builtin_capabilities() -> Vec<CapabilityWrapper> {
    vec![current_time_capability()]
}
