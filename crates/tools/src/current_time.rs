//! Current date and time, optionally shifted to a fixed UTC offset.

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use parley_core::error::ToolError;
use parley_core::tool::{CallArgs, Function, FunctionOutput, ParamSpec, ParamType};

pub struct CurrentTime;

#[async_trait]
impl Function for CurrentTime {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time. Defaults to UTC; pass an hour offset such as 5.5 or -8 for another zone."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::optional(
            "timezone_offset_hours",
            ParamType::Number,
            "Offset from UTC in hours, between -12 and 14",
        )]
    }

    async fn invoke(&self, args: CallArgs) -> Result<FunctionOutput, ToolError> {
        let hours = args.f64("timezone_offset_hours").unwrap_or(0.0);
        let offset = offset_from_hours(hours).ok_or_else(|| ToolError::ExecutionFailed {
            function: self.name().into(),
            reason: format!("Unsupported UTC offset: {hours}"),
        })?;

        let now = Utc::now().with_timezone(&offset);
        Ok(FunctionOutput::Json(serde_json::json!({
            "iso8601": now.to_rfc3339(),
            "date": now.format("%Y-%m-%d").to_string(),
            "time": now.format("%H:%M:%S").to_string(),
            "weekday": now.format("%A").to_string(),
            "utc_offset": now.format("%:z").to_string(),
        })))
    }
}

fn offset_from_hours(hours: f64) -> Option<FixedOffset> {
    if !(-12.0..=14.0).contains(&hours) {
        return None;
    }
    FixedOffset::east_opt((hours * 3600.0).round() as i32)
}
