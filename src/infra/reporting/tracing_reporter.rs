use crate::core::errors::{BoxError, ErrorReport, ErrorReporter};
use async_trait::async_trait;
use tracing::error;

/// Writes the full report, cause chain included, to the log.
pub struct TracingReporter;

#[async_trait]
impl ErrorReporter for TracingReporter {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn report(&self, report: &ErrorReport) -> Result<(), BoxError> {
        let causes = if report.causes.is_empty() {
            "-".to_string()
        } else {
            report.causes.join(" <- ")
        };

        error!(
            target: "error_report",
            report_id = %report.id,
            command = report.context.command.as_deref().unwrap_or("-"),
            user_id = report.context.user_id.unwrap_or_default(),
            guild_id = report.context.guild_id.unwrap_or_default(),
            channel_id = report.context.channel_id.unwrap_or_default(),
            occurred_at = %report.occurred_at.to_rfc3339(),
            causes = %causes,
            "{}",
            report.message
        );
        Ok(())
    }
}
