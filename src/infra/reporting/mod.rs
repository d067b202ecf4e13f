// Error reporters: where unexpected command errors end up.

pub mod tracing_reporter;
pub mod webhook_reporter;

pub use tracing_reporter::TracingReporter;
pub use webhook_reporter::WebhookReporter;
