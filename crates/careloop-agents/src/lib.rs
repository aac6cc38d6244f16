pub mod anomaly;
pub mod context;
pub mod router;
pub mod tools;

pub use anomaly::PlausibleRanges;
pub use context::PatientContextBuilder;
pub use router::{ToolDefinition, ToolRouter};
pub use tools::{Tool, ToolContext, ToolDeps, ToolOutput};
