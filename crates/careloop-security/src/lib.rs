pub mod redaction;
pub mod signature;

pub use redaction::{RedactingWriter, redact_secrets};
pub use signature::{RejectReason, Verdict, sign_payload, verify};
