pub mod firing;
pub mod outcome;
pub mod router;
pub mod server;
pub mod state;
pub mod webhooks;

pub use server::GatewayServer;
pub use state::{AppState, SharedState};
