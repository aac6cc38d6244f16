use std::net::SocketAddr;
use std::sync::Arc;

use careloop_common::Result;
use tokio::net::TcpListener;
use tracing::info;

use crate::firing;
use crate::router::build_router;
use crate::state::SharedState;

/// HTTP gateway plus the outreach firing loop, run until shutdown.
pub struct GatewayServer {
    state: SharedState,
}

impl GatewayServer {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let firing_task = firing::spawn_firing_loop(Arc::clone(&self.state));
        let app = build_router(self.state);

        let listener = TcpListener::bind(addr).await?;
        info!("gateway listening on {addr}");

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;

        firing_task.abort();
        result?;
        Ok(())
    }
}
