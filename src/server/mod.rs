pub mod api;
pub mod stream;

pub use api::{ build_router, AppState, ChatSettings, ChatTurn };
pub use stream::Playback;

use crate::cli::Args;
use std::error::Error;
use std::net::SocketAddr;
use log::info;

pub struct Server {
    addr: String,
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: Args) -> Self {
        Self { addr, state, args }
    }

    /// Serves until the listener fails.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = build_router(self.state.clone());

        match (self.args.enable_tls, &self.args.tls_cert_path, &self.args.tls_key_path) {
            (true, Some(cert_path), Some(key_path)) => {
                let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    cert_path,
                    key_path
                ).await?;

                info!("Starting HTTPS API server on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
            }
            (true, _, _) => {
                return Err("TLS enabled but --tls-cert-path or --tls-key-path is missing".into());
            }
            _ => {
                let listener = tokio::net::TcpListener::bind(addr).await
                    .map_err(|e| format!("Failed to bind HTTP server to {}: {}", addr, e))?;
                info!("Starting HTTP API server on: http://{}", addr);
                axum::serve(listener, app.into_make_service()).await?;
            }
        }

        Ok(())
    }
}
