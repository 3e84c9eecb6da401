use anyhow::Result;
use rv_config::Config;
use rv_storage::Storage;
use rv_web::{AppState, WebServer};
use std::sync::Arc;

pub async fn handle(
    storage: Arc<Storage>,
    config: Config,
    host: Option<String>,
    port: Option<u16>,
    read_only: bool,
) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let read_only = read_only || config.server.read_only;

    if config.submission.auth_token.is_none() {
        tracing::warn!("No submission token configured; batch runs will be refused");
    }

    let state = AppState::new(storage, config, read_only)?;

    println!("Starting run viewer on {}:{}", host, port);
    if read_only {
        println!("Read-only mode: changes are refused");
    }

    WebServer::serve(state, &host, port).await
}
