//! `docflow server`: Start the HTTP server.

use docflow_core::DocflowConfig;

pub async fn run(
    mut config: DocflowConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), String> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    println!(
        "Starting docflow server on {}:{}...",
        config.server.host, config.server.port
    );

    let addr = docflow_server::start_server(config).await?;
    println!("docflow server listening on http://{}", addr);

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}
