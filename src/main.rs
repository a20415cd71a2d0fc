use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "rproxy")]
#[command(about = "Host-based HTTP/HTTPS reverse proxy", version)]
struct Cli {
    /// Path to an alternative config file (default: /etc/rproxy/rproxy.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = rproxy::config::load_config(cli.config.as_deref())?;
    rproxy::observability::logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rproxy starting");
    tracing::info!(
        http = %config.listener.http_address,
        https = %config.listener.https_address,
        stats = %config.stats.bind_address,
        data_dir = %config.paths.data_dir.display(),
        "Configuration loaded"
    );

    let supervisor = rproxy::Supervisor::new(config)?;
    supervisor.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
