use app_client::client::handlers::router;
use app_client::client::transport::HttpMasterTransport;
use app_client::{AppClient, AppClientListener, ClientConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Logs every lifecycle event and wakes `main` when the session dies.
struct LoggingListener {
    dead: Arc<Notify>,
}

impl AppClientListener for LoggingListener {
    fn connected(&self, app_id: &str) {
        tracing::info!("Connected to cluster as {}", app_id);
    }

    fn disconnected(&self) {
        tracing::warn!("Disconnected from master, waiting for failover");
    }

    fn dead(&self, reason: &str) {
        tracing::error!("Application session is dead: {}", reason);
        self.dead.notify_one();
    }

    fn executor_added(
        &self,
        full_id: &str,
        worker_id: &str,
        host_port: &str,
        cores: u32,
        memory_mb: u32,
    ) {
        tracing::info!(
            "Granted executor {} on {} ({}) with {} core(s), {} MB",
            full_id,
            worker_id,
            host_port,
            cores,
            memory_mb
        );
    }

    fn executor_removed(
        &self,
        full_id: &str,
        message: &str,
        exit_status: Option<i32>,
        worker_host: Option<&str>,
    ) {
        tracing::info!(
            "Executor {} removed: {} (exit status {:?}, worker host {:?})",
            full_id,
            message,
            exit_status,
            worker_host
        );
    }

    fn worker_removed(&self, worker_id: &str, host: &str, message: &str) {
        tracing::info!("Worker {} on {} removed: {}", worker_id, host, message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config = match ClientConfig::from_args(&args[1..]) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!(
                "Usage: {} --master <url> [--master <url>...] [--bind <addr:port>] [--advertise <addr:port>] [--name <app>]",
                args[0]
            );
            eprintln!(
                "Example: {} --master cluster://10.0.0.1:7077,10.0.0.2:7077 --bind 10.0.0.5:7078",
                args[0]
            );
            std::process::exit(1);
        }
    };

    let callback_addr = config.callback_addr;
    let dead = Arc::new(Notify::new());

    let transport = Arc::new(HttpMasterTransport::new(config.ask_retries));
    let listener = Arc::new(LoggingListener { dead: dead.clone() });
    let client = AppClient::new(config, transport, listener)?;

    tracing::info!("Candidate masters: {:?}", client.masters());

    // Bind before registering so master replies queue up instead of failing.
    let tcp = tokio::net::TcpListener::bind(callback_addr).await?;
    tracing::info!("Callback server listening on {}", callback_addr);

    let handle = client.start().await?;
    let app = router(handle);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(tcp, app).await {
            tracing::error!("Callback server failed: {}", e);
        }
    });

    let stats_client = client.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            match stats_client.status().await {
                Ok(status) => tracing::info!(
                    "Client status: registered={} app={:?} master={:?} disconnected={} round={}",
                    status.registered,
                    status.app_id,
                    status.active_master.map(|m| m.to_string()),
                    status.disconnected,
                    status.registration_attempt
                ),
                Err(_) => break,
            }
        }
    });

    tracing::info!("Press Ctrl+C to shutdown");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown requested"),
        _ = dead.notified() => {}
    }

    client.stop().await;

    Ok(())
}
