//! hypersig notification server.
//!
//! Loads a JSON configuration, subscribes to the configured topics and
//! serves the WebSub notification receiver until Ctrl-C.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: tracing filter (default: "info,hypersig=debug")

use std::path::PathBuf;
use std::sync::Arc;

use hypersig::config::HyperConfig;
use hypersig::profile::JsonProfileSource;
use hypersig::recommendation::RecommendationRegistry;
use hypersig::router::NotificationRouter;
use hypersig::situation::SituationalContextValidator;
use hypersig::state::SharedState;
use hypersig::transport::{receiver_routes, HttpSubscribeSender, NOTIFICATIONS_PATH};
use hypersig::HyperResult;

/// Command-line options.
#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    port: Option<u16>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --config requires a value");
                    std::process::exit(1);
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    let port: u16 = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("error: invalid port number: {}", args[i + 1]);
                        std::process::exit(1);
                    });
                    parsed.port = Some(port);
                    i += 2;
                } else {
                    eprintln!("error: --port requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                println!("hypersig-server - WebSub notification router");
                println!();
                println!("USAGE:");
                println!("    hypersig-server [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <FILE>       JSON configuration file");
                println!("    -p, --port <PORT>         Port to listen on [default: 8081]");
                println!("    -h, --help                Print help information");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {}", arg);
                std::process::exit(1);
            }
        }
    }

    parsed
}

fn load_config(args: &Args) -> HyperResult<HyperConfig> {
    let mut cfg = match &args.config {
        Some(path) => HyperConfig::from_path(path)?,
        None => HyperConfig::default(),
    };
    if let Some(port) = args.port {
        let host = cfg.bind_addr.rsplit_once(':').map_or("127.0.0.1", |(h, _)| h).to_string();
        cfg.bind_addr = format!("{host}:{port}");
        if args.config.is_none() {
            cfg.callback_uri = format!("http://{host}:{port}{NOTIFICATIONS_PATH}");
        }
    }
    Ok(cfg)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hypersig=debug".into()),
        )
        .init();

    let args = parse_args();
    if let Err(e) = run(&args) {
        tracing::error!(error = %e, "hypersig-server failed");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> HyperResult<()> {
    let cfg = load_config(args)?;

    let state = SharedState::with_namespaces(cfg.namespace_registry()?);
    let sender = Arc::new(HttpSubscribeSender::new(cfg.callback_uri.clone(), cfg.agent_web_id.clone())?);
    let router = Arc::new(NotificationRouter::start(cfg.router_config(), state.clone(), sender)?);

    let recommendations = Arc::new(RecommendationRegistry::new(
        state,
        Arc::new(JsonProfileSource::new()),
        SituationalContextValidator::default(),
    ));

    // Handshakes use a blocking client, so they run before the runtime starts.
    for sub in &cfg.subscriptions {
        router.register_for_topic(&sub.topic, &sub.source, sub.mode.clone(), recommendations.clone())?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| hypersig::HyperError::internal(format!("failed to start runtime: {e}")))?;

    runtime.block_on(serve(&cfg.bind_addr, Arc::clone(&router)))?;

    let snapshot = router.stop()?;
    tracing::info!(
        delivered = snapshot.delivered,
        failed = snapshot.failed,
        dropped = snapshot.dropped,
        "router stopped"
    );
    Ok(())
}

async fn serve(bind_addr: &str, router: Arc<NotificationRouter>) -> HyperResult<()> {
    let app = receiver_routes(router);

    tracing::info!("hypersig-server listening on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health          liveness probe");
    tracing::info!("  POST {}  WebSub notifications", NOTIFICATIONS_PATH);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| hypersig::HyperError::internal(format!("failed to bind {bind_addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .map_err(|e| hypersig::HyperError::internal(format!("server failed: {e}")))
}
