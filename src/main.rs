//! labelgate - tenant-scoping reverse proxy for monitoring query APIs.
//!
//! Forwards all traffic to the configured upstream query API and rewrites
//! rules/alerts response bodies so that only entries carrying the caller's
//! tenant label value remain visible.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::Parser;
use http::header::HeaderName;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto;
use labelgate::config::GateConfig;
use labelgate::error::GateError;
use labelgate::logging_layer::logging_layer;
use labelgate::proxy_service::ProxyService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, broadcast};
use tokio::time::sleep;
use tower::ServiceBuilder;
use tracing::{error, info, warn};

/// Command-line configuration for the proxy server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Config {
    /// Port to listen on
    #[arg(short, long, env = "PROXY_PORT", default_value = "8080")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Upstream query API base URL (e.g. "http://prometheus:9090")
    #[arg(long, env = "UPSTREAM_URL")]
    upstream_url: String,

    /// Label name designating tenant ownership
    #[arg(long, env = "LABELGATE_LABEL", default_value = "tenant")]
    label: String,

    /// Request header carrying the tenant value
    #[arg(long, env = "LABELGATE_TENANT_HEADER", default_value = "X-Scope-OrgID")]
    tenant_header: String,

    /// Graceful shutdown timeout in seconds
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value = "30")]
    shutdown_timeout: u64,
}

/// Connection tracker for graceful shutdown.
#[derive(Clone)]
struct ConnectionTracker {
    active_connections: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    fn new() -> Self {
        Self {
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn increment(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
    }

    fn count(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli_config = Config::parse();
    let gate_config = GateConfig::from_env();

    let tenant_header = HeaderName::from_bytes(cli_config.tenant_header.as_bytes())
        .map_err(|e| format!("invalid tenant header name: {}", e))?;

    let addr = format!("{}:{}", cli_config.bind, cli_config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(
        addr = %addr,
        upstream = %cli_config.upstream_url,
        label = %cli_config.label,
        tenant_header = %cli_config.tenant_header,
        max_concurrent_streams = gate_config.max_concurrent_streams,
        resp_buffer_max = gate_config.resp_buffer_max,
        "labelgate starting"
    );

    let proxy_service = ProxyService::new(
        cli_config.upstream_url.clone(),
        cli_config.label.clone(),
        tenant_header,
        gate_config.clone(),
    )?;
    let service_stack = ServiceBuilder::new()
        .layer(logging_layer())
        .service(proxy_service);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let shutdown_tx_clone = shutdown_tx.clone();
    let connection_tracker = ConnectionTracker::new();
    let tracker_clone = connection_tracker.clone();
    let config_clone = gate_config.clone();

    let semaphore = Arc::new(Semaphore::new(gate_config.max_concurrent_streams));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                let _ = shutdown_tx_clone.send(());
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    {
        let shutdown_tx_sigterm = shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating graceful shutdown");
                    let _ = shutdown_tx_sigterm.send(());
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for SIGTERM");
                }
            }
        });
    }

    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let permit = match semaphore.clone().try_acquire_owned() {
                            Ok(p) => p,
                            Err(_) => {
                                warn!(
                                    peer = %peer_addr,
                                    max_streams = gate_config.max_concurrent_streams,
                                    "Rejected connection: max concurrent streams reached"
                                );
                                tokio::spawn(async move {
                                    let _ = send_503_response(stream).await;
                                });
                                continue;
                            }
                        };

                        if let Err(e) = configure_tcp_stream(&stream, &config_clone) {
                            error!(error = %e, "Failed to configure socket");
                        }

                        let service_stack = service_stack.clone();
                        let mut conn_shutdown_rx = shutdown_tx.subscribe();
                        let tracker = connection_tracker.clone();

                        tracker.increment();

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(
                                stream,
                                peer_addr,
                                service_stack,
                                &mut conn_shutdown_rx,
                            )
                            .await
                            {
                                error!(error = %e, "Connection handling error");
                            }

                            tracker.decrement();
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                }
            }

            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping new connections");
                break;
            }
        }
    }

    info!(
        active_connections = tracker_clone.count(),
        timeout_seconds = cli_config.shutdown_timeout,
        "Waiting for active connections to drain"
    );

    let shutdown_deadline = Duration::from_secs(cli_config.shutdown_timeout);
    let start = std::time::Instant::now();

    while tracker_clone.count() > 0 {
        if start.elapsed() >= shutdown_deadline {
            warn!(
                active_connections = tracker_clone.count(),
                "Shutdown timeout reached, forcing exit"
            );
            break;
        }

        sleep(Duration::from_millis(100)).await;
    }

    if tracker_clone.count() == 0 {
        info!("All connections drained, shutting down cleanly");
    }

    Ok(())
}

/// Handle a single connection with HTTP protocol.
async fn handle_connection<S, B>(
    stream: TcpStream,
    _peer_addr: SocketAddr,
    service: S,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> Result<(), GateError>
where
    S: tower::Service<Request<Incoming>, Response = Response<B>, Error = GateError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    B: http_body::Body<Data = bytes::Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let io = TokioIo::new(stream);

    let svc_fn = hyper::service::service_fn(move |req| {
        let mut svc = service.clone();
        async move {
            // Every service error becomes a proxy-level error response;
            // there is no fallback to an unfiltered body.
            let result: Result<_, std::convert::Infallible> = match svc.call(req).await {
                Ok(response) => Ok(response.map(|body| {
                    body.map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { e.into() })
                        .boxed()
                })),
                Err(e) => {
                    error!(error = %e, "Service error");
                    Ok(e.to_response().map(|body| {
                        body.map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                            match e {}
                        })
                        .boxed()
                    }))
                }
            };
            result
        }
    });

    let executor = hyper_util::rt::TokioExecutor::new();
    let builder = auto::Builder::new(executor);
    let conn = builder.serve_connection(io, svc_fn);

    tokio::pin!(conn);

    tokio::select! {
        result = &mut conn => {
            if let Err(e) = result {
                error!(error = %e, "Connection error");
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received, gracefully closing connection");
            conn.as_mut().graceful_shutdown();
            let _ = tokio::time::timeout(Duration::from_secs(5), conn).await;
        }
    }

    Ok(())
}

/// Configure a TcpStream with the tuned socket options.
fn configure_tcp_stream(stream: &TcpStream, config: &GateConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    let socket = socket2::SockRef::from(stream);

    let keepalive =
        socket2::TcpKeepalive::new().with_time(Duration::from_secs(config.tcp_keepalive_secs));
    socket.set_tcp_keepalive(&keepalive)?;

    socket.set_recv_buffer_size(config.socket_buffer_size)?;
    socket.set_send_buffer_size(config.socket_buffer_size)?;

    Ok(())
}

/// Send a 503 response when the concurrency semaphore is exhausted.
async fn send_503_response(mut stream: TcpStream) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let body = "503 Service Unavailable\n\n\
                labelgate has reached its maximum concurrent stream limit.\n\
                Please retry your request in a moment.";
    let response = format!(
        "HTTP/1.1 503 Service Unavailable\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         Retry-After: 1\r\n\
         \r\n\
         {}",
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
