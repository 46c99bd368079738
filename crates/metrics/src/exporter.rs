use anyhow::{anyhow, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{Encoder, Registry, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Serve the registry as a prometheus text endpoint.
///
/// Binds immediately and answers every path with the encoded metric
/// families; the returned handle keeps the server alive.
pub async fn serve_metrics(bind: &str, registry: Arc<Registry>) -> Result<JoinHandle<()>> {
    let addr: SocketAddr = bind.parse()?;

    let make_service = make_service_fn(move |_| {
        let registry = Arc::clone(&registry);
        async move {
            Ok::<_, Infallible>(service_fn(move |_req: Request<Body>| {
                let registry = Arc::clone(&registry);
                async move {
                    let encoder = TextEncoder::new();
                    let metric_families = registry.gather();
                    let mut buffer = Vec::new();
                    encoder.encode(&metric_families, &mut buffer).unwrap_or(());
                    Ok::<_, Infallible>(
                        Response::builder()
                            .status(200)
                            .header("Content-Type", encoder.format_type())
                            .body(Body::from(buffer))
                            .expect("valid HTTP response"),
                    )
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .map_err(|err| anyhow!("failed to bind metrics endpoint on {addr}: {err}"))?
        .serve(make_service);

    log::info!("metrics endpoint listening on {addr}");
    let handle = tokio::spawn(async move {
        if let Err(err) = server.await {
            log::error!("metrics endpoint failed: {err}");
        }
    });

    Ok(handle)
}
