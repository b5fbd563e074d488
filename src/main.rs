//! `jwkssvr`: serves a filtered, cached copy of a remote JSON Web Key Set.

use std::process;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::Service;
use actix_web::{App, HttpServer};
use clap::Parser;
use futures::future::join;
use jwks_server::{
    build_http_client, init_tracing, service_span, JwksClient, KeyFilter, Options, RefreshCache,
    Routes,
};
use tracing::*;

const CLIENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
const KEEP_ALIVE: Duration = Duration::from_secs(2);
const SHUTDOWN_TIMEOUT_SECS: u64 = 1;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let opts = Options::parse();
    init_tracing(opts.log_format, opts.log_level);

    let span = service_span(env!("CARGO_BIN_NAME"));
    run(opts, span.clone()).instrument(span).await
}

async fn run(opts: Options, span: Span) -> std::io::Result<()> {
    let http = match build_http_client(opts.fetch_timeout()) {
        Ok(http) => http,
        Err(err) => {
            error!(error = %err, "failed to build http client");
            process::exit(1);
        }
    };

    let endpoint = opts.endpoint();
    let jwks_uri = match endpoint.resolve(&http).await {
        Ok(url) => url,
        Err(err) => {
            error!(error = %err, issuer = ?endpoint.issuer(), "error resolving jwks_uri");
            process::exit(1);
        }
    };

    info!(
        port = opts.port,
        jwks_uri = %jwks_uri,
        issuer = ?endpoint.issuer(),
        log_level = opts.log_level.as_directive(),
        log_format = ?opts.log_format,
        refresh_interval = ?opts.refresh_interval(),
        fetch_timeout = ?opts.fetch_timeout(),
        "using these options",
    );

    if opts.dry_run {
        return Ok(());
    }

    let client = JwksClient::with_client(http, jwks_uri);
    let ttl = opts.refresh_interval();
    let routes = Routes {
        with_algorithm: Arc::new(RefreshCache::new(
            client.clone(),
            KeyFilter::WithAlgorithm,
            ttl,
        )),
        raw: Arc::new(RefreshCache::new(client, KeyFilter::None, ttl)),
    };

    // Failures are already logged by the cache; the first request retries.
    let (with_algorithm, raw) = join(routes.with_algorithm.refresh(), routes.raw.refresh()).await;
    if with_algorithm.is_err() || raw.is_err() {
        warn!("initial key set fetch failed, serving will retry on demand");
    }

    info!(port = opts.port, "starting server");
    HttpServer::new(move || {
        // Workers run on their own threads, so requests re-enter the root span.
        let span = span.clone();
        App::new()
            .wrap_fn(move |req, srv| srv.call(req).instrument(span.clone()))
            .configure(|cfg| routes.configure(cfg))
    })
    .client_request_timeout(CLIENT_REQUEST_TIMEOUT)
    .keep_alive(KEEP_ALIVE)
    .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS)
    .bind(("0.0.0.0", opts.port))?
    .run()
    .await?;

    info!("server shutdown");
    Ok(())
}
