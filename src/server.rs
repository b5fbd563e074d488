//! HTTP routes serving the cached key sets.

use std::sync::Arc;
use std::time::Instant;

use actix_web::http::header::{self, ContentType, HeaderMap, HeaderName};
use actix_web::http::{Method, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::*;

use crate::cache::RefreshCache;

/// Content type of every key set response.
pub const CONTENT_TYPE_JWKS: &str = "application/json; charset=utf-8";

/// The caches backing the exposed routes.
#[derive(Debug, Clone)]
pub struct Routes {
    /// Serves keys that declare an algorithm, on `/` and `/fixed`.
    pub with_algorithm: Arc<RefreshCache>,
    /// Serves every upstream key, on `/raw`.
    pub raw: Arc<RefreshCache>,
}

impl Routes {
    /// Registers `/`, `/fixed` and `/raw` on an actix [`web::ServiceConfig`].
    ///
    /// Every method is routed to [`serve_jwks`], which rejects anything but GET.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        let with_algorithm = web::Data::from(Arc::clone(&self.with_algorithm));
        let raw = web::Data::from(Arc::clone(&self.raw));

        for path in ["/", "/fixed"] {
            cfg.service(
                web::resource(path)
                    .app_data(with_algorithm.clone())
                    .route(web::route().to(serve_jwks)),
            );
        }
        cfg.service(
            web::resource("/raw")
                .app_data(raw)
                .route(web::route().to(serve_jwks)),
        );
    }
}

/// Serves the key set held by the route's cache.
pub async fn serve_jwks(
    req: HttpRequest,
    cache: web::Data<RefreshCache>,
) -> crate::Result<HttpResponse> {
    let span = info_span!(
        "request",
        method = %req.method(),
        path = req.path(),
        remote = %req.peer_addr().map(|addr| addr.to_string()).unwrap_or_default(),
        filter = cache.filter().name(),
    );

    respond(&req, &cache).instrument(span).await
}

async fn respond(req: &HttpRequest, cache: &RefreshCache) -> crate::Result<HttpResponse> {
    let started = Instant::now();
    debug!(headers = ?loggable_headers(req.headers()), "request headers");

    if req.method() != Method::GET {
        let status = StatusCode::METHOD_NOT_ALLOWED;
        info!(status = status.as_u16(), duration = ?started.elapsed(), "served request");
        return Ok(HttpResponse::build(status)
            .insert_header((header::ALLOW, "GET"))
            .insert_header(ContentType::plaintext())
            .body(status.canonical_reason().unwrap_or_default()));
    }

    let retrieve_started = Instant::now();
    let lookup = cache.lookup().await;
    let retrieve = retrieve_started.elapsed();

    let cached = match lookup {
        Ok(cached) => cached,
        Err(err) => {
            error!(
                error = %err,
                retrieve = ?retrieve,
                duration = ?started.elapsed(),
                "internal error",
            );
            return Err(err);
        }
    };

    info!(
        status = StatusCode::OK.as_u16(),
        cache = cached.status.as_str(),
        retrieve = ?retrieve,
        duration = ?started.elapsed(),
        "served request",
    );

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, CONTENT_TYPE_JWKS))
        .body(cached.bytes))
}

/// Request headers minus credentials.
fn loggable_headers(headers: &HeaderMap) -> Vec<(&str, &str)> {
    headers
        .iter()
        .filter(|(name, _)| !is_redacted(name))
        .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("<binary>")))
        .collect()
}

fn is_redacted(name: &HeaderName) -> bool {
    name == header::AUTHORIZATION || name == header::PROXY_AUTHORIZATION || name == header::COOKIE
}
