//! # jwks-server
//!
//! A caching reverse proxy for a JSON Web Key Set. The upstream `jwks_uri` is
//! either configured directly or discovered from an OpenID issuer. The key set
//! is fetched on demand, filtered, cached as serialized bytes, and served by
//! `actix-web` to any number of concurrent readers with at most one upstream
//! fetch in flight per cache.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use actix_web::{App, HttpServer};
//! use jwks_server::{build_http_client, EndpointConfig, JwksClient, KeyFilter, RefreshCache, Routes};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let http = build_http_client(Duration::from_millis(750)).unwrap();
//!     let url = EndpointConfig::with_issuer("https://issuer.example")
//!         .resolve(&http)
//!         .await
//!         .unwrap(); // Don't forget to handle this error
//!
//!     let client = JwksClient::with_client(http, url);
//!     let ttl = Duration::from_secs(300);
//!     let routes = Routes {
//!         with_algorithm: Arc::new(RefreshCache::new(client.clone(), KeyFilter::WithAlgorithm, ttl)),
//!         raw: Arc::new(RefreshCache::new(client, KeyFilter::None, ttl)),
//!     };
//!
//!     HttpServer::new(move || App::new().configure(|cfg| routes.configure(cfg)))
//!         .bind(("127.0.0.1", 8080))?
//!         .run()
//!         .await
//! }
//! ```

mod cache;
mod client;
mod config;
mod error;
mod impls;
mod jwk;
mod observability;
mod server;

pub use cache::*;
pub use client::*;
pub use config::*;
pub use error::*;
pub use jwk::*;
pub use observability::*;
pub use server::*;
