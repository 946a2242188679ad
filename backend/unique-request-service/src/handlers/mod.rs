use actix_web::web;

pub mod accept;
pub mod health;

pub use accept::{accept, AcceptParams};

use crate::metrics::metrics_handler;

/// Ingress path used by existing callers
pub const ACCEPT_PATH: &str = "/api/verve/accept";
/// Short alias of the ingress path
pub const ACCEPT_ALIAS_PATH: &str = "/accept";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(ACCEPT_PATH)
            .route(web::get().to(accept))
            .route(web::post().to(accept)),
    )
    .service(
        web::resource(ACCEPT_ALIAS_PATH)
            .route(web::get().to(accept))
            .route(web::post().to(accept)),
    )
    .route("/health", web::get().to(health::health))
    .route("/ready", web::get().to(health::ready))
    .route("/metrics", web::get().to(metrics_handler));
}
