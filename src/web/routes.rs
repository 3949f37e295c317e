use actix_web::http::Method;
use actix_web::middleware::DefaultHeaders;
use actix_web::web;
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/status", web::get().to(handlers::status))
            .route("/ask", web::post().to(handlers::ask))
            .route("/ask", web::method(Method::OPTIONS).to(handlers::ask_preflight))
    )
    .route("/", web::get().to(handlers::index))
    .route("/health", web::get().to(handlers::health_check));
}

// Any origin may call the API; added to every response, pre-flight included
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Headers", "Content-Type"))
        .add(("Access-Control-Allow-Methods", "GET,POST,OPTIONS"))
}
