use actix_web::{web, HttpResponse, Responder};
use log::{error, info, warn};
use serde_json::json;
use tera::Context;
use uuid::Uuid;

use crate::web::models::{AskRequest, AskResponse, ErrorResponse, StatusResponse};
use crate::AppState;

// Index page handler
pub async fn index(data: web::Data<AppState>) -> impl Responder {
    let mut context = Context::new();
    context.insert("wallet", &data.wallet.checksummed());
    context.insert("model", &data.oracle.selection().label);
    match data.tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => {
            error!("Template error: {}", e);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

// Wallet, token balance and active model. A failed balance read is reported inline.
pub async fn status(data: web::Data<AppState>) -> impl Responder {
    let balance = data.balances.balance(data.wallet.address()).await;
    HttpResponse::Ok().json(StatusResponse {
        wallet: data.wallet.checksummed(),
        balance,
        model: data.oracle.selection().label.clone(),
    })
}

// Pre-flight for the ask endpoint; the CORS headers come from the app wrapper
pub async fn ask_preflight() -> impl Responder {
    HttpResponse::Ok().json(json!({}))
}

// Oracle endpoint. The body is read leniently so a malformed request still
// gets a question back rather than a 400.
pub async fn ask(data: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let request = AskRequest::from_body(&body);
    let request_id = Uuid::new_v4();

    info!(
        "Ask request {}: category={} q#{} ({} history entries)",
        request_id,
        request.category,
        request.question_num,
        request.history.len()
    );

    match data.oracle.ask(&request).await {
        Ok(answer) => HttpResponse::Ok().json(AskResponse {
            success: true,
            response: answer.reply,
            payment_hash: answer.payment_hash,
            question_num: request.question_num,
        }),
        Err(e) => {
            if e.is_timeout() {
                warn!("Ask request {} timed out", request_id);
            } else {
                error!("Ask request {} failed: {}", request_id, e);
            }
            HttpResponse::InternalServerError().json(ErrorResponse::new(e.to_string()))
        }
    }
}
