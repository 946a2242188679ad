use actix_web::{HttpResponse, Responder};

pub async fn health() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

pub async fn ready() -> impl Responder {
    HttpResponse::Ok().body("READY")
}
