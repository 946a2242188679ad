#![allow(dead_code)]

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use unique_request_service::config::CallbackMode;
use unique_request_service::services::event_bridge::InMemoryBus;
use unique_request_service::services::{
    CallbackDispatcher, EventBridge, EventPublisher, UniqueRequestService,
};
use unique_request_service::AppState;

pub const TOPIC: &str = "unique-requests";

/// Callback received by the capture server
#[derive(Debug, Clone)]
pub struct CapturedCallback {
    pub method: String,
    pub path: String,
    pub body: String,
}

pub fn service_on(publisher: Arc<dyn EventPublisher>) -> Arc<UniqueRequestService> {
    let bridge = EventBridge::new(publisher, TOPIC, TOPIC);
    Arc::new(UniqueRequestService::new(bridge))
}

pub fn memory_service() -> (InMemoryBus, Arc<UniqueRequestService>) {
    let bus = InMemoryBus::new(1024);
    let service = service_on(Arc::new(bus.clone()));
    (bus, service)
}

pub fn app_state(service: Arc<UniqueRequestService>, mode: CallbackMode) -> AppState {
    let callbacks =
        CallbackDispatcher::new(Duration::from_secs(2)).expect("callback client");
    AppState::new(service, callbacks, mode)
}

async fn capture(
    req: HttpRequest,
    body: web::Bytes,
    captured: web::Data<Mutex<Vec<CapturedCallback>>>,
) -> HttpResponse {
    captured.lock().unwrap().push(CapturedCallback {
        method: req.method().to_string(),
        path: req.path().to_string(),
        body: String::from_utf8_lossy(&body).to_string(),
    });
    HttpResponse::Ok().finish()
}

/// Start an HTTP server on an ephemeral port that records every request.
pub fn start_capture_server() -> (SocketAddr, web::Data<Mutex<Vec<CapturedCallback>>>) {
    let captured = web::Data::new(Mutex::new(Vec::new()));
    let data = captured.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .default_service(web::to(capture))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("bind capture server");

    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());

    (addr, captured)
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
