//! HTTP surface: `GET /stream` (server-sent events) and `GET /snapshot`

use actix_web::http::header::{CacheControl, CacheDirective, ContentType};
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use tracing::{info, warn};

use super::{event_stream, StreamContext, EVENT_STREAM_MIME};

#[get("/stream")]
async fn stream(context: web::Data<StreamContext>) -> impl Responder {
    let context = context.get_ref().clone();
    let listener = context.aggregator.subscribe();

    HttpResponse::Ok()
        .content_type(EVENT_STREAM_MIME)
        .insert_header(CacheControl(vec![CacheDirective::NoCache]))
        .streaming(event_stream(context, listener))
}

#[get("/snapshot")]
async fn snapshot(context: web::Data<StreamContext>) -> impl Responder {
    match context.current_json().await {
        Ok(json) => HttpResponse::Ok().content_type(ContentType::json()).body(json),
        Err(e) => {
            warn!(error = %e, "Snapshot unavailable");
            HttpResponse::ServiceUnavailable().finish()
        }
    }
}

/// Register the routes on an app
pub fn routes(config: &mut web::ServiceConfig) {
    config.service(stream).service(snapshot);
}

/// Serve until the context's cancellation token fires
///
/// Open event streams end on cancellation, so the graceful stop does not
/// wait on them.
///
/// # Errors
///
/// Returns the bind or server I/O error
pub async fn serve(bind: &str, context: StreamContext) -> std::io::Result<()> {
    let cancel = context.cancel.clone();
    let data = web::Data::new(context);

    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
        .disable_signals()
        .bind(bind)?
        .run();

    info!(bind, "Event stream server listening");

    let handle = server.handle();
    tokio::spawn(async move {
        cancel.cancelled().await;
        handle.stop(true).await;
    });

    server.await
}
