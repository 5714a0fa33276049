//! Catch-all proxy resource.

use crate::services::http::RouteHandler;
use actix_web::{web, HttpRequest};

/// Configures the main proxy route.
///
/// Registers a catch-all `/{tail:.*}` resource that hands every request to
/// the [`RouteHandler`] pipeline; route resolution, policies and forwarding
/// all happen inside the handler. The handler renders its own errors, so the
/// resource is infallible from actix's point of view.
pub fn configure_route(cfg: &mut web::ServiceConfig, handler: RouteHandler) {
    cfg.service(web::resource("/{tail:.*}").to(
        move |req: HttpRequest, payload: web::Payload| {
            let handler = handler.clone();
            async move { handler.handle_request(req, payload.into_inner()).await }
        },
    ));
}
