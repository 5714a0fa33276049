//! Portico API Gateway Server
//!
//! Binary entry point: loads and validates configuration, compiles the
//! request pipeline and starts the HTTP server with graceful shutdown.

use portico_rs::config::settings::load_settings;
use portico_rs::config::validation::ConfigValidator;
use portico_rs::logs::logger::configure_logger;
use portico_rs::models::settings::Settings;
use portico_rs::routes::{health, http};
use portico_rs::services::http::RouteHandler;

use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info, warn};
use tokio::signal;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let config: Settings = load_settings().unwrap_or_else(|e| {
        eprintln!("Failed to load settings: {}", e);
        std::process::exit(1);
    });

    info!("Starting Portico API Gateway v{}", env!("CARGO_PKG_VERSION"));

    let validation = ConfigValidator::validate_comprehensive(&config);
    if !validation.is_valid {
        error!("Configuration validation failed:");
        for e in &validation.errors {
            error!("  - {}", e);
        }
        std::process::exit(1);
    }
    for w in &validation.warnings {
        warn!("Configuration warning: {}", w);
    }
    info!(
        "Configuration validated: {} routes, {} warnings",
        config.routes.len(),
        validation.warnings.len()
    );

    let route_handler = RouteHandler::from_settings(&config).unwrap_or_else(|e| {
        error!("Failed to compile routes: {}", e);
        std::process::exit(1);
    });

    // Coarse gateway-wide limiter in front of the per-route fixed-window
    // limiters.
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(100)
        .burst_size(200)
        .finish()
        .unwrap();

    let host = std::env::var("PORTICO_HOST").unwrap_or_else(|_| config.server.host.clone());
    let port = std::env::var("PORTICO_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(config.server.port);
    let shutdown_timeout = config.server.shutdown_timeout_secs;

    info!("Starting server on {}:{}", host, port);

    let handler_for_server = route_handler.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(handler_for_server.clone()))
            .wrap(Governor::new(&governor_conf))
            .wrap(Logger::new(
                r#"%a "%r" %s %b "%{Referer}i" "%{User-Agent}i" %T"#,
            ))
            .wrap(actix_web::middleware::Compress::default())
            .configure(health::configure_health)
            .configure(|cfg| http::configure_route(cfg, handler_for_server.clone()))
    })
    .shutdown_timeout(shutdown_timeout)
    .bind((host.as_str(), port))?
    .run();

    info!("Server started successfully");

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("Server stopped gracefully"),
                Err(e) => error!("Server error: {}", e),
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal, draining in-flight requests...");
        }
    }

    Ok(())
}
