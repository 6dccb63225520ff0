// Commute recommendation server for a voice assistant
// VVS trip data (Pragfriedhof -> Weilimdorf, 07:00-08:30) summarised by Gemini

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::{header, Method};
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

mod advisor;
mod commute;
mod config;
mod gemini;
mod logging;
mod vvs_api_models;

use advisor::CommuteAdvisor;
use commute::DepartureWindow;
use config::Config;
use gemini::{GeminiClient, LanguageModel};
use vvs_api_models::VvsClient;

const GENERIC_ERROR: &str =
    "Sorry, something went wrong with the transit data service. Please try again later.";

#[derive(Clone)]
struct AppState {
    advisor: CommuteAdvisor,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn error_response(details: String) -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorBody {
        error: GENERIC_ERROR.to_string(),
        details: Some(details),
    })
}

// ============================================================================
// Endpoints
// ============================================================================

async fn get_recommendation(state: web::Data<AppState>) -> HttpResponse {
    log::info!("🚆 Recommendation requested");

    let advisor = state.advisor.clone();
    match tokio::task::spawn_blocking(move || advisor.recommend(commute::today())).await {
        Ok(Ok(recommendation)) => HttpResponse::Ok().json(recommendation),
        Ok(Err(e)) => {
            log::error!("Error processing request: {}", e);
            error_response(e.to_string())
        }
        Err(e) => {
            log::error!("Recommendation task panicked: {}", e);
            error_response(format!("Recommendation task panicked: {}", e))
        }
    }
}

async fn preflight() -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
        .finish()
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "VVS Commute Advisor",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().timestamp(),
        "model_configured": state.advisor.has_model()
    }))
}

fn recommendation_resource(path: &str) -> actix_web::Resource {
    web::resource(path)
        .route(web::get().to(get_recommendation))
        .route(web::method(Method::OPTIONS).to(preflight))
}

fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .service(recommendation_resource("/"))
        .service(recommendation_resource("/api"));
}

/// `Access-Control-Allow-Origin: *` on every response, with or without an
/// `Origin` request header. Preflights of any shape reach `preflight`.
fn cors_headers() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new().add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
}

fn build_app(
    state: web::Data<AppState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(state)
        .wrap(cors_headers())
        .wrap(middleware::Logger::default())
        .wrap(middleware::Compress::default())
        .configure(configure_routes)
}

// ============================================================================
// Server Setup
// ============================================================================

fn build_advisor(config: &Config) -> Result<CommuteAdvisor, Box<dyn std::error::Error>> {
    let trips = Arc::new(VvsClient::new(config.vvs_trip_url.clone(), config.http_timeout)?);

    let model: Option<Arc<dyn LanguageModel>> = match &config.gemini_api_key {
        Some(key) => Some(Arc::new(GeminiClient::new(
            config.gemini_base_url.clone(),
            key.clone(),
            config.http_timeout,
        )?)),
        None => {
            log::warn!("⚠️  GEMINI_API_KEY not set, recommendations will fail until it is configured");
            None
        }
    };

    let window = DepartureWindow::morning()?;
    Ok(CommuteAdvisor::new(trips, model, config.gemini_model.clone(), window))
}

async fn run_server(state: AppState, bind_addr: String, port: u16) -> std::io::Result<()> {
    log::info!("🌐 Server running on: http://{}:{}", bind_addr, port);
    log::info!("📍 Routes: GET|OPTIONS /api, GET|OPTIONS /, GET /health");

    HttpServer::new(move || build_app(web::Data::new(state.clone())))
        .bind((bind_addr.as_str(), port))?
        .run()
        .await
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> std::io::Result<()> {
    let config = Config::from_env();
    logging::init(config.log_format);

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║    🚆 VVS Commute Advisor                                  ║");
    println!("║       Pragfriedhof -> Weilimdorf, 07:00-08:30              ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");

    // Clients are built outside the async runtime; `state` outlives it.
    let state = match build_advisor(&config) {
        Ok(advisor) => AppState { advisor },
        Err(e) => {
            log::error!("❌ Failed to initialize clients: {}", e);
            std::process::exit(1);
        }
    };

    actix_web::rt::System::new().block_on(run_server(
        state.clone(),
        config.bind_addr.clone(),
        config.port,
    ))
}
