use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comment_service::db::{ensure_comments_table, PgCommentStore};
use comment_service::handlers::{self, AppState};
use comment_service::identity::HttpIdentityResolver;
use comment_service::middleware::{CorrelationIdMiddleware, RequestTimingMiddleware};
use comment_service::services::CommentService;
use comment_service::Config;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting comment-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    // Initialize database connection pool
    let db_pool = match PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database pool creation failed: {}", e);
            eprintln!("ERROR: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = ensure_comments_table(&db_pool).await {
        tracing::error!("Schema check failed: {:#}", e);
        eprintln!("ERROR: Failed to ensure comments table: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Connected to database");

    let store = Arc::new(PgCommentStore::new(db_pool));
    let identities = Arc::new(HttpIdentityResolver::new(config.identity.base_url.clone()));
    let state = web::Data::new(AppState {
        comments: CommentService::new(store, identities),
        jwt_secret: config.auth.jwt_secret.clone(),
    });

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Starting HTTP server at {}", bind_address);

    let allowed_origins = config.cors.allowed_origins.clone();

    HttpServer::new(move || {
        let mut cors = Cors::default();
        for origin in allowed_origins.split(',').map(str::trim) {
            if !origin.is_empty() {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors.allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .app_data(state.clone())
            // Registered innermost-first: the correlation id wrap runs
            // before the timing wrap reads it from request extensions.
            .wrap(RequestTimingMiddleware)
            .wrap(DefaultHeaders::new().add((header::CACHE_CONTROL, "no-store")))
            .wrap(CorrelationIdMiddleware)
            .wrap(Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(cors)
            .configure(handlers::routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
