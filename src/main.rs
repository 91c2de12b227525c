// src/main.rs - AgriPortal: department-scoped equipment inventory backend
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::{Compress, DefaultHeaders, Logger};
use actix_web::{web, App, HttpResponse, HttpServer};
use actix_web_httpauth::middleware::HttpAuthentication;
use anyhow::Context;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Sqlite, SqlitePool};
use std::env;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod auth_handlers;
mod config;
mod db;
mod department_handlers;
mod equipment_handlers;
mod error;
mod handlers;
mod import_export;
mod land_handlers;
mod maintenance_handlers;
mod models;
mod staffing_handlers;

use auth::{jwt_middleware, AuthService, CreateUserRequest, UserRole};
use auth_handlers::{
    change_password, create_user, delete_user, get_profile, get_roles, get_users, login,
};
use config::{load_config, Config};
use department_handlers::{
    create_department, delete_department, get_all_departments, get_department, update_department,
};
use equipment_handlers::{
    create_equipment, delete_equipment, get_equipment, get_equipment_by_id, update_equipment,
};
use handlers::get_dashboard_stats;
use import_export::{export_equipment, import_equipment};
use land_handlers::{create_land_asset, delete_land_asset, get_land_assets, update_land_asset};
use maintenance_handlers::{
    complete_maintenance_log, create_maintenance_log, delete_maintenance_log,
    get_maintenance_logs,
};
use staffing_handlers::{
    create_staff_position, delete_staff_position, get_staff_positions, update_staff_position,
};

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    setup_logging(&config)?;

    if config.is_production() {
        validate_production_config(&config)?;
    }

    config.print_startup_info();

    setup_database(&config.database.url).await?;
    let pool = create_database_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let auth_service = Arc::new(AuthService::new(
        &config.auth.jwt_secret,
        config.auth.token_expiration_hours,
        config.auth.bcrypt_cost,
    ));

    create_default_admin_if_needed(&pool, &auth_service).await?;

    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    log::info!("Starting server at http://{}", bind_address);

    let workers = config.server.workers;

    let mut server = HttpServer::new(move || {
        let cors = setup_improved_cors(&config.security.allowed_origins);
        let auth_middleware = HttpAuthentication::bearer(jwt_middleware);
        let security_headers = setup_security_headers(&config.security);

        App::new()
            .wrap(cors)
            .wrap(security_headers)
            .wrap(Logger::default())
            .wrap(Compress::default())
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            // Health check (no auth)
            .route(
                "/health",
                web::get().to(|| async { HttpResponse::Ok().body("OK") }),
            )
            // Login (no auth)
            .service(web::scope("/auth").route("/login", web::post().to(login)))
            // Protected API
            .service(
                web::scope("/api/v1")
                    .wrap(auth_middleware)
                    .service(
                        web::scope("/auth")
                            .route("/profile", web::get().to(get_profile))
                            .route("/change-password", web::post().to(change_password))
                            .route("/roles", web::get().to(get_roles))
                            .route("/users", web::get().to(get_users))
                            .route("/users", web::post().to(create_user))
                            .route("/users/{id}", web::delete().to(delete_user)),
                    )
                    .service(
                        web::scope("/dashboard").route("/stats", web::get().to(get_dashboard_stats)),
                    )
                    .service(
                        web::scope("/departments")
                            .route("", web::get().to(get_all_departments))
                            .route("", web::post().to(create_department))
                            .route("/{id}", web::get().to(get_department))
                            .route("/{id}", web::put().to(update_department))
                            .route("/{id}", web::delete().to(delete_department)),
                    )
                    .service(
                        web::scope("/equipment")
                            .route("", web::get().to(get_equipment))
                            .route("", web::post().to(create_equipment))
                            .route("/export", web::get().to(export_equipment))
                            .route("/import", web::post().to(import_equipment))
                            .route("/{id}", web::get().to(get_equipment_by_id))
                            .route("/{id}", web::put().to(update_equipment))
                            .route("/{id}", web::delete().to(delete_equipment))
                            .route("/{id}/maintenance", web::get().to(get_maintenance_logs))
                            .route("/{id}/maintenance", web::post().to(create_maintenance_log))
                            .route(
                                "/{id}/maintenance/{log_id}/complete",
                                web::post().to(complete_maintenance_log),
                            )
                            .route(
                                "/{id}/maintenance/{log_id}",
                                web::delete().to(delete_maintenance_log),
                            ),
                    )
                    .service(
                        web::scope("/staffing")
                            .route("", web::get().to(get_staff_positions))
                            .route("", web::post().to(create_staff_position))
                            .route("/{id}", web::put().to(update_staff_position))
                            .route("/{id}", web::delete().to(delete_staff_position)),
                    )
                    .service(
                        web::scope("/land-assets")
                            .route("", web::get().to(get_land_assets))
                            .route("", web::post().to(create_land_asset))
                            .route("/{id}", web::put().to(update_land_asset))
                            .route("/{id}", web::delete().to(delete_land_asset)),
                    ),
            )
    })
    .bind(&bind_address)?;

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server.run().await.context("Server failed to run")?;

    Ok(())
}

// ==================== HELPER FUNCTIONS ====================

pub fn setup_improved_cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .expose_headers(vec![header::CONTENT_LENGTH, header::CONTENT_DISPOSITION])
        .max_age(3600);

    let is_production = env::var("PORTAL_ENV").as_deref() == Ok("production");

    if allowed_origins.contains(&"*".to_string()) {
        if is_production {
            panic!("Wildcard CORS origin (*) is not allowed in production");
        }
        log::warn!("Using wildcard CORS (*) in development mode");
        cors = cors.allow_any_origin().allow_any_header().allow_any_method();
    } else {
        for origin in allowed_origins {
            if origin.is_empty() {
                continue;
            }
            cors = cors.allowed_origin(origin);
        }
    }

    cors
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn validate_production_config(config: &Config) -> anyhow::Result<()> {
    if config.auth.jwt_secret.len() < 32 {
        anyhow::bail!("Insecure JWT secret in production! Must be at least 32 characters.");
    }

    if config
        .security
        .allowed_origins
        .contains(&"*".to_string())
    {
        anyhow::bail!("Wildcard CORS origins not allowed in production!");
    }

    Ok(())
}

async fn setup_database(database_url: &str) -> anyhow::Result<()> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        log::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

async fn create_database_pool(
    db_config: &crate::config::DatabaseConfig,
) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_config.url.trim_start_matches("sqlite:"))
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

fn setup_security_headers(config: &crate::config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload",
        ));
    }

    headers
}

fn generate_admin_password() -> String {
    let mut rng = thread_rng();
    let digits: Vec<char> = "0123456789".chars().collect();
    let uppercase: Vec<char> = "ABCDEFGHIJKLMNOPQRSTUVWXYZ".chars().collect();
    let lowercase: Vec<char> = "abcdefghijklmnopqrstuvwxyz".chars().collect();

    let mut pwd_chars: Vec<char> = Vec::new();
    pwd_chars.push(*digits.choose(&mut rng).unwrap());
    pwd_chars.push(*uppercase.choose(&mut rng).unwrap());
    pwd_chars.push(*lowercase.choose(&mut rng).unwrap());

    for _ in 0..12 {
        pwd_chars.push(char::from(rng.sample(Alphanumeric)));
    }

    pwd_chars.shuffle(&mut rng);
    pwd_chars.into_iter().collect()
}

async fn create_default_admin_if_needed(
    pool: &SqlitePool,
    auth_service: &AuthService,
) -> anyhow::Result<()> {
    let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if user_count.0 > 0 {
        return Ok(());
    }

    let password =
        env::var("DEFAULT_ADMIN_PASSWORD").unwrap_or_else(|_| generate_admin_password());

    let admin_request = CreateUserRequest {
        username: "admin".to_string(),
        email: "admin@agriportal.local".to_string(),
        password: password.clone(),
        role: Some("admin".to_string()),
        department_id: None,
    };

    auth::User::create(pool, admin_request, UserRole::Admin, auth_service)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create default admin user: {}", e))?;

    log::warn!("Default admin user created:");
    log::warn!("  Username: admin");
    log::warn!("  Password: {} (generated - CHANGE IMMEDIATELY!)", password);

    Ok(())
}
