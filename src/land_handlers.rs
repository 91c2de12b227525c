// src/land_handlers.rs - Land and building assets
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{check_department_access, department_scope, get_current_user};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{resolve_department_for_write, ApiResponse};
use crate::models::{CreateLandAssetRequest, LandAsset, UpdateLandAssetRequest, LAND_ASSET_KINDS};
use crate::AppState;

fn validate_asset_kind(kind: &str) -> ApiResult<()> {
    if LAND_ASSET_KINDS.contains(&kind) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Invalid asset kind '{}'. Valid kinds: {}",
            kind,
            LAND_ASSET_KINDS.join(", ")
        )))
    }
}

async fn load_scoped_asset(
    pool: &sqlx::SqlitePool,
    claims: &crate::auth::Claims,
    asset_id: &str,
) -> ApiResult<LandAsset> {
    let asset: LandAsset = sqlx::query_as("SELECT * FROM land_assets WHERE id = ?")
        .bind(asset_id)
        .fetch_one(pool)
        .await
        .map_err(|_| ApiError::not_found("Land asset"))?;

    check_department_access(claims, &asset.department_id)?;
    Ok(asset)
}

pub async fn get_land_assets(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;

    let assets: Vec<LandAsset> = match department_scope(&claims) {
        Some(home) => {
            sqlx::query_as("SELECT * FROM land_assets WHERE department_id = ? ORDER BY name")
                .bind(home)
                .fetch_all(&app_state.db_pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM land_assets ORDER BY department_id, name")
                .fetch_all(&app_state.db_pool)
                .await?
        }
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(assets)))
}

pub async fn create_land_asset(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateLandAssetRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    request.validate()?;
    validate_asset_kind(&request.asset_kind)?;

    let department_id = resolve_department_for_write(
        &app_state.db_pool,
        &claims,
        request.department_id.as_deref(),
    )
    .await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO land_assets
           (id, department_id, name, asset_kind, area_sq_m, address, notes, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&department_id)
    .bind(&request.name)
    .bind(&request.asset_kind)
    .bind(request.area_sq_m)
    .bind(&request.address)
    .bind(&request.notes)
    .bind(&now)
    .bind(&now)
    .execute(&app_state.db_pool)
    .await?;

    let created: LandAsset = sqlx::query_as("SELECT * FROM land_assets WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn update_land_asset(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateLandAssetRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let asset_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    if let Some(ref kind) = request.asset_kind {
        validate_asset_kind(kind)?;
    }

    let existing = load_scoped_asset(&app_state.db_pool, &claims, &asset_id).await?;

    let name = request.name.clone().unwrap_or(existing.name);
    let asset_kind = request.asset_kind.clone().unwrap_or(existing.asset_kind);
    let area_sq_m = request.area_sq_m.or(existing.area_sq_m);
    let address = request.address.clone().or(existing.address);
    let notes = request.notes.clone().or(existing.notes);

    sqlx::query(
        "UPDATE land_assets SET name = ?, asset_kind = ?, area_sq_m = ?, address = ?, notes = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&asset_kind)
    .bind(area_sq_m)
    .bind(&address)
    .bind(&notes)
    .bind(Utc::now())
    .bind(&asset_id)
    .execute(&app_state.db_pool)
    .await?;

    let updated: LandAsset = sqlx::query_as("SELECT * FROM land_assets WHERE id = ?")
        .bind(&asset_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn delete_land_asset(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let asset_id = path.into_inner();
    let claims = get_current_user(&http_request)?;

    load_scoped_asset(&app_state.db_pool, &claims, &asset_id).await?;

    sqlx::query("DELETE FROM land_assets WHERE id = ?")
        .bind(&asset_id)
        .execute(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Land asset deleted".to_string(),
    )))
}
