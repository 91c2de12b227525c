// src/maintenance_handlers.rs - Maintenance logs, nested under equipment
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::get_current_user;
use crate::equipment_handlers::load_scoped_equipment;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{CompleteMaintenanceRequest, CreateMaintenanceRequest, MaintenanceLog};
use crate::AppState;

pub async fn get_maintenance_logs(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();
    let claims = get_current_user(&http_request)?;

    load_scoped_equipment(&app_state.db_pool, &claims, &equipment_id).await?;

    let logs: Vec<MaintenanceLog> = sqlx::query_as(
        "SELECT * FROM maintenance_logs WHERE equipment_id = ? ORDER BY created_at DESC",
    )
    .bind(&equipment_id)
    .fetch_all(&app_state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(logs)))
}

pub async fn create_maintenance_log(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<CreateMaintenanceRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    load_scoped_equipment(&app_state.db_pool, &claims, &equipment_id).await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let mut tx = app_state.db_pool.begin().await?;

    sqlx::query(
        r#"INSERT INTO maintenance_logs
           (id, equipment_id, title, details, scheduled_date, performed_by,
            created_by, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&equipment_id)
    .bind(&request.title)
    .bind(&request.details)
    .bind(request.scheduled_date)
    .bind(&request.performed_by)
    .bind(&claims.sub)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    // Opening a log moves the equipment into maintenance
    sqlx::query("UPDATE equipment SET status = 'under_maintenance', updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&equipment_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let created: MaintenanceLog = sqlx::query_as("SELECT * FROM maintenance_logs WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    log::info!(
        "Maintenance log '{}' opened for equipment {} by {}",
        created.title,
        equipment_id,
        claims.username
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn complete_maintenance_log(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<(String, String)>,
    request: web::Json<CompleteMaintenanceRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let (equipment_id, log_id) = path.into_inner();
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    load_scoped_equipment(&app_state.db_pool, &claims, &equipment_id).await?;

    let log: MaintenanceLog =
        sqlx::query_as("SELECT * FROM maintenance_logs WHERE id = ? AND equipment_id = ?")
            .bind(&log_id)
            .bind(&equipment_id)
            .fetch_one(&app_state.db_pool)
            .await
            .map_err(|_| ApiError::not_found("Maintenance log"))?;

    if log.completed_at.is_some() {
        return Err(ApiError::BadRequest(
            "Maintenance log is already completed".to_string(),
        ));
    }

    let now = Utc::now();
    let details = request.details.clone().or(log.details);
    let performed_by = request.performed_by.clone().or(log.performed_by);

    let mut tx = app_state.db_pool.begin().await?;

    sqlx::query(
        r#"UPDATE maintenance_logs SET
           completed_at = ?, details = ?, performed_by = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&now)
    .bind(&details)
    .bind(&performed_by)
    .bind(&now)
    .bind(&log_id)
    .execute(&mut *tx)
    .await?;

    // Return the equipment to service once no open logs remain
    let open_logs: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM maintenance_logs WHERE equipment_id = ? AND completed_at IS NULL",
    )
    .bind(&equipment_id)
    .fetch_one(&mut *tx)
    .await?;

    if open_logs.0 == 0 {
        sqlx::query("UPDATE equipment SET status = 'in_service', updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&equipment_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let updated: MaintenanceLog = sqlx::query_as("SELECT * FROM maintenance_logs WHERE id = ?")
        .bind(&log_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        updated,
        "Maintenance log completed".to_string(),
    )))
}

pub async fn delete_maintenance_log(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<(String, String)>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let (equipment_id, log_id) = path.into_inner();
    let claims = get_current_user(&http_request)?;

    load_scoped_equipment(&app_state.db_pool, &claims, &equipment_id).await?;

    let result = sqlx::query("DELETE FROM maintenance_logs WHERE id = ? AND equipment_id = ?")
        .bind(&log_id)
        .bind(&equipment_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Maintenance log"));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Maintenance log deleted".to_string(),
    )))
}
