// src/staffing_handlers.rs - Department staffing tables
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{check_department_access, department_scope, get_current_user};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{resolve_department_for_write, ApiResponse};
use crate::models::{CreateStaffPositionRequest, StaffPosition, UpdateStaffPositionRequest};
use crate::AppState;

async fn load_scoped_position(
    pool: &sqlx::SqlitePool,
    claims: &crate::auth::Claims,
    position_id: &str,
) -> ApiResult<StaffPosition> {
    let position: StaffPosition = sqlx::query_as("SELECT * FROM staff_positions WHERE id = ?")
        .bind(position_id)
        .fetch_one(pool)
        .await
        .map_err(|_| ApiError::not_found("Staff position"))?;

    check_department_access(claims, &position.department_id)?;
    Ok(position)
}

pub async fn get_staff_positions(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;

    let positions: Vec<StaffPosition> = match department_scope(&claims) {
        Some(home) => {
            sqlx::query_as(
                "SELECT * FROM staff_positions WHERE department_id = ? ORDER BY title",
            )
            .bind(home)
            .fetch_all(&app_state.db_pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM staff_positions ORDER BY department_id, title")
                .fetch_all(&app_state.db_pool)
                .await?
        }
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(positions)))
}

pub async fn create_staff_position(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateStaffPositionRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let filled = request.filled.unwrap_or(0);
    if filled > request.headcount {
        return Err(ApiError::BadRequest(
            "Filled count cannot exceed headcount".to_string(),
        ));
    }

    let department_id = resolve_department_for_write(
        &app_state.db_pool,
        &claims,
        request.department_id.as_deref(),
    )
    .await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO staff_positions
           (id, department_id, title, headcount, filled, notes, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&department_id)
    .bind(&request.title)
    .bind(request.headcount)
    .bind(filled)
    .bind(&request.notes)
    .bind(&now)
    .bind(&now)
    .execute(&app_state.db_pool)
    .await?;

    let created: StaffPosition = sqlx::query_as("SELECT * FROM staff_positions WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn update_staff_position(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateStaffPositionRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let position_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let existing = load_scoped_position(&app_state.db_pool, &claims, &position_id).await?;

    let title = request.title.clone().unwrap_or(existing.title);
    let headcount = request.headcount.unwrap_or(existing.headcount);
    let filled = request.filled.unwrap_or(existing.filled);
    let notes = request.notes.clone().or(existing.notes);

    if filled > headcount {
        return Err(ApiError::BadRequest(
            "Filled count cannot exceed headcount".to_string(),
        ));
    }

    sqlx::query(
        "UPDATE staff_positions SET title = ?, headcount = ?, filled = ?, notes = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&title)
    .bind(headcount)
    .bind(filled)
    .bind(&notes)
    .bind(Utc::now())
    .bind(&position_id)
    .execute(&app_state.db_pool)
    .await?;

    let updated: StaffPosition = sqlx::query_as("SELECT * FROM staff_positions WHERE id = ?")
        .bind(&position_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn delete_staff_position(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let position_id = path.into_inner();
    let claims = get_current_user(&http_request)?;

    load_scoped_position(&app_state.db_pool, &claims, &position_id).await?;

    sqlx::query("DELETE FROM staff_positions WHERE id = ?")
        .bind(&position_id)
        .execute(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Staff position deleted".to_string(),
    )))
}
