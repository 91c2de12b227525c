// src/department_handlers.rs - Department management (admin only for writes)
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{check_permission, get_current_user};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{CreateDepartmentRequest, Department, UpdateDepartmentRequest};
use crate::AppState;

pub async fn get_all_departments(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let departments: Vec<Department> =
        sqlx::query_as("SELECT * FROM departments ORDER BY name")
            .fetch_all(&app_state.db_pool)
            .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(departments)))
}

pub async fn get_department(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let department_id = path.into_inner();

    let department: Department = sqlx::query_as("SELECT * FROM departments WHERE id = ?")
        .bind(&department_id)
        .fetch_one(&app_state.db_pool)
        .await
        .map_err(|_| ApiError::department_not_found(&department_id))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(department)))
}

pub async fn create_department(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateDepartmentRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    check_permission(&claims, |role| role.can_manage_departments())?;
    request.validate()?;

    let existing: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM departments WHERE name = ? OR code = ?")
            .bind(&request.name)
            .bind(&request.code)
            .fetch_one(&app_state.db_pool)
            .await?;

    if existing.0 > 0 {
        return Err(ApiError::BadRequest(format!(
            "Department with name '{}' or code '{}' already exists",
            request.name, request.code
        )));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"INSERT INTO departments (id, name, code, description, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&request.name)
    .bind(&request.code)
    .bind(&request.description)
    .bind(&now)
    .bind(&now)
    .execute(&app_state.db_pool)
    .await?;

    let created: Department = sqlx::query_as("SELECT * FROM departments WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    log::info!("Department '{}' created by {}", created.name, claims.username);

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn update_department(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateDepartmentRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let department_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    check_permission(&claims, |role| role.can_manage_departments())?;
    request.validate()?;

    let existing: Department = sqlx::query_as("SELECT * FROM departments WHERE id = ?")
        .bind(&department_id)
        .fetch_one(&app_state.db_pool)
        .await
        .map_err(|_| ApiError::department_not_found(&department_id))?;

    let name = request.name.clone().unwrap_or(existing.name);
    let code = request.code.clone().unwrap_or(existing.code);
    let description = request.description.clone().or(existing.description);

    sqlx::query(
        "UPDATE departments SET name = ?, code = ?, description = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&code)
    .bind(&description)
    .bind(Utc::now())
    .bind(&department_id)
    .execute(&app_state.db_pool)
    .await?;

    let updated: Department = sqlx::query_as("SELECT * FROM departments WHERE id = ?")
        .bind(&department_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn delete_department(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let department_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    check_permission(&claims, |role| role.can_manage_departments())?;

    let department: Department = sqlx::query_as("SELECT * FROM departments WHERE id = ?")
        .bind(&department_id)
        .fetch_one(&app_state.db_pool)
        .await
        .map_err(|_| ApiError::department_not_found(&department_id))?;

    // Refuse to orphan assets or accounts
    let in_use: (i64,) = sqlx::query_as(
        r#"SELECT
             (SELECT COUNT(*) FROM equipment WHERE department_id = ?)
           + (SELECT COUNT(*) FROM staff_positions WHERE department_id = ?)
           + (SELECT COUNT(*) FROM land_assets WHERE department_id = ?)
           + (SELECT COUNT(*) FROM users WHERE department_id = ?)"#,
    )
    .bind(&department_id)
    .bind(&department_id)
    .bind(&department_id)
    .bind(&department_id)
    .fetch_one(&app_state.db_pool)
    .await?;

    if in_use.0 > 0 {
        return Err(ApiError::department_in_use(&department.name));
    }

    sqlx::query("DELETE FROM departments WHERE id = ?")
        .bind(&department_id)
        .execute(&app_state.db_pool)
        .await?;

    log::warn!(
        "Department '{}' deleted by {}",
        department.name,
        claims.username
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Department deleted successfully".to_string(),
    )))
}
