// src/equipment_handlers.rs - Equipment CRUD with department row-level security
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{check_department_access, department_scope, get_current_user};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{
    resolve_department_for_write, ApiResponse, PaginatedResponse, PaginationQuery,
};
use crate::models::{
    CreateEquipmentRequest, Equipment, EquipmentCategory, EquipmentStatus, UpdateEquipmentRequest,
};
use crate::AppState;

/// Fetch one equipment row, enforcing the caller's department scope.
pub async fn load_scoped_equipment(
    pool: &sqlx::SqlitePool,
    claims: &crate::auth::Claims,
    equipment_id: &str,
) -> ApiResult<Equipment> {
    let equipment: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(equipment_id)
        .fetch_one(pool)
        .await
        .map_err(|_| ApiError::equipment_not_found(equipment_id))?;

    check_department_access(claims, &equipment.department_id)?;
    Ok(equipment)
}

pub async fn get_equipment(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let (page, per_page, offset) = query.normalize();

    let mut conditions = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    // Department heads only ever see their own rows; an admin may narrow
    // the listing with the department_id query parameter.
    match department_scope(&claims) {
        Some(home) => {
            conditions.push("department_id = ?");
            binds.push(home.to_string());
        }
        None => {
            if let Some(ref dept) = query.department_id {
                conditions.push("department_id = ?");
                binds.push(dept.clone());
            }
        }
    }

    if let Some(ref category) = query.category {
        EquipmentCategory::from_str(category)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid category '{}'", category)))?;
        conditions.push("category = ?");
        binds.push(category.clone());
    }

    if let Some(ref status) = query.status {
        EquipmentStatus::from_str(status)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid status '{}'", status)))?;
        conditions.push("status = ?");
        binds.push(status.clone());
    }

    if let Some(ref search) = query.search {
        if !search.trim().is_empty() {
            conditions.push("(name LIKE ? OR serial_number LIKE ?)");
            let pattern = format!("%{}%", search.trim());
            binds.push(pattern.clone());
            binds.push(pattern);
        }
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM equipment{}", where_clause);
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind);
    }
    let total = count_query.fetch_one(&app_state.db_pool).await?.0;

    let list_sql = format!(
        "SELECT * FROM equipment{} ORDER BY name LIMIT ? OFFSET ?",
        where_clause
    );
    let mut list_query = sqlx::query_as::<_, Equipment>(&list_sql);
    for bind in &binds {
        list_query = list_query.bind(bind);
    }
    let equipment = list_query
        .bind(per_page)
        .bind(offset)
        .fetch_all(&app_state.db_pool)
        .await?;

    let total_pages = (total + per_page - 1) / per_page;

    let response = PaginatedResponse {
        data: equipment,
        total,
        page,
        per_page,
        total_pages,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

pub async fn get_equipment_by_id(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();
    let claims = get_current_user(&http_request)?;

    let equipment =
        load_scoped_equipment(&app_state.db_pool, &claims, &equipment_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(equipment)))
}

pub async fn create_equipment(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateEquipmentRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let department_id = resolve_department_for_write(
        &app_state.db_pool,
        &claims,
        request.department_id.as_deref(),
    )
    .await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let status = request.status.unwrap_or_default();

    sqlx::query(
        r#"INSERT INTO equipment
           (id, department_id, name, category, status, purchase_date, image_url,
            serial_number, description, created_by, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(&department_id)
    .bind(&request.name)
    .bind(request.category.as_str())
    .bind(status.as_str())
    .bind(request.purchase_date)
    .bind(&request.image_url)
    .bind(&request.serial_number)
    .bind(&request.description)
    .bind(&claims.sub)
    .bind(&now)
    .bind(&now)
    .execute(&app_state.db_pool)
    .await?;

    let created: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&id)
        .fetch_one(&app_state.db_pool)
        .await?;

    log::info!(
        "Equipment '{}' created in department {} by {}",
        created.name,
        department_id,
        claims.username
    );

    Ok(HttpResponse::Created().json(ApiResponse::success(created)))
}

pub async fn update_equipment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateEquipmentRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let existing =
        load_scoped_equipment(&app_state.db_pool, &claims, &equipment_id).await?;

    let name = request.name.clone().unwrap_or(existing.name);
    let category = request
        .category
        .map(|c| c.as_str().to_string())
        .unwrap_or(existing.category);
    let status = request
        .status
        .map(|s| s.as_str().to_string())
        .unwrap_or(existing.status);
    let purchase_date = request.purchase_date.or(existing.purchase_date);
    let image_url = request.image_url.clone().or(existing.image_url);
    let serial_number = request.serial_number.clone().or(existing.serial_number);
    let description = request.description.clone().or(existing.description);

    sqlx::query(
        r#"UPDATE equipment SET
           name = ?, category = ?, status = ?, purchase_date = ?, image_url = ?,
           serial_number = ?, description = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&name)
    .bind(&category)
    .bind(&status)
    .bind(purchase_date)
    .bind(&image_url)
    .bind(&serial_number)
    .bind(&description)
    .bind(Utc::now())
    .bind(&equipment_id)
    .execute(&app_state.db_pool)
    .await?;

    let updated: Equipment = sqlx::query_as("SELECT * FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .fetch_one(&app_state.db_pool)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

pub async fn delete_equipment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let equipment_id = path.into_inner();
    let claims = get_current_user(&http_request)?;

    let equipment =
        load_scoped_equipment(&app_state.db_pool, &claims, &equipment_id).await?;

    sqlx::query("DELETE FROM equipment WHERE id = ?")
        .bind(&equipment_id)
        .execute(&app_state.db_pool)
        .await?;

    log::info!(
        "Equipment '{}' deleted by {}",
        equipment.name,
        claims.username
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Equipment deleted successfully".to_string(),
    )))
}
