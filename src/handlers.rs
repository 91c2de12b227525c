// src/handlers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{department_scope, get_current_user};
use crate::error::ApiResult;
use crate::AppState;

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub department_id: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl PaginationQuery {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

// ==================== DEPARTMENT RESOLUTION ====================

/// Resolve which department a write lands in. Department heads always
/// write into their home department and any requested id is ignored;
/// administrators must name an existing department.
pub async fn resolve_department_for_write(
    pool: &sqlx::SqlitePool,
    claims: &crate::auth::Claims,
    requested: Option<&str>,
) -> ApiResult<String> {
    match department_scope(claims) {
        Some(home) => Ok(home.to_string()),
        None => {
            let department_id = requested.ok_or_else(crate::error::ApiError::department_required)?;

            let exists: Option<(String,)> =
                sqlx::query_as("SELECT id FROM departments WHERE id = ?")
                    .bind(department_id)
                    .fetch_optional(pool)
                    .await?;

            match exists {
                Some(_) => Ok(department_id.to_string()),
                None => Err(crate::error::ApiError::department_not_found(department_id)),
            }
        }
    }
}

// ==================== DASHBOARD STATISTICS ====================

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_departments: i64,
    pub total_equipment: i64,
    pub equipment_in_service: i64,
    pub equipment_under_maintenance: i64,
    pub open_maintenance_logs: i64,
    pub total_staff_positions: i64,
    pub total_land_assets: i64,
}

/// Aggregate counts for the dashboard. A department head sees only
/// their own department's numbers; an administrator sees everything.
pub async fn get_dashboard_stats(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let scope = department_scope(&claims).map(String::from);

    let (dept_filter, scoped) = match &scope {
        Some(_) => (" WHERE department_id = ?", true),
        None => ("", false),
    };

    async fn scoped_count(
        pool: &sqlx::SqlitePool,
        sql: &str,
        scope: &Option<String>,
    ) -> ApiResult<i64> {
        let mut query = sqlx::query_as::<_, (i64,)>(sql);
        if let Some(dept) = scope {
            query = query.bind(dept.clone());
        }
        Ok(query.fetch_one(pool).await?.0)
    }

    let pool = &app_state.db_pool;

    let total_departments = if scoped {
        1
    } else {
        scoped_count(pool, "SELECT COUNT(*) FROM departments", &None).await?
    };

    let total_equipment = scoped_count(
        pool,
        &format!("SELECT COUNT(*) FROM equipment{}", dept_filter),
        &scope,
    )
    .await?;

    let equipment_in_service = scoped_count(
        pool,
        &format!(
            "SELECT COUNT(*) FROM equipment WHERE status = 'in_service'{}",
            if scoped { " AND department_id = ?" } else { "" }
        ),
        &scope,
    )
    .await?;

    let equipment_under_maintenance = scoped_count(
        pool,
        &format!(
            "SELECT COUNT(*) FROM equipment WHERE status = 'under_maintenance'{}",
            if scoped { " AND department_id = ?" } else { "" }
        ),
        &scope,
    )
    .await?;

    let open_maintenance_logs = scoped_count(
        pool,
        &format!(
            "SELECT COUNT(*) FROM maintenance_logs ml \
             JOIN equipment e ON ml.equipment_id = e.id \
             WHERE ml.completed_at IS NULL{}",
            if scoped { " AND e.department_id = ?" } else { "" }
        ),
        &scope,
    )
    .await?;

    let total_staff_positions = scoped_count(
        pool,
        &format!("SELECT COUNT(*) FROM staff_positions{}", dept_filter),
        &scope,
    )
    .await?;

    let total_land_assets = scoped_count(
        pool,
        &format!("SELECT COUNT(*) FROM land_assets{}", dept_filter),
        &scope,
    )
    .await?;

    let stats = DashboardStats {
        total_departments,
        total_equipment,
        equipment_in_service,
        equipment_under_maintenance,
        open_maintenance_logs,
        total_staff_positions,
        total_land_assets,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let query = PaginationQuery {
            page: None,
            per_page: None,
            search: None,
            status: None,
            category: None,
            department_id: None,
            sort_by: None,
            sort_order: None,
        };
        assert_eq!(query.normalize(), (1, 20, 0));
    }

    #[test]
    fn test_pagination_clamps() {
        let query = PaginationQuery {
            page: Some(-3),
            per_page: Some(10_000),
            search: None,
            status: None,
            category: None,
            department_id: None,
            sort_by: None,
            sort_order: None,
        };
        let (page, per_page, offset) = query.normalize();
        assert_eq!(page, 1);
        assert_eq!(per_page, 100);
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_pagination_offset() {
        let query = PaginationQuery {
            page: Some(3),
            per_page: Some(25),
            search: None,
            status: None,
            category: None,
            department_id: None,
            sort_by: None,
            sort_order: None,
        };
        assert_eq!(query.normalize(), (3, 25, 50));
    }
}
