// src/auth_handlers.rs - Authentication route handlers

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

use crate::auth::{
    check_permission, get_current_user, AuthService, ChangePasswordRequest, CreateUserRequest,
    LoginRequest, LoginResponse, User, UserInfo, UserRole,
};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::AppState;

// ======== AUTH HANDLERS ========

pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let mut user = User::find_by_username(&app_state.db_pool, &request.username)
        .await
        .map_err(|_| ApiError::BadRequest("Invalid username or password".to_string()))?;

    if !user.is_active {
        return Err(ApiError::AuthError("Account is disabled".to_string()));
    }

    if user.is_locked() {
        return Err(ApiError::AuthError(
            "Account is temporarily locked. Try again later.".to_string(),
        ));
    }

    if !auth_service.verify_password(&request.password, &user.password_hash) {
        user.increment_failed_attempts(&app_state.db_pool).await?;

        let max_attempts = app_state.config.auth.max_login_attempts;
        if user.failed_login_attempts >= max_attempts {
            let lockout = app_state.config.auth.lockout_duration_minutes;
            user.lock_for_duration(&app_state.db_pool, Duration::minutes(lockout as i64))
                .await?;
            return Err(ApiError::AuthError(format!(
                "Account locked due to too many failed attempts. Try again in {} minutes.",
                lockout
            )));
        }

        return Err(ApiError::BadRequest("Invalid username or password".to_string()));
    }

    user.reset_failed_attempts(&app_state.db_pool).await?;
    user.update_last_login(&app_state.db_pool).await?;

    let token = auth_service.generate_token(&user)?;

    let response = LoginResponse {
        token,
        expires_in: app_state.config.auth.token_expiration_hours * 3600,
        user: user.clone().into(),
    };

    log::info!("User {} logged in successfully", user.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        response,
        "Login successful".to_string(),
    )))
}

pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;

    let user = User::find_by_id(&app_state.db_pool, &claims.sub).await?;

    #[derive(Serialize)]
    struct ProfileResponse {
        #[serde(flatten)]
        user: UserInfo,
        role_description: &'static str,
    }

    let role_description = claims.role.description();
    let response = ProfileResponse {
        user: user.into(),
        role_description,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

pub async fn change_password(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<ChangePasswordRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let claims = get_current_user(&http_request)?;

    let user = User::find_by_id(&app_state.db_pool, &claims.sub).await?;

    user.change_password(
        &app_state.db_pool,
        &request.current_password,
        &request.new_password,
        &auth_service,
    )
    .await?;

    log::info!("User {} changed password", user.username);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Password changed successfully".to_string(),
    )))
}

pub async fn get_roles() -> ApiResult<HttpResponse> {
    #[derive(Serialize)]
    struct RoleInfo {
        value: &'static str,
        display_name: &'static str,
        description: &'static str,
    }

    let roles: Vec<RoleInfo> = UserRole::all_roles()
        .into_iter()
        .map(|role| RoleInfo {
            value: role.as_str(),
            display_name: role.display_name(),
            description: role.description(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(roles)))
}

// ======== USER MANAGEMENT (ADMIN) ========

pub async fn get_users(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    check_permission(&claims, |role| role.can_manage_users())?;

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(&app_state.db_pool)
        .await?;

    let user_infos: Vec<UserInfo> = users.into_iter().map(|u| u.into()).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(user_infos)))
}

/// Create a new user (admin only). A `dept_head` account must be bound
/// to an existing department at creation time.
pub async fn create_user(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<CreateUserRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    check_permission(&claims, |role| role.can_manage_users())?;

    request.validate()?;

    let role = match &request.role {
        Some(role_str) => UserRole::from_str(role_str).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Invalid role '{}'. Valid roles: admin, dept_head",
                role_str
            ))
        })?,
        None => UserRole::DeptHead,
    };

    if role == UserRole::DeptHead {
        let department_id = request
            .department_id
            .as_deref()
            .ok_or_else(|| {
                ApiError::BadRequest("A department head must be assigned a home department".to_string())
            })?;

        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM departments WHERE id = ?")
                .bind(department_id)
                .fetch_optional(&app_state.db_pool)
                .await?;

        if exists.is_none() {
            return Err(ApiError::department_not_found(department_id));
        }
    }

    let user = User::create(
        &app_state.db_pool,
        request.into_inner(),
        role,
        &auth_service,
    )
    .await?;

    log::info!(
        "Admin {} created user {} with role {}",
        claims.username,
        user.username,
        user.role
    );

    let user_info: UserInfo = user.into();

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        user_info,
        "User created successfully".to_string(),
    )))
}

pub async fn delete_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    let claims = get_current_user(&http_request)?;
    check_permission(&claims, |role| role.can_manage_users())?;

    if claims.sub == user_id {
        return Err(ApiError::BadRequest(
            "Cannot delete your own account".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User"));
    }

    log::warn!("Admin {} deleted user {}", claims.username, user_id);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "User deleted successfully".to_string(),
    )))
}
