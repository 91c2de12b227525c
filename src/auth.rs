use actix_web::dev::ServiceRequest;
use actix_web::web;
use actix_web::{HttpMessage, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};

// ======== USER MODEL ========

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub department_id: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

// ======== USER ROLE ========

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum UserRole {
    Admin,
    DeptHead,
}

impl UserRole {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(UserRole::Admin),
            "dept_head" => Some(UserRole::DeptHead),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::DeptHead => "dept_head",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            UserRole::Admin => "Administrator",
            UserRole::DeptHead => "Department Head",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            UserRole::Admin => "Cross-department access to all inventories and user management",
            UserRole::DeptHead => "Full access to the home department's inventory only",
        }
    }

    // ======== USER MANAGEMENT ========
    pub fn can_manage_users(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    // ======== DEPARTMENT PERMISSIONS ========
    pub fn can_manage_departments(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// Whether the role may touch rows belonging to any department.
    pub fn has_cross_department_access(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    // ======== INVENTORY PERMISSIONS ========
    pub fn can_create_assets(&self) -> bool {
        true // Both roles write, dept heads only inside their department
    }

    pub fn can_import_data(&self) -> bool {
        true
    }

    pub fn can_export_data(&self) -> bool {
        true
    }

    pub fn can_view_reports(&self) -> bool {
        true
    }

    /// Get all available roles
    pub fn all_roles() -> Vec<Self> {
        vec![UserRole::Admin, UserRole::DeptHead]
    }

    pub fn all_role_strings() -> Vec<&'static str> {
        vec!["admin", "dept_head"]
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ======== REQUEST/RESPONSE STRUCTS ========

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: Option<String>,
    pub department_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub department_id: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: UserRole::from_str(&user.role).unwrap_or(UserRole::DeptHead),
            department_id: user.department_id,
            is_active: user.is_active,
            last_login: user.last_login,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub role: UserRole,
    pub department_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiration_hours: i64,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(jwt_secret: &str, token_expiration_hours: i64, bcrypt_cost: u32) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_expiration_hours,
            bcrypt_cost,
        }
    }

    pub fn hash_password(&self, password: &str) -> ApiResult<String> {
        validate_password_strength(password)?;
        hash(password, self.bcrypt_cost)
            .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        verify(password, hash).unwrap_or(false)
    }

    pub fn generate_token(&self, user: &User) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.token_expiration_hours);

        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: UserRole::from_str(&user.role).unwrap_or(UserRole::DeptHead),
            department_id: user.department_id.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::AuthError("Failed to generate token".to_string()))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::AuthError("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::AuthError("Invalid token".to_string())
                }
                _ => ApiError::AuthError("Token verification failed".to_string()),
            })
    }
}

// ======== PASSWORD VALIDATION ========

pub fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::ValidationError(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::ValidationError(
            "Password must contain at least one digit".to_string(),
        ));
    }
    Ok(())
}

// ======== USER METHODS ========

impl User {
    pub async fn find_by_username(pool: &SqlitePool, username: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(pool)
            .await
            .map_err(|_| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(|_| ApiError::NotFound("User not found".to_string()))
    }

    pub async fn create(
        pool: &SqlitePool,
        request: CreateUserRequest,
        role: UserRole,
        auth_service: &AuthService,
    ) -> ApiResult<User> {
        let password_hash = auth_service.hash_password(&request.password)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"INSERT INTO users
               (id, username, email, password_hash, role, department_id, is_active,
                created_at, updated_at, failed_login_attempts)
               VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, 0)"#,
        )
        .bind(&id)
        .bind(&request.username)
        .bind(&request.email)
        .bind(&password_hash)
        .bind(role.as_str())
        .bind(&request.department_id)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.message().contains("UNIQUE") => {
                ApiError::BadRequest("Username or email already taken".to_string())
            }
            _ => ApiError::DatabaseError(e),
        })?;

        User::find_by_id(pool, &id).await
    }

    pub fn is_locked(&self) -> bool {
        self.locked_until
            .map(|until| Utc::now() < until)
            .unwrap_or(false)
    }

    pub async fn increment_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts += 1;
        sqlx::query("UPDATE users SET failed_login_attempts = ?, updated_at = ? WHERE id = ?")
            .bind(self.failed_login_attempts)
            .bind(Utc::now())
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn lock_for_duration(
        &mut self,
        pool: &SqlitePool,
        duration: Duration,
    ) -> ApiResult<()> {
        let until = Utc::now() + duration;
        self.locked_until = Some(until);
        sqlx::query("UPDATE users SET locked_until = ?, updated_at = ? WHERE id = ?")
            .bind(until)
            .bind(Utc::now())
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn reset_failed_attempts(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        self.failed_login_attempts = 0;
        self.locked_until = None;
        sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, locked_until = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(&self.id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn update_last_login(&mut self, pool: &SqlitePool) -> ApiResult<()> {
        let now = Utc::now();
        self.last_login = Some(now);
        sqlx::query("UPDATE users SET last_login = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn change_password(
        &self,
        pool: &SqlitePool,
        current_password: &str,
        new_password: &str,
        auth_service: &AuthService,
    ) -> ApiResult<()> {
        if !auth_service.verify_password(current_password, &self.password_hash) {
            return Err(ApiError::BadRequest(
                "Current password is incorrect".to_string(),
            ));
        }

        let new_hash = auth_service.hash_password(new_password)?;
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&new_hash)
            .bind(Utc::now())
            .bind(&self.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

// ======== REQUEST HELPERS ========

pub fn get_current_user(req: &HttpRequest) -> ApiResult<Claims> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized("No user information found".to_string()))
}

pub fn check_permission<F>(claims: &Claims, check: F) -> ApiResult<()>
where
    F: Fn(&UserRole) -> bool,
{
    if check(&claims.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Insufficient permissions".to_string()))
    }
}

/// Check if the current user has a specific permission
pub fn require_permission(
    req: &HttpRequest,
    permission_check: fn(&UserRole) -> bool,
) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    check_permission(&claims, permission_check)?;
    Ok(claims)
}

/// Department a caller's reads and writes are confined to.
/// `None` means unrestricted (administrator).
pub fn department_scope(claims: &Claims) -> Option<&str> {
    match claims.role {
        UserRole::Admin => None,
        UserRole::DeptHead => claims.department_id.as_deref(),
    }
}

/// Ensure the caller may touch a row belonging to `department_id`.
pub fn check_department_access(claims: &Claims, department_id: &str) -> ApiResult<()> {
    match department_scope(claims) {
        None => Ok(()),
        Some(home) if home == department_id => Ok(()),
        Some(_) => Err(ApiError::cross_department_access()),
    }
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let auth_service = match req.app_data::<web::Data<std::sync::Arc<AuthService>>>() {
        Some(svc) => svc,
        None => {
            log::error!("AuthService not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    match auth_service.verify_token(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(req)
        }
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            Err((err.into(), req))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_for(role: UserRole, department_id: Option<&str>) -> Claims {
        Claims {
            sub: "u-1".to_string(),
            username: "test".to_string(),
            role,
            department_id: department_id.map(String::from),
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn test_role_round_trip() {
        for role in UserRole::all_roles() {
            assert_eq!(UserRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::from_str("viewer"), None);
    }

    #[test]
    fn test_only_admin_manages_users_and_departments() {
        assert!(UserRole::Admin.can_manage_users());
        assert!(UserRole::Admin.can_manage_departments());
        assert!(!UserRole::DeptHead.can_manage_users());
        assert!(!UserRole::DeptHead.can_manage_departments());
    }

    #[test]
    fn test_department_scope() {
        let admin = claims_for(UserRole::Admin, Some("d-1"));
        assert_eq!(department_scope(&admin), None);

        let head = claims_for(UserRole::DeptHead, Some("d-1"));
        assert_eq!(department_scope(&head), Some("d-1"));
    }

    #[test]
    fn test_check_department_access() {
        let head = claims_for(UserRole::DeptHead, Some("d-1"));
        assert!(check_department_access(&head, "d-1").is_ok());
        assert!(check_department_access(&head, "d-2").is_err());

        let admin = claims_for(UserRole::Admin, None);
        assert!(check_department_access(&admin, "d-2").is_ok());
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Abcdef12").is_ok());
        assert!(validate_password_strength("abcdef12").is_err());
        assert!(validate_password_strength("ABCDEF12").is_err());
        assert!(validate_password_strength("Abcdefgh").is_err());
        assert!(validate_password_strength("Ab1").is_err());
    }

    #[test]
    fn test_token_round_trip() {
        let svc = AuthService::new("dummy_32_chars_for_tests_only!!!", 24, 4);
        let user = User {
            id: "u-1".to_string(),
            username: "head".to_string(),
            email: "head@agri.example".to_string(),
            password_hash: String::new(),
            role: "dept_head".to_string(),
            department_id: Some("d-1".to_string()),
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            failed_login_attempts: 0,
            locked_until: None,
        };

        let token = svc.generate_token(&user).unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role, UserRole::DeptHead);
        assert_eq!(claims.department_id.as_deref(), Some("d-1"));
    }
}
