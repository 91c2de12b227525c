// src/import_export.rs - Bulk CSV import pipeline and CSV export
//!
//! The import pipeline accepts a multipart CSV upload, resolves the target
//! department under role constraints, validates each row, and persists rows
//! independently. One bad row never aborts its siblings; the caller gets an
//! aggregated report with 1-based row numbers for every failure.

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDate, Utc};
use futures_util::StreamExt as _;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{department_scope, get_current_user, Claims, UserRole};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{Equipment, EquipmentCategory, EquipmentStatus};
use crate::AppState;

pub const MAX_IMPORT_FILE_SIZE: usize = 10 * 1024 * 1024; // 10 MiB

const CSV_MEDIA_TYPES: [&str; 3] = ["text/csv", "application/csv", "application/vnd.ms-excel"];

// ==================== IMPORT TYPES ====================

/// Caller identity passed explicitly into the pipeline, so the core logic
/// never reaches into ambient request state.
#[derive(Debug, Clone)]
pub struct ImportContext {
    pub user_id: String,
    pub role: UserRole,
    pub home_department_id: Option<String>,
}

impl From<&Claims> for ImportContext {
    fn from(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            role: claims.role.clone(),
            home_department_id: department_scope(claims).map(String::from),
        }
    }
}

/// One raw CSV record before validation. Every field is loose text; the
/// validator decides what it means.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEquipmentRow {
    pub name: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub purchase_date: Option<String>,
    pub image_url: Option<String>,
    pub serial_number: Option<String>,
    pub description: Option<String>,
}

/// A row that passed validation, with the batch's department attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEquipmentRecord {
    pub department_id: String,
    pub name: String,
    pub category: EquipmentCategory,
    pub status: EquipmentStatus,
    pub purchase_date: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub serial_number: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportErrorReason {
    Parse,
    Validation,
    Database,
    System,
}

/// One failed row. `row` is the record's 1-based position in the uploaded
/// file; row 0 is reserved for batch-level system errors.
#[derive(Debug, Clone, Serialize)]
pub struct ImportError {
    pub row: usize,
    pub reason: ImportErrorReason,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<ImportError>,
}

/// How a parse-complete import run ended. Call-level precondition failures
/// (no file, bad type, oversize, department resolution) surface as `ApiError`
/// before an outcome exists.
#[derive(Debug)]
pub enum ImportOutcome {
    /// Rows were processed; the result may still contain row-level failures.
    Completed(ImportResult),
    /// Nothing parsed at all; no persistence was attempted.
    ParseFailed(ImportResult),
}

// ==================== PARSING ====================

#[derive(Debug)]
pub struct ParsedCsv {
    /// Successfully parsed records, each keeping its 1-based file position.
    pub rows: Vec<(usize, RawEquipmentRow)>,
    pub total_rows: usize,
    pub errors: Vec<ImportError>,
}

pub fn parse_equipment_csv(data: &[u8]) -> ParsedCsv {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for (idx, record) in reader.deserialize::<RawEquipmentRow>().enumerate() {
        let row_number = idx + 1;
        match record {
            Ok(row) => rows.push((row_number, row)),
            Err(err) => errors.push(ImportError {
                row: row_number,
                reason: ImportErrorReason::Parse,
                message: format!("Parse error: {}", err),
            }),
        }
    }

    ParsedCsv {
        total_rows: rows.len() + errors.len(),
        rows,
        errors,
    }
}

/// Reject an upload once the bytes received pass the import ceiling. Called
/// per chunk so an oversize file is refused before any parse attempt.
pub fn check_import_size(received: usize) -> ApiResult<()> {
    if received > MAX_IMPORT_FILE_SIZE {
        return Err(ApiError::PayloadTooLarge(
            "File exceeds the maximum import size of 10 MiB".to_string(),
        ));
    }
    Ok(())
}

/// Uploads are accepted when either the declared media type is a CSV type
/// or the filename carries a `.csv` suffix.
pub fn is_csv_upload(content_type: Option<&str>, filename: &str) -> bool {
    if let Some(declared) = content_type {
        if CSV_MEDIA_TYPES.contains(&declared) {
            return true;
        }
    }
    filename.to_lowercase().ends_with(".csv")
}

// ==================== DEPARTMENT RESOLUTION ====================

/// The whole batch lands in one department. A department head always writes
/// into their home department and any form-supplied id is ignored; an
/// administrator must name an existing department.
pub async fn resolve_target_department(
    pool: &SqlitePool,
    ctx: &ImportContext,
    requested: Option<&str>,
) -> ApiResult<String> {
    match ctx.role {
        UserRole::DeptHead => ctx
            .home_department_id
            .clone()
            .ok_or_else(ApiError::no_department_assigned),
        UserRole::Admin => {
            let department_id = requested
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(ApiError::department_required)?;

            let exists: Option<(String,)> =
                sqlx::query_as("SELECT id FROM departments WHERE id = ?")
                    .bind(department_id)
                    .fetch_optional(pool)
                    .await?;

            match exists {
                Some(_) => Ok(department_id.to_string()),
                None => Err(ApiError::department_not_found(department_id)),
            }
        }
    }
}

// ==================== ROW VALIDATION ====================

/// Pure validation of a single raw row. All field-level issues are collected
/// rather than stopping at the first one.
pub fn validate_row(
    row: &RawEquipmentRow,
    department_id: &str,
) -> Result<ValidatedEquipmentRecord, Vec<String>> {
    let mut issues = Vec::new();

    let text = |value: &Option<String>| -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };

    let name = match text(&row.name) {
        Some(name) if name.len() <= 255 => Some(name),
        Some(_) => {
            issues.push("Name cannot exceed 255 characters".to_string());
            None
        }
        None => {
            issues.push("Name is required".to_string());
            None
        }
    };

    let category = match text(&row.category) {
        Some(raw) => match EquipmentCategory::from_str(&raw) {
            Some(category) => Some(category),
            None => {
                issues.push(format!("Unknown category '{}'", raw));
                None
            }
        },
        None => {
            issues.push("Category is required".to_string());
            None
        }
    };

    let status = match text(&row.status) {
        Some(raw) => match EquipmentStatus::from_str(&raw) {
            Some(status) => status,
            None => {
                issues.push(format!("Unknown status '{}'", raw));
                EquipmentStatus::default()
            }
        },
        None => EquipmentStatus::default(),
    };

    let purchase_date = match text(&row.purchase_date) {
        Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                issues.push(format!(
                    "Invalid purchase date '{}' (expected YYYY-MM-DD)",
                    raw
                ));
                None
            }
        },
        None => None,
    };

    let image_url = text(&row.image_url);
    if image_url.as_deref().map_or(false, |v| v.len() > 500) {
        issues.push("Image URL cannot exceed 500 characters".to_string());
    }

    let serial_number = text(&row.serial_number);
    if serial_number.as_deref().map_or(false, |v| v.len() > 100) {
        issues.push("Serial number cannot exceed 100 characters".to_string());
    }

    let description = text(&row.description);
    if description.as_deref().map_or(false, |v| v.len() > 1000) {
        issues.push("Description cannot exceed 1000 characters".to_string());
    }

    // A missing name or category always pushed an issue above
    match (name, category) {
        (Some(name), Some(category)) if issues.is_empty() => Ok(ValidatedEquipmentRecord {
            department_id: department_id.to_string(),
            name,
            category,
            status,
            purchase_date,
            image_url,
            serial_number,
            description,
        }),
        _ => Err(issues),
    }
}

// ==================== PERSISTENCE ====================

async fn insert_record(
    pool: &SqlitePool,
    record: &ValidatedEquipmentRecord,
    created_by: &str,
) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    sqlx::query(
        r#"INSERT INTO equipment
           (id, department_id, name, category, status, purchase_date, image_url,
            serial_number, description, created_by, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&record.department_id)
    .bind(&record.name)
    .bind(record.category.as_str())
    .bind(record.status.as_str())
    .bind(record.purchase_date)
    .bind(&record.image_url)
    .bind(&record.serial_number)
    .bind(&record.description)
    .bind(created_by)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

// ==================== PIPELINE ====================

/// Run the whole import for an already-received file body.
///
/// Rows are processed strictly in file order, each inside its own statement;
/// a failed row never rolls back or aborts its siblings. Parse-stage errors
/// are folded into the final counts so `imported + failed` always equals the
/// number of rows in the file.
pub async fn import_equipment_csv(
    pool: &SqlitePool,
    ctx: &ImportContext,
    data: &[u8],
    requested_department: Option<&str>,
) -> ApiResult<ImportOutcome> {
    let parsed = parse_equipment_csv(data);

    if parsed.rows.is_empty() && !parsed.errors.is_empty() {
        let failed = parsed.errors.len();
        return Ok(ImportOutcome::ParseFailed(ImportResult {
            success: false,
            imported: 0,
            failed,
            errors: parsed.errors,
        }));
    }

    let department_id = match resolve_target_department(pool, ctx, requested_department).await {
        Ok(id) => id,
        // Resolution rules are part of the call-level contract
        Err(err @ ApiError::BadRequest(_)) | Err(err @ ApiError::NotFound(_)) => return Err(err),
        // Anything else is a systemic failure, reported once with row 0
        Err(err) => {
            let mut errors = vec![ImportError {
                row: 0,
                reason: ImportErrorReason::System,
                message: format!("System error: {}", err),
            }];
            errors.extend(parsed.errors);
            let failed = errors.len();
            return Ok(ImportOutcome::Completed(ImportResult {
                success: false,
                imported: 0,
                failed,
                errors,
            }));
        }
    };

    let mut imported = 0;
    let mut errors: Vec<ImportError> = Vec::new();

    for (row_number, row) in &parsed.rows {
        match validate_row(row, &department_id) {
            Err(issues) => {
                errors.push(ImportError {
                    row: *row_number,
                    reason: ImportErrorReason::Validation,
                    message: format!("Validation failed: {}", issues.join(", ")),
                });
            }
            Ok(record) => match insert_record(pool, &record, &ctx.user_id).await {
                Ok(()) => imported += 1,
                Err(err) => {
                    errors.push(ImportError {
                        row: *row_number,
                        reason: ImportErrorReason::Database,
                        message: format!("Database error: {}", err),
                    });
                }
            },
        }
    }

    errors.extend(parsed.errors);
    let failed = errors.len();

    Ok(ImportOutcome::Completed(ImportResult {
        success: failed == 0,
        imported,
        failed,
        errors,
    }))
}

pub fn import_summary_message(result: &ImportResult) -> String {
    if result.success {
        format!("Successfully imported {} equipment records", result.imported)
    } else {
        format!(
            "Import completed with {} successful and {} failed records",
            result.imported, result.failed
        )
    }
}

// ==================== HTTP HANDLERS ====================

/// POST /equipment/import - multipart form with a `file` part and, for
/// administrators, a `departmentId` part.
pub async fn import_equipment(
    app_state: web::Data<Arc<AppState>>,
    mut payload: Multipart,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;

    let mut file_data: Option<Vec<u8>> = None;
    let mut requested_department: Option<String> = None;

    while let Some(item) = payload.next().await {
        let mut field = item
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart payload: {}", e)))?;

        let field_name = field.name().to_string();
        match field_name.as_str() {
            "file" => {
                let filename = field
                    .content_disposition()
                    .get_filename()
                    .map(String::from)
                    .unwrap_or_default();
                let declared_type = field.content_type().map(|m| m.essence_str().to_string());

                if !is_csv_upload(declared_type.as_deref(), &filename) {
                    return Err(ApiError::BadRequest(
                        "Invalid file type. Only CSV files are accepted".to_string(),
                    ));
                }

                let mut data = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk.map_err(|e| {
                        ApiError::BadRequest(format!("Failed to read upload: {}", e))
                    })?;
                    check_import_size(data.len() + chunk.len())?;
                    data.extend_from_slice(&chunk);
                }
                file_data = Some(data);
            }
            "departmentId" => {
                let mut value = Vec::new();
                while let Some(chunk) = field.next().await {
                    let chunk = chunk.map_err(|e| {
                        ApiError::BadRequest(format!("Failed to read form field: {}", e))
                    })?;
                    value.extend_from_slice(&chunk);
                }
                requested_department = Some(String::from_utf8_lossy(&value).trim().to_string());
            }
            _ => {}
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let ctx = ImportContext::from(&claims);
    let outcome = import_equipment_csv(
        &app_state.db_pool,
        &ctx,
        &file_data,
        requested_department.as_deref(),
    )
    .await?;

    match outcome {
        ImportOutcome::Completed(result) => {
            log::info!(
                "Equipment import by {}: {} imported, {} failed",
                claims.username,
                result.imported,
                result.failed
            );
            let message = import_summary_message(&result);
            Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(result, message)))
        }
        ImportOutcome::ParseFailed(result) => {
            log::warn!(
                "Equipment import by {} rejected: file parsing failed with {} errors",
                claims.username,
                result.failed
            );
            Ok(HttpResponse::BadRequest().json(serde_json::json!({
                "success": false,
                "message": "File parsing failed",
                "data": result,
            })))
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportRow {
    id: String,
    department_id: String,
    name: String,
    category: String,
    status: String,
    purchase_date: Option<NaiveDate>,
    serial_number: Option<String>,
    description: Option<String>,
}

impl From<Equipment> for ExportRow {
    fn from(equipment: Equipment) -> Self {
        Self {
            id: equipment.id,
            department_id: equipment.department_id,
            name: equipment.name,
            category: equipment.category,
            status: equipment.status,
            purchase_date: equipment.purchase_date,
            serial_number: equipment.serial_number,
            description: equipment.description,
        }
    }
}

/// GET /equipment/export - department-scoped CSV download.
pub async fn export_equipment(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;

    let equipment: Vec<Equipment> = match department_scope(&claims) {
        Some(home) => {
            sqlx::query_as("SELECT * FROM equipment WHERE department_id = ? ORDER BY name")
                .bind(home)
                .fetch_all(&app_state.db_pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM equipment ORDER BY department_id, name")
                .fetch_all(&app_state.db_pool)
                .await?
        }
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    for item in equipment {
        writer
            .serialize(ExportRow::from(item))
            .map_err(|e| ApiError::InternalServerError(format!("CSV export failed: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::InternalServerError(format!("CSV export failed: {}", e)))?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header((
            "Content-Disposition",
            "attachment; filename=\"equipment_export.csv\"",
        ))
        .body(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    const HEADER: &str =
        "name,category,status,purchase_date,image_url,serial_number,description\n";

    fn ctx(role: UserRole, home: Option<&str>) -> ImportContext {
        ImportContext {
            user_id: "u-1".to_string(),
            role,
            home_department_id: home.map(String::from),
        }
    }

    async fn seed_department(pool: &SqlitePool, id: &str) {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO departments (id, name, code, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(format!("Department {}", id))
        .bind(id.to_uppercase())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
    }

    // equipment.created_by references users(id), so the importing account
    // must exist before any row can persist
    async fn seed_user(pool: &SqlitePool, id: &str) {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO users
               (id, username, email, password_hash, role, is_active,
                created_at, updated_at, failed_login_attempts)
               VALUES (?, ?, ?, 'not-a-hash', 'admin', 1, ?, ?, 0)"#,
        )
        .bind(id)
        .bind(format!("user-{}", id))
        .bind(format!("{}@agri.example", id))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn equipment_count(pool: &SqlitePool, department_id: &str) -> i64 {
        sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM equipment WHERE department_id = ?")
            .bind(department_id)
            .fetch_one(pool)
            .await
            .unwrap()
            .0
    }

    // ---- pure pieces ----

    #[test]
    fn test_validate_row_accepts_full_record() {
        let row = RawEquipmentRow {
            name: Some("Soil analyzer".to_string()),
            category: Some("laboratory".to_string()),
            status: Some("in_storage".to_string()),
            purchase_date: Some("2023-04-15".to_string()),
            image_url: None,
            serial_number: Some("SA-100".to_string()),
            description: Some("Benchtop unit".to_string()),
        };

        let record = validate_row(&row, "d-1").unwrap();
        assert_eq!(record.name, "Soil analyzer");
        assert_eq!(record.category, EquipmentCategory::Laboratory);
        assert_eq!(record.status, EquipmentStatus::InStorage);
        assert_eq!(record.department_id, "d-1");
        assert_eq!(
            record.purchase_date,
            Some(NaiveDate::from_ymd_opt(2023, 4, 15).unwrap())
        );
    }

    #[test]
    fn test_validate_row_defaults_status() {
        let row = RawEquipmentRow {
            name: Some("Tractor".to_string()),
            category: Some("farm_machinery".to_string()),
            ..Default::default()
        };
        let record = validate_row(&row, "d-1").unwrap();
        assert_eq!(record.status, EquipmentStatus::InService);
    }

    #[test]
    fn test_validate_row_collects_all_issues() {
        let row = RawEquipmentRow {
            name: None,
            category: Some("spaceship".to_string()),
            purchase_date: Some("15/04/2023".to_string()),
            ..Default::default()
        };

        let issues = validate_row(&row, "d-1").unwrap_err();
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().any(|i| i == "Name is required"));
        assert!(issues.iter().any(|i| i.contains("spaceship")));
        assert!(issues.iter().any(|i| i.contains("15/04/2023")));
    }

    #[test]
    fn test_validate_row_treats_blank_as_missing() {
        let row = RawEquipmentRow {
            name: Some("   ".to_string()),
            category: Some("tool".to_string()),
            ..Default::default()
        };
        let issues = validate_row(&row, "d-1").unwrap_err();
        assert!(issues.iter().any(|i| i == "Name is required"));
    }

    #[test]
    fn test_parse_csv_keeps_row_positions() {
        let data = format!("{}Plow,tool,,,,,\nSeeder,tool,,,,,\n", HEADER);
        let parsed = parse_equipment_csv(data.as_bytes());
        assert_eq!(parsed.total_rows, 2);
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.rows[0].0, 1);
        assert_eq!(parsed.rows[1].0, 2);
        assert_eq!(parsed.rows[1].1.name.as_deref(), Some("Seeder"));
    }

    #[test]
    fn test_parse_csv_reports_malformed_rows() {
        // Row 2 has one field too many
        let data = format!("{}Plow,tool,,,,,\na,b,c,d,e,f,g,h\nSeeder,tool,,,,,\n", HEADER);
        let parsed = parse_equipment_csv(data.as_bytes());
        assert_eq!(parsed.total_rows, 3);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].row, 2);
        assert_eq!(parsed.errors[0].reason, ImportErrorReason::Parse);
    }

    #[test]
    fn test_import_size_ceiling() {
        assert!(check_import_size(0).is_ok());
        assert!(check_import_size(MAX_IMPORT_FILE_SIZE).is_ok());

        let err = check_import_size(MAX_IMPORT_FILE_SIZE + 1).unwrap_err();
        assert!(matches!(err, ApiError::PayloadTooLarge(_)));
    }

    #[test]
    fn test_is_csv_upload() {
        assert!(is_csv_upload(Some("text/csv"), "data.txt"));
        assert!(is_csv_upload(Some("application/vnd.ms-excel"), "report"));
        assert!(is_csv_upload(Some("application/octet-stream"), "DATA.CSV"));
        assert!(is_csv_upload(None, "inventory.csv"));
        assert!(!is_csv_upload(Some("application/octet-stream"), "data.txt"));
        assert!(!is_csv_upload(None, "data.xlsx"));
    }

    // ---- full pipeline ----

    #[actix_rt::test]
    async fn test_import_all_valid_rows() {
        let pool = test_pool().await;
        seed_department(&pool, "d-1").await;
        seed_user(&pool, "u-1").await;

        let data = format!(
            "{}Plow,tool,,,,,\nTractor,farm_machinery,in_storage,2020-01-10,,TR-9,\nMicroscope,laboratory,,,,,\n",
            HEADER
        );

        let outcome = import_equipment_csv(
            &pool,
            &ctx(UserRole::DeptHead, Some("d-1")),
            data.as_bytes(),
            None,
        )
        .await
        .unwrap();

        match outcome {
            ImportOutcome::Completed(result) => {
                assert!(result.success);
                assert_eq!(result.imported, 3);
                assert_eq!(result.failed, 0);
                assert!(result.errors.is_empty());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(equipment_count(&pool, "d-1").await, 3);
    }

    #[actix_rt::test]
    async fn test_import_row_two_fails_validation() {
        let pool = test_pool().await;
        seed_department(&pool, "d-1").await;
        seed_user(&pool, "u-1").await;

        // Row 2 has no name
        let data = format!("{}Plow,tool,,,,,\n,tool,,,,,\nSeeder,tool,,,,,\n", HEADER);

        let outcome = import_equipment_csv(
            &pool,
            &ctx(UserRole::DeptHead, Some("d-1")),
            data.as_bytes(),
            None,
        )
        .await
        .unwrap();

        match outcome {
            ImportOutcome::Completed(result) => {
                assert!(!result.success);
                assert_eq!(result.imported, 2);
                assert_eq!(result.failed, 1);
                assert_eq!(result.errors.len(), 1);
                assert_eq!(result.errors[0].row, 2);
                assert_eq!(result.errors[0].reason, ImportErrorReason::Validation);
                assert!(result.errors[0].message.starts_with("Validation failed: "));
                assert_eq!(result.imported + result.failed, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(equipment_count(&pool, "d-1").await, 2);
    }

    #[actix_rt::test]
    async fn test_dept_head_supplied_department_is_ignored() {
        let pool = test_pool().await;
        seed_department(&pool, "d-1").await;
        seed_department(&pool, "d-2").await;
        seed_user(&pool, "u-1").await;

        let data = format!("{}Plow,tool,,,,,\n", HEADER);

        let outcome = import_equipment_csv(
            &pool,
            &ctx(UserRole::DeptHead, Some("d-1")),
            data.as_bytes(),
            Some("d-2"),
        )
        .await
        .unwrap();

        match outcome {
            ImportOutcome::Completed(result) => assert_eq!(result.imported, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(equipment_count(&pool, "d-1").await, 1);
        assert_eq!(equipment_count(&pool, "d-2").await, 0);
    }

    #[actix_rt::test]
    async fn test_dept_head_without_home_department() {
        let pool = test_pool().await;

        let data = format!("{}Plow,tool,,,,,\n", HEADER);
        let err = import_equipment_csv(
            &pool,
            &ctx(UserRole::DeptHead, None),
            data.as_bytes(),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(err.to_string().contains("home department"));
    }

    #[actix_rt::test]
    async fn test_admin_requires_department() {
        let pool = test_pool().await;
        seed_department(&pool, "d-1").await;

        let data = format!("{}Plow,tool,,,,,\n", HEADER);

        let err = import_equipment_csv(&pool, &ctx(UserRole::Admin, None), data.as_bytes(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(equipment_count(&pool, "d-1").await, 0);

        let err = import_equipment_csv(
            &pool,
            &ctx(UserRole::Admin, None),
            data.as_bytes(),
            Some("no-such-dept"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[actix_rt::test]
    async fn test_admin_imports_into_named_department() {
        let pool = test_pool().await;
        seed_department(&pool, "d-2").await;
        seed_user(&pool, "u-1").await;

        let data = format!("{}Plow,tool,,,,,\n", HEADER);
        let outcome = import_equipment_csv(
            &pool,
            &ctx(UserRole::Admin, None),
            data.as_bytes(),
            Some("d-2"),
        )
        .await
        .unwrap();

        match outcome {
            ImportOutcome::Completed(result) => assert!(result.success),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(equipment_count(&pool, "d-2").await, 1);
    }

    #[actix_rt::test]
    async fn test_persistence_failure_is_reported_per_row() {
        let pool = test_pool().await;
        seed_department(&pool, "d-1").await;
        seed_user(&pool, "u-1").await;

        // Make every INSERT fail while department resolution still works
        sqlx::query("DROP TABLE equipment")
            .execute(&pool)
            .await
            .unwrap();

        let data = format!("{}Plow,tool,,,,,\n", HEADER);
        let outcome = import_equipment_csv(
            &pool,
            &ctx(UserRole::DeptHead, Some("d-1")),
            data.as_bytes(),
            None,
        )
        .await
        .unwrap();

        match outcome {
            ImportOutcome::Completed(result) => {
                assert!(!result.success);
                assert_eq!(result.imported, 0);
                assert_eq!(result.failed, 1);
                assert_eq!(result.errors[0].row, 1);
                assert_eq!(result.errors[0].reason, ImportErrorReason::Database);
                assert!(result.errors[0].message.starts_with("Database error: "));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn test_parse_failure_short_circuits() {
        let pool = test_pool().await;
        seed_department(&pool, "d-1").await;

        // Both rows malformed, so nothing parses
        let data = format!("{}a,b,c,d,e,f,g,h\n1,2,3,4,5,6,7,8\n", HEADER);

        let outcome = import_equipment_csv(
            &pool,
            &ctx(UserRole::DeptHead, Some("d-1")),
            data.as_bytes(),
            None,
        )
        .await
        .unwrap();

        match outcome {
            ImportOutcome::ParseFailed(result) => {
                assert!(!result.success);
                assert_eq!(result.imported, 0);
                assert_eq!(result.failed, 2);
                assert_eq!(result.errors.len(), 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(equipment_count(&pool, "d-1").await, 0);
    }

    #[actix_rt::test]
    async fn test_mixed_parse_and_validation_errors_keep_counts() {
        let pool = test_pool().await;
        seed_department(&pool, "d-1").await;
        seed_user(&pool, "u-1").await;

        // Row 1 valid, row 2 malformed, row 3 invalid category
        let data = format!(
            "{}Plow,tool,,,,,\na,b,c,d,e,f,g,h\nThing,widget,,,,,\n",
            HEADER
        );

        let outcome = import_equipment_csv(
            &pool,
            &ctx(UserRole::DeptHead, Some("d-1")),
            data.as_bytes(),
            None,
        )
        .await
        .unwrap();

        match outcome {
            ImportOutcome::Completed(result) => {
                assert_eq!(result.imported, 1);
                assert_eq!(result.failed, 2);
                assert_eq!(result.imported + result.failed, 3);

                let rows: Vec<usize> = result.errors.iter().map(|e| e.row).collect();
                assert!(rows.contains(&2));
                assert!(rows.contains(&3));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_summary_messages() {
        let ok = ImportResult {
            success: true,
            imported: 4,
            failed: 0,
            errors: vec![],
        };
        assert_eq!(
            import_summary_message(&ok),
            "Successfully imported 4 equipment records"
        );

        let partial = ImportResult {
            success: false,
            imported: 2,
            failed: 1,
            errors: vec![],
        };
        assert_eq!(
            import_summary_message(&partial),
            "Import completed with 2 successful and 1 failed records"
        );
    }
}
