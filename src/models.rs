// src/models.rs
//! Data models for the inventory portal:
//! departments, equipment, maintenance logs, staffing positions and
//! land/building assets, plus the request DTOs used by the handlers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

// ==================== EQUIPMENT CATEGORY ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EquipmentCategory {
    Laboratory,
    FarmMachinery,
    Vehicle,
    Tool,
    Other,
}

impl EquipmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentCategory::Laboratory => "laboratory",
            EquipmentCategory::FarmMachinery => "farm_machinery",
            EquipmentCategory::Vehicle => "vehicle",
            EquipmentCategory::Tool => "tool",
            EquipmentCategory::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "laboratory" => Some(EquipmentCategory::Laboratory),
            "farm_machinery" => Some(EquipmentCategory::FarmMachinery),
            "vehicle" => Some(EquipmentCategory::Vehicle),
            "tool" => Some(EquipmentCategory::Tool),
            "other" => Some(EquipmentCategory::Other),
            _ => None,
        }
    }

    pub fn all_strings() -> Vec<&'static str> {
        vec!["laboratory", "farm_machinery", "vehicle", "tool", "other"]
    }
}

impl std::fmt::Display for EquipmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==================== EQUIPMENT STATUS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    InService,
    InStorage,
    UnderMaintenance,
    Retired,
}

impl Default for EquipmentStatus {
    fn default() -> Self {
        EquipmentStatus::InService
    }
}

impl EquipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::InService => "in_service",
            EquipmentStatus::InStorage => "in_storage",
            EquipmentStatus::UnderMaintenance => "under_maintenance",
            EquipmentStatus::Retired => "retired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "in_service" => Some(EquipmentStatus::InService),
            "in_storage" => Some(EquipmentStatus::InStorage),
            "under_maintenance" => Some(EquipmentStatus::UnderMaintenance),
            "retired" => Some(EquipmentStatus::Retired),
            _ => None,
        }
    }

    pub fn all_strings() -> Vec<&'static str> {
        vec!["in_service", "in_storage", "under_maintenance", "retired"]
    }
}

impl std::fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==================== DEPARTMENT ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateDepartmentRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 20, message = "Code must be between 1 and 20 characters"))]
    pub code: String,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDepartmentRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 20, message = "Code must be between 1 and 20 characters"))]
    pub code: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
}

// ==================== EQUIPMENT ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Equipment {
    pub id: String,
    pub department_id: String,
    pub name: String,
    pub category: String,
    pub status: String,
    pub purchase_date: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub serial_number: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateEquipmentRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    pub category: EquipmentCategory,

    pub status: Option<EquipmentStatus>,

    pub purchase_date: Option<NaiveDate>,

    #[validate(length(max = 500, message = "Image URL cannot exceed 500 characters"))]
    pub image_url: Option<String>,

    #[validate(length(max = 100, message = "Serial number cannot exceed 100 characters"))]
    pub serial_number: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,

    /// Required for administrators; ignored for department heads.
    pub department_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEquipmentRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    pub category: Option<EquipmentCategory>,

    pub status: Option<EquipmentStatus>,

    pub purchase_date: Option<NaiveDate>,

    #[validate(length(max = 500, message = "Image URL cannot exceed 500 characters"))]
    pub image_url: Option<String>,

    #[validate(length(max = 100, message = "Serial number cannot exceed 100 characters"))]
    pub serial_number: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,
}

// ==================== MAINTENANCE LOG ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct MaintenanceLog {
    pub id: String,
    pub equipment_id: String,
    pub title: String,
    pub details: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
    pub performed_by: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateMaintenanceRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Details cannot exceed 2000 characters"))]
    pub details: Option<String>,

    pub scheduled_date: Option<NaiveDate>,

    #[validate(length(max = 255, message = "Performer cannot exceed 255 characters"))]
    pub performed_by: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteMaintenanceRequest {
    #[validate(length(max = 2000, message = "Details cannot exceed 2000 characters"))]
    pub details: Option<String>,

    #[validate(length(max = 255, message = "Performer cannot exceed 255 characters"))]
    pub performed_by: Option<String>,
}

// ==================== STAFF POSITION ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct StaffPosition {
    pub id: String,
    pub department_id: String,
    pub title: String,
    pub headcount: i64,
    pub filled: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateStaffPositionRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: String,

    #[validate(range(min = 1, message = "Headcount must be at least 1"))]
    pub headcount: i64,

    #[validate(range(min = 0, message = "Filled count cannot be negative"))]
    pub filled: Option<i64>,

    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,

    /// Required for administrators; ignored for department heads.
    pub department_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStaffPositionRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: Option<String>,

    #[validate(range(min = 1, message = "Headcount must be at least 1"))]
    pub headcount: Option<i64>,

    #[validate(range(min = 0, message = "Filled count cannot be negative"))]
    pub filled: Option<i64>,

    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

// ==================== LAND / BUILDING ASSET ====================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LandAsset {
    pub id: String,
    pub department_id: String,
    pub name: String,
    pub asset_kind: String, // 'land' or 'building'
    pub area_sq_m: Option<f64>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateLandAssetRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,

    pub asset_kind: String,

    #[validate(range(min = 0.0, message = "Area must be non-negative"))]
    pub area_sq_m: Option<f64>,

    #[validate(length(max = 500, message = "Address cannot exceed 500 characters"))]
    pub address: Option<String>,

    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,

    /// Required for administrators; ignored for department heads.
    pub department_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLandAssetRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,

    pub asset_kind: Option<String>,

    #[validate(range(min = 0.0, message = "Area must be non-negative"))]
    pub area_sq_m: Option<f64>,

    #[validate(length(max = 500, message = "Address cannot exceed 500 characters"))]
    pub address: Option<String>,

    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

pub const LAND_ASSET_KINDS: [&str; 2] = ["land", "building"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for s in EquipmentCategory::all_strings() {
            let cat = EquipmentCategory::from_str(s).unwrap();
            assert_eq!(cat.as_str(), s);
        }
        assert_eq!(EquipmentCategory::from_str("reagent"), None);
    }

    #[test]
    fn test_status_round_trip() {
        for s in EquipmentStatus::all_strings() {
            let status = EquipmentStatus::from_str(s).unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert_eq!(EquipmentStatus::from_str("depleted"), None);
    }

    #[test]
    fn test_status_default() {
        assert_eq!(EquipmentStatus::default(), EquipmentStatus::InService);
    }

    #[test]
    fn test_create_equipment_request_validation() {
        let request = CreateEquipmentRequest {
            name: "".to_string(),
            category: EquipmentCategory::Laboratory,
            status: None,
            purchase_date: None,
            image_url: None,
            serial_number: None,
            description: None,
            department_id: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_create_staff_position_validation() {
        let request = CreateStaffPositionRequest {
            title: "Senior Agronomist".to_string(),
            headcount: 0,
            filled: None,
            notes: None,
            department_id: None,
        };
        assert!(request.validate().is_err());
    }
}
