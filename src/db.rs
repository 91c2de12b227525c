// src/db.rs - Database migrations and setup

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    // Departments first: users and every asset table reference them
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS departments (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE CHECK(length(name) > 0 AND length(name) <= 255),
            code TEXT NOT NULL UNIQUE CHECK(length(code) > 0 AND length(code) <= 20),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE CHECK(length(username) >= 3 AND length(username) <= 50),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'dept_head' CHECK(
                role IN ('admin', 'dept_head')
            ),
            department_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            last_login DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until DATETIME,
            FOREIGN KEY (department_id) REFERENCES departments (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS equipment (
            id TEXT PRIMARY KEY,
            department_id TEXT NOT NULL,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            category TEXT NOT NULL CHECK(category IN (
                'laboratory', 'farm_machinery', 'vehicle', 'tool', 'other'
            )),
            status TEXT NOT NULL DEFAULT 'in_service' CHECK(
                status IN ('in_service', 'in_storage', 'under_maintenance', 'retired')
            ),
            purchase_date DATE,
            image_url TEXT CHECK(image_url IS NULL OR length(image_url) <= 500),
            serial_number TEXT CHECK(serial_number IS NULL OR length(serial_number) <= 100),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            created_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (department_id) REFERENCES departments (id),
            FOREIGN KEY (created_by) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS maintenance_logs (
            id TEXT PRIMARY KEY,
            equipment_id TEXT NOT NULL,
            title TEXT NOT NULL CHECK(length(title) > 0 AND length(title) <= 255),
            details TEXT CHECK(details IS NULL OR length(details) <= 2000),
            scheduled_date DATE,
            completed_at DATETIME,
            performed_by TEXT CHECK(performed_by IS NULL OR length(performed_by) <= 255),
            created_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (equipment_id) REFERENCES equipment (id) ON DELETE CASCADE,
            FOREIGN KEY (created_by) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staff_positions (
            id TEXT PRIMARY KEY,
            department_id TEXT NOT NULL,
            title TEXT NOT NULL CHECK(length(title) > 0 AND length(title) <= 255),
            headcount INTEGER NOT NULL CHECK(headcount >= 1),
            filled INTEGER NOT NULL DEFAULT 0 CHECK(filled >= 0),
            notes TEXT CHECK(notes IS NULL OR length(notes) <= 1000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (department_id) REFERENCES departments (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS land_assets (
            id TEXT PRIMARY KEY,
            department_id TEXT NOT NULL,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            asset_kind TEXT NOT NULL CHECK(asset_kind IN ('land', 'building')),
            area_sq_m REAL CHECK(area_sq_m IS NULL OR area_sq_m >= 0),
            address TEXT CHECK(address IS NULL OR length(address) <= 500),
            notes TEXT CHECK(notes IS NULL OR length(notes) <= 1000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (department_id) REFERENCES departments (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for the department-scoped list queries
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_equipment_department ON equipment (department_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_equipment_status ON equipment (status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_maintenance_equipment ON maintenance_logs (equipment_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_staff_department ON staff_positions (department_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_land_department ON land_assets (department_id)")
        .execute(pool)
        .await?;

    log::info!("Database migrations completed");

    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // One connection only: each in-memory connection is its own database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    run_migrations(&pool).await.expect("migrations");
    pool
}
