//! SQLite persistence layer for CareConnect intake.
//!
//! This crate stores patient requests, volunteer applications, contact
//! messages and chat sessions using SQLx with SQLite, and answers the
//! reporting queries behind the admin dashboard.
//!
//! # Example
//!
//! ```no_run
//! use database::{patient, Database, PatientSubmission};
//! use triage_core::{summarize_concern, ConcernContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:careconnect.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     // Validate a submission and store it with its triage summary
//!     let submission: PatientSubmission = serde_json::from_str(
//!         r#"{"fullName":"A","age":30,"gender":"male","phone":"1","email":"a@b.com",
//!             "location":"X","medicalConcern":"I have a headache","urgencyLevel":"medium"}"#,
//!     )?;
//!     let new = submission.validate()?;
//!     let summary = summarize_concern(&ConcernContext::new(
//!         new.medical_concern.clone(),
//!         new.urgency_level,
//!     ));
//!     patient::create_patient(db.pool(), &new, &summary).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod chat_session;
pub mod contact;
pub mod error;
pub mod models;
pub mod patient;
pub mod query;
pub mod stats;
pub mod validation;
pub mod volunteer;

pub use chat_session::{ChatSubmission, ChatTurn, NewChatMessage, RatingSubmission};
pub use contact::{ContactSubmission, ContactUpdateSubmission};
pub use error::{DatabaseError, Result};
pub use models::{
    ChatMessage, ChatSession, Contact, FileRef, NewContact, NewPatient, NewVolunteer, Note,
    Patient, Volunteer,
};
pub use patient::{PatientSubmission, PatientUpdateSubmission};
pub use query::{Page, PageRequest, Pagination, SortOrder};
pub use stats::StatsWindow;
pub use validation::{FieldError, ValidationError, ValidationErrors};
pub use volunteer::{ReviewSubmission, VolunteerSubmission};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size for database connections.
    const DEFAULT_POOL_SIZE: u32 = 10;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `?mode=rwc` to create the database file if it doesn't exist.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// // File database
    /// let db = database::Database::connect("sqlite:data/careconnect.db?mode=rwc").await?;
    ///
    /// // In-memory database (for testing)
    /// let db = database::Database::connect("sqlite::memory:").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    ///
    /// Foreign keys are enforced, so a record that is still referenced
    /// cannot be deleted.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(
            "Connected to database: {} (pool size: {})",
            url,
            pool_size
        );

        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// This should be called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PatientStatus, VolunteerStatus};
    use crate::test_support::{sample_patient, sample_summary, sample_volunteer, test_db};
    use triage_core::{Priority, RiskLevel};

    #[tokio::test]
    async fn test_patient_scenario() {
        let db = test_db().await;

        let new = sample_patient().validate().unwrap();
        let patient = patient::create_patient(db.pool(), &new, &sample_summary())
            .await
            .unwrap();

        assert_eq!(patient.status, PatientStatus::Pending);
        assert_eq!(patient.ai_summary.risk_level, RiskLevel::Medium);
        assert_eq!(patient.ai_summary.suggested_priority, Priority::Medium);
    }

    #[tokio::test]
    async fn test_rejected_submission_is_not_stored() {
        let db = test_db().await;

        let mut submission = sample_patient();
        submission.medical_concern = None;
        assert!(submission.validate().is_err());

        assert_eq!(patient::count_patients(db.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_referenced_volunteer_cannot_be_deleted() {
        let db = test_db().await;

        let volunteer =
            volunteer::create_volunteer(db.pool(), &sample_volunteer().validate().unwrap())
                .await
                .unwrap();
        assert_eq!(volunteer.status, VolunteerStatus::Pending);

        let new = sample_patient().validate().unwrap();
        let patient = patient::create_patient(db.pool(), &new, &sample_summary())
            .await
            .unwrap();
        patient::assign_volunteer(db.pool(), &patient.id, &volunteer.id)
            .await
            .unwrap();

        let result = sqlx::query("DELETE FROM volunteers WHERE id = ?")
            .bind(&volunteer.id)
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }
}
