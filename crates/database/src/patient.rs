//! Patient request operations.

use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use triage_core::{AiSummary, UrgencyLevel};
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::{FileRef, Gender, NewPatient, Note, Patient, PatientBrief, PatientStatus};
use crate::query::{push_search, Page, PageRequest, SortOrder};
use crate::validation::{lenient_number, FieldValidator, ValidationErrors};

const ENTITY: &str = "Patient";

const PATIENT_COLUMNS: &str = "id, full_name, age, gender, phone, email, location, \
     medical_concern, urgency_level, prescription_file, status, assigned_volunteer, \
     ai_summary, resolved_at, created_at, updated_at";

/// A patient request as posted by the intake form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSubmission {
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub medical_concern: Option<String>,
    pub urgency_level: Option<String>,
    pub prescription_file: Option<FileRef>,
}

impl PatientSubmission {
    /// Check required fields, ranges and choices.
    pub fn validate(&self) -> std::result::Result<NewPatient, ValidationErrors> {
        let mut v = FieldValidator::new();

        let full_name = v.required_text("fullName", self.full_name.as_deref(), 100);
        let age = v.range("age", self.age, 1, 120);
        let gender = v.required_choice("gender", self.gender.as_deref(), Gender::parse);
        let phone = v.required_text("phone", self.phone.as_deref(), 30);
        let email = v.email("email", self.email.as_deref());
        let location = v.required_text("location", self.location.as_deref(), 200);
        let medical_concern =
            v.required_text("medicalConcern", self.medical_concern.as_deref(), 2000);
        let urgency_level = v.required_choice(
            "urgencyLevel",
            self.urgency_level.as_deref(),
            UrgencyLevel::parse,
        );

        match (
            full_name,
            age,
            gender,
            phone,
            email,
            location,
            medical_concern,
            urgency_level,
        ) {
            (
                Some(full_name),
                Some(age),
                Some(gender),
                Some(phone),
                Some(email),
                Some(location),
                Some(medical_concern),
                Some(urgency_level),
            ) if v.is_valid() => Ok(NewPatient {
                full_name,
                age,
                gender,
                phone,
                email,
                location,
                medical_concern,
                urgency_level,
                prescription_file: self.prescription_file.clone(),
            }),
            _ => Err(v.into_errors()),
        }
    }
}

/// Staff edits to a patient request. Triage output is not editable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientUpdateSubmission {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub status: Option<String>,
}

/// Validated patient edits; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientUpdate {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub status: Option<PatientStatus>,
}

impl PatientUpdateSubmission {
    pub fn validate(&self) -> std::result::Result<PatientUpdate, ValidationErrors> {
        let mut v = FieldValidator::new();

        let phone = v.optional_text("phone", self.phone.as_deref(), 30);
        let email = match self.email.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(email) => v.email("email", Some(email)),
        };
        let location = v.optional_text("location", self.location.as_deref(), 200);
        let status = v.optional_choice("status", self.status.as_deref(), PatientStatus::parse);

        if v.is_valid() {
            Ok(PatientUpdate {
                phone,
                email,
                location,
                status,
            })
        } else {
            Err(v.into_errors())
        }
    }
}

impl PatientStatus {
    /// Whether staff may move a request from `self` to `next`.
    pub fn can_become(&self, next: PatientStatus) -> bool {
        use PatientStatus::*;

        matches!(
            (self, next),
            (Pending, InProgress | Resolved | Closed)
                | (InProgress, Resolved | Closed)
                | (Resolved, Closed)
        )
    }
}

/// Filters for listing patients.
#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    pub status: Option<PatientStatus>,
    pub urgency_level: Option<UrgencyLevel>,
    /// Matched against name, email and location.
    pub search: Option<String>,
}

/// Sortable patient columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PatientSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    FullName,
    Age,
    UrgencyLevel,
    Status,
}

impl PatientSort {
    /// Get the database column name for this field.
    pub fn column_name(&self) -> &'static str {
        match self {
            PatientSort::CreatedAt => "created_at",
            PatientSort::UpdatedAt => "updated_at",
            PatientSort::FullName => "full_name",
            PatientSort::Age => "age",
            PatientSort::UrgencyLevel => "urgency_level",
            PatientSort::Status => "status",
        }
    }

    /// Parse a sort key from user input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "createdAt" | "created_at" => Some(PatientSort::CreatedAt),
            "updatedAt" | "updated_at" => Some(PatientSort::UpdatedAt),
            "fullName" | "full_name" => Some(PatientSort::FullName),
            "age" => Some(PatientSort::Age),
            "urgencyLevel" | "urgency_level" => Some(PatientSort::UrgencyLevel),
            "status" => Some(PatientSort::Status),
            _ => None,
        }
    }
}

/// Insert a new patient request with its triage summary.
pub async fn create_patient(
    pool: &SqlitePool,
    patient: &NewPatient,
    summary: &AiSummary,
) -> Result<Patient> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO patients (
            id, full_name, age, gender, phone, email, location,
            medical_concern, urgency_level, prescription_file, ai_summary
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&patient.full_name)
    .bind(patient.age)
    .bind(patient.gender)
    .bind(&patient.phone)
    .bind(&patient.email)
    .bind(&patient.location)
    .bind(&patient.medical_concern)
    .bind(patient.urgency_level.as_str())
    .bind(patient.prescription_file.as_ref().map(Json))
    .bind(Json(summary))
    .execute(pool)
    .await?;

    tracing::info!(
        patient_id = %id,
        urgency = %patient.urgency_level,
        priority = %summary.suggested_priority,
        "Patient request created"
    );

    get_patient(pool, &id).await
}

/// Get a patient by ID, including notes.
pub async fn get_patient(pool: &SqlitePool, id: &str) -> Result<Patient> {
    let mut patient = fetch_patient(pool, id).await?;
    patient.notes = list_notes(pool, id).await?;
    Ok(patient)
}

async fn fetch_patient<'e, E>(executor: E, id: &str) -> Result<Patient>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Patient>(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found(ENTITY, id))
}

async fn list_notes(pool: &SqlitePool, id: &str) -> Result<Vec<Note>> {
    let notes = sqlx::query_as::<_, Note>(
        r#"
        SELECT author, content, timestamp
        FROM patient_notes
        WHERE patient_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(notes)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PatientFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(urgency) = filter.urgency_level {
        qb.push(" AND urgency_level = ").push_bind(urgency.as_str());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        push_search(qb, &["full_name", "email", "location"], search);
    }
}

/// List patients. Notes are only loaded by [`get_patient`].
pub async fn list_patients(
    pool: &SqlitePool,
    filter: &PatientFilter,
    sort: PatientSort,
    order: SortOrder,
    page: PageRequest,
) -> Result<Page<Patient>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM patients");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {PATIENT_COLUMNS} FROM patients"));
    push_filters(&mut qb, filter);
    qb.push(format!(" ORDER BY {} {}, id ASC", sort.column_name(), order.sql()));
    page.push_to(&mut qb);

    let items = qb.build_query_as::<Patient>().fetch_all(pool).await?;

    Ok(Page::new(items, page, total))
}

/// Count all patients.
pub async fn count_patients(pool: &SqlitePool) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM patients")
        .fetch_one(pool)
        .await?;

    Ok(count.0)
}

/// The most recently submitted patients.
pub async fn recent_patients(pool: &SqlitePool, limit: i64) -> Result<Vec<PatientBrief>> {
    let patients = sqlx::query_as::<_, PatientBrief>(
        r#"
        SELECT id, full_name, status, urgency_level, created_at
        FROM patients
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(patients)
}

/// Apply staff edits. A status change must be a valid transition; moving to
/// `resolved` stamps `resolved_at`.
pub async fn update_patient(pool: &SqlitePool, id: &str, update: &PatientUpdate) -> Result<Patient> {
    let mut tx = pool.begin().await?;
    let current = fetch_patient(&mut *tx, id).await?;

    let status = match update.status {
        Some(next) if next != current.status => {
            if !current.status.can_become(next) {
                return Err(DatabaseError::transition(ENTITY, current.status, next));
            }
            next
        }
        _ => current.status,
    };

    sqlx::query(
        r#"
        UPDATE patients
        SET phone = COALESCE(?, phone),
            email = COALESCE(?, email),
            location = COALESCE(?, location),
            status = ?,
            resolved_at = CASE
                WHEN ? = 'resolved' AND resolved_at IS NULL THEN datetime('now')
                ELSE resolved_at
            END,
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(update.phone.as_deref())
    .bind(update.email.as_deref())
    .bind(update.location.as_deref())
    .bind(status)
    .bind(status.as_str())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    get_patient(pool, id).await
}

/// Append a staff note.
pub async fn add_note(pool: &SqlitePool, id: &str, author: &str, content: &str) -> Result<Note> {
    let mut tx = pool.begin().await?;
    fetch_patient(&mut *tx, id).await?;

    let note = sqlx::query_as::<_, Note>(
        r#"
        INSERT INTO patient_notes (patient_id, author, content)
        VALUES (?, ?, ?)
        RETURNING author, content, timestamp
        "#,
    )
    .bind(id)
    .bind(author)
    .bind(content)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE patients SET updated_at = datetime('now') WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(note)
}

/// Assign a volunteer; the request moves to `in-progress`.
///
/// Allowed while the request is pending or already in progress.
pub async fn assign_volunteer(pool: &SqlitePool, id: &str, volunteer_id: &str) -> Result<Patient> {
    let mut tx = pool.begin().await?;
    let current = fetch_patient(&mut *tx, id).await?;

    if !matches!(
        current.status,
        PatientStatus::Pending | PatientStatus::InProgress
    ) {
        return Err(DatabaseError::transition(
            ENTITY,
            current.status,
            PatientStatus::InProgress,
        ));
    }

    let volunteer: Option<(String,)> = sqlx::query_as("SELECT id FROM volunteers WHERE id = ?")
        .bind(volunteer_id)
        .fetch_optional(&mut *tx)
        .await?;
    if volunteer.is_none() {
        return Err(DatabaseError::not_found("Volunteer", volunteer_id));
    }

    sqlx::query(
        r#"
        UPDATE patients
        SET assigned_volunteer = ?, status = 'in-progress', updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(volunteer_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE volunteers SET last_active = datetime('now') WHERE id = ?")
        .bind(volunteer_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(patient_id = %id, volunteer_id = %volunteer_id, "Volunteer assigned");
    get_patient(pool, id).await
}

/// Mark a request resolved and stamp `resolved_at`.
pub async fn resolve_patient(pool: &SqlitePool, id: &str) -> Result<Patient> {
    let mut tx = pool.begin().await?;
    let current = fetch_patient(&mut *tx, id).await?;

    if !current.status.can_become(PatientStatus::Resolved) {
        return Err(DatabaseError::transition(
            ENTITY,
            current.status,
            PatientStatus::Resolved,
        ));
    }

    sqlx::query(
        r#"
        UPDATE patients
        SET status = 'resolved', resolved_at = datetime('now'), updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    get_patient(pool, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_patient, sample_summary, sample_volunteer, test_db};
    use crate::volunteer;
    use triage_core::{Priority, RiskLevel};

    #[test]
    fn test_submission_requires_medical_concern() {
        let mut submission = sample_patient();
        submission.medical_concern = None;

        let errors = submission.validate().unwrap_err();
        assert!(errors.has_field("medicalConcern"));
        assert_eq!(errors.errors().len(), 1);
    }

    #[test]
    fn test_submission_reports_every_bad_field() {
        let submission = PatientSubmission {
            age: Some(130),
            gender: Some("robot".to_string()),
            email: Some("not-an-email".to_string()),
            urgency_level: Some("extreme".to_string()),
            ..sample_patient()
        };

        let errors = submission.validate().unwrap_err();
        assert!(errors.has_field("age"));
        assert!(errors.has_field("gender"));
        assert!(errors.has_field("email"));
        assert!(errors.has_field("urgencyLevel"));
        assert!(!errors.has_field("fullName"));
    }

    #[test]
    fn test_submission_normalizes_email() {
        let submission = PatientSubmission {
            email: Some(" A@B.com ".to_string()),
            ..sample_patient()
        };
        assert_eq!(submission.validate().unwrap().email, "a@b.com");
    }

    #[test]
    fn test_fractional_age_rejected() {
        let submission: PatientSubmission = serde_json::from_str(
            r#"{"fullName":"A","age":120.9,"gender":"male","phone":"1","email":"a@b.com",
                "location":"X","medicalConcern":"I have a headache","urgencyLevel":"medium"}"#,
        )
        .unwrap();
        let errors = submission.validate().unwrap_err();
        assert!(errors.has_field("age"));
    }

    #[test]
    fn test_status_transitions() {
        use PatientStatus::*;

        assert!(Pending.can_become(InProgress));
        assert!(Pending.can_become(Closed));
        assert!(InProgress.can_become(Resolved));
        assert!(Resolved.can_become(Closed));
        assert!(!Resolved.can_become(Pending));
        assert!(!Closed.can_become(InProgress));
        assert!(!InProgress.can_become(Pending));
    }

    #[tokio::test]
    async fn test_create_and_get_patient() {
        let db = test_db().await;
        let new = sample_patient().validate().unwrap();

        let patient = create_patient(db.pool(), &new, &sample_summary()).await.unwrap();
        assert_eq!(patient.status, PatientStatus::Pending);
        assert_eq!(patient.urgency_level, UrgencyLevel::Medium);
        assert_eq!(patient.ai_summary.risk_level, RiskLevel::Medium);
        assert_eq!(patient.ai_summary.suggested_priority, Priority::Medium);
        assert!(patient.notes.is_empty());
        assert!(patient.resolved_at.is_none());

        let fetched = get_patient(db.pool(), &patient.id).await.unwrap();
        assert_eq!(fetched, patient);
    }

    #[tokio::test]
    async fn test_get_missing_patient() {
        let db = test_db().await;
        let result = get_patient(db.pool(), "missing").await;
        assert!(matches!(result, Err(DatabaseError::NotFound { entity: "Patient", .. })));
    }

    #[tokio::test]
    async fn test_list_filters_and_paging() {
        let db = test_db().await;
        for (name, urgency) in [("Ann", "high"), ("Bob", "low"), ("Cid", "high")] {
            let new = PatientSubmission {
                full_name: Some(name.to_string()),
                urgency_level: Some(urgency.to_string()),
                ..sample_patient()
            }
            .validate()
            .unwrap();
            create_patient(db.pool(), &new, &sample_summary()).await.unwrap();
        }

        let filter = PatientFilter {
            urgency_level: Some(UrgencyLevel::High),
            ..PatientFilter::default()
        };
        let page = list_patients(
            db.pool(),
            &filter,
            PatientSort::FullName,
            SortOrder::Asc,
            PageRequest::new(Some(1), Some(1)),
        )
        .await
        .unwrap();
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.pagination.pages, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].full_name, "Ann");

        let filter = PatientFilter {
            search: Some("bo".to_string()),
            ..PatientFilter::default()
        };
        let page = list_patients(
            db.pool(),
            &filter,
            PatientSort::default(),
            SortOrder::default(),
            PageRequest::default(),
        )
        .await
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].full_name, "Bob");
    }

    #[tokio::test]
    async fn test_notes_are_appended_in_order() {
        let db = test_db().await;
        let new = sample_patient().validate().unwrap();
        let patient = create_patient(db.pool(), &new, &sample_summary()).await.unwrap();

        add_note(db.pool(), &patient.id, "nurse", "called back").await.unwrap();
        let note = add_note(db.pool(), &patient.id, "doctor", "follow up").await.unwrap();
        assert_eq!(note.author, "doctor");

        let fetched = get_patient(db.pool(), &patient.id).await.unwrap();
        let contents: Vec<_> = fetched.notes.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(contents, vec!["called back", "follow up"]);

        let result = add_note(db.pool(), "missing", "nurse", "x").await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_assign_then_resolve() {
        let db = test_db().await;
        let new = sample_patient().validate().unwrap();
        let patient = create_patient(db.pool(), &new, &sample_summary()).await.unwrap();
        let vol = volunteer::create_volunteer(db.pool(), &sample_volunteer().validate().unwrap())
            .await
            .unwrap();

        let assigned = assign_volunteer(db.pool(), &patient.id, &vol.id).await.unwrap();
        assert_eq!(assigned.status, PatientStatus::InProgress);
        assert_eq!(assigned.assigned_volunteer.as_deref(), Some(vol.id.as_str()));

        let resolved = resolve_patient(db.pool(), &patient.id).await.unwrap();
        assert_eq!(resolved.status, PatientStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        // Resolved requests can no longer be assigned or resolved again.
        let result = assign_volunteer(db.pool(), &patient.id, &vol.id).await;
        assert!(matches!(result, Err(DatabaseError::InvalidTransition { .. })));
        let result = resolve_patient(db.pool(), &patient.id).await;
        assert!(matches!(result, Err(DatabaseError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_assign_unknown_volunteer() {
        let db = test_db().await;
        let new = sample_patient().validate().unwrap();
        let patient = create_patient(db.pool(), &new, &sample_summary()).await.unwrap();

        let result = assign_volunteer(db.pool(), &patient.id, "nobody").await;
        assert!(matches!(result, Err(DatabaseError::NotFound { entity: "Volunteer", .. })));

        let unchanged = get_patient(db.pool(), &patient.id).await.unwrap();
        assert_eq!(unchanged.status, PatientStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_fields_and_status() {
        let db = test_db().await;
        let new = sample_patient().validate().unwrap();
        let patient = create_patient(db.pool(), &new, &sample_summary()).await.unwrap();

        let update = PatientUpdateSubmission {
            location: Some("Y".to_string()),
            status: Some("closed".to_string()),
            ..PatientUpdateSubmission::default()
        }
        .validate()
        .unwrap();
        let updated = update_patient(db.pool(), &patient.id, &update).await.unwrap();
        assert_eq!(updated.location, "Y");
        assert_eq!(updated.phone, patient.phone);
        assert_eq!(updated.status, PatientStatus::Closed);
        assert_eq!(updated.ai_summary, patient.ai_summary);

        let reopen = PatientUpdate {
            status: Some(PatientStatus::Pending),
            ..PatientUpdate::default()
        };
        let result = update_patient(db.pool(), &patient.id, &reopen).await;
        assert!(matches!(result, Err(DatabaseError::InvalidTransition { .. })));
    }

    #[test]
    fn test_update_submission_rejects_bad_status() {
        let submission = PatientUpdateSubmission {
            status: Some("archived".to_string()),
            ..PatientUpdateSubmission::default()
        };
        assert!(submission.validate().unwrap_err().has_field("status"));
    }
}
