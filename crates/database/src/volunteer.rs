//! Volunteer application operations.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::error::{map_unique, DatabaseError, Result};
use crate::models::{
    AgeGroup, AvailabilitySlot, ConcernPreference, FileRef, NewVolunteer, PatientBrief, Rating,
    Review, Skill, Volunteer, VolunteerPreferences, VolunteerStatus, Weekday,
};
use crate::query::{push_search, Page, PageRequest, SortOrder};
use crate::validation::{lenient_number, FieldValidator, ValidationError, ValidationErrors};

const ENTITY: &str = "Volunteer";

const VOLUNTEER_COLUMNS: &str = "id, full_name, email, phone, skills, experience, \
     availability, city, state, country, license_number, license_file, id_proof_file, \
     professional_background, why_volunteer, languages, status, approved_at, approved_by, \
     rejection_reason, total_hours, rating_average, rating_count, last_active, preferences, \
     created_at, updated_at";

/// An availability window as posted by the form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySubmission {
    pub day: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesSubmission {
    #[serde(default, deserialize_with = "lenient_number")]
    pub max_patients: Option<i64>,
    #[serde(default)]
    pub preferred_age_groups: Vec<String>,
    #[serde(default)]
    pub preferred_concerns: Vec<String>,
}

/// A volunteer application as posted by the registration form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerSubmission {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub experience: Option<String>,
    #[serde(default)]
    pub availability: Vec<AvailabilitySubmission>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub license_number: Option<String>,
    pub license_file: Option<FileRef>,
    pub id_proof_file: Option<FileRef>,
    pub professional_background: Option<String>,
    pub why_volunteer: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    pub preferences: Option<PreferencesSubmission>,
}

impl VolunteerSubmission {
    /// Check required fields, skill and schedule choices.
    pub fn validate(&self) -> std::result::Result<NewVolunteer, ValidationErrors> {
        let mut v = FieldValidator::new();

        let full_name = v.required_text("fullName", self.full_name.as_deref(), 100);
        let email = v.email("email", self.email.as_deref());
        let phone = v.required_text("phone", self.phone.as_deref(), 30);

        let mut skills = v.choices("skills", &self.skills, Skill::parse);
        let mut seen = Vec::with_capacity(skills.len());
        skills.retain(|skill| {
            let first = !seen.contains(skill);
            seen.push(*skill);
            first
        });
        if self.skills.is_empty() {
            v.push(ValidationError::Empty("skills".to_string()));
        }

        let experience = v.required_text("experience", self.experience.as_deref(), 1000);

        let availability: Vec<AvailabilitySlot> = self
            .availability
            .iter()
            .filter_map(|slot| {
                let day = v.required_choice("availability.day", slot.day.as_deref(), Weekday::parse);
                let start_time = v.clock("availability.startTime", slot.start_time.as_deref());
                let end_time = v.clock("availability.endTime", slot.end_time.as_deref());
                Some(AvailabilitySlot {
                    day: day?,
                    start_time: start_time?,
                    end_time: end_time?,
                })
            })
            .collect();

        let city = v.required_text("city", self.city.as_deref(), 100);
        let state = v.required_text("state", self.state.as_deref(), 100);
        let country = v
            .optional_text("country", self.country.as_deref(), 100)
            .unwrap_or_else(|| "USA".to_string());
        let license_number = v.optional_text("licenseNumber", self.license_number.as_deref(), 100);
        let professional_background = v.optional_text(
            "professionalBackground",
            self.professional_background.as_deref(),
            1000,
        );
        let why_volunteer = v.required_text("whyVolunteer", self.why_volunteer.as_deref(), 1000);

        let mut languages: Vec<String> = self
            .languages
            .iter()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        if languages.is_empty() {
            languages.push("english".to_string());
        }

        let preferences = match &self.preferences {
            None => VolunteerPreferences::default(),
            Some(prefs) => VolunteerPreferences {
                max_patients: match prefs.max_patients {
                    None => 10,
                    Some(n) => v
                        .range("preferences.maxPatients", Some(n), 1, 100)
                        .map(|n| n as u32)
                        .unwrap_or(10),
                },
                preferred_age_groups: v.choices(
                    "preferences.preferredAgeGroups",
                    &prefs.preferred_age_groups,
                    AgeGroup::parse,
                ),
                preferred_concerns: v.choices(
                    "preferences.preferredConcerns",
                    &prefs.preferred_concerns,
                    ConcernPreference::parse,
                ),
            },
        };

        match (full_name, email, phone, experience, city, state, why_volunteer) {
            (
                Some(full_name),
                Some(email),
                Some(phone),
                Some(experience),
                Some(city),
                Some(state),
                Some(why_volunteer),
            ) if v.is_valid() => Ok(NewVolunteer {
                full_name,
                email,
                phone,
                skills,
                experience,
                availability,
                city,
                state,
                country,
                license_number,
                license_file: self.license_file.clone(),
                id_proof_file: self.id_proof_file.clone(),
                professional_background,
                why_volunteer,
                languages,
                preferences,
            }),
            _ => Err(v.into_errors()),
        }
    }
}

/// A review as posted by staff or a patient.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmission {
    pub patient_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

/// A validated review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub patient_id: String,
    pub rating: i64,
    pub comment: Option<String>,
}

impl ReviewSubmission {
    pub fn validate(&self) -> std::result::Result<NewReview, ValidationErrors> {
        let mut v = FieldValidator::new();

        let patient_id = v.required_text("patientId", self.patient_id.as_deref(), 64);
        let rating = v.range("rating", self.rating, 1, 5);
        let comment = v.optional_text("comment", self.comment.as_deref(), 1000);

        match (patient_id, rating) {
            (Some(patient_id), Some(rating)) if v.is_valid() => Ok(NewReview {
                patient_id,
                rating,
                comment,
            }),
            _ => Err(v.into_errors()),
        }
    }
}

impl VolunteerStatus {
    /// Whether staff may move an application from `self` to `next`.
    ///
    /// `rejected` is terminal; `active` and `inactive` toggle freely.
    pub fn can_become(&self, next: VolunteerStatus) -> bool {
        use VolunteerStatus::*;

        matches!(
            (self, next),
            (Pending, Approved | Rejected)
                | (Approved, Active | Inactive)
                | (Active, Inactive)
                | (Inactive, Active)
        )
    }
}

/// Filters for listing volunteers.
#[derive(Debug, Clone, Default)]
pub struct VolunteerFilter {
    pub status: Option<VolunteerStatus>,
    /// Substring match on city.
    pub city: Option<String>,
    /// Volunteers offering any of these skills.
    pub skills: Vec<Skill>,
    /// Matched against name, email and city.
    pub search: Option<String>,
}

/// Sortable volunteer columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VolunteerSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    FullName,
    City,
    Status,
    Rating,
}

impl VolunteerSort {
    /// Get the database column name for this field.
    pub fn column_name(&self) -> &'static str {
        match self {
            VolunteerSort::CreatedAt => "created_at",
            VolunteerSort::UpdatedAt => "updated_at",
            VolunteerSort::FullName => "full_name",
            VolunteerSort::City => "city",
            VolunteerSort::Status => "status",
            VolunteerSort::Rating => "rating_average",
        }
    }

    /// Parse a sort key from user input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "createdAt" | "created_at" => Some(VolunteerSort::CreatedAt),
            "updatedAt" | "updated_at" => Some(VolunteerSort::UpdatedAt),
            "fullName" | "full_name" => Some(VolunteerSort::FullName),
            "city" => Some(VolunteerSort::City),
            "status" => Some(VolunteerSort::Status),
            "rating" | "rating.average" | "rating_average" => Some(VolunteerSort::Rating),
            _ => None,
        }
    }
}

/// Criteria for finding volunteers to assign.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityQuery {
    pub city: Option<String>,
    pub state: Option<String>,
    pub skills: Vec<Skill>,
    /// Day and minutes past midnight that must fall inside a slot.
    pub at: Option<(Weekday, u32)>,
}

/// An active volunteer with their current open caseload.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AvailableVolunteer {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub volunteer: Volunteer,
    pub open_cases: i64,
}

/// Short volunteer view for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerBrief {
    pub id: String,
    pub full_name: String,
    pub status: VolunteerStatus,
    pub created_at: String,
}

/// Insert a new application with status `pending`.
///
/// A second application with the same email is rejected as `AlreadyExists`.
pub async fn create_volunteer(pool: &SqlitePool, volunteer: &NewVolunteer) -> Result<Volunteer> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO volunteers (
            id, full_name, email, phone, skills, experience, availability, city, state,
            country, license_number, license_file, id_proof_file, professional_background,
            why_volunteer, languages, preferences
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&volunteer.full_name)
    .bind(&volunteer.email)
    .bind(&volunteer.phone)
    .bind(Json(&volunteer.skills))
    .bind(&volunteer.experience)
    .bind(Json(&volunteer.availability))
    .bind(&volunteer.city)
    .bind(&volunteer.state)
    .bind(&volunteer.country)
    .bind(volunteer.license_number.as_deref())
    .bind(volunteer.license_file.as_ref().map(Json))
    .bind(volunteer.id_proof_file.as_ref().map(Json))
    .bind(volunteer.professional_background.as_deref())
    .bind(&volunteer.why_volunteer)
    .bind(Json(&volunteer.languages))
    .bind(Json(&volunteer.preferences))
    .execute(pool)
    .await
    .map_err(map_unique(ENTITY, &volunteer.email))?;

    tracing::info!(volunteer_id = %id, "Volunteer application created");

    get_volunteer(pool, &id).await
}

/// Get a volunteer with reviews and assigned patients.
pub async fn get_volunteer(pool: &SqlitePool, id: &str) -> Result<Volunteer> {
    let mut volunteer = fetch_volunteer(pool, id).await?;

    volunteer.reviews = sqlx::query_as::<_, Review>(
        r#"
        SELECT r.id, r.patient_id, p.full_name AS patient_name, r.rating, r.comment, r.timestamp
        FROM volunteer_reviews r
        LEFT JOIN patients p ON p.id = r.patient_id
        WHERE r.volunteer_id = ?
        ORDER BY r.id ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    volunteer.assigned_patients = sqlx::query_as::<_, PatientBrief>(
        r#"
        SELECT id, full_name, status, urgency_level, created_at
        FROM patients
        WHERE assigned_volunteer = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(volunteer)
}

async fn fetch_volunteer<'e, E>(executor: E, id: &str) -> Result<Volunteer>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Volunteer>(&format!(
        "SELECT {VOLUNTEER_COLUMNS} FROM volunteers WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found(ENTITY, id))
}

fn push_skill_filter(qb: &mut QueryBuilder<'_, Sqlite>, skills: &[Skill]) {
    if skills.is_empty() {
        return;
    }
    qb.push(" AND EXISTS (SELECT 1 FROM json_each(volunteers.skills) WHERE json_each.value IN (");
    let mut separated = qb.separated(", ");
    for skill in skills {
        separated.push_bind(skill.as_str());
    }
    separated.push_unseparated("))");
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &VolunteerFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(city) = filter.city.as_deref().filter(|s| !s.trim().is_empty()) {
        push_search(qb, &["city"], city);
    }
    push_skill_filter(qb, &filter.skills);
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        push_search(qb, &["full_name", "email", "city"], search);
    }
}

/// List volunteers. Reviews and assignments are only loaded by [`get_volunteer`].
pub async fn list_volunteers(
    pool: &SqlitePool,
    filter: &VolunteerFilter,
    sort: VolunteerSort,
    order: SortOrder,
    page: PageRequest,
) -> Result<Page<Volunteer>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM volunteers");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut qb =
        QueryBuilder::<Sqlite>::new(format!("SELECT {VOLUNTEER_COLUMNS} FROM volunteers"));
    push_filters(&mut qb, filter);
    qb.push(format!(" ORDER BY {} {}, id ASC", sort.column_name(), order.sql()));
    page.push_to(&mut qb);

    let items = qb.build_query_as::<Volunteer>().fetch_all(pool).await?;

    Ok(Page::new(items, page, total))
}

/// Active volunteers matching the query, best rated first, then lightest
/// open caseload.
pub async fn available_volunteers(
    pool: &SqlitePool,
    query: &AvailabilityQuery,
) -> Result<Vec<AvailableVolunteer>> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {VOLUNTEER_COLUMNS}, \
         (SELECT COUNT(*) FROM patients p WHERE p.assigned_volunteer = volunteers.id \
          AND p.status IN ('pending', 'in-progress')) AS open_cases \
         FROM volunteers WHERE status = 'active'"
    ));
    if let Some(city) = query.city.as_deref().filter(|s| !s.trim().is_empty()) {
        push_search(&mut qb, &["city"], city);
    }
    if let Some(state) = query.state.as_deref().filter(|s| !s.trim().is_empty()) {
        push_search(&mut qb, &["state"], state);
    }
    push_skill_filter(&mut qb, &query.skills);
    qb.push(" ORDER BY rating_average DESC, open_cases ASC, created_at ASC");

    let mut volunteers = qb
        .build_query_as::<AvailableVolunteer>()
        .fetch_all(pool)
        .await?;

    if let Some((day, minutes)) = query.at {
        volunteers.retain(|v| v.volunteer.is_available(day, minutes));
    }

    Ok(volunteers)
}

/// The most recent applications.
pub async fn recent_volunteers(pool: &SqlitePool, limit: i64) -> Result<Vec<VolunteerBrief>> {
    let volunteers = sqlx::query_as::<_, VolunteerBrief>(
        r#"
        SELECT id, full_name, status, created_at
        FROM volunteers
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(volunteers)
}

async fn transition(
    pool: &SqlitePool,
    id: &str,
    next: VolunteerStatus,
    apply: impl FnOnce(&mut QueryBuilder<'_, Sqlite>),
) -> Result<Volunteer> {
    let mut tx = pool.begin().await?;
    let current = fetch_volunteer(&mut *tx, id).await?;

    // Re-sending the current active/inactive state is a no-op.
    if current.status == next && matches!(next, VolunteerStatus::Active | VolunteerStatus::Inactive)
    {
        tx.commit().await?;
        return get_volunteer(pool, id).await;
    }
    if !current.status.can_become(next) {
        return Err(DatabaseError::transition(ENTITY, current.status, next));
    }

    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE volunteers SET status = ");
    qb.push_bind(next.as_str());
    apply(&mut qb);
    qb.push(", updated_at = datetime('now') WHERE id = ").push_bind(id.to_string());
    qb.build().execute(&mut *tx).await?;

    tx.commit().await?;

    tracing::info!(volunteer_id = %id, from = %current.status, to = %next, "Volunteer status changed");
    get_volunteer(pool, id).await
}

/// Approve a pending application.
pub async fn approve_volunteer(
    pool: &SqlitePool,
    id: &str,
    approved_by: Option<&str>,
) -> Result<Volunteer> {
    let approved_by = approved_by.map(str::to_string);
    transition(pool, id, VolunteerStatus::Approved, |qb| {
        qb.push(", approved_at = datetime('now'), approved_by = ")
            .push_bind(approved_by);
    })
    .await
}

/// Reject a pending application. A reason is required.
pub async fn reject_volunteer(
    pool: &SqlitePool,
    id: &str,
    reason: &str,
    rejected_by: Option<&str>,
) -> Result<Volunteer> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ValidationErrors::single(ValidationError::Missing(
            "rejectionReason".to_string(),
        ))
        .into());
    }

    let reason = reason.to_string();
    let rejected_by = rejected_by.map(str::to_string);
    transition(pool, id, VolunteerStatus::Rejected, |qb| {
        qb.push(", rejection_reason = ")
            .push_bind(reason)
            .push(", approved_by = ")
            .push_bind(rejected_by);
    })
    .await
}

/// Toggle an approved volunteer between `active` and `inactive`.
pub async fn set_volunteer_status(
    pool: &SqlitePool,
    id: &str,
    status: VolunteerStatus,
) -> Result<Volunteer> {
    if !matches!(status, VolunteerStatus::Active | VolunteerStatus::Inactive) {
        return Err(ValidationErrors::single(ValidationError::InvalidChoice {
            field: "status".to_string(),
            value: status.to_string(),
        })
        .into());
    }

    transition(pool, id, status, |qb| {
        qb.push(", last_active = datetime('now')");
    })
    .await
}

/// Add a review and recompute the rating in the same transaction.
///
/// Returns the updated rating.
pub async fn add_review(pool: &SqlitePool, id: &str, review: &NewReview) -> Result<Rating> {
    let mut tx = pool.begin().await?;
    fetch_volunteer(&mut *tx, id).await?;

    let patient: Option<(String,)> = sqlx::query_as("SELECT id FROM patients WHERE id = ?")
        .bind(&review.patient_id)
        .fetch_optional(&mut *tx)
        .await?;
    if patient.is_none() {
        return Err(DatabaseError::not_found("Patient", &review.patient_id));
    }

    sqlx::query(
        r#"
        INSERT INTO volunteer_reviews (volunteer_id, patient_id, rating, comment)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&review.patient_id)
    .bind(review.rating)
    .bind(review.comment.as_deref())
    .execute(&mut *tx)
    .await?;

    let rating = sqlx::query_as::<_, Rating>(
        r#"
        UPDATE volunteers
        SET rating_average = (
                SELECT COALESCE(AVG(rating), 0) FROM volunteer_reviews WHERE volunteer_id = ?1
            ),
            rating_count = (
                SELECT COUNT(*) FROM volunteer_reviews WHERE volunteer_id = ?1
            ),
            updated_at = datetime('now')
        WHERE id = ?1
        RETURNING rating_average, rating_count
        "#,
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(rating)
}
