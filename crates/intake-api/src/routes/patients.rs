//! Patient intake routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use database::models::{Note, Patient, PatientStatus};
use database::patient::{self, PatientFilter, PatientSort};
use database::stats::{self, PatientStats};
use database::validation::FieldValidator;
use database::{Page, PageRequest, PatientSubmission, PatientUpdateSubmission};
use serde::{Deserialize, Serialize};
use tracing::info;
use triage_core::{AiSummary, ConcernContext, UrgencyLevel};

use super::{created, finish, ok, sort_order, Envelope, NoteBody, WindowQuery};
use crate::error::{ApiError, Result};
use crate::extract::{ApiJson, ApiQuery};
use crate::notify::{Notification, Template};
use crate::state::AppState;

/// What the submitter gets back.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientReceipt {
    pub id: String,
    pub full_name: String,
    pub status: PatientStatus,
    pub urgency_level: UrgencyLevel,
    pub ai_summary: AiSummary,
    pub created_at: String,
}

impl From<Patient> for PatientReceipt {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            full_name: patient.full_name,
            status: patient.status,
            urgency_level: patient.urgency_level,
            ai_summary: patient.ai_summary.0,
            created_at: patient.created_at,
        }
    }
}

/// Submit a patient request.
///
/// The concern is triaged before the insert; triage cannot fail the request.
pub async fn submit(
    State(state): State<AppState>,
    ApiJson(submission): ApiJson<PatientSubmission>,
) -> Result<(StatusCode, Json<Envelope<PatientReceipt>>)> {
    let new = submission.validate()?;

    let context = ConcernContext::new(new.medical_concern.clone(), new.urgency_level)
        .with_demographics(new.age as u32, new.gender.as_str());
    let summary = state.triage.summarize(&context).await;

    let patient = patient::create_patient(state.db.pool(), &new, &summary).await?;
    info!(
        patient_id = %patient.id,
        urgency = %patient.urgency_level,
        risk = %summary.risk_level,
        "Patient request received"
    );

    state
        .notify(Notification::new(
            &patient.email,
            Template::PatientReceived,
            serde_json::json!({ "id": patient.id, "fullName": patient.full_name }),
        ))
        .await;

    if patient.urgency_level == UrgencyLevel::High {
        state
            .notify(Notification::new(
                &state.config.admin_email,
                Template::UrgentPatient,
                serde_json::json!({
                    "id": patient.id,
                    "fullName": patient.full_name,
                    "location": patient.location,
                    "riskLevel": summary.risk_level,
                    "symptoms": summary.symptoms,
                }),
            ))
            .await;
    }

    Ok(created(
        "Patient request submitted successfully",
        PatientReceipt::from(patient),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub urgency_level: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// List patient requests.
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PatientListQuery>,
) -> Result<Json<Envelope<Page<Patient>>>> {
    let mut v = FieldValidator::new();
    let filter = PatientFilter {
        status: v.optional_choice("status", query.status.as_deref(), PatientStatus::parse),
        urgency_level: v.optional_choice(
            "urgencyLevel",
            query.urgency_level.as_deref(),
            UrgencyLevel::parse,
        ),
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let sort = v
        .optional_choice("sortBy", query.sort_by.as_deref(), PatientSort::parse)
        .unwrap_or_default();
    let order = sort_order(&mut v, query.sort_order.as_deref());
    finish(v)?;

    let page = patient::list_patients(
        state.db.pool(),
        &filter,
        sort,
        order,
        PageRequest::new(query.page, query.limit),
    )
    .await?;
    Ok(ok(page))
}

/// Patient statistics for a window.
pub async fn statistics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WindowQuery>,
) -> Result<Json<Envelope<PatientStats>>> {
    let window = query.window()?;
    Ok(ok(stats::patient_stats(state.db.pool(), &window).await?))
}

/// Fetch one patient request with its notes.
pub async fn fetch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Patient>>> {
    Ok(ok(patient::get_patient(state.db.pool(), &id).await?))
}

/// Edit contact fields or status.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(submission): ApiJson<PatientUpdateSubmission>,
) -> Result<Json<Envelope<Patient>>> {
    let update = submission.validate()?;
    let patient = patient::update_patient(state.db.pool(), &id, &update).await?;
    info!(patient_id = %id, status = %patient.status, "Patient request updated");
    Ok(ok(patient))
}

/// Append a staff note.
pub async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NoteBody>,
) -> Result<(StatusCode, Json<Envelope<Note>>)> {
    let (author, content) = body.validate()?;
    let note = patient::add_note(state.db.pool(), &id, &author, &content).await?;
    Ok(created("Note added", note))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    pub volunteer_id: Option<String>,
}

/// Assign a volunteer; the request moves to in-progress.
pub async fn assign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AssignBody>,
) -> Result<Json<Envelope<Patient>>> {
    let volunteer_id = body
        .volunteer_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("volunteerId is required".to_string()))?;

    let patient = patient::assign_volunteer(state.db.pool(), &id, volunteer_id).await?;
    info!(patient_id = %id, volunteer_id = %volunteer_id, "Volunteer assigned");
    Ok(ok(patient))
}

/// Mark a request resolved.
pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Patient>>> {
    let patient = patient::resolve_patient(state.db.pool(), &id).await?;
    info!(patient_id = %id, "Patient request resolved");
    Ok(ok(patient))
}
