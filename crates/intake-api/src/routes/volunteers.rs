//! Volunteer application routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use database::models::{Rating, Skill, Volunteer, VolunteerStatus, Weekday};
use database::stats::{self, VolunteerStats};
use database::validation::{clock_minutes, FieldValidator, ValidationError};
use database::volunteer::{
    self, AvailabilityQuery, AvailableVolunteer, VolunteerFilter, VolunteerSort,
};
use database::{Page, PageRequest, ReviewSubmission, VolunteerSubmission};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{created, finish, ok, ok_with, sort_order, split_list, Envelope, WindowQuery};
use crate::error::{ApiError, Result};
use crate::extract::{ApiJson, ApiQuery};
use crate::notify::{Notification, Template};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerReceipt {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub status: VolunteerStatus,
    pub created_at: String,
}

/// Submit a volunteer application.
pub async fn submit(
    State(state): State<AppState>,
    ApiJson(submission): ApiJson<VolunteerSubmission>,
) -> Result<(StatusCode, Json<Envelope<VolunteerReceipt>>)> {
    let new = submission.validate()?;
    let volunteer = volunteer::create_volunteer(state.db.pool(), &new).await?;
    info!(volunteer_id = %volunteer.id, city = %volunteer.city, "Volunteer application received");

    state
        .notify(Notification::new(
            &volunteer.email,
            Template::VolunteerReceived,
            serde_json::json!({ "id": volunteer.id, "fullName": volunteer.full_name }),
        ))
        .await;

    Ok(created(
        "Volunteer application submitted successfully",
        VolunteerReceipt {
            id: volunteer.id,
            full_name: volunteer.full_name,
            email: volunteer.email,
            status: volunteer.status,
            created_at: volunteer.created_at,
        },
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub city: Option<String>,
    /// Comma-separated skills.
    pub skills: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// List volunteer applications.
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<VolunteerListQuery>,
) -> Result<Json<Envelope<Page<Volunteer>>>> {
    let mut v = FieldValidator::new();
    let filter = VolunteerFilter {
        status: v.optional_choice("status", query.status.as_deref(), VolunteerStatus::parse),
        city: query.city.filter(|s| !s.trim().is_empty()),
        skills: v.choices("skills", &split_list(query.skills.as_deref()), Skill::parse),
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let sort = v
        .optional_choice("sortBy", query.sort_by.as_deref(), VolunteerSort::parse)
        .unwrap_or_default();
    let order = sort_order(&mut v, query.sort_order.as_deref());
    finish(v)?;

    let page = volunteer::list_volunteers(
        state.db.pool(),
        &filter,
        sort,
        order,
        PageRequest::new(query.page, query.limit),
    )
    .await?;
    Ok(ok(page))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableQuery {
    pub city: Option<String>,
    pub state: Option<String>,
    pub skills: Option<String>,
    pub day: Option<String>,
    /// `HH:MM`; required with `day`.
    pub time: Option<String>,
}

/// Active volunteers who could take a case.
pub async fn available(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AvailableQuery>,
) -> Result<Json<Envelope<Vec<AvailableVolunteer>>>> {
    let mut v = FieldValidator::new();
    let skills = v.choices("skills", &split_list(query.skills.as_deref()), Skill::parse);
    let day = v.optional_choice("day", query.day.as_deref(), Weekday::parse);
    let time = match (day, query.time.as_deref()) {
        (None, None) => None,
        (_, time) => v.clock("time", time),
    };
    if day.is_none() && time.is_some() {
        v.push(ValidationError::Missing("day".to_string()));
    }
    finish(v)?;

    let at = day.zip(time.as_deref().and_then(clock_minutes));
    let query = AvailabilityQuery {
        city: query.city,
        state: query.state,
        skills,
        at,
    };

    let volunteers = volunteer::available_volunteers(state.db.pool(), &query).await?;
    Ok(ok(volunteers))
}

/// Volunteer statistics for a window.
pub async fn statistics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WindowQuery>,
) -> Result<Json<Envelope<VolunteerStats>>> {
    let window = query.window()?;
    Ok(ok(stats::volunteer_stats(state.db.pool(), &window).await?))
}

/// Fetch one volunteer with reviews and assigned patients.
pub async fn fetch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Volunteer>>> {
    Ok(ok(volunteer::get_volunteer(state.db.pool(), &id).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalBody {
    pub approved_by: Option<String>,
}

/// Approve a pending application.
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ApprovalBody>,
) -> Result<Json<Envelope<Volunteer>>> {
    let volunteer =
        volunteer::approve_volunteer(state.db.pool(), &id, body.approved_by.as_deref()).await?;

    state
        .notify(Notification::new(
            &volunteer.email,
            Template::VolunteerApproved,
            serde_json::json!({ "id": volunteer.id, "fullName": volunteer.full_name }),
        ))
        .await;

    Ok(ok_with("Volunteer approved", volunteer))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody {
    pub reason: Option<String>,
    pub rejected_by: Option<String>,
}

/// Reject a pending application; a reason is required.
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RejectionBody>,
) -> Result<Json<Envelope<Volunteer>>> {
    let volunteer = volunteer::reject_volunteer(
        state.db.pool(),
        &id,
        body.reason.as_deref().unwrap_or_default(),
        body.rejected_by.as_deref(),
    )
    .await?;

    state
        .notify(Notification::new(
            &volunteer.email,
            Template::VolunteerRejected,
            serde_json::json!({
                "id": volunteer.id,
                "fullName": volunteer.full_name,
                "reason": volunteer.rejection_reason,
            }),
        ))
        .await;

    Ok(ok_with("Volunteer rejected", volunteer))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusBody {
    pub status: Option<String>,
}

/// Switch an approved volunteer between active and inactive.
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusBody>,
) -> Result<Json<Envelope<Volunteer>>> {
    let mut v = FieldValidator::new();
    let status = match v.required_choice("status", body.status.as_deref(), VolunteerStatus::parse)
    {
        Some(status) => status,
        None => return Err(ApiError::Validation(v.into_errors())),
    };

    let volunteer = volunteer::set_volunteer_status(state.db.pool(), &id, status).await?;
    info!(volunteer_id = %id, status = %volunteer.status, "Volunteer availability changed");
    Ok(ok(volunteer))
}

/// Review a volunteer; returns the recomputed rating.
pub async fn add_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(submission): ApiJson<ReviewSubmission>,
) -> Result<(StatusCode, Json<Envelope<Rating>>)> {
    let review = submission.validate()?;
    let rating = volunteer::add_review(state.db.pool(), &id, &review).await?;
    info!(volunteer_id = %id, average = rating.average, count = rating.count, "Review added");
    Ok(created("Review added", rating))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::notify::Template;
    use crate::routes::test_support::{patient_body, send, test_app, volunteer_body};

    async fn submit(app: &axum::Router, email: &str) -> String {
        let (status, json) =
            send(app, "POST", "/api/volunteers", Some(volunteer_body(email))).await;
        assert_eq!(status, StatusCode::CREATED);
        json["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_submit_and_duplicate() {
        let app = test_app().await;
        submit(&app.app, "dana@example.com").await;

        let (status, json) = send(
            &app.app,
            "POST",
            "/api/volunteers",
            Some(volunteer_body("DANA@example.com")),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["success"], false);
        assert_eq!(app.notifier.templates(), vec![Template::VolunteerReceived]);
    }

    #[tokio::test]
    async fn test_empty_skills_rejected() {
        let app = test_app().await;
        let mut body = volunteer_body("dana@example.com");
        body["skills"] = json!([]);

        let (status, json) = send(&app.app, "POST", "/api/volunteers", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "skills");
    }

    #[tokio::test]
    async fn test_approval_flow() {
        let app = test_app().await;
        let id = submit(&app.app, "dana@example.com").await;

        let (status, json) = send(
            &app.app,
            "PUT",
            &format!("/api/volunteers/{id}/approve"),
            Some(json!({ "approvedBy": "coordinator" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "approved");
        assert_eq!(json["data"]["approvedBy"], "coordinator");
        assert!(json["data"]["approvedAt"].is_string());

        let status_url = format!("/api/volunteers/{id}/status");
        let (status, json) =
            send(&app.app, "PUT", &status_url, Some(json!({ "status": "active" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "active");

        let (status, _) =
            send(&app.app, "PUT", &status_url, Some(json!({ "status": "rejected" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app.app,
            "PUT",
            &format!("/api/volunteers/{id}/reject"),
            Some(json!({ "reason": "late" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        assert_eq!(
            app.notifier.templates(),
            vec![Template::VolunteerReceived, Template::VolunteerApproved]
        );
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let app = test_app().await;
        let id = submit(&app.app, "dana@example.com").await;
        let url = format!("/api/volunteers/{id}/reject");

        let (status, json) = send(&app.app, "PUT", &url, Some(json!({ "reason": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "rejectionReason");

        let (status, json) = send(
            &app.app,
            "PUT",
            &url,
            Some(json!({ "reason": "Incomplete license" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "rejected");
        assert_eq!(json["data"]["rejectionReason"], "Incomplete license");
    }

    #[tokio::test]
    async fn test_reviews_update_rating() {
        let app = test_app().await;
        let id = submit(&app.app, "dana@example.com").await;
        let (_, patient) = send(&app.app, "POST", "/api/patients", Some(patient_body())).await;
        let patient_id = patient["data"]["id"].as_str().unwrap().to_string();
        let url = format!("/api/volunteers/{id}/reviews");

        for rating in [4, 2] {
            let (status, _) = send(
                &app.app,
                "POST",
                &url,
                Some(json!({ "patientId": patient_id, "rating": rating })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, _) = send(
            &app.app,
            "POST",
            &url,
            Some(json!({ "patientId": patient_id, "rating": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, json) = send(&app.app, "GET", &format!("/api/volunteers/{id}"), None).await;
        assert_eq!(json["data"]["rating"]["average"], 3.0);
        assert_eq!(json["data"]["rating"]["count"], 2);
        assert_eq!(json["data"]["reviews"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_and_available() {
        let app = test_app().await;
        let id = submit(&app.app, "dana@example.com").await;
        submit(&app.app, "lee@example.com").await;

        let (status, json) =
            send(&app.app, "GET", "/api/volunteers?skills=first-aid&status=pending", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["pagination"]["total"], 2);

        let (status, _) = send(&app.app, "GET", "/api/volunteers?skills=juggling", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        send(
            &app.app,
            "PUT",
            &format!("/api/volunteers/{id}/approve"),
            Some(json!({})),
        )
        .await;
        send(
            &app.app,
            "PUT",
            &format!("/api/volunteers/{id}/status"),
            Some(json!({ "status": "active" })),
        )
        .await;

        let (status, json) = send(
            &app.app,
            "GET",
            "/api/volunteers/available?day=monday&time=10:30",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let available = json["data"].as_array().unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0]["id"], id.as_str());
        assert_eq!(available[0]["openCases"], 0);

        let (_, json) = send(
            &app.app,
            "GET",
            "/api/volunteers/available?day=sunday&time=10:30",
            None,
        )
        .await;
        assert!(json["data"].as_array().unwrap().is_empty());

        let (status, _) =
            send(&app.app, "GET", "/api/volunteers/available?time=10:30", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
