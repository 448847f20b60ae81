//! Contact message routes.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use database::contact::{self, ContactFilter, ContactSort};
use database::models::{Contact, ContactCategory, ContactStatus, Note};
use database::stats::{self, ContactStats};
use database::validation::FieldValidator;
use database::{ContactSubmission, ContactUpdateSubmission, Page, PageRequest};
use serde::{Deserialize, Serialize};
use tracing::info;
use triage_core::Priority;

use super::{
    client_info, created, finish, ok, ok_with, sort_order, Envelope, NoteBody, WindowQuery,
};
use crate::error::{ApiError, Result};
use crate::extract::{ApiJson, ApiQuery};
use crate::notify::{Notification, Template};
use crate::state::AppState;

/// What the sender gets back, including the derived classification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactReceipt {
    pub id: String,
    pub category: ContactCategory,
    pub priority: Priority,
    pub status: ContactStatus,
    pub tags: Vec<String>,
    pub created_at: String,
}

/// Submit a contact message.
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(submission): ApiJson<ContactSubmission>,
) -> Result<(StatusCode, Json<Envelope<ContactReceipt>>)> {
    let mut new = submission.validate()?;
    (new.user_agent, new.ip_address) = client_info(&headers);

    let contact = contact::create_contact(state.db.pool(), &new).await?;
    info!(
        contact_id = %contact.id,
        category = %contact.category,
        priority = %contact.priority,
        "Contact message received"
    );

    state
        .notify(Notification::new(
            &contact.email,
            Template::ContactReceived,
            serde_json::json!({ "id": contact.id, "subject": contact.subject }),
        ))
        .await;

    Ok(created(
        "Message sent successfully",
        ContactReceipt {
            id: contact.id,
            category: contact.category,
            priority: contact.priority,
            status: contact.status,
            tags: contact.tags.0,
            created_at: contact.created_at,
        },
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// List contact messages.
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ContactListQuery>,
) -> Result<Json<Envelope<Page<Contact>>>> {
    let mut v = FieldValidator::new();
    let filter = ContactFilter {
        status: v.optional_choice("status", query.status.as_deref(), ContactStatus::parse),
        category: v.optional_choice(
            "category",
            query.category.as_deref(),
            ContactCategory::parse,
        ),
        priority: v.optional_choice("priority", query.priority.as_deref(), Priority::parse),
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let sort = v
        .optional_choice("sortBy", query.sort_by.as_deref(), ContactSort::parse)
        .unwrap_or_default();
    let order = sort_order(&mut v, query.sort_order.as_deref());
    finish(v)?;

    let page = contact::list_contacts(
        state.db.pool(),
        &filter,
        sort,
        order,
        PageRequest::new(query.page, query.limit),
    )
    .await?;
    Ok(ok(page))
}

/// Contact statistics for a window.
pub async fn statistics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WindowQuery>,
) -> Result<Json<Envelope<ContactStats>>> {
    let window = query.window()?;
    Ok(ok(stats::contact_stats(state.db.pool(), &window).await?))
}

/// Fetch one message with its internal notes.
pub async fn fetch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Contact>>> {
    Ok(ok(contact::get_contact(state.db.pool(), &id).await?))
}

/// Edit subject, phone, status or tags.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(submission): ApiJson<ContactUpdateSubmission>,
) -> Result<Json<Envelope<Contact>>> {
    let update = submission.validate()?;
    let contact = contact::update_contact(state.db.pool(), &id, &update).await?;
    info!(contact_id = %id, status = %contact.status, "Contact message updated");
    Ok(ok(contact))
}

/// Append an internal note.
pub async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NoteBody>,
) -> Result<(StatusCode, Json<Envelope<Note>>)> {
    let (author, content) = body.validate()?;
    let note = contact::add_note(state.db.pool(), &id, &author, &content).await?;
    Ok(created("Note added", note))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub content: Option<String>,
    pub responded_by: Option<String>,
}

/// Answer a message; it moves to resolved and the sender is notified.
pub async fn respond(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ResponseBody>,
) -> Result<Json<Envelope<Contact>>> {
    let mut v = FieldValidator::new();
    let content = v.required_text("content", body.content.as_deref(), 2000);
    let responded_by = v.optional_text("respondedBy", body.responded_by.as_deref(), 100);
    let content = match content {
        Some(content) if v.is_valid() => content,
        _ => return Err(ApiError::Validation(v.into_errors())),
    };
    let responded_by = responded_by.unwrap_or_else(|| "staff".to_string());

    let contact =
        contact::respond_to_contact(state.db.pool(), &id, &content, &responded_by).await?;

    state
        .notify(Notification::new(
            &contact.email,
            Template::ContactResponse,
            serde_json::json!({
                "id": contact.id,
                "subject": contact.subject,
                "response": content,
            }),
        ))
        .await;

    Ok(ok_with("Response sent", contact))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    pub assigned_to: Option<String>,
}

/// Assign a staff member; the message moves to in-progress.
pub async fn assign(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AssignBody>,
) -> Result<Json<Envelope<Contact>>> {
    let mut v = FieldValidator::new();
    let assignee = match v.required_text("assignedTo", body.assigned_to.as_deref(), 100) {
        Some(assignee) => assignee,
        None => return Err(ApiError::Validation(v.into_errors())),
    };

    let contact = contact::assign_contact(state.db.pool(), &id, &assignee).await?;
    info!(contact_id = %id, assigned_to = %assignee, "Contact message assigned");
    Ok(ok(contact))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};

    use crate::notify::Template;
    use crate::routes::test_support::{request_json, send, test_app};

    fn contact_body(category: &str, message: &str) -> Value {
        json!({
            "name": "Sam Lee",
            "email": "sam@example.com",
            "category": category,
            "subject": "Question",
            "message": message,
            "priority": "low"
        })
    }

    async fn submit(app: &axum::Router, category: &str, message: &str) -> Value {
        let (status, json) =
            send(app, "POST", "/api/contact", Some(contact_body(category, message))).await;
        assert_eq!(status, StatusCode::CREATED);
        json
    }

    #[tokio::test]
    async fn test_priority_and_tags_are_derived() {
        let app = test_app().await;

        let json = submit(&app.app, "emergency", "Please help, urgent").await;
        assert_eq!(json["data"]["priority"], "urgent");
        assert_eq!(json["data"]["tags"], json!(["urgent"]));
        assert_eq!(json["data"]["status"], "new");

        let json = submit(&app.app, "complaint", "The website is down").await;
        assert_eq!(json["data"]["priority"], "high");
        assert_eq!(json["data"]["tags"], json!(["technical"]));

        let json = submit(&app.app, "feedback", "I want to volunteer").await;
        assert_eq!(json["data"]["priority"], "low");
        assert_eq!(json["data"]["tags"], json!(["volunteer-related"]));

        assert_eq!(app.notifier.templates().len(), 3);
    }

    #[tokio::test]
    async fn test_client_details_are_recorded() {
        let app = test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/contact")
            .header("content-type", "application/json")
            .header("user-agent", "test-agent")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::from(
                serde_json::to_vec(&contact_body("feedback", "Thanks")).unwrap(),
            ))
            .unwrap();
        let (status, json) = request_json(&app.app, request).await;
        assert_eq!(status, StatusCode::CREATED);

        let id = json["data"]["id"].as_str().unwrap();
        let (_, json) = send(&app.app, "GET", &format!("/api/contact/{id}"), None).await;
        assert_eq!(json["data"]["userAgent"], "test-agent");
        assert_eq!(json["data"]["ipAddress"], "203.0.113.9");
        assert_eq!(json["data"]["source"], "website");
    }

    #[tokio::test]
    async fn test_subject_too_long() {
        let app = test_app().await;
        let mut body = contact_body("feedback", "hello");
        body["subject"] = json!("x".repeat(201));

        let (status, json) = send(&app.app, "POST", "/api/contact", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "subject");
    }

    #[tokio::test]
    async fn test_ticket_flow() {
        let app = test_app().await;
        let json = submit(&app.app, "general-inquiry", "How do I start?").await;
        let id = json["data"]["id"].as_str().unwrap().to_string();

        let (status, json) = send(
            &app.app,
            "PUT",
            &format!("/api/contact/{id}/assign"),
            Some(json!({ "assignedTo": "jo" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "in-progress");
        assert_eq!(json["data"]["assignedTo"], "jo");

        let (status, _) = send(
            &app.app,
            "POST",
            &format!("/api/contact/{id}/notes"),
            Some(json!({ "content": "called sender" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let respond = format!("/api/contact/{id}/respond");
        let (status, _) = send(&app.app, "POST", &respond, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(
            &app.app,
            "POST",
            &respond,
            Some(json!({ "content": "Sign up on the volunteer page", "respondedBy": "jo" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "resolved");
        assert_eq!(json["data"]["response"]["respondedBy"], "jo");
        assert!(json["data"]["resolvedAt"].is_string());
        assert_eq!(json["data"]["internalNotes"][0]["content"], "called sender");

        let (status, _) = send(
            &app.app,
            "PUT",
            &format!("/api/contact/{id}/assign"),
            Some(json!({ "assignedTo": "kim" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        assert_eq!(
            app.notifier.templates(),
            vec![Template::ContactReceived, Template::ContactResponse]
        );
    }

    #[tokio::test]
    async fn test_update_and_list() {
        let app = test_app().await;
        let json = submit(&app.app, "partnership", "Let's collaborate").await;
        let id = json["data"]["id"].as_str().unwrap().to_string();
        submit(&app.app, "feedback", "Nice site").await;

        let (status, json) = send(
            &app.app,
            "PUT",
            &format!("/api/contact/{id}"),
            Some(json!({ "tags": ["VIP"], "status": "closed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["tags"], json!(["vip"]));
        assert_eq!(json["data"]["status"], "closed");

        let (status, json) =
            send(&app.app, "GET", "/api/contact?category=partnership", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["pagination"]["total"], 1);

        let (status, _) = send(&app.app, "GET", "/api/contact?priority=extreme", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(&app.app, "GET", "/api/contact/statistics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["total"], 2);
    }
}
