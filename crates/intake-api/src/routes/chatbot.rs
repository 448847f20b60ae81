//! Chat assistant routes.

use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use database::chat_session::{self, SessionFilter, MAX_MESSAGE_LENGTH};
use database::models::{
    ChatRole, ChatSession, EscalationTarget, MessageMetadata, SessionCategory,
};
use database::stats::{self, ChatStats};
use database::validation::FieldValidator;
use database::{ChatSubmission, NewChatMessage, Page, PageRequest, RatingSubmission};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use triage_core::{ChatReply, ChatUrgency, MessageAnalysis};

use super::{client_info, finish, ok, ok_with, Envelope, WindowQuery};
use crate::error::{ApiError, Result};
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

const EMERGENCY_REASON: &str = "Emergency keywords detected";
const HUMAN_REASON: &str = "Complex medical inquiry";

/// The assistant's answer to one message.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAnswer {
    pub session_id: String,
    pub response: String,
    pub analysis: MessageAnalysis,
    pub is_emergency: bool,
    pub escalated: bool,
}

/// Who a reply should be handed to, if anyone.
fn escalation_for(reply: &ChatReply) -> Option<(EscalationTarget, &'static str)> {
    if reply.is_emergency {
        Some((EscalationTarget::EmergencyServices, EMERGENCY_REASON))
    } else if reply.analysis.escalate {
        Some((EscalationTarget::HumanVolunteer, HUMAN_REASON))
    } else {
        None
    }
}

/// Send a message to the assistant, starting a session if needed.
pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(submission): ApiJson<ChatSubmission>,
) -> Result<Json<Envelope<ChatAnswer>>> {
    let turn = submission.validate()?;
    let pool = state.db.pool();

    let session =
        chat_session::get_or_create_session(pool, turn.session_id.as_deref(), &turn.user_info)
            .await?;
    let session_id = session.session_id;

    let (user_agent, ip_address) = client_info(&headers);
    let user_message = NewChatMessage {
        role: ChatRole::User,
        content: turn.message.clone(),
        metadata: MessageMetadata {
            user_agent,
            ip_address,
            ..MessageMetadata::default()
        },
    };
    chat_session::append_message(pool, &session_id, &user_message).await?;

    let started = Instant::now();
    let reply = state.triage.reply(&turn.message).await;
    let response_time = started.elapsed().as_millis() as u64;
    debug!(session_id = %session_id, intent = %reply.analysis.intent, response_time, "Assistant replied");

    let assistant_message = NewChatMessage {
        role: ChatRole::Assistant,
        content: reply.response.chars().take(MAX_MESSAGE_LENGTH).collect(),
        metadata: MessageMetadata {
            response_time: Some(response_time),
            tokens_used: Some(reply.tokens_used),
            model: reply.model.clone(),
            ..MessageMetadata::default()
        },
    };
    chat_session::append_message(pool, &session_id, &assistant_message).await?;
    chat_session::record_analysis(pool, &session_id, &reply.analysis).await?;

    let escalated = match escalation_for(&reply) {
        Some((target, reason)) => {
            chat_session::escalate_session(pool, &session_id, target, reason).await?;
            true
        }
        None => false,
    };

    Ok(ok(ChatAnswer {
        session_id,
        response: reply.response,
        analysis: reply.analysis,
        is_emergency: reply.is_emergency,
        escalated,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub end_time: Option<String>,
    pub duration: Option<i64>,
    pub message_count: i64,
}

/// End a session. Ending again returns the original end time.
pub async fn end(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SessionBody>,
) -> Result<Json<Envelope<SessionSummary>>> {
    let mut v = FieldValidator::new();
    let session_id = match v.required_text("sessionId", body.session_id.as_deref(), 64) {
        Some(id) => id,
        None => return Err(ApiError::Validation(v.into_errors())),
    };

    let session = chat_session::end_session(state.db.pool(), &session_id).await?;
    info!(
        session_id = %session_id,
        duration = session.session_info.duration,
        "Chat session ended"
    );

    Ok(ok_with(
        "Session ended",
        SessionSummary {
            session_id: session.session_id,
            end_time: session.session_info.end_time,
            duration: session.session_info.duration,
            message_count: session.session_info.message_count,
        },
    ))
}

/// Rate a session.
pub async fn rate(
    State(state): State<AppState>,
    ApiJson(submission): ApiJson<RatingSubmission>,
) -> Result<Json<Envelope<ChatSession>>> {
    let rating = submission.validate()?;
    let session = chat_session::rate_session(state.db.pool(), &rating).await?;
    info!(session_id = %rating.session_id, rating = rating.rating, "Chat session rated");
    Ok(ok_with("Thank you for your feedback", session))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub urgency: Option<String>,
    pub escalated: Option<String>,
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// List sessions, newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SessionListQuery>,
) -> Result<Json<Envelope<Page<ChatSession>>>> {
    let mut v = FieldValidator::new();
    let filter = SessionFilter {
        category: v.optional_choice(
            "category",
            query.category.as_deref(),
            SessionCategory::parse,
        ),
        urgency: v.optional_choice("urgency", query.urgency.as_deref(), ChatUrgency::parse),
        escalated: v.optional_choice("escalated", query.escalated.as_deref(), parse_flag),
    };
    finish(v)?;

    let page = chat_session::list_sessions(
        state.db.pool(),
        &filter,
        PageRequest::new(query.page, query.limit),
    )
    .await?;
    Ok(ok(page))
}

/// Fetch a session with its messages.
pub async fn fetch_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Envelope<ChatSession>>> {
    Ok(ok(chat_session::get_session(state.db.pool(), &session_id).await?))
}

/// Chat statistics for a window.
pub async fn statistics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WindowQuery>,
) -> Result<Json<Envelope<ChatStats>>> {
    let window = query.window()?;
    Ok(ok(stats::chat_stats(state.db.pool(), &window).await?))
}
