//! Chat session operations.
//!
//! Counters on a session (`message_count`, `total_tokens`,
//! `average_response_time`) are recomputed from its messages in the same
//! transaction that appends a message.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use triage_core::{ChatUrgency, MessageAnalysis};
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::{
    ChatMessage, ChatRole, ChatSession, EscalationTarget, MessageMetadata, Satisfaction,
    SessionCategory, UserInfo,
};
use crate::query::{Page, PageRequest};
use crate::validation::{lenient_number, FieldValidator, ValidationErrors};

const ENTITY: &str = "ChatSession";

/// Longest accepted chat message, in chars.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

const SESSION_COLUMNS: &str = "session_id, user_info, start_time, end_time, duration, \
     message_count, satisfaction, category, tags, escalated, escalated_to, escalated_at, \
     escalation_reason, ai_analysis, total_tokens, total_cost, average_response_time";

/// A chat message as posted by the widget.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSubmission {
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub user_info: Option<UserInfo>,
}

/// A validated chat message with the session it belongs to, if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub message: String,
    pub session_id: Option<String>,
    pub user_info: UserInfo,
}

impl ChatSubmission {
    pub fn validate(&self) -> std::result::Result<ChatTurn, ValidationErrors> {
        let mut v = FieldValidator::new();

        let message = v.required_text("message", self.message.as_deref(), MAX_MESSAGE_LENGTH);
        let session_id = v.optional_text("sessionId", self.session_id.as_deref(), 64);

        match message {
            Some(message) if v.is_valid() => Ok(ChatTurn {
                message,
                session_id,
                user_info: self.user_info.clone().unwrap_or_default(),
            }),
            _ => Err(v.into_errors()),
        }
    }
}

/// A satisfaction rating as posted by the widget.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSubmission {
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub rating: Option<i64>,
    pub feedback: Option<String>,
}

/// A validated satisfaction rating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRating {
    pub session_id: String,
    pub rating: u8,
    pub feedback: Option<String>,
}

impl RatingSubmission {
    pub fn validate(&self) -> std::result::Result<NewRating, ValidationErrors> {
        let mut v = FieldValidator::new();

        let session_id = v.required_text("sessionId", self.session_id.as_deref(), 64);
        let rating = v.range("rating", self.rating, 1, 5);
        let feedback = v.optional_text("feedback", self.feedback.as_deref(), 1000);

        match (session_id, rating) {
            (Some(session_id), Some(rating)) if v.is_valid() => Ok(NewRating {
                session_id,
                rating: rating as u8,
                feedback,
            }),
            _ => Err(v.into_errors()),
        }
    }
}

/// A message to append to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub metadata: MessageMetadata,
}

/// Filters for listing sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub category: Option<SessionCategory>,
    /// Urgency from the latest message analysis.
    pub urgency: Option<ChatUrgency>,
    pub escalated: Option<bool>,
}

/// Short session view for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionBrief {
    pub session_id: String,
    pub category: SessionCategory,
    pub message_count: i64,
    pub escalated: bool,
    pub start_time: String,
}

/// Load `session_id` if given and known, otherwise start a new session.
pub async fn get_or_create_session(
    pool: &SqlitePool,
    session_id: Option<&str>,
    user_info: &UserInfo,
) -> Result<ChatSession> {
    if let Some(id) = session_id {
        match fetch_session(pool, id).await {
            Ok(session) => return Ok(session),
            Err(DatabaseError::NotFound { .. }) => {
                tracing::debug!(session_id = %id, "Unknown chat session, starting a new one");
            }
            Err(e) => return Err(e),
        }
    }

    create_session(pool, user_info).await
}

/// Start a new session with a generated ID.
pub async fn create_session(pool: &SqlitePool, user_info: &UserInfo) -> Result<ChatSession> {
    let id = Uuid::new_v4().to_string();

    sqlx::query("INSERT INTO chat_sessions (session_id, user_info) VALUES (?, ?)")
        .bind(&id)
        .bind(Json(user_info))
        .execute(pool)
        .await?;

    tracing::info!(session_id = %id, "Chat session started");

    fetch_session(pool, &id).await
}

/// Get a session with all its messages.
pub async fn get_session(pool: &SqlitePool, session_id: &str) -> Result<ChatSession> {
    let mut session = fetch_session(pool, session_id).await?;

    session.messages = sqlx::query_as::<_, ChatMessage>(
        r#"
        SELECT role, content, timestamp, metadata
        FROM chat_messages
        WHERE session_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(session)
}

async fn fetch_session<'e, E>(executor: E, session_id: &str) -> Result<ChatSession>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, ChatSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE session_id = ?"
    ))
    .bind(session_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found(ENTITY, session_id))
}

/// Append a message and recompute the session counters.
pub async fn append_message(
    pool: &SqlitePool,
    session_id: &str,
    message: &NewChatMessage,
) -> Result<ChatMessage> {
    let mut tx = pool.begin().await?;
    fetch_session(&mut *tx, session_id).await?;

    let stored = sqlx::query_as::<_, ChatMessage>(
        r#"
        INSERT INTO chat_messages (session_id, role, content, metadata)
        VALUES (?, ?, ?, ?)
        RETURNING role, content, timestamp, metadata
        "#,
    )
    .bind(session_id)
    .bind(message.role)
    .bind(&message.content)
    .bind(Json(&message.metadata))
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE chat_sessions
        SET message_count = (
                SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1
            ),
            total_tokens = (
                SELECT COALESCE(SUM(json_extract(metadata, '$.tokensUsed')), 0)
                FROM chat_messages WHERE session_id = ?1
            ),
            average_response_time = COALESCE((
                SELECT CAST(AVG(json_extract(metadata, '$.responseTime')) AS INTEGER)
                FROM chat_messages
                WHERE session_id = ?1
                  AND role = 'assistant'
                  AND json_extract(metadata, '$.responseTime') IS NOT NULL
            ), 0)
        WHERE session_id = ?1
        "#,
    )
    .bind(session_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(stored)
}

/// Store the latest message analysis; the session category follows its intent.
pub async fn record_analysis(
    pool: &SqlitePool,
    session_id: &str,
    analysis: &MessageAnalysis,
) -> Result<ChatSession> {
    let category = SessionCategory::from_intent(&analysis.intent);

    let result = sqlx::query(
        "UPDATE chat_sessions SET ai_analysis = ?, category = ? WHERE session_id = ?",
    )
    .bind(Json(analysis))
    .bind(category)
    .bind(session_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found(ENTITY, session_id));
    }

    fetch_session(pool, session_id).await
}

/// Hand a session over to a human or emergency services.
///
/// Tags the session `escalated`, plus `emergency` for emergency services.
pub async fn escalate_session(
    pool: &SqlitePool,
    session_id: &str,
    target: EscalationTarget,
    reason: &str,
) -> Result<ChatSession> {
    let mut tx = pool.begin().await?;
    let session = fetch_session(&mut *tx, session_id).await?;

    let mut tags = session.session_info.tags.0;
    let mut add_tag = |tag: &str| {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    };
    add_tag("escalated");
    if target == EscalationTarget::EmergencyServices {
        add_tag("emergency");
    }

    sqlx::query(
        r#"
        UPDATE chat_sessions
        SET escalated = 1, escalated_to = ?, escalated_at = datetime('now'),
            escalation_reason = ?, tags = ?
        WHERE session_id = ?
        "#,
    )
    .bind(target)
    .bind(reason)
    .bind(Json(&tags))
    .bind(session_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::warn!(session_id = %session_id, target = %target, reason, "Chat session escalated");
    fetch_session(pool, session_id).await
}

/// End a session, freezing its duration. Ending twice keeps the first end time.
pub async fn end_session(pool: &SqlitePool, session_id: &str) -> Result<ChatSession> {
    let result = sqlx::query(
        r#"
        UPDATE chat_sessions
        SET end_time = COALESCE(end_time, datetime('now')),
            duration = COALESCE(
                duration,
                CAST(ROUND(
                    (julianday(COALESCE(end_time, datetime('now'))) - julianday(start_time))
                    * 86400
                ) AS INTEGER)
            )
        WHERE session_id = ?
        "#,
    )
    .bind(session_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found(ENTITY, session_id));
    }

    get_session(pool, session_id).await
}

/// Record the user's satisfaction rating, replacing any earlier one.
pub async fn rate_session(pool: &SqlitePool, rating: &NewRating) -> Result<ChatSession> {
    let satisfaction = Satisfaction {
        rating: rating.rating,
        feedback: rating.feedback.clone(),
        timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };

    let result = sqlx::query("UPDATE chat_sessions SET satisfaction = ? WHERE session_id = ?")
        .bind(Json(&satisfaction))
        .bind(&rating.session_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found(ENTITY, &rating.session_id));
    }

    fetch_session(pool, &rating.session_id).await
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &SessionFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(urgency) = filter.urgency {
        qb.push(" AND json_extract(ai_analysis, '$.urgency.level') = ")
            .push_bind(urgency.as_str());
    }
    if let Some(escalated) = filter.escalated {
        qb.push(" AND escalated = ").push_bind(escalated);
    }
}

/// List sessions, newest first. Messages are only loaded by [`get_session`].
pub async fn list_sessions(
    pool: &SqlitePool,
    filter: &SessionFilter,
    page: PageRequest,
) -> Result<Page<ChatSession>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM chat_sessions");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut qb =
        QueryBuilder::<Sqlite>::new(format!("SELECT {SESSION_COLUMNS} FROM chat_sessions"));
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY start_time DESC, rowid DESC");
    page.push_to(&mut qb);

    let items = qb.build_query_as::<ChatSession>().fetch_all(pool).await?;

    Ok(Page::new(items, page, total))
}

/// The most recently started sessions.
pub async fn recent_sessions(pool: &SqlitePool, limit: i64) -> Result<Vec<SessionBrief>> {
    let sessions = sqlx::query_as::<_, SessionBrief>(
        r#"
        SELECT session_id, category, message_count, escalated, start_time
        FROM chat_sessions
        ORDER BY start_time DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;
    use triage_core::UrgencyAssessment;

    fn user(content: &str) -> NewChatMessage {
        NewChatMessage {
            role: ChatRole::User,
            content: content.to_string(),
            metadata: MessageMetadata::default(),
        }
    }

    fn assistant(content: &str, response_time: u64, tokens: u32) -> NewChatMessage {
        NewChatMessage {
            role: ChatRole::Assistant,
            content: content.to_string(),
            metadata: MessageMetadata {
                response_time: Some(response_time),
                tokens_used: Some(tokens),
                model: Some("gpt-3.5-turbo".to_string()),
                ..MessageMetadata::default()
            },
        }
    }

    #[test]
    fn test_chat_submission_limits() {
        let submission = ChatSubmission {
            message: Some("x".repeat(MAX_MESSAGE_LENGTH + 1)),
            ..ChatSubmission::default()
        };
        assert!(submission.validate().unwrap_err().has_field("message"));

        let submission = ChatSubmission {
            message: Some("   ".to_string()),
            ..ChatSubmission::default()
        };
        assert!(submission.validate().unwrap_err().has_field("message"));
    }

    #[test]
    fn test_rating_submission_range() {
        let submission = RatingSubmission {
            session_id: Some("s".to_string()),
            rating: Some(0),
            feedback: None,
        };
        assert!(submission.validate().unwrap_err().has_field("rating"));
    }

    #[tokio::test]
    async fn test_counters_recomputed_on_append() {
        let db = test_db().await;
        let session = create_session(db.pool(), &UserInfo::default()).await.unwrap();
        assert_eq!(session.session_info.message_count, 0);
        assert_eq!(session.session_info.category, SessionCategory::GeneralInquiry);

        let id = session.session_id.as_str();
        append_message(db.pool(), id, &user("hi")).await.unwrap();
        append_message(db.pool(), id, &assistant("hello", 100, 10)).await.unwrap();
        append_message(db.pool(), id, &user("more")).await.unwrap();
        append_message(db.pool(), id, &assistant("sure", 301, 15)).await.unwrap();

        let session = get_session(db.pool(), id).await.unwrap();
        assert_eq!(session.session_info.message_count, 4);
        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.performance.total_tokens, 25);
        assert_eq!(session.performance.average_response_time, 200);
        assert_eq!(session.messages[1].metadata.0.response_time, Some(100));
    }

    #[tokio::test]
    async fn test_unknown_session_starts_new_one() {
        let db = test_db().await;
        let session = get_or_create_session(db.pool(), Some("nope"), &UserInfo::default())
            .await
            .unwrap();
        assert_ne!(session.session_id, "nope");

        let again =
            get_or_create_session(db.pool(), Some(session.session_id.as_str()), &UserInfo::default())
                .await
                .unwrap();
        assert_eq!(again.session_id, session.session_id);
    }

    #[tokio::test]
    async fn test_end_session_is_idempotent() {
        let db = test_db().await;
        let session = create_session(db.pool(), &UserInfo::default()).await.unwrap();

        let ended = end_session(db.pool(), &session.session_id).await.unwrap();
        let end_time = ended.session_info.end_time.clone();
        assert!(end_time.is_some());
        assert!(ended.session_info.duration.unwrap() >= 0);

        let again = end_session(db.pool(), &session.session_id).await.unwrap();
        assert_eq!(again.session_info.end_time, end_time);
        assert_eq!(again.session_info.duration, ended.session_info.duration);

        let result = end_session(db.pool(), "missing").await;
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_escalation_tags() {
        let db = test_db().await;
        let session = create_session(db.pool(), &UserInfo::default()).await.unwrap();

        let escalated = escalate_session(
            db.pool(),
            &session.session_id,
            EscalationTarget::EmergencyServices,
            "Emergency keywords detected",
        )
        .await
        .unwrap();
        assert!(escalated.session_info.escalated);
        assert_eq!(
            escalated.session_info.escalated_to,
            Some(EscalationTarget::EmergencyServices)
        );
        assert!(escalated.session_info.escalated_at.is_some());
        assert_eq!(escalated.session_info.tags.0, vec!["escalated", "emergency"]);

        // Escalating again does not duplicate tags.
        let again = escalate_session(
            db.pool(),
            &session.session_id,
            EscalationTarget::HumanVolunteer,
            "Complex medical inquiry",
        )
        .await
        .unwrap();
        assert_eq!(again.session_info.tags.0, vec!["escalated", "emergency"]);
    }

    #[tokio::test]
    async fn test_analysis_sets_category_and_filters() {
        let db = test_db().await;
        let session = create_session(db.pool(), &UserInfo::default()).await.unwrap();
        create_session(db.pool(), &UserInfo::default()).await.unwrap();

        let analysis = MessageAnalysis {
            intent: "symptom-check".to_string(),
            urgency: UrgencyAssessment {
                level: ChatUrgency::High,
                confidence: 0.8,
            },
            ..MessageAnalysis::default()
        };
        let updated = record_analysis(db.pool(), &session.session_id, &analysis)
            .await
            .unwrap();
        assert_eq!(updated.session_info.category, SessionCategory::SymptomCheck);
        assert_eq!(updated.ai_analysis.unwrap().0, analysis);

        let filter = SessionFilter {
            urgency: Some(ChatUrgency::High),
            ..SessionFilter::default()
        };
        let page = list_sessions(db.pool(), &filter, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.items[0].session_id, session.session_id);
        assert!(page.items[0].messages.is_empty());

        let filter = SessionFilter {
            category: Some(SessionCategory::GeneralInquiry),
            ..SessionFilter::default()
        };
        let page = list_sessions(db.pool(), &filter, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 1);
    }

    #[tokio::test]
    async fn test_rate_session() {
        let db = test_db().await;
        let session = create_session(db.pool(), &UserInfo::default()).await.unwrap();

        let rating = NewRating {
            session_id: session.session_id.clone(),
            rating: 4,
            feedback: Some("helpful".to_string()),
        };
        let rated = rate_session(db.pool(), &rating).await.unwrap();
        let satisfaction = rated.session_info.satisfaction.unwrap().0;
        assert_eq!(satisfaction.rating, 4);
        assert_eq!(satisfaction.feedback.as_deref(), Some("helpful"));
    }
}
