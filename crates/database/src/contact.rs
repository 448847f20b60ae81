//! Contact message operations.
//!
//! Priority and tags are derived once, when a message is created. Later
//! edits never re-derive them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use triage_core::Priority;
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::{
    Contact, ContactCategory, ContactResponse, ContactSource, ContactStatus, NewContact, Note,
};
use crate::query::{push_search, Page, PageRequest, SortOrder};
use crate::validation::{FieldValidator, ValidationErrors};

const ENTITY: &str = "Contact";

const CONTACT_COLUMNS: &str = "id, name, email, phone, category, subject, message, priority, \
     status, assigned_to, response, tags, source, user_agent, ip_address, resolved_at, \
     created_at, updated_at";

/// Keyword groups scanned in the message body, with the tag each adds.
const TAG_RULES: &[(&[&str], &str)] = &[
    (&["urgent", "emergency"], "urgent"),
    (&["volunteer"], "volunteer-related"),
    (&["technical", "website", "app"], "technical"),
    (&["partnership", "collaborate"], "business"),
];

/// A contact message as posted by the contact form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub category: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub priority: Option<String>,
    pub source: Option<String>,
}

impl ContactSubmission {
    /// Check required fields and choices. Request metadata (user agent, IP)
    /// is filled in by the caller.
    pub fn validate(&self) -> std::result::Result<NewContact, ValidationErrors> {
        let mut v = FieldValidator::new();

        let name = v.required_text("name", self.name.as_deref(), 100);
        let email = v.email("email", self.email.as_deref());
        let phone = v.optional_text("phone", self.phone.as_deref(), 30);
        let category =
            v.required_choice("category", self.category.as_deref(), ContactCategory::parse);
        let subject = v.required_text("subject", self.subject.as_deref(), 200);
        let message = v.required_text("message", self.message.as_deref(), 2000);
        let priority = v.optional_choice("priority", self.priority.as_deref(), Priority::parse);
        let source = v
            .optional_choice("source", self.source.as_deref(), ContactSource::parse)
            .unwrap_or(ContactSource::Website);

        match (name, email, category, subject, message) {
            (Some(name), Some(email), Some(category), Some(subject), Some(message))
                if v.is_valid() =>
            {
                Ok(NewContact {
                    name,
                    email,
                    phone,
                    category,
                    subject,
                    message,
                    priority,
                    source,
                    user_agent: None,
                    ip_address: None,
                })
            }
            _ => Err(v.into_errors()),
        }
    }
}

/// Priority for a new message: some categories fix it, otherwise the
/// submitted priority or `medium`.
pub fn derive_priority(category: ContactCategory, submitted: Option<Priority>) -> Priority {
    match category {
        ContactCategory::Emergency => Priority::Urgent,
        ContactCategory::Complaint => Priority::High,
        ContactCategory::GeneralInquiry => Priority::Low,
        _ => submitted.unwrap_or(Priority::Medium),
    }
}

/// Tags for a new message from keywords in its body.
pub fn derive_tags(message: &str) -> Vec<String> {
    let message = message.to_lowercase();
    TAG_RULES
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|k| message.contains(k)))
        .map(|(_, tag)| tag.to_string())
        .collect()
}

/// Staff edits to a contact message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdateSubmission {
    pub subject: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Validated contact edits; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactUpdate {
    pub subject: Option<String>,
    pub phone: Option<String>,
    pub status: Option<ContactStatus>,
    pub tags: Option<Vec<String>>,
}

impl ContactUpdateSubmission {
    pub fn validate(&self) -> std::result::Result<ContactUpdate, ValidationErrors> {
        let mut v = FieldValidator::new();

        let subject = v.optional_text("subject", self.subject.as_deref(), 200);
        let phone = v.optional_text("phone", self.phone.as_deref(), 30);
        let status = v.optional_choice("status", self.status.as_deref(), ContactStatus::parse);
        let tags: Option<Vec<String>> = self.tags.as_ref().map(|tags| {
            tags.iter()
                .filter_map(|t| v.optional_text("tags", Some(t), 50))
                .map(|t| t.to_lowercase())
                .collect()
        });

        if v.is_valid() {
            Ok(ContactUpdate {
                subject,
                phone,
                status,
                tags,
            })
        } else {
            Err(v.into_errors())
        }
    }
}

impl ContactStatus {
    /// Whether staff may move a message from `self` to `next`.
    pub fn can_become(&self, next: ContactStatus) -> bool {
        use ContactStatus::*;

        matches!(
            (self, next),
            (New, InProgress | Resolved | Closed)
                | (InProgress, Resolved | Closed)
                | (Resolved, Closed)
        )
    }
}

/// Filters for listing contact messages.
#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub status: Option<ContactStatus>,
    pub category: Option<ContactCategory>,
    pub priority: Option<Priority>,
    /// Matched against name, email, subject and message.
    pub search: Option<String>,
}

/// Sortable contact columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContactSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    Category,
    Priority,
    Status,
}

impl ContactSort {
    /// Get the database column name for this field.
    pub fn column_name(&self) -> &'static str {
        match self {
            ContactSort::CreatedAt => "created_at",
            ContactSort::UpdatedAt => "updated_at",
            ContactSort::Name => "name",
            ContactSort::Category => "category",
            ContactSort::Priority => "priority",
            ContactSort::Status => "status",
        }
    }

    /// Parse a sort key from user input.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "createdAt" | "created_at" => Some(ContactSort::CreatedAt),
            "updatedAt" | "updated_at" => Some(ContactSort::UpdatedAt),
            "name" => Some(ContactSort::Name),
            "category" => Some(ContactSort::Category),
            "priority" => Some(ContactSort::Priority),
            "status" => Some(ContactSort::Status),
            _ => None,
        }
    }
}

/// Short contact view for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContactBrief {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub category: ContactCategory,
    #[sqlx(try_from = "String")]
    pub priority: Priority,
    pub status: ContactStatus,
    pub created_at: String,
}

/// Insert a new message with status `new`, deriving its priority and tags.
pub async fn create_contact(pool: &SqlitePool, contact: &NewContact) -> Result<Contact> {
    let id = Uuid::new_v4().to_string();
    let priority = derive_priority(contact.category, contact.priority);
    let tags = derive_tags(&contact.message);

    sqlx::query(
        r#"
        INSERT INTO contacts (
            id, name, email, phone, category, subject, message, priority, tags,
            source, user_agent, ip_address
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&contact.name)
    .bind(&contact.email)
    .bind(contact.phone.as_deref())
    .bind(contact.category)
    .bind(&contact.subject)
    .bind(&contact.message)
    .bind(priority.as_str())
    .bind(Json(&tags))
    .bind(contact.source)
    .bind(contact.user_agent.as_deref())
    .bind(contact.ip_address.as_deref())
    .execute(pool)
    .await?;

    tracing::info!(
        contact_id = %id,
        category = %contact.category,
        priority = %priority,
        "Contact message created"
    );

    get_contact(pool, &id).await
}

/// Get a contact message by ID, including internal notes.
pub async fn get_contact(pool: &SqlitePool, id: &str) -> Result<Contact> {
    let mut contact = fetch_contact(pool, id).await?;

    contact.internal_notes = sqlx::query_as::<_, Note>(
        r#"
        SELECT author, content, timestamp
        FROM contact_notes
        WHERE contact_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(contact)
}

async fn fetch_contact<'e, E>(executor: E, id: &str) -> Result<Contact>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Contact>(&format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| DatabaseError::not_found(ENTITY, id))
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ContactFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        push_search(qb, &["name", "email", "subject", "message"], search);
    }
}

/// List contact messages. Notes are only loaded by [`get_contact`].
pub async fn list_contacts(
    pool: &SqlitePool,
    filter: &ContactFilter,
    sort: ContactSort,
    order: SortOrder,
    page: PageRequest,
) -> Result<Page<Contact>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM contacts");
    push_filters(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {CONTACT_COLUMNS} FROM contacts"));
    push_filters(&mut qb, filter);
    qb.push(format!(" ORDER BY {} {}, id ASC", sort.column_name(), order.sql()));
    page.push_to(&mut qb);

    let items = qb.build_query_as::<Contact>().fetch_all(pool).await?;

    Ok(Page::new(items, page, total))
}

/// The most recent contact messages.
pub async fn recent_contacts(pool: &SqlitePool, limit: i64) -> Result<Vec<ContactBrief>> {
    let contacts = sqlx::query_as::<_, ContactBrief>(
        r#"
        SELECT id, name, subject, category, priority, status, created_at
        FROM contacts
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(contacts)
}

/// Apply staff edits. Priority and tags are not re-derived.
pub async fn update_contact(pool: &SqlitePool, id: &str, update: &ContactUpdate) -> Result<Contact> {
    let mut tx = pool.begin().await?;
    let current = fetch_contact(&mut *tx, id).await?;

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
        UPDATE contacts
        SET subject = COALESCE(?, subject),
            phone = COALESCE(?, phone),
            tags = COALESCE(?, tags),
            status = ?,
            resolved_at = CASE
                WHEN ? = 'resolved' AND resolved_at IS NULL THEN datetime('now')
                ELSE resolved_at
            END,
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(update.subject.as_deref())
    .bind(update.phone.as_deref())
    .bind(update.tags.as_ref().map(Json))
    .bind(status)
    .bind(status.as_str())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    get_contact(pool, id).await
}

/// Append an internal note.
pub async fn add_note(pool: &SqlitePool, id: &str, author: &str, content: &str) -> Result<Note> {
    let mut tx = pool.begin().await?;
    fetch_contact(&mut *tx, id).await?;

    let note = sqlx::query_as::<_, Note>(
        r#"
        INSERT INTO contact_notes (contact_id, author, content)
        VALUES (?, ?, ?)
        RETURNING author, content, timestamp
        "#,
    )
    .bind(id)
    .bind(author)
    .bind(content)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE contacts SET updated_at = datetime('now') WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(note)
}

/// Record a staff response; the message moves to `resolved`.
pub async fn respond_to_contact(
    pool: &SqlitePool,
    id: &str,
    content: &str,
    responded_by: &str,
) -> Result<Contact> {
    let mut tx = pool.begin().await?;
    let current = fetch_contact(&mut *tx, id).await?;

    if !current.status.can_become(ContactStatus::Resolved) {
        return Err(DatabaseError::transition(
            ENTITY,
            current.status,
            ContactStatus::Resolved,
        ));
    }

    let response = ContactResponse {
        content: content.to_string(),
        responded_by: responded_by.to_string(),
        responded_at: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        email_sent: false,
    };

    sqlx::query(
        r#"
        UPDATE contacts
        SET response = ?, status = 'resolved', resolved_at = datetime('now'),
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(Json(&response))
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(contact_id = %id, responded_by = %responded_by, "Contact message answered");
    get_contact(pool, id).await
}

/// Assign a staff member; the message moves to `in-progress`.
///
/// Allowed while the message is new or already in progress.
pub async fn assign_contact(pool: &SqlitePool, id: &str, assignee: &str) -> Result<Contact> {
    let mut tx = pool.begin().await?;
    let current = fetch_contact(&mut *tx, id).await?;

    if !matches!(current.status, ContactStatus::New | ContactStatus::InProgress) {
        return Err(DatabaseError::transition(
            ENTITY,
            current.status,
            ContactStatus::InProgress,
        ));
    }

    sqlx::query(
        r#"
        UPDATE contacts
        SET assigned_to = ?, status = 'in-progress', updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(assignee)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    get_contact(pool, id).await
}
