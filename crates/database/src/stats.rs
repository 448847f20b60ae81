//! Read-only reporting queries.
//!
//! Every count is `COALESCE`d so an empty window reports zeros, and every
//! enum breakdown lists all variants, including those with no rows.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use triage_core::{Priority, UrgencyLevel};

use crate::chat_session::{recent_sessions, SessionBrief};
use crate::contact::{recent_contacts, ContactBrief};
use crate::error::Result;
use crate::models::{
    ContactCategory, ContactStatus, PatientBrief, PatientStatus, SessionCategory, Skill,
    VolunteerStatus,
};
use crate::patient::recent_patients;
use crate::validation::{FieldValidator, ValidationError, ValidationErrors};
use crate::volunteer::{recent_volunteers, VolunteerBrief};

/// Days covered when no window is given.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Items per entity in the dashboard's recent-activity lists.
pub const RECENT_LIMIT: i64 = 5;

/// Urgent open patients above this count raise an alert.
pub const URGENT_PATIENTS_THRESHOLD: i64 = 0;
/// Pending applications above this count raise a warning.
pub const PENDING_VOLUNTEERS_THRESHOLD: i64 = 5;
/// New contact messages above this count raise a notice.
pub const NEW_CONTACTS_THRESHOLD: i64 = 0;
/// Fewer active volunteers than this is critical.
pub const MIN_ACTIVE_VOLUNTEERS: i64 = 10;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// An inclusive reporting window in stored timestamp form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsWindow {
    pub start: String,
    pub end: String,
}

impl StatsWindow {
    /// Build a window from optional `startDate`/`endDate` inputs.
    ///
    /// Accepts `YYYY-MM-DD` or RFC 3339. A bare end date covers that whole
    /// day. Missing bounds default to the last [`DEFAULT_WINDOW_DAYS`] days
    /// before the end.
    pub fn resolve(
        start: Option<&str>,
        end: Option<&str>,
    ) -> std::result::Result<Self, ValidationErrors> {
        Self::resolve_at(Utc::now(), start, end)
    }

    fn resolve_at(
        now: DateTime<Utc>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> std::result::Result<Self, ValidationErrors> {
        let mut v = FieldValidator::new();
        let start = parse_bound(&mut v, "startDate", start, false);
        let end = parse_bound(&mut v, "endDate", end, true);
        if !v.is_valid() {
            return Err(v.into_errors());
        }

        let end = end.unwrap_or(now);
        let start = start.unwrap_or(end - Duration::days(DEFAULT_WINDOW_DAYS));
        Ok(Self::between(start, end))
    }

    /// The last `days` days up to now.
    pub fn last_days(days: i64) -> Self {
        let now = Utc::now();
        Self::between(now - Duration::days(days), now)
    }

    fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: start.format(TIMESTAMP_FORMAT).to_string(),
            end: end.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Every calendar day touched by the window, as `YYYY-MM-DD`.
    fn days(&self) -> Vec<String> {
        let day = |ts: &str| NaiveDate::parse_from_str(ts.get(..10).unwrap_or(ts), DATE_FORMAT);
        let (Ok(first), Ok(last)) = (day(&self.start), day(&self.end)) else {
            return Vec::new();
        };
        first
            .iter_days()
            .take_while(|d| *d <= last)
            .map(|d| d.format(DATE_FORMAT).to_string())
            .collect()
    }
}

fn parse_bound(
    v: &mut FieldValidator,
    field: &str,
    value: Option<&str>,
    end_of_day: bool,
) -> Option<DateTime<Utc>> {
    let value = value.map(str::trim).filter(|s| !s.is_empty())?;

    if let Ok(date) = NaiveDate::parse_from_str(value, DATE_FORMAT) {
        let (h, m, s) = if end_of_day { (23, 59, 59) } else { (0, 0, 0) };
        return date.and_hms_opt(h, m, s).map(|dt| dt.and_utc());
    }

    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => {
            v.push(ValidationError::InvalidFormat {
                field: field.to_string(),
                expected: "YYYY-MM-DD or RFC 3339".to_string(),
            });
            None
        }
    }
}

/// A count for one key of a breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Bucket {
    pub key: String,
    pub count: i64,
}

/// Fill `buckets` so every key in `keys` appears, in that order.
fn complete(keys: impl IntoIterator<Item = &'static str>, buckets: Vec<Bucket>) -> Vec<Bucket> {
    keys.into_iter()
        .map(|key| Bucket {
            key: key.to_string(),
            count: buckets
                .iter()
                .find(|b| b.key == key)
                .map_or(0, |b| b.count),
        })
        .collect()
}

/// Fill a day series so every day in the window appears.
fn complete_days(window: &StatsWindow, buckets: Vec<Bucket>) -> Vec<Bucket> {
    window
        .days()
        .into_iter()
        .map(|day| {
            let count = buckets
                .iter()
                .find(|b| b.key == day)
                .map_or(0, |b| b.count);
            Bucket { key: day, count }
        })
        .collect()
}

/// `SELECT {key}, COUNT(*)` over rows of `table` whose `time_column` falls in
/// the window. Table and column names are crate constants.
async fn group_by(
    pool: &SqlitePool,
    table: &str,
    time_column: &str,
    key: &str,
    window: &StatsWindow,
) -> Result<Vec<Bucket>> {
    let buckets = sqlx::query_as::<_, Bucket>(&format!(
        "SELECT {key} AS key, COUNT(*) AS count FROM {table} \
         WHERE {time_column} BETWEEN ? AND ? AND {key} IS NOT NULL \
         GROUP BY 1 ORDER BY count DESC, key ASC"
    ))
    .bind(&window.start)
    .bind(&window.end)
    .fetch_all(pool)
    .await?;

    Ok(buckets)
}

fn status_keys<T: Copy>(all: &'static [T], name: fn(&T) -> &'static str) -> Vec<&'static str> {
    all.iter().map(name).collect()
}

// ---------------------------------------------------------------------------
// Per-entity statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientStats {
    pub total: i64,
    pub urgent_cases: i64,
    pub pending_cases: i64,
    pub in_progress_cases: i64,
    pub resolved_cases: i64,
    pub average_age: f64,
    pub by_status: Vec<Bucket>,
    pub by_urgency: Vec<Bucket>,
    pub by_priority: Vec<Bucket>,
    pub by_day: Vec<Bucket>,
}

#[derive(FromRow)]
struct PatientTotals {
    total: i64,
    urgent_cases: i64,
    pending_cases: i64,
    in_progress_cases: i64,
    resolved_cases: i64,
    average_age: f64,
}

/// Patient counts for requests created in the window.
pub async fn patient_stats(pool: &SqlitePool, window: &StatsWindow) -> Result<PatientStats> {
    let totals = sqlx::query_as::<_, PatientTotals>(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(CASE WHEN urgency_level = 'high' THEN 1 ELSE 0 END), 0) AS urgent_cases,
            COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending_cases,
            COALESCE(SUM(CASE WHEN status = 'in-progress' THEN 1 ELSE 0 END), 0) AS in_progress_cases,
            COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0) AS resolved_cases,
            CAST(COALESCE(AVG(age), 0) AS REAL) AS average_age
        FROM patients
        WHERE created_at BETWEEN ? AND ?
        "#,
    )
    .bind(&window.start)
    .bind(&window.end)
    .fetch_one(pool)
    .await?;

    let by_status = group_by(pool, "patients", "created_at", "status", window).await?;
    let by_urgency = group_by(pool, "patients", "created_at", "urgency_level", window).await?;
    let by_priority = group_by(
        pool,
        "patients",
        "created_at",
        "json_extract(ai_summary, '$.suggestedPriority')",
        window,
    )
    .await?;
    let by_day = group_by(pool, "patients", "created_at", "date(created_at)", window).await?;

    Ok(PatientStats {
        total: totals.total,
        urgent_cases: totals.urgent_cases,
        pending_cases: totals.pending_cases,
        in_progress_cases: totals.in_progress_cases,
        resolved_cases: totals.resolved_cases,
        average_age: totals.average_age,
        by_status: complete(status_keys(PatientStatus::ALL, PatientStatus::as_str), by_status),
        by_urgency: complete(status_keys(UrgencyLevel::ALL, UrgencyLevel::as_str), by_urgency),
        by_priority: complete(status_keys(Priority::ALL, Priority::as_str), by_priority),
        by_day: complete_days(window, by_day),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub active: i64,
    pub rejected: i64,
    pub inactive: i64,
    /// Mean rating over volunteers with at least one review.
    pub average_rating: f64,
    pub total_hours: f64,
    pub by_status: Vec<Bucket>,
    /// Skills offered by approved and active volunteers.
    pub by_skill: Vec<Bucket>,
    pub by_day: Vec<Bucket>,
}

#[derive(FromRow)]
struct VolunteerTotals {
    total: i64,
    average_rating: f64,
    total_hours: f64,
}

/// Volunteer counts for applications created in the window.
pub async fn volunteer_stats(pool: &SqlitePool, window: &StatsWindow) -> Result<VolunteerStats> {
    let totals = sqlx::query_as::<_, VolunteerTotals>(
        r#"
        SELECT
            COUNT(*) AS total,
            CAST(COALESCE(AVG(CASE WHEN rating_count > 0 THEN rating_average END), 0) AS REAL)
                AS average_rating,
            CAST(COALESCE(SUM(total_hours), 0) AS REAL) AS total_hours
        FROM volunteers
        WHERE created_at BETWEEN ? AND ?
        "#,
    )
    .bind(&window.start)
    .bind(&window.end)
    .fetch_one(pool)
    .await?;

    let by_status = complete(
        status_keys(VolunteerStatus::ALL, VolunteerStatus::as_str),
        group_by(pool, "volunteers", "created_at", "status", window).await?,
    );
    let count_of = |status: VolunteerStatus| {
        by_status
            .iter()
            .find(|b| b.key == status.as_str())
            .map_or(0, |b| b.count)
    };

    let by_skill = sqlx::query_as::<_, Bucket>(
        r#"
        SELECT skill.value AS key, COUNT(*) AS count
        FROM volunteers, json_each(volunteers.skills) AS skill
        WHERE volunteers.created_at BETWEEN ? AND ?
          AND volunteers.status IN ('approved', 'active')
        GROUP BY skill.value
        "#,
    )
    .bind(&window.start)
    .bind(&window.end)
    .fetch_all(pool)
    .await?;
    let mut by_skill = complete(status_keys(Skill::ALL, Skill::as_str), by_skill);
    by_skill.sort_by(|a, b| b.count.cmp(&a.count));

    let by_day = group_by(pool, "volunteers", "created_at", "date(created_at)", window).await?;

    Ok(VolunteerStats {
        total: totals.total,
        pending: count_of(VolunteerStatus::Pending),
        approved: count_of(VolunteerStatus::Approved),
        active: count_of(VolunteerStatus::Active),
        rejected: count_of(VolunteerStatus::Rejected),
        inactive: count_of(VolunteerStatus::Inactive),
        average_rating: totals.average_rating,
        total_hours: totals.total_hours,
        by_skill,
        by_day: complete_days(window, by_day),
        by_status,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactStats {
    pub total: i64,
    pub new_messages: i64,
    pub resolved_messages: i64,
    pub urgent_messages: i64,
    /// Mean hours from submission to resolution over resolved messages.
    pub average_resolution_hours: f64,
    pub by_status: Vec<Bucket>,
    pub by_priority: Vec<Bucket>,
    pub by_category: Vec<Bucket>,
    pub by_day: Vec<Bucket>,
}

#[derive(FromRow)]
struct ContactTotals {
    total: i64,
    new_messages: i64,
    resolved_messages: i64,
    urgent_messages: i64,
    average_resolution_hours: f64,
}

/// Contact counts for messages received in the window.
pub async fn contact_stats(pool: &SqlitePool, window: &StatsWindow) -> Result<ContactStats> {
    let totals = sqlx::query_as::<_, ContactTotals>(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(CASE WHEN status = 'new' THEN 1 ELSE 0 END), 0) AS new_messages,
            COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0) AS resolved_messages,
            COALESCE(SUM(CASE WHEN priority = 'urgent' THEN 1 ELSE 0 END), 0) AS urgent_messages,
            CAST(COALESCE(AVG(
                CASE WHEN resolved_at IS NOT NULL
                    THEN (julianday(resolved_at) - julianday(created_at)) * 24
                END
            ), 0) AS REAL) AS average_resolution_hours
        FROM contacts
        WHERE created_at BETWEEN ? AND ?
        "#,
    )
    .bind(&window.start)
    .bind(&window.end)
    .fetch_one(pool)
    .await?;

    let by_status = group_by(pool, "contacts", "created_at", "status", window).await?;
    let by_priority = group_by(pool, "contacts", "created_at", "priority", window).await?;
    let by_category = group_by(pool, "contacts", "created_at", "category", window).await?;
    let by_day = group_by(pool, "contacts", "created_at", "date(created_at)", window).await?;

    Ok(ContactStats {
        total: totals.total,
        new_messages: totals.new_messages,
        resolved_messages: totals.resolved_messages,
        urgent_messages: totals.urgent_messages,
        average_resolution_hours: totals.average_resolution_hours,
        by_status: complete(status_keys(ContactStatus::ALL, ContactStatus::as_str), by_status),
        by_priority: complete(status_keys(Priority::ALL, Priority::as_str), by_priority),
        by_category: complete(
            status_keys(ContactCategory::ALL, ContactCategory::as_str),
            by_category,
        ),
        by_day: complete_days(window, by_day),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStats {
    pub total_sessions: i64,
    pub average_messages: f64,
    /// Mean seconds over ended sessions.
    pub average_duration: f64,
    pub escalated_sessions: i64,
    /// Mean satisfaction over rated sessions.
    pub satisfaction_rating: f64,
    pub total_tokens: i64,
    pub by_category: Vec<Bucket>,
    pub by_urgency: Vec<Bucket>,
    pub by_day: Vec<Bucket>,
}

#[derive(FromRow)]
struct ChatTotals {
    total_sessions: i64,
    average_messages: f64,
    average_duration: f64,
    escalated_sessions: i64,
    satisfaction_rating: f64,
    total_tokens: i64,
}

/// Chat counts for sessions started in the window.
pub async fn chat_stats(pool: &SqlitePool, window: &StatsWindow) -> Result<ChatStats> {
    let totals = sqlx::query_as::<_, ChatTotals>(
        r#"
        SELECT
            COUNT(*) AS total_sessions,
            CAST(COALESCE(AVG(message_count), 0) AS REAL) AS average_messages,
            CAST(COALESCE(AVG(duration), 0) AS REAL) AS average_duration,
            COALESCE(SUM(escalated), 0) AS escalated_sessions,
            CAST(COALESCE(AVG(json_extract(satisfaction, '$.rating')), 0) AS REAL)
                AS satisfaction_rating,
            COALESCE(SUM(total_tokens), 0) AS total_tokens
        FROM chat_sessions
        WHERE start_time BETWEEN ? AND ?
        "#,
    )
    .bind(&window.start)
    .bind(&window.end)
    .fetch_one(pool)
    .await?;

    let by_category = group_by(pool, "chat_sessions", "start_time", "category", window).await?;
    let by_urgency = group_by(
        pool,
        "chat_sessions",
        "start_time",
        "json_extract(ai_analysis, '$.urgency.level')",
        window,
    )
    .await?;
    let by_day = group_by(pool, "chat_sessions", "start_time", "date(start_time)", window).await?;

    Ok(ChatStats {
        total_sessions: totals.total_sessions,
        average_messages: totals.average_messages,
        average_duration: totals.average_duration,
        escalated_sessions: totals.escalated_sessions,
        satisfaction_rating: totals.satisfaction_rating,
        total_tokens: totals.total_tokens,
        by_category: complete(
            status_keys(SessionCategory::ALL, SessionCategory::as_str),
            by_category,
        ),
        by_urgency,
        by_day: complete_days(window, by_day),
    })
}

// ---------------------------------------------------------------------------
// Admin reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentActivity {
    pub patients: Vec<PatientBrief>,
    pub volunteers: Vec<VolunteerBrief>,
    pub contacts: Vec<ContactBrief>,
    pub sessions: Vec<SessionBrief>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub window: StatsWindow,
    pub patients: PatientStats,
    pub volunteers: VolunteerStats,
    pub contacts: ContactStats,
    pub chats: ChatStats,
    pub recent: RecentActivity,
}

/// All per-entity statistics plus the latest records of each kind.
pub async fn dashboard(pool: &SqlitePool, window: &StatsWindow) -> Result<Dashboard> {
    Ok(Dashboard {
        patients: patient_stats(pool, window).await?,
        volunteers: volunteer_stats(pool, window).await?,
        contacts: contact_stats(pool, window).await?,
        chats: chat_stats(pool, window).await?,
        recent: RecentActivity {
            patients: recent_patients(pool, RECENT_LIMIT).await?,
            volunteers: recent_volunteers(pool, RECENT_LIMIT).await?,
            contacts: recent_contacts(pool, RECENT_LIMIT).await?,
            sessions: recent_sessions(pool, RECENT_LIMIT).await?,
        },
        window: window.clone(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EntityCounts {
    pub patients: i64,
    pub volunteers: i64,
    pub contacts: i64,
    pub chat_sessions: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub totals: EntityCounts,
    pub last_seven_days: EntityCounts,
    pub active_volunteers: i64,
    pub new_contacts: i64,
    /// High-urgency patients not yet resolved or closed.
    pub urgent_cases: i64,
    /// Sessions started in the last 24 hours that have not ended.
    pub active_chats: i64,
}

#[derive(FromRow)]
struct OverviewCounts {
    active_volunteers: i64,
    new_contacts: i64,
    urgent_cases: i64,
    active_chats: i64,
}

/// System-wide counts and seven-day trends.
pub async fn overview(pool: &SqlitePool) -> Result<Overview> {
    let totals = sqlx::query_as::<_, EntityCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM patients) AS patients,
            (SELECT COUNT(*) FROM volunteers) AS volunteers,
            (SELECT COUNT(*) FROM contacts) AS contacts,
            (SELECT COUNT(*) FROM chat_sessions) AS chat_sessions
        "#,
    )
    .fetch_one(pool)
    .await?;

    let last_seven_days = sqlx::query_as::<_, EntityCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM patients WHERE created_at >= datetime('now', '-7 days'))
                AS patients,
            (SELECT COUNT(*) FROM volunteers WHERE created_at >= datetime('now', '-7 days'))
                AS volunteers,
            (SELECT COUNT(*) FROM contacts WHERE created_at >= datetime('now', '-7 days'))
                AS contacts,
            (SELECT COUNT(*) FROM chat_sessions WHERE start_time >= datetime('now', '-7 days'))
                AS chat_sessions
        "#,
    )
    .fetch_one(pool)
    .await?;

    let counts = sqlx::query_as::<_, OverviewCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM volunteers WHERE status = 'active') AS active_volunteers,
            (SELECT COUNT(*) FROM contacts WHERE status = 'new') AS new_contacts,
            (SELECT COUNT(*) FROM patients
                WHERE urgency_level = 'high' AND status NOT IN ('resolved', 'closed'))
                AS urgent_cases,
            (SELECT COUNT(*) FROM chat_sessions
                WHERE start_time >= datetime('now', '-1 day') AND end_time IS NULL)
                AS active_chats
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(Overview {
        totals,
        last_seven_days,
        active_volunteers: counts.active_volunteers,
        new_contacts: counts.new_contacts,
        urgent_cases: counts.urgent_cases,
        active_chats: counts.active_chats,
    })
}

/// Length of an analytics series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum AnalyticsPeriod {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl AnalyticsPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "7d" => Some(AnalyticsPeriod::Week),
            "30d" => Some(AnalyticsPeriod::Month),
            "90d" => Some(AnalyticsPeriod::Quarter),
            _ => None,
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            AnalyticsPeriod::Week => 7,
            AnalyticsPeriod::Month => 30,
            AnalyticsPeriod::Quarter => 90,
        }
    }
}

/// Which records an analytics series counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsKind {
    #[default]
    Patients,
    Volunteers,
    Contacts,
    Chats,
}

impl AnalyticsKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "patients" => Some(AnalyticsKind::Patients),
            "volunteers" => Some(AnalyticsKind::Volunteers),
            "contacts" => Some(AnalyticsKind::Contacts),
            "chats" | "chat" => Some(AnalyticsKind::Chats),
            _ => None,
        }
    }

    fn table_and_time(&self) -> (&'static str, &'static str) {
        match self {
            AnalyticsKind::Patients => ("patients", "created_at"),
            AnalyticsKind::Volunteers => ("volunteers", "created_at"),
            AnalyticsKind::Contacts => ("contacts", "created_at"),
            AnalyticsKind::Chats => ("chat_sessions", "start_time"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analytics {
    pub kind: AnalyticsKind,
    pub period: AnalyticsPeriod,
    /// One bucket per day, oldest first.
    pub series: Vec<Bucket>,
}

/// A daily series of new records over the period.
pub async fn analytics(
    pool: &SqlitePool,
    kind: AnalyticsKind,
    period: AnalyticsPeriod,
) -> Result<Analytics> {
    let window = StatsWindow::last_days(period.days());
    let (table, time_column) = kind.table_and_time();
    let day = format!("date({time_column})");
    let buckets = group_by(pool, table, time_column, &day, &window).await?;

    Ok(Analytics {
        kind,
        period,
        series: complete_days(&window, buckets),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Urgent,
    Warning,
    Info,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub count: i64,
    /// Admin list that shows the records behind the alert.
    pub link: String,
}

/// Snapshot alerts over the current state of every table.
pub async fn alerts(pool: &SqlitePool) -> Result<Vec<Alert>> {
    let counts = sqlx::query_as::<_, (i64, i64, i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM patients
                WHERE urgency_level = 'high' AND status IN ('pending', 'in-progress')),
            (SELECT COUNT(*) FROM volunteers WHERE status = 'pending'),
            (SELECT COUNT(*) FROM contacts WHERE status = 'new'),
            (SELECT COUNT(*) FROM volunteers WHERE status = 'active')
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(build_alerts(counts.0, counts.1, counts.2, counts.3))
}

fn build_alerts(urgent: i64, pending: i64, new_contacts: i64, active: i64) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if urgent > URGENT_PATIENTS_THRESHOLD {
        alerts.push(Alert {
            level: AlertLevel::Urgent,
            title: "Urgent Patient Cases".to_string(),
            message: format!("{urgent} urgent patient case(s) require attention"),
            count: urgent,
            link: "/admin/patients?urgencyLevel=high".to_string(),
        });
    }
    if pending > PENDING_VOLUNTEERS_THRESHOLD {
        alerts.push(Alert {
            level: AlertLevel::Warning,
            title: "Pending Volunteer Applications".to_string(),
            message: format!("{pending} volunteer application(s) awaiting review"),
            count: pending,
            link: "/admin/volunteers?status=pending".to_string(),
        });
    }
    if new_contacts > NEW_CONTACTS_THRESHOLD {
        alerts.push(Alert {
            level: AlertLevel::Info,
            title: "New Contact Messages".to_string(),
            message: format!("{new_contacts} unread contact message(s)"),
            count: new_contacts,
            link: "/admin/contacts?status=new".to_string(),
        });
    }
    if active < MIN_ACTIVE_VOLUNTEERS {
        alerts.push(Alert {
            level: AlertLevel::Critical,
            title: "Low Volunteer Availability".to_string(),
            message: format!("Only {active} active volunteer(s) available"),
            count: active,
            link: "/admin/volunteers?status=active".to_string(),
        });
    }

    alerts
}
