//! Database models.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use triage_core::{AiSummary, MessageAnalysis, Priority, UrgencyLevel};

/// Declares a kebab-case text enum stored as TEXT.
///
/// Variant names must kebab-case to their `$text`, which serde and sqlx
/// derive from `rename_all`.
macro_rules! db_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[serde(rename_all = "kebab-case")]
        #[sqlx(rename_all = "kebab-case")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire and storage representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Parse from user input, ignoring case and surrounding whitespace.
            pub fn parse(s: &str) -> Option<Self> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

db_enum!(
    /// Patient gender as submitted on the intake form.
    Gender {
        Male => "male",
        Female => "female",
        Other => "other",
        PreferNotToSay => "prefer-not-to-say",
    }
);

db_enum!(
    /// Lifecycle of a patient request.
    PatientStatus {
        Pending => "pending",
        InProgress => "in-progress",
        Resolved => "resolved",
        Closed => "closed",
    }
);

db_enum!(
    /// Lifecycle of a volunteer application.
    VolunteerStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Active => "active",
        Inactive => "inactive",
    }
);

db_enum!(
    /// Skills a volunteer can offer.
    Skill {
        GeneralPractice => "general-practice",
        EmergencyCare => "emergency-care",
        MentalHealth => "mental-health",
        Pediatrics => "pediatrics",
        ElderCare => "elder-care",
        ChronicDisease => "chronic-disease",
        Nutrition => "nutrition",
        PhysicalTherapy => "physical-therapy",
        Counseling => "counseling",
        FirstAid => "first-aid",
        Telemedicine => "telemedicine",
        Other => "other",
    }
);

db_enum!(
    Weekday {
        Monday => "monday",
        Tuesday => "tuesday",
        Wednesday => "wednesday",
        Thursday => "thursday",
        Friday => "friday",
        Saturday => "saturday",
        Sunday => "sunday",
    }
);

db_enum!(
    AgeGroup {
        Children => "children",
        Adults => "adults",
        Seniors => "seniors",
    }
);

db_enum!(
    /// Kinds of concern a volunteer prefers to handle.
    ConcernPreference {
        GeneralHealth => "general-health",
        MentalHealth => "mental-health",
        ChronicConditions => "chronic-conditions",
        Emergency => "emergency",
        PreventiveCare => "preventive-care",
        LifestyleAdvice => "lifestyle-advice",
    }
);

db_enum!(
    /// What a contact message is about.
    ContactCategory {
        GeneralInquiry => "general-inquiry",
        TechnicalSupport => "technical-support",
        VolunteerInfo => "volunteer-info",
        Partnership => "partnership",
        MediaInquiry => "media-inquiry",
        Complaint => "complaint",
        Feedback => "feedback",
        Emergency => "emergency",
    }
);

db_enum!(
    /// Lifecycle of a contact message.
    ContactStatus {
        New => "new",
        InProgress => "in-progress",
        Resolved => "resolved",
        Closed => "closed",
    }
);

db_enum!(
    ContactSource {
        Website => "website",
        Email => "email",
        Phone => "phone",
        SocialMedia => "social-media",
        Referral => "referral",
    }
);

db_enum!(
    ChatRole {
        User => "user",
        Assistant => "assistant",
        System => "system",
    }
);

db_enum!(
    /// Topic of a chat session, taken from the latest message intent.
    SessionCategory {
        GeneralInquiry => "general-inquiry",
        SymptomCheck => "symptom-check",
        MedicationInfo => "medication-info",
        EmergencyGuidance => "emergency-guidance",
        AppointmentBooking => "appointment-booking",
        VolunteerInfo => "volunteer-info",
        TechnicalSupport => "technical-support",
        Emergency => "emergency",
        Other => "other",
    }
);

impl SessionCategory {
    /// Category for an analysed intent; unknown intents become `Other`.
    pub fn from_intent(intent: &str) -> Self {
        Self::parse(intent).unwrap_or(SessionCategory::Other)
    }
}

db_enum!(
    /// Who a chat session is handed over to.
    EscalationTarget {
        HumanVolunteer => "human-volunteer",
        EmergencyServices => "emergency-services",
        MedicalProfessional => "medical-professional",
    }
);

/// Metadata of a stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub filename: String,
    pub original_name: String,
    pub path: String,
    pub size: u64,
    pub mimetype: String,
}

/// A note attached to a patient or contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub author: String,
    pub content: String,
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Patients
// ---------------------------------------------------------------------------

/// A patient support request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub full_name: String,
    pub age: i64,
    pub gender: Gender,
    pub phone: String,
    pub email: String,
    pub location: String,
    pub medical_concern: String,
    #[sqlx(try_from = "String")]
    pub urgency_level: UrgencyLevel,
    pub prescription_file: Option<Json<FileRef>>,
    pub status: PatientStatus,
    pub assigned_volunteer: Option<String>,
    /// Computed once at intake; no update path writes it.
    pub ai_summary: Json<AiSummary>,
    #[sqlx(skip)]
    pub notes: Vec<Note>,
    pub resolved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A validated patient request ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPatient {
    pub full_name: String,
    pub age: i64,
    pub gender: Gender,
    pub phone: String,
    pub email: String,
    pub location: String,
    pub medical_concern: String,
    pub urgency_level: UrgencyLevel,
    pub prescription_file: Option<FileRef>,
}

/// Short patient view used in volunteer detail and dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PatientBrief {
    pub id: String,
    pub full_name: String,
    pub status: PatientStatus,
    #[sqlx(try_from = "String")]
    pub urgency_level: UrgencyLevel,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Volunteers
// ---------------------------------------------------------------------------

/// A weekly availability window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    pub day: Weekday,
    pub start_time: String,
    pub end_time: String,
}

/// Review aggregate, kept in step with the reviews table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Rating {
    #[sqlx(rename = "rating_average")]
    pub average: f64,
    #[sqlx(rename = "rating_count")]
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerPreferences {
    #[serde(default = "default_max_patients")]
    pub max_patients: u32,
    #[serde(default)]
    pub preferred_age_groups: Vec<AgeGroup>,
    #[serde(default)]
    pub preferred_concerns: Vec<ConcernPreference>,
}

fn default_max_patients() -> u32 {
    10
}

impl Default for VolunteerPreferences {
    fn default() -> Self {
        Self {
            max_patients: default_max_patients(),
            preferred_age_groups: Vec::new(),
            preferred_concerns: Vec::new(),
        }
    }
}

/// A review left for a volunteer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub patient_id: String,
    /// Resolved from the patients table when listing.
    pub patient_name: Option<String>,
    pub rating: i64,
    pub comment: Option<String>,
    pub timestamp: String,
}

/// A volunteer application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Volunteer {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub skills: Json<Vec<Skill>>,
    pub experience: String,
    pub availability: Json<Vec<AvailabilitySlot>>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub license_number: Option<String>,
    pub license_file: Option<Json<FileRef>>,
    pub id_proof_file: Option<Json<FileRef>>,
    pub professional_background: Option<String>,
    pub why_volunteer: String,
    pub languages: Json<Vec<String>>,
    pub status: VolunteerStatus,
    pub approved_at: Option<String>,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub total_hours: f64,
    #[sqlx(flatten)]
    pub rating: Rating,
    pub last_active: String,
    pub preferences: Json<VolunteerPreferences>,
    #[sqlx(skip)]
    pub assigned_patients: Vec<PatientBrief>,
    #[sqlx(skip)]
    pub reviews: Vec<Review>,
    pub created_at: String,
    pub updated_at: String,
}

impl Volunteer {
    /// Whether a slot on `day` covers `minutes` past midnight.
    pub fn is_available(&self, day: Weekday, minutes: u32) -> bool {
        use crate::validation::clock_minutes;

        self.availability.iter().any(|slot| {
            slot.day == day
                && matches!(
                    (clock_minutes(&slot.start_time), clock_minutes(&slot.end_time)),
                    (Some(start), Some(end)) if start <= minutes && minutes <= end
                )
        })
    }
}

/// A validated volunteer application ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVolunteer {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub skills: Vec<Skill>,
    pub experience: String,
    pub availability: Vec<AvailabilitySlot>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub license_number: Option<String>,
    pub license_file: Option<FileRef>,
    pub id_proof_file: Option<FileRef>,
    pub professional_background: Option<String>,
    pub why_volunteer: String,
    pub languages: Vec<String>,
    pub preferences: VolunteerPreferences,
}

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

/// Staff answer to a contact message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub content: String,
    pub responded_by: String,
    pub responded_at: String,
    #[serde(default)]
    pub email_sent: bool,
}

/// A contact/ticket message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub category: ContactCategory,
    pub subject: String,
    pub message: String,
    #[sqlx(try_from = "String")]
    pub priority: Priority,
    pub status: ContactStatus,
    pub assigned_to: Option<String>,
    pub response: Option<Json<ContactResponse>>,
    #[sqlx(skip)]
    pub internal_notes: Vec<Note>,
    pub tags: Json<Vec<String>>,
    pub source: ContactSource,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub resolved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A validated contact message ready to insert. Priority and tags are
/// derived from it by [`crate::contact::derive_priority`] and
/// [`crate::contact::derive_tags`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub category: ContactCategory,
    pub subject: String,
    pub message: String,
    pub priority: Option<Priority>,
    pub source: ContactSource,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

// ---------------------------------------------------------------------------
// Chat sessions
// ---------------------------------------------------------------------------

/// Per-message metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Milliseconds taken to produce an assistant reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: String,
    pub metadata: Json<MessageMetadata>,
}

/// Who is chatting, as far as the widget knows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub is_registered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Satisfaction {
    pub rating: u8,
    pub feedback: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub start_time: String,
    pub end_time: Option<String>,
    /// Seconds; set once when the session ends.
    pub duration: Option<i64>,
    pub message_count: i64,
    pub satisfaction: Option<Json<Satisfaction>>,
    pub category: SessionCategory,
    pub tags: Json<Vec<String>>,
    pub escalated: bool,
    pub escalated_to: Option<EscalationTarget>,
    pub escalated_at: Option<String>,
    pub escalation_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub total_tokens: i64,
    pub total_cost: f64,
    /// Milliseconds, averaged over assistant messages.
    pub average_response_time: i64,
}

/// A chatbot conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub session_id: String,
    #[sqlx(skip)]
    pub messages: Vec<ChatMessage>,
    pub user_info: Json<UserInfo>,
    #[sqlx(flatten)]
    pub session_info: SessionInfo,
    pub ai_analysis: Option<Json<MessageAnalysis>>,
    #[sqlx(flatten)]
    pub performance: Performance,
}
