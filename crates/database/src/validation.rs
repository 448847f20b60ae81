//! Field validation for intake submissions.
//!
//! Submissions arrive with every field optional. A [`FieldValidator`] walks the
//! fields, collects every problem it finds and hands back the cleaned values,
//! so a rejected form reports all failing fields at once.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid email format.
    InvalidEmail(String),
    /// Value too long.
    TooLong { field: String, max: usize, actual: usize },
    /// Empty value where one is required.
    Empty(String),
    /// Required field absent.
    Missing(String),
    /// Number outside the accepted range.
    OutOfRange { field: String, min: i64, max: i64 },
    /// Value not among the accepted choices.
    InvalidChoice { field: String, value: String },
    /// Value does not match the expected format.
    InvalidFormat { field: String, expected: String },
}

impl ValidationError {
    /// Name of the submitted field this error is about.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::InvalidEmail(_) => "email",
            ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidChoice { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field,
            ValidationError::Empty(field) | ValidationError::Missing(field) => field,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidEmail(msg) => write!(f, "Invalid email: {}", msg),
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is too long ({} chars, max {})", field, actual, max)
            }
            ValidationError::Empty(field) => write!(f, "{} cannot be empty", field),
            ValidationError::Missing(field) => write!(f, "{} is required", field),
            ValidationError::OutOfRange { field, min, max } => {
                write!(f, "{} must be between {} and {}", field, min, max)
            }
            ValidationError::InvalidChoice { field, value } => {
                write!(f, "'{}' is not a valid {}", value, field)
            }
            ValidationError::InvalidFormat { field, expected } => {
                write!(f, "{} must use {} format", field, expected)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// A field-attributed message, as reported to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every validation problem found in one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// A single-error list.
    pub fn single(error: ValidationError) -> Self {
        Self(vec![error])
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any error is attributed to `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field() == field)
    }

    /// Errors as `{field, message}` pairs.
    pub fn to_fields(&self) -> Vec<FieldError> {
        self.0
            .iter()
            .map(|e| FieldError {
                field: e.field().to_string(),
                message: e.to_string(),
            })
            .collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "validation failed: {}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Maximum allowed length for email addresses.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Validate an email address (basic RFC 5322 format check).
///
/// This is a basic validation that checks:
/// - Contains exactly one @
/// - Has at least one character before @
/// - Has at least one character after @
/// - Has at least one dot after @
/// - Is not too long
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();

    if email.is_empty() {
        return Err(ValidationError::Empty("email".to_string()));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            field: "email".to_string(),
            max: MAX_EMAIL_LENGTH,
            actual: email.len(),
        });
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail(
            "must contain exactly one @ symbol".to_string(),
        ));
    };

    if domain.contains('@') {
        return Err(ValidationError::InvalidEmail(
            "must contain exactly one @ symbol".to_string(),
        ));
    }

    if local.is_empty() {
        return Err(ValidationError::InvalidEmail(
            "missing local part (before @)".to_string(),
        ));
    }

    if domain.is_empty() {
        return Err(ValidationError::InvalidEmail(
            "missing domain (after @)".to_string(),
        ));
    }

    if !domain.contains('.') {
        return Err(ValidationError::InvalidEmail(
            "domain must contain at least one dot".to_string(),
        ));
    }

    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(ValidationError::InvalidEmail(
            "domain cannot start or end with a dot".to_string(),
        ));
    }

    if domain.contains("..") {
        return Err(ValidationError::InvalidEmail(
            "domain cannot contain consecutive dots".to_string(),
        ));
    }

    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail(
            "cannot contain whitespace".to_string(),
        ));
    }

    Ok(())
}

/// Whether `value` is a 24-hour `H:MM` or `HH:MM` clock time.
pub fn is_clock_time(value: &str) -> bool {
    clock_minutes(value).is_some()
}

/// Minutes since midnight for a valid clock time.
pub fn clock_minutes(value: &str) -> Option<u32> {
    let (hours, minutes) = value.split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    if !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    (hours < 24 && minutes < 60).then_some(hours * 60 + minutes)
}

/// Accept a number sent either as JSON number or as numeric text.
///
/// Form posts often carry numbers as strings; text that is not a number
/// deserializes to `None` and is reported by the validator as missing.
/// Fractional numbers are also `None`.
pub fn lenient_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Int(n)) => Some(n),
        Some(Raw::Float(f)) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        Some(Raw::Float(_)) => None,
        Some(Raw::Text(s)) => s.trim().parse().ok(),
    })
}

/// Collects validation errors while extracting cleaned field values.
#[derive(Debug, Default)]
pub struct FieldValidator {
    errors: Vec<ValidationError>,
}

impl FieldValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error found by custom logic.
    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> ValidationErrors {
        ValidationErrors(self.errors)
    }

    /// Trimmed, non-empty text no longer than `max` chars.
    pub fn required_text(&mut self, field: &str, value: Option<&str>, max: usize) -> Option<String> {
        match value.map(str::trim) {
            None | Some("") => {
                self.push(ValidationError::Missing(field.to_string()));
                None
            }
            Some(text) => self.bounded(field, text, max),
        }
    }

    /// Trimmed text if present; blank counts as absent.
    pub fn optional_text(&mut self, field: &str, value: Option<&str>, max: usize) -> Option<String> {
        match value.map(str::trim) {
            None | Some("") => None,
            Some(text) => self.bounded(field, text, max),
        }
    }

    fn bounded(&mut self, field: &str, text: &str, max: usize) -> Option<String> {
        let actual = text.chars().count();
        if actual > max {
            self.push(ValidationError::TooLong {
                field: field.to_string(),
                max,
                actual,
            });
            return None;
        }
        Some(text.to_string())
    }

    /// A required value parsed by `parse`.
    pub fn required_choice<T>(
        &mut self,
        field: &str,
        value: Option<&str>,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        match value.map(str::trim) {
            None | Some("") => {
                self.push(ValidationError::Missing(field.to_string()));
                None
            }
            Some(raw) => self.choice(field, raw, parse),
        }
    }

    /// An optional value parsed by `parse`; invalid input is still an error.
    pub fn optional_choice<T>(
        &mut self,
        field: &str,
        value: Option<&str>,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Option<T> {
        match value.map(str::trim) {
            None | Some("") => None,
            Some(raw) => self.choice(field, raw, parse),
        }
    }

    /// Each entry parsed by `parse`; invalid entries are reported and skipped.
    pub fn choices<T>(
        &mut self,
        field: &str,
        values: &[String],
        parse: impl Fn(&str) -> Option<T>,
    ) -> Vec<T> {
        values
            .iter()
            .filter_map(|raw| self.choice(field, raw, &parse))
            .collect()
    }

    fn choice<T>(&mut self, field: &str, raw: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let parsed = parse(raw);
        if parsed.is_none() {
            self.push(ValidationError::InvalidChoice {
                field: field.to_string(),
                value: raw.to_string(),
            });
        }
        parsed
    }

    /// A required email address, lower-cased.
    pub fn email(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let email = self.required_text(field, value, MAX_EMAIL_LENGTH)?;
        match validate_email(&email) {
            Ok(()) => Some(email.to_lowercase()),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    /// A required integer within `min..=max`.
    pub fn range(&mut self, field: &str, value: Option<i64>, min: i64, max: i64) -> Option<i64> {
        match value {
            None => {
                self.push(ValidationError::Missing(field.to_string()));
                None
            }
            Some(n) if n < min || n > max => {
                self.push(ValidationError::OutOfRange {
                    field: field.to_string(),
                    min,
                    max,
                });
                None
            }
            Some(n) => Some(n),
        }
    }

    /// A required clock time (`HH:MM`).
    pub fn clock(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let text = self.required_text(field, value, 5)?;
        if is_clock_time(&text) {
            Some(text)
        } else {
            self.push(ValidationError::InvalidFormat {
                field: field.to_string(),
                expected: "HH:MM".to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_valid() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("user.name@domain.co.uk").is_ok());
        assert!(validate_email("a@b.c").is_ok());
        assert!(validate_email(" test@example.com ").is_ok()); // trimmed
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(matches!(validate_email(""), Err(ValidationError::Empty(_))));

        for bad in [
            "test.example.com",
            "test@example@com",
            "@example.com",
            "test@",
            "test@localhost",
            "test@.example.com",
            "test@example.com.",
            "test@example..com",
            "te st@example.com",
        ] {
            assert!(
                matches!(validate_email(bad), Err(ValidationError::InvalidEmail(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_email_too_long() {
        let email = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            validate_email(&email),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_clock_time() {
        assert_eq!(clock_minutes("09:30"), Some(570));
        assert_eq!(clock_minutes("9:05"), Some(545));
        assert_eq!(clock_minutes("23:59"), Some(1439));
        assert!(!is_clock_time("24:00"));
        assert!(!is_clock_time("12:60"));
        assert!(!is_clock_time("12:5"));
        assert!(!is_clock_time("noon"));
        assert!(!is_clock_time("+1:30"));
    }

    #[test]
    fn test_field_validator_collects_all_errors() {
        let mut v = FieldValidator::new();

        assert_eq!(v.required_text("fullName", Some("  Ada  "), 100), Some("Ada".to_string()));
        assert_eq!(v.required_text("phone", Some("   "), 20), None);
        assert_eq!(v.range("age", Some(0), 1, 120), None);
        assert_eq!(v.email("email", Some("Ada@Example.COM")), Some("ada@example.com".to_string()));
        assert_eq!(v.optional_text("notes", None, 10), None);
        assert_eq!(v.optional_text("notes", Some("x".repeat(11).as_str()), 10), None);

        assert!(!v.is_valid());
        let errors = v.into_errors();
        assert_eq!(errors.errors().len(), 3);
        assert!(errors.has_field("phone"));
        assert!(errors.has_field("age"));
        assert!(errors.has_field("notes"));
        assert!(!errors.has_field("email"));
    }

    #[test]
    fn test_choice_helpers() {
        let parse = |s: &str| (s == "yes").then_some(true);
        let mut v = FieldValidator::new();

        assert_eq!(v.required_choice("answer", Some("yes"), parse), Some(true));
        assert_eq!(v.optional_choice("answer", None, parse), None);
        assert!(v.is_valid());

        assert_eq!(v.required_choice("answer", Some("maybe"), parse), None);
        let list = v.choices("answers", &["yes".to_string(), "no".to_string()], parse);
        assert_eq!(list, vec![true]);

        let errors = v.into_errors();
        assert_eq!(
            errors.errors()[0],
            ValidationError::InvalidChoice {
                field: "answer".to_string(),
                value: "maybe".to_string()
            }
        );
        assert_eq!(errors.to_fields()[1].field, "answers");
    }

    #[test]
    fn test_lenient_number() {
        #[derive(Deserialize)]
        struct Form {
            #[serde(default, deserialize_with = "lenient_number")]
            age: Option<i64>,
        }

        let parse = |json: &str| serde_json::from_str::<Form>(json).unwrap().age;
        assert_eq!(parse(r#"{"age": 30}"#), Some(30));
        assert_eq!(parse(r#"{"age": "42"}"#), Some(42));
        assert_eq!(parse(r#"{"age": 4.0}"#), Some(4));
        assert_eq!(parse(r#"{"age": 120.9}"#), None);
        assert_eq!(parse(r#"{"age": "120.9"}"#), None);
        assert_eq!(parse(r#"{"age": "old"}"#), None);
        assert_eq!(parse(r#"{"age": null}"#), None);
        assert_eq!(parse(r#"{}"#), None);
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidEmail("test message".to_string());
        assert_eq!(err.to_string(), "Invalid email: test message");

        let err = ValidationError::TooLong {
            field: "email".to_string(),
            max: 254,
            actual: 300,
        };
        assert_eq!(err.to_string(), "email is too long (300 chars, max 254)");

        let err = ValidationError::OutOfRange {
            field: "age".to_string(),
            min: 1,
            max: 120,
        };
        assert_eq!(err.to_string(), "age must be between 1 and 120");
    }
}
