//! Defensive parsing of extraction replies.
//!
//! Stages, in order: the whole (fence-stripped) reply as a JSON object; the
//! slice between the first `{` and the last `}`; per-field regexes. Anything
//! still missing stays empty.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use confscout_common::ExtractedFields;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON value is not an object")]
    NotAnObject,

    #[error("no braces in reply")]
    NoObject,
}

/// How far down the fallback ladder a reply had to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Direct,
    BraceSlice,
    FieldPatterns,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub fields: ExtractedFields,
    pub stage: ParseStage,
}

#[derive(Clone, Copy)]
enum Field {
    SubmissionDeadline,
    SubmissionFee,
    RegistrationFee,
    Continent,
}

impl Field {
    const ALL: [Field; 4] = [
        Field::SubmissionDeadline,
        Field::SubmissionFee,
        Field::RegistrationFee,
        Field::Continent,
    ];

    /// Accepted keys, canonical first.
    fn keys(self) -> &'static [&'static str] {
        match self {
            Field::SubmissionDeadline => &["Submission Deadline"],
            Field::SubmissionFee => &["Submission Fee", "Submission Fees"],
            Field::RegistrationFee => &["Registration Fee", "Registration Fees"],
            Field::Continent => &["Continent"],
        }
    }

    fn slot(self, fields: &mut ExtractedFields) -> &mut String {
        match self {
            Field::SubmissionDeadline => &mut fields.submission_deadline,
            Field::SubmissionFee => &mut fields.submission_fee,
            Field::RegistrationFee => &mut fields.registration_fee,
            Field::Continent => &mut fields.continent,
        }
    }
}

static FIELD_PATTERNS: LazyLock<Vec<(Field, Regex)>> = LazyLock::new(|| {
    [
        (Field::SubmissionDeadline, r#""Submission Deadline"\s*:\s*"([^"]*)""#),
        (Field::SubmissionFee, r#""Submission Fees?"\s*:\s*"([^"]*)""#),
        (Field::RegistrationFee, r#""Registration Fees?"\s*:\s*"([^"]*)""#),
        (Field::Continent, r#""Continent"\s*:\s*"([^"]*)""#),
    ]
    .into_iter()
    .map(|(field, pattern)| (field, Regex::new(pattern).expect("valid regex")))
    .collect()
});

const PLACEHOLDERS: &[&str] = &["nan", "none", "null", "n/a", "not mentioned", "not found"];

/// Trim and blank out placeholder values the service uses for "unknown".
pub fn clean_value(raw: &str) -> String {
    let value = raw.trim();
    if PLACEHOLDERS.contains(&value.to_lowercase().as_str()) {
        String::new()
    } else {
        value.to_string()
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => clean_value(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn fields_from_object(object: &Map<String, Value>) -> ExtractedFields {
    let mut fields = ExtractedFields::default();
    for field in Field::ALL {
        if let Some(value) = field.keys().iter().find_map(|k| object.get(*k)) {
            *field.slot(&mut fields) = value_text(value);
        }
    }
    fields
}

fn parse_object(text: &str) -> Result<ExtractedFields, ParseError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(object) => Ok(fields_from_object(&object)),
        _ => Err(ParseError::NotAnObject),
    }
}

fn brace_slice(text: &str) -> Result<&str, ParseError> {
    let start = text.find('{').ok_or(ParseError::NoObject)?;
    let end = text.rfind('}').ok_or(ParseError::NoObject)?;
    if end <= start {
        return Err(ParseError::NoObject);
    }
    Ok(&text[start..=end])
}

fn from_patterns(text: &str) -> ExtractedFields {
    let mut fields = ExtractedFields::default();
    for (field, regex) in FIELD_PATTERNS.iter() {
        if let Some(m) = regex.captures(text).and_then(|c| c.get(1)) {
            *field.slot(&mut fields) = clean_value(m.as_str());
        }
    }
    fields
}

/// Parse a raw reply. Never fails; unrecoverable replies give empty fields.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let text = ai_client::strip_code_blocks(raw.trim());

    if let Ok(fields) = parse_object(text) {
        return ParsedReply {
            fields,
            stage: ParseStage::Direct,
        };
    }
    if let Ok(fields) = brace_slice(text).and_then(parse_object) {
        return ParsedReply {
            fields,
            stage: ParseStage::BraceSlice,
        };
    }
    let fields = from_patterns(text);
    let stage = if fields.is_empty() {
        ParseStage::Empty
    } else {
        ParseStage::FieldPatterns
    };
    ParsedReply { fields, stage }
}
