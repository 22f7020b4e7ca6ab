use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Delay between an approval and the moment its queue entry becomes due.
pub const QUEUE_DELAY_SECONDS: i64 = 60;

/// Maximum number of posts returned by the pending listing.
pub const PENDING_LIMIT: usize = 20;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,32}$").expect("valid username regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported decision '{0}': expected one of approved, rejected")]
    Decision(String),
    #[error("invalid username '{0}': expected 1-32 letters, digits or underscores after an optional '@'")]
    Username(String),
    #[error("unsupported category '{given}': expected one of {allowed}")]
    Category { given: String, allowed: String },
    #[error("unknown post status '{0}'")]
    Status(String),
    #[error("unknown platform '{0}'")]
    Platform(String),
}

/// Row identifier as handed out by the store. Hosted tables may use bigint or
/// uuid keys, so both shapes are accepted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(id) => write!(f, "{}", id),
            RowId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        RowId::Int(id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Approved,
    Published,
    Rejected,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Approved => "approved",
            PostStatus::Published => "published",
            PostStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for PostStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PostStatus::Pending),
            "approved" => Ok(PostStatus::Approved),
            "published" => Ok(PostStatus::Published),
            "rejected" => Ok(PostStatus::Rejected),
            other => Err(ValidationError::Status(other.to_string())),
        }
    }
}

/// Moderation outcome accepted by the decide endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn status(&self) -> PostStatus {
        match self {
            Decision::Approved => PostStatus::Approved,
            Decision::Rejected => PostStatus::Rejected,
        }
    }

    pub fn enqueues(&self) -> bool {
        matches!(self, Decision::Approved)
    }
}

impl FromStr for Decision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            _ => Err(ValidationError::Decision(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
        }
    }
}

impl FromStr for Platform {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Platform::Telegram),
            other => Err(ValidationError::Platform(other.to_string())),
        }
    }
}

/// A post awaiting or past moderation. Content columns are owned by the
/// ingestion side and passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: RowId,
    pub status: PostStatus,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Parse an RFC 3339 timestamp, or a timestamp without an offset (as a
/// `timestamp without time zone` column returns it) taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(de::Error::custom)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub id: RowId,
    pub username: String,
    pub category: String,
    pub is_active: bool,
}

/// Insert payload for a source; `username` is already normalized.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewSource {
    pub username: String,
    pub category: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntry {
    pub post_id: RowId,
    pub platform: Platform,
    pub scheduled_for: DateTime<Utc>,
}

impl QueueEntry {
    /// Entry for a post approved at `now`.
    pub fn for_approval(post_id: RowId, now: DateTime<Utc>) -> Self {
        Self {
            post_id,
            platform: Platform::Telegram,
            scheduled_for: now + chrono::Duration::seconds(QUEUE_DELAY_SECONDS),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub total: u64,
    pub published: u64,
}

/// Normalize a chat handle to exactly one leading `@`.
pub fn normalize_username(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let handle = trimmed.strip_prefix('@').unwrap_or(trimmed);
    if !USERNAME_RE.is_match(handle) {
        return Err(ValidationError::Username(raw.to_string()));
    }
    Ok(format!("@{}", handle))
}
