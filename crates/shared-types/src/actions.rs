//! # Action Catalog
//!
//! The closed set of actions Core may ask the Gateway to perform, and the
//! strict payload schema for each.
//!
//! ## Design Rules
//!
//! - Every payload struct is `deny_unknown_fields`: an extra key is a caller
//!   bug and is rejected with `SCHEMA_INVALID`, never ignored.
//! - Actions that name an explicit destination (`web.fetch`,
//!   `service.api_call`, `model.download`) or a fixed provider (`web.search`)
//!   expose a `NetworkTarget` for the allow-list check.
//! - Account-bound actions (email, calendar, finance) reach hosts that were
//!   allow-listed when the account was connected; the adapter behind the
//!   handler enforces that, not the payload.

use crate::envelope::Payload;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

// =============================================================================
// ACTION TYPE
// =============================================================================

/// Every action the Gateway knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "email.fetch")]
    EmailFetch,
    #[serde(rename = "email.send")]
    EmailSend,
    #[serde(rename = "calendar.fetch")]
    CalendarFetch,
    #[serde(rename = "calendar.create")]
    CalendarCreate,
    #[serde(rename = "finance.fetch_transactions")]
    FinanceFetchTransactions,
    #[serde(rename = "web.search")]
    WebSearch,
    #[serde(rename = "web.fetch")]
    WebFetch,
    #[serde(rename = "service.api_call")]
    ServiceApiCall,
    #[serde(rename = "model.download")]
    ModelDownload,
}

impl ActionType {
    /// Every action, in declaration order.
    pub const ALL: [ActionType; 9] = [
        ActionType::EmailFetch,
        ActionType::EmailSend,
        ActionType::CalendarFetch,
        ActionType::CalendarCreate,
        ActionType::FinanceFetchTransactions,
        ActionType::WebSearch,
        ActionType::WebFetch,
        ActionType::ServiceApiCall,
        ActionType::ModelDownload,
    ];

    /// Dotted wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::EmailFetch => "email.fetch",
            ActionType::EmailSend => "email.send",
            ActionType::CalendarFetch => "calendar.fetch",
            ActionType::CalendarCreate => "calendar.create",
            ActionType::FinanceFetchTransactions => "finance.fetch_transactions",
            ActionType::WebSearch => "web.search",
            ActionType::WebFetch => "web.fetch",
            ActionType::ServiceApiCall => "service.api_call",
            ActionType::ModelDownload => "model.download",
        }
    }

    /// Whether the action changes state outside this machine.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ActionType::EmailSend | ActionType::CalendarCreate | ActionType::ServiceApiCall
        )
    }

    /// Requests allowed per rate window for this action alone.
    pub fn default_rate_limit(&self) -> u32 {
        match self {
            ActionType::EmailFetch => 30,
            ActionType::EmailSend => 10,
            ActionType::CalendarFetch => 30,
            ActionType::CalendarCreate => 10,
            ActionType::FinanceFetchTransactions => 10,
            ActionType::WebSearch => 30,
            ActionType::WebFetch => 30,
            ActionType::ServiceApiCall => 30,
            ActionType::ModelDownload => 3,
        }
    }

    /// Rough human time saved by one successful execution, for the audit trail.
    pub fn estimated_time_saved_seconds(&self) -> u32 {
        match self {
            ActionType::EmailFetch => 15,
            ActionType::EmailSend => 120,
            ActionType::CalendarFetch => 10,
            ActionType::CalendarCreate => 60,
            ActionType::FinanceFetchTransactions => 30,
            ActionType::WebSearch => 45,
            ActionType::WebFetch => 30,
            ActionType::ServiceApiCall => 20,
            ActionType::ModelDownload => 0,
        }
    }

    /// Validate `payload` against this action's strict schema.
    ///
    /// # Errors
    ///
    /// `SchemaError` when a field is missing, unknown, mistyped, or out of range.
    pub fn parse_payload(&self, payload: &Payload) -> Result<ActionPayload, SchemaError> {
        let parsed = match self {
            ActionType::EmailFetch => ActionPayload::EmailFetch(parse(*self, payload)?),
            ActionType::EmailSend => ActionPayload::EmailSend(parse(*self, payload)?),
            ActionType::CalendarFetch => ActionPayload::CalendarFetch(parse(*self, payload)?),
            ActionType::CalendarCreate => ActionPayload::CalendarCreate(parse(*self, payload)?),
            ActionType::FinanceFetchTransactions => {
                ActionPayload::FinanceFetchTransactions(parse(*self, payload)?)
            }
            ActionType::WebSearch => ActionPayload::WebSearch(parse(*self, payload)?),
            ActionType::WebFetch => ActionPayload::WebFetch(parse(*self, payload)?),
            ActionType::ServiceApiCall => ActionPayload::ServiceApiCall(parse(*self, payload)?),
            ActionType::ModelDownload => ActionPayload::ModelDownload(parse(*self, payload)?),
        };
        Ok(parsed)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an action name is not in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for ActionType {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

// =============================================================================
// SCHEMA VALIDATION
// =============================================================================

/// Which rule a rejected payload broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaViolation {
    MissingField,
    UnknownField,
    /// Wrong JSON type or an unrecognised enum value.
    InvalidValue,
    /// Well-typed but outside a range or format the action accepts.
    Constraint,
}

impl SchemaViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaViolation::MissingField => "missing_field",
            SchemaViolation::UnknownField => "unknown_field",
            SchemaViolation::InvalidValue => "invalid_value",
            SchemaViolation::Constraint => "constraint",
        }
    }
}

/// Payload rejected by an action schema.
///
/// `reason` may quote payload values. `violation` and `field` never do and
/// are what the Gateway logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("invalid {action} payload: {reason}")]
    Invalid {
        action: &'static str,
        violation: SchemaViolation,
        field: Option<String>,
        reason: String,
    },
}

impl SchemaError {
    pub fn violation(&self) -> SchemaViolation {
        match self {
            SchemaError::Invalid { violation, .. } => *violation,
        }
    }

    /// Top-level payload key at fault, when one can be named.
    pub fn field(&self) -> Option<&str> {
        match self {
            SchemaError::Invalid { field, .. } => field.as_deref(),
        }
    }
}

/// A post-deserialization rule that failed.
struct Broken {
    field: &'static str,
    reason: String,
}

/// Post-deserialization checks serde cannot express.
trait PayloadSchema: DeserializeOwned {
    fn check(&self) -> Result<(), Broken> {
        Ok(())
    }
}

fn parse<T: PayloadSchema>(action: ActionType, payload: &Payload) -> Result<T, SchemaError> {
    let parsed: T = serde_json::from_value(Value::Object(payload.clone())).map_err(|e| {
        let reason = e.to_string();
        let (violation, field) = classify_serde_error(&reason);
        SchemaError::Invalid {
            action: action.as_str(),
            violation,
            field,
            reason,
        }
    })?;
    parsed.check().map_err(|broken| SchemaError::Invalid {
        action: action.as_str(),
        violation: SchemaViolation::Constraint,
        field: Some(broken.field.to_string()),
        reason: broken.reason,
    })?;
    Ok(parsed)
}

/// serde names the offending key only for missing and unknown fields.
fn classify_serde_error(message: &str) -> (SchemaViolation, Option<String>) {
    let named = |prefix: &str| {
        message
            .strip_prefix(prefix)
            .and_then(|rest| rest.split('`').next())
            .map(str::to_string)
    };
    if let Some(field) = named("missing field `") {
        (SchemaViolation::MissingField, Some(field))
    } else if let Some(field) = named("unknown field `") {
        (SchemaViolation::UnknownField, Some(field))
    } else {
        (SchemaViolation::InvalidValue, None)
    }
}

fn require(condition: bool, field: &'static str, reason: &str) -> Result<(), Broken> {
    if condition {
        Ok(())
    } else {
        Err(Broken {
            field,
            reason: reason.to_string(),
        })
    }
}

fn non_empty(value: &str, field: &'static str) -> Result<(), Broken> {
    require(!value.trim().is_empty(), field, &format!("`{field}` must not be empty"))
}

fn valid_url(raw: &str, field: &'static str) -> Result<NetworkTarget, Broken> {
    NetworkTarget::from_url(raw).map_err(|reason| Broken { field, reason })
}

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmailFetchPayload {
    pub account_id: String,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    /// ISO-8601 lower bound.
    #[serde(default)]
    pub since: Option<String>,
}

impl PayloadSchema for EmailFetchPayload {
    fn check(&self) -> Result<(), Broken> {
        non_empty(&self.account_id, "accountId")?;
        if let Some(limit) = self.limit {
            require((1..=500).contains(&limit), "limit", "`limit` must be within 1..=500")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmailSendPayload {
    pub account_id: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub in_reply_to: Option<String>,
}

impl PayloadSchema for EmailSendPayload {
    fn check(&self) -> Result<(), Broken> {
        non_empty(&self.account_id, "accountId")?;
        require(!self.to.is_empty(), "to", "`to` needs at least one recipient")?;
        for (field, addresses) in [("to", &self.to), ("cc", &self.cc)] {
            for address in addresses {
                require(
                    address.contains('@') && !address.contains(char::is_whitespace),
                    field,
                    "recipients must be plain email addresses",
                )?;
            }
        }
        require(
            self.subject.chars().count() <= 998,
            "subject",
            "`subject` exceeds 998 characters",
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CalendarFetchPayload {
    pub account_id: String,
    #[serde(default)]
    pub calendar_id: Option<String>,
    pub start_date: String,
    pub end_date: String,
}

impl PayloadSchema for CalendarFetchPayload {
    fn check(&self) -> Result<(), Broken> {
        non_empty(&self.account_id, "accountId")?;
        non_empty(&self.start_date, "startDate")?;
        non_empty(&self.end_date, "endDate")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CalendarCreatePayload {
    pub account_id: String,
    #[serde(default)]
    pub calendar_id: Option<String>,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

impl PayloadSchema for CalendarCreatePayload {
    fn check(&self) -> Result<(), Broken> {
        non_empty(&self.account_id, "accountId")?;
        non_empty(&self.title, "title")?;
        non_empty(&self.start_time, "startTime")?;
        non_empty(&self.end_time, "endTime")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FinanceFetchTransactionsPayload {
    pub account_id: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl PayloadSchema for FinanceFetchTransactionsPayload {
    fn check(&self) -> Result<(), Broken> {
        non_empty(&self.account_id, "accountId")?;
        if let Some(limit) = self.limit {
            require((1..=1000).contains(&limit), "limit", "`limit` must be within 1..=1000")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WebSearchPayload {
    pub query: String,
    #[serde(default)]
    pub count: Option<u8>,
}

impl PayloadSchema for WebSearchPayload {
    fn check(&self) -> Result<(), Broken> {
        non_empty(&self.query, "query")?;
        require(
            self.query.chars().count() <= 1000,
            "query",
            "`query` exceeds 1000 characters",
        )?;
        if let Some(count) = self.count {
            require((1..=20).contains(&count), "count", "`count` must be within 1..=20")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WebFetchPayload {
    pub url: String,
    #[serde(default)]
    pub max_content_length: Option<u64>,
}

impl PayloadSchema for WebFetchPayload {
    fn check(&self) -> Result<(), Broken> {
        valid_url(&self.url, "url").map(|_| ())
    }
}

/// HTTP verbs `service.api_call` may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceApiCallPayload {
    pub service: String,
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl PayloadSchema for ServiceApiCallPayload {
    fn check(&self) -> Result<(), Broken> {
        non_empty(&self.service, "service")?;
        valid_url(&self.url, "url")?;
        require(
            !self
                .headers
                .keys()
                .any(|h| {
                    h.eq_ignore_ascii_case("authorization") || h.eq_ignore_ascii_case("cookie")
                }),
            "headers",
            "credential headers are attached by the Gateway, not the caller",
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelDownloadPayload {
    pub model_id: String,
    pub url: String,
    pub expected_sha256: String,
}

impl PayloadSchema for ModelDownloadPayload {
    fn check(&self) -> Result<(), Broken> {
        non_empty(&self.model_id, "modelId")?;
        require(self.url.starts_with("https://"), "url", "model downloads must use https")?;
        valid_url(&self.url, "url")?;
        require(
            self.expected_sha256.len() == 64
                && self.expected_sha256.chars().all(|c| c.is_ascii_hexdigit()),
            "expectedSha256",
            "`expectedSha256` must be 64 hex characters",
        )
    }
}

/// A payload that passed its action's schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    EmailFetch(EmailFetchPayload),
    EmailSend(EmailSendPayload),
    CalendarFetch(CalendarFetchPayload),
    CalendarCreate(CalendarCreatePayload),
    FinanceFetchTransactions(FinanceFetchTransactionsPayload),
    WebSearch(WebSearchPayload),
    WebFetch(WebFetchPayload),
    ServiceApiCall(ServiceApiCallPayload),
    ModelDownload(ModelDownloadPayload),
}

impl ActionPayload {
    /// The destination this payload will make the Gateway contact, if any.
    ///
    /// `search_provider` is the domain `web.search` is served from.
    pub fn network_target(&self, search_provider: &str) -> Option<NetworkTarget> {
        match self {
            ActionPayload::WebFetch(p) => NetworkTarget::from_url(&p.url).ok(),
            ActionPayload::ServiceApiCall(p) => NetworkTarget::from_url(&p.url).ok(),
            ActionPayload::ModelDownload(p) => NetworkTarget::from_url(&p.url).ok(),
            ActionPayload::WebSearch(_) => Some(NetworkTarget {
                domain: search_provider.to_string(),
                port: Some(443),
            }),
            ActionPayload::EmailFetch(_)
            | ActionPayload::EmailSend(_)
            | ActionPayload::CalendarFetch(_)
            | ActionPayload::CalendarCreate(_)
            | ActionPayload::FinanceFetchTransactions(_) => None,
        }
    }
}

// =============================================================================
// NETWORK TARGET
// =============================================================================

/// A `(domain, port)` pair the Gateway is about to contact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkTarget {
    pub domain: String,
    pub port: Option<u16>,
}

impl NetworkTarget {
    /// Extract the host and effective port of an http(s) URL.
    ///
    /// Embedded credentials are refused so `https://allowed.com@evil.com`
    /// cannot smuggle a different host past a reader.
    pub fn from_url(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw).map_err(|e| format!("invalid url: {e}"))?;
        match url.scheme() {
            "https" | "http" => {}
            other => return Err(format!("unsupported url scheme `{other}`")),
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err("url credentials are not allowed".to_string());
        }
        let host = url
            .host_str()
            .ok_or_else(|| "url host required".to_string())?;
        Ok(Self {
            domain: host.to_string(),
            port: url.port_or_known_default(),
        })
    }
}
