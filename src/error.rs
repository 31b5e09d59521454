use std::{any::Any, error::Error as StdError, fmt, sync::Arc};

use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

pub const COURTBOT_ERROR_NAME: &str = "Courtbot Error";

/// Category tag of a [`CourtbotError`].
///
/// Errors are distinguished by tag rather than by type; the `Api*` tags are
/// reserved for transport collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum ErrorType {
    #[default]
    General,
    /// A provider's pending work rejected during aggregation.
    Retrieval,
    ApiGeneral,
    ApiGet,
    Custom(String),
}

impl ErrorType {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorType::General => "general",
            ErrorType::Retrieval => "retrieval",
            ErrorType::ApiGeneral => "api-error--general",
            ErrorType::ApiGet => "api-error--get",
            ErrorType::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ErrorType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "general" => ErrorType::General,
            "retrieval" => ErrorType::Retrieval,
            "api-error--general" => ErrorType::ApiGeneral,
            "api-error--get" => ErrorType::ApiGet,
            _ => ErrorType::Custom(tag),
        }
    }
}

impl From<ErrorType> for String {
    fn from(kind: ErrorType) -> Self {
        kind.as_str().to_string()
    }
}

/// Whatever a provider's pending work rejected with.
#[derive(Debug, Clone)]
pub enum Rejection {
    Courtbot(CourtbotError),
    Error(Arc<dyn StdError + Send + Sync>),
    Value(Value),
}

impl Rejection {
    pub fn error<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Rejection::Error(Arc::new(err))
    }

    /// A panic raised by provider or listener code, as a primitive failure
    /// value carrying the panic message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => message.to_string(),
                Err(_) => "provider panicked".to_string(),
            },
        };
        Rejection::Value(Value::String(format!("panic: {}", message)))
    }

    fn describe(&self) -> String {
        match self {
            Rejection::Courtbot(err) => err.message.clone(),
            Rejection::Error(err) => err.to_string(),
            Rejection::Value(Value::String(s)) => s.clone(),
            Rejection::Value(v) => v.to_string(),
        }
    }
}

impl From<CourtbotError> for Rejection {
    fn from(err: CourtbotError) -> Self {
        Rejection::Courtbot(err)
    }
}

impl From<Value> for Rejection {
    fn from(value: Value) -> Self {
        Rejection::Value(value)
    }
}

impl From<&str> for Rejection {
    fn from(value: &str) -> Self {
        Rejection::Value(Value::String(value.to_string()))
    }
}

impl From<String> for Rejection {
    fn from(value: String) -> Self {
        Rejection::Value(Value::String(value))
    }
}

impl From<anyhow::Error> for Rejection {
    fn from(err: anyhow::Error) -> Self {
        let err: Box<dyn StdError + Send + Sync> = err.into();
        Rejection::Error(Arc::from(err))
    }
}

/// The cause recorded on a [`CourtbotError`].
#[derive(Debug, Clone)]
pub enum CausalError {
    /// A foreign error type, kept as is.
    Error(Arc<dyn StdError + Send + Sync>),
    /// A structured (object or array) failure value, kept verbatim.
    Object(Value),
    /// A primitive failure value, boxed as `{ data: value }`.
    Data { data: Value },
}

impl CausalError {
    /// The boxed primitive, if this cause was a primitive.
    pub fn data(&self) -> Option<&Value> {
        match self {
            CausalError::Data { data } => Some(data),
            _ => None,
        }
    }
}

impl From<Value> for CausalError {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => CausalError::Object(value),
            data => CausalError::Data { data },
        }
    }
}

impl Serialize for CausalError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CausalError::Error(err) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("message", &err.to_string())?;
                map.end()
            }
            CausalError::Object(value) => value.serialize(serializer),
            CausalError::Data { data } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("data", data)?;
                map.end()
            }
        }
    }
}

/// Optional settings for [`CourtbotError::new`]; unset fields take the
/// documented defaults.
#[derive(Debug, Clone, Default)]
pub struct ErrorSettings {
    pub kind: Option<ErrorType>,
    pub message: Option<String>,
    pub case: Option<String>,
    pub api: Option<String>,
    pub timestamp: Option<String>,
    pub initial_error: Option<CausalError>,
}

impl ErrorSettings {
    pub fn kind(mut self, kind: ErrorType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn case(mut self, case: impl Into<String>) -> Self {
        self.case = Some(case.into());
        self
    }

    pub fn api(mut self, api: impl Into<String>) -> Self {
        self.api = Some(api.into());
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// The single domain error of the system.
///
/// Immutable once built: the fields are only readable through accessors.
#[derive(Debug, Clone, Serialize)]
pub struct CourtbotError {
    #[serde(rename = "type")]
    kind: ErrorType,
    message: String,
    case: String,
    api: String,
    timestamp: String,
    initial_error: Option<CausalError>,
}

impl CourtbotError {
    pub fn new(settings: ErrorSettings) -> Self {
        // empty strings fall back to the defaults as well
        fn or_default(value: Option<String>, default: &str) -> String {
            value
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        }

        Self {
            kind: settings.kind.unwrap_or_default(),
            message: or_default(settings.message, "No message listed"),
            case: or_default(settings.case, "No case listed"),
            api: or_default(settings.api, "No api listed"),
            timestamp: or_default(settings.timestamp, "No timestamp listed"),
            initial_error: settings.initial_error,
        }
    }

    /// Normalise a rejection into a `CourtbotError`.
    ///
    /// An existing `CourtbotError` comes back unchanged; anything else becomes
    /// the `initial_error` of a new error built from `settings`.
    pub fn wrap_if_needed(rejection: Rejection, settings: ErrorSettings) -> Self {
        let cause = match rejection {
            Rejection::Courtbot(err) => return err,
            Rejection::Error(err) => CausalError::Error(err),
            Rejection::Value(value) => CausalError::from(value),
        };
        CourtbotError::new(ErrorSettings {
            initial_error: Some(cause),
            ..settings
        })
    }

    pub fn name(&self) -> &'static str {
        COURTBOT_ERROR_NAME
    }

    pub fn kind(&self) -> &ErrorType {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn case(&self) -> &str {
        &self.case
    }

    pub fn api(&self) -> &str {
        &self.api
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn initial_error(&self) -> Option<&CausalError> {
        self.initial_error.as_ref()
    }
}

impl Default for CourtbotError {
    fn default() -> Self {
        CourtbotError::new(ErrorSettings::default())
    }
}

impl fmt::Display for CourtbotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [type: {}, case: {}, api: {}]",
            COURTBOT_ERROR_NAME, self.message, self.kind, self.case, self.api
        )
    }
}

impl StdError for CourtbotError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.initial_error {
            Some(CausalError::Error(err)) => Some(err.as_ref() as &(dyn StdError + 'static)),
            _ => None,
        }
    }
}

/// Build the settings an aggregation uses to tag a failure.
pub(crate) fn retrieval_settings(topic: &str, case_id: &str, rejection: &Rejection) -> ErrorSettings {
    ErrorSettings::default()
        .kind(ErrorType::Retrieval)
        .message(format!("`{}` provider failed: {}", topic, rejection.describe()))
        .case(case_id)
        .api(topic)
        .timestamp(chrono::Utc::now().to_rfc3339())
}
