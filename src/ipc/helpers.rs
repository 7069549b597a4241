use crate::absence::ValidationError;
use crate::assign::ChoiceError;
use crate::clock;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::selection::SelectionError;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    /// Validation failure attributed to one request field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: Some(json!({ "field": field.into() })),
        }
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        Self {
            code: "not_found",
            message: format!("{} not found", what),
            details: Some(json!({ "id": id })),
        }
    }

    pub fn query(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn update(e: impl std::fmt::Display, table: &str) -> Self {
        Self {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": table })),
        }
    }

    pub fn tx(e: impl std::fmt::Display) -> Self {
        Self::new("db_tx_failed", e.to_string())
    }

    pub fn commit(e: impl std::fmt::Display) -> Self {
        Self::new("db_commit_failed", e.to_string())
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ValidationError> for HandlerErr {
    fn from(e: ValidationError) -> Self {
        Self::field(e.field(), e.to_string())
    }
}

impl From<ChoiceError> for HandlerErr {
    fn from(e: ChoiceError) -> Self {
        Self::field(e.field(), e.to_string())
    }
}

impl From<SelectionError> for HandlerErr {
    fn from(e: SelectionError) -> Self {
        let code = match e {
            SelectionError::UnknownEvent(_) => "unknown_event",
            SelectionError::MenuOpen
            | SelectionError::DialogOpen
            | SelectionError::NoDialog
            | SelectionError::NothingSelected
            | SelectionError::NothingToApply
            | SelectionError::NothingToRemove => "invalid_action",
        };
        Self::new(code, e.to_string())
    }
}

/// Wraps a handler result in the response envelope, logging failures.
pub fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::warn!(method = %req.method, code = e.code, message = %e.message, "request failed");
            e.response(&req.id)
        }
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::field(key, format!("missing {}", key)))
}

pub fn opt_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| HandlerErr::field(key, format!("{} must be string or null", key)))?;
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
    }
}

pub fn opt_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match opt_str(params, key)? {
        None => Ok(None),
        Some(s) => clock::parse_date(&s)
            .map(Some)
            .ok_or_else(|| HandlerErr::field(key, format!("{} must be YYYY-MM-DD", key))),
    }
}

pub fn required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    opt_date(params, key)?.ok_or_else(|| HandlerErr::field(key, format!("missing {}", key)))
}

pub fn string_list(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::field(key, format!("missing {}", key)));
    };
    Ok(items
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Deserializes `params[key]` into `T`, reporting serde errors against `key`.
pub fn typed_param<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, HandlerErr> {
    let raw = params
        .get(key)
        .cloned()
        .ok_or_else(|| HandlerErr::field(key, format!("missing {}", key)))?;
    serde_json::from_value(raw).map_err(|e| HandlerErr::field(key, e.to_string()))
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("internal", e.to_string()))
}
