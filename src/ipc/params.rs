use crate::geofence::{CoordinateError, GeoPoint};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::model::parse_date;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::de::DeserializeOwned;

impl From<CoordinateError> for HandlerErr {
    fn from(e: CoordinateError) -> Self {
        HandlerErr::bad_params(e.to_string())
    }
}

/// Decodes `params` into a typed request body.
pub fn parse_params<T: DeserializeOwned>(params: &serde_json::Value) -> Result<T, HandlerErr> {
    let value = if params.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(value).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_text(value: String, key: &str) -> Result<String, HandlerErr> {
    let t = value.trim();
    if t.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(t.to_string())
}

pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn required_date(raw: &str, key: &str) -> Result<NaiveDate, HandlerErr> {
    parse_date(raw).ok_or_else(|| {
        HandlerErr::bad_params(format!("{} must be YYYY-MM-DD or an RFC 3339 timestamp", key))
    })
}

/// Both coordinates or neither; a lone one is a malformed submission.
pub fn optional_point(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<Option<GeoPoint>, HandlerErr> {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => Ok(Some(GeoPoint::new(lat, lon)?)),
        (None, None) => Ok(None),
        _ => Err(HandlerErr::bad_params(
            "latitude and longitude must be given together",
        )),
    }
}
