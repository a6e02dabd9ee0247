use crate::geofence::{within_geofence, GeoPoint, Location};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::locations::{find_location, location_from_row, LOCATION_COLUMNS};
use crate::ipc::handlers::users::load_actor;
use crate::ipc::params::{optional_point, optional_text, parse_params, require_db, required_date};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    local_day_bounds, now_timestamp, today_local, ApprovalStatus, AttendanceMethod,
    AttendanceType, Role,
};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentSummary {
    id: String,
    name: String,
    nis: Option<String>,
    class: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Attendance {
    id: String,
    user_id: String,
    location_id: String,
    #[serde(rename = "type")]
    kind: AttendanceType,
    method: AttendanceMethod,
    status: ApprovalStatus,
    photo: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    subject: Option<String>,
    created_at: String,
    location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<StudentSummary>,
}

const ATTENDANCE_COLUMNS: &str = "a.id, a.user_id, a.location_id, a.type, a.method, a.status,
     a.photo, a.latitude, a.longitude, a.subject, a.created_at";
const ATTENDANCE_COLUMN_COUNT: usize = 11;

fn parse_stored<T: std::str::FromStr<Err = String>>(
    r: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = r.get(idx)?;
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn attendance_from_row(r: &Row<'_>, with_user: bool) -> rusqlite::Result<Attendance> {
    let location = location_from_row(r, ATTENDANCE_COLUMN_COUNT)?;
    let user = if with_user {
        let o = ATTENDANCE_COLUMN_COUNT + 6;
        Some(StudentSummary {
            id: r.get(o)?,
            name: r.get(o + 1)?,
            nis: r.get(o + 2)?,
            class: r.get(o + 3)?,
        })
    } else {
        None
    };
    Ok(Attendance {
        id: r.get(0)?,
        user_id: r.get(1)?,
        location_id: r.get(2)?,
        kind: parse_stored(r, 3)?,
        method: parse_stored(r, 4)?,
        status: parse_stored(r, 5)?,
        photo: r.get(6)?,
        latitude: r.get(7)?,
        longitude: r.get(8)?,
        subject: r.get(9)?,
        created_at: r.get(10)?,
        location,
        user,
    })
}

fn select_with_location(filter_and_order: &str) -> String {
    format!(
        "SELECT {}, {}
         FROM attendances a
         JOIN locations l ON l.id = a.location_id
         {}",
        ATTENDANCE_COLUMNS,
        prefixed_location_columns(),
        filter_and_order
    )
}

fn prefixed_location_columns() -> String {
    LOCATION_COLUMNS
        .split(", ")
        .map(|c| format!("l.{}", c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAttendance {
    actor_id: String,
    location_id: String,
    #[serde(rename = "type")]
    kind: AttendanceType,
    method: AttendanceMethod,
    #[serde(default)]
    photo: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    subject: Option<String>,
}

/// Rejects submissions from outside a locked location's radius.
fn check_geofence(location: &Location, submitted: Option<&GeoPoint>) -> Result<(), HandlerErr> {
    let Some(point) = submitted else {
        return Ok(());
    };
    if within_geofence(location, point) {
        return Ok(());
    }
    let distance_m = location.point.distance_m(point);
    tracing::info!(
        location_id = %location.id,
        distance_m,
        radius_m = location.radius_m,
        "attendance rejected outside geofence"
    );
    Err(
        HandlerErr::new("outside_geofence", "You are too far from the attendance location")
            .with_details(json!({
                "locationId": location.id,
                "distanceMeters": distance_m,
                "radiusMeters": location.radius_m
            })),
    )
}

fn attendance_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: CreateAttendance = parse_params(params)?;
    let submitted = optional_point(p.latitude, p.longitude)?;
    let actor = load_actor(conn, &p.actor_id)?;
    let location = find_location(conn, &p.location_id)?.ok_or_else(|| {
        HandlerErr::not_found("Location not found").with_details(json!({ "locationId": p.location_id }))
    })?;

    check_geofence(&location, submitted.as_ref())?;

    let record = Attendance {
        id: Uuid::new_v4().to_string(),
        user_id: actor.id,
        location_id: location.id.clone(),
        kind: p.kind,
        method: p.method,
        status: ApprovalStatus::initial_for(actor.role),
        photo: optional_text(p.photo),
        latitude: submitted.map(|pt| pt.latitude),
        longitude: submitted.map(|pt| pt.longitude),
        subject: optional_text(p.subject),
        created_at: now_timestamp(),
        location,
        user: None,
    };
    conn.execute(
        "INSERT INTO attendances(
            id, user_id, location_id, type, method, status,
            photo, latitude, longitude, subject, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &record.id,
            &record.user_id,
            &record.location_id,
            record.kind.as_str(),
            record.method.as_str(),
            record.status.as_str(),
            &record.photo,
            record.latitude,
            record.longitude,
            &record.subject,
            &record.created_at,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "attendances" }))
    })?;
    tracing::debug!(attendance_id = %record.id, status = %record.status, "attendance recorded");

    Ok(json!({ "attendance": record }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorOnly {
    actor_id: String,
}

fn attendance_today(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: ActorOnly = parse_params(params)?;
    let (start, end) = local_day_bounds(today_local());
    let sql = select_with_location(
        "WHERE a.user_id = ?1 AND a.created_at >= ?2 AND a.created_at < ?3
         ORDER BY a.created_at, a.id",
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((&p.actor_id, &start, &end), |r| attendance_from_row(r, false))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "attendances": rows }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    actor_id: String,
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 10;

fn positive_or(v: Option<i64>, default: i64) -> i64 {
    v.filter(|n| *n > 0).unwrap_or(default)
}

fn page_count(total: i64, limit: i64) -> i64 {
    total / limit + i64::from(total % limit != 0)
}

fn attendance_history(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: HistoryParams = parse_params(params)?;
    let page = positive_or(p.page, DEFAULT_PAGE);
    let limit = positive_or(p.limit, DEFAULT_LIMIT);

    // The window only applies when both ends are given.
    let window = match (p.start_date.as_deref(), p.end_date.as_deref()) {
        (Some(s), Some(e)) => {
            let start = required_date(s, "startDate")?;
            let end = required_date(e, "endDate")?;
            if end < start {
                return Err(HandlerErr::bad_params("endDate must not be before startDate"));
            }
            Some((local_day_bounds(start).0, local_day_bounds(end).1))
        }
        _ => None,
    };
    let (from, until) = match &window {
        Some((f, u)) => (Some(f.as_str()), Some(u.as_str())),
        None => (None, None),
    };

    let filter = "WHERE a.user_id = ?1
           AND (?2 IS NULL OR a.created_at >= ?2)
           AND (?3 IS NULL OR a.created_at < ?3)";
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM attendances a {}", filter),
        (&p.actor_id, from, until),
        |r| r.get(0),
    )?;

    let sql = select_with_location(&format!(
        "{} ORDER BY a.created_at DESC, a.id DESC LIMIT ?4 OFFSET ?5",
        filter
    ));
    let offset = (page - 1).saturating_mul(limit);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((&p.actor_id, from, until, limit, offset), |r| {
            attendance_from_row(r, false)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let total_pages = page_count(total, limit);
    Ok(json!({
        "data": rows,
        "meta": {
            "total": total,
            "page": page,
            "limit": limit,
            "totalPages": total_pages
        }
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentsParams {
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

fn attendance_students(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: StudentsParams = parse_params(params)?;
    let day = match p.date.as_deref() {
        Some(raw) => required_date(raw, "date")?,
        None => today_local(),
    };
    let class = optional_text(p.class);
    let (start, end) = local_day_bounds(day);

    let sql = format!(
        "SELECT {}, {}, u.id, u.name, u.nis, u.class
         FROM attendances a
         JOIN locations l ON l.id = a.location_id
         JOIN users u ON u.id = a.user_id
         WHERE u.role = ?1
           AND (?2 IS NULL OR u.class = ?2)
           AND a.created_at >= ?3 AND a.created_at < ?4
         ORDER BY u.class, u.name, a.created_at",
        ATTENDANCE_COLUMNS,
        prefixed_location_columns()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (Role::Student.as_str(), class.as_deref(), &start, &end),
            |r| attendance_from_row(r, true),
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "date": day.format("%Y-%m-%d").to_string(), "attendances": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.create" => require_db(state).and_then(|conn| attendance_create(conn, &req.params)),
        "attendance.today" => require_db(state).and_then(|conn| attendance_today(conn, &req.params)),
        "attendance.history" => {
            require_db(state).and_then(|conn| attendance_history(conn, &req.params))
        }
        "attendance.students" => {
            require_db(state).and_then(|conn| attendance_students(conn, &req.params))
        }
        _ => return None,
    };
    Some(respond(&req.id, result))
}
