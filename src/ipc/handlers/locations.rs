use crate::geofence::{validate_radius, GeoPoint, Location};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::{parse_params, require_db, required_text};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

pub const LOCATION_COLUMNS: &str = "id, name, latitude, longitude, radius, is_locked";

pub fn location_from_row(r: &Row<'_>, offset: usize) -> rusqlite::Result<Location> {
    Ok(Location {
        id: r.get(offset)?,
        name: r.get(offset + 1)?,
        point: GeoPoint {
            latitude: r.get(offset + 2)?,
            longitude: r.get(offset + 3)?,
        },
        radius_m: r.get(offset + 4)?,
        is_locked: r.get::<_, i64>(offset + 5)? != 0,
    })
}

pub fn find_location(conn: &Connection, location_id: &str) -> Result<Option<Location>, HandlerErr> {
    let sql = format!("SELECT {} FROM locations WHERE id = ?", LOCATION_COLUMNS);
    Ok(conn
        .query_row(&sql, [location_id], |r| location_from_row(r, 0))
        .optional()?)
}

fn load_location(conn: &Connection, location_id: &str) -> Result<Location, HandlerErr> {
    find_location(conn, location_id)?.ok_or_else(|| {
        HandlerErr::not_found("Location not found").with_details(json!({ "locationId": location_id }))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLocation {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    radius: Option<f64>,
    #[serde(default)]
    is_locked: Option<bool>,
}

fn locations_create(
    conn: &Connection,
    default_radius_m: f64,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let p: CreateLocation = parse_params(params)?;
    let location = Location {
        id: Uuid::new_v4().to_string(),
        name: required_text(p.name, "name")?,
        point: GeoPoint::new(p.latitude, p.longitude)?,
        is_locked: p.is_locked.unwrap_or(false),
        radius_m: validate_radius(p.radius.unwrap_or(default_radius_m))?,
    };
    conn.execute(
        "INSERT INTO locations(id, name, latitude, longitude, radius, is_locked)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &location.id,
            &location.name,
            location.point.latitude,
            location.point.longitude,
            location.radius_m,
            location.is_locked as i64,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "locations" }))
    })?;

    Ok(json!({ "location": location }))
}

fn locations_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!("SELECT {} FROM locations ORDER BY name, id", LOCATION_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let locations = stmt
        .query_map([], |r| location_from_row(r, 0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "locations": locations }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateLocation {
    location_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    radius: Option<f64>,
    #[serde(default)]
    is_locked: Option<bool>,
}

fn locations_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: UpdateLocation = parse_params(params)?;
    let mut location = load_location(conn, &p.location_id)?;

    if let Some(name) = p.name {
        location.name = required_text(name, "name")?;
    }
    location.point = GeoPoint::new(
        p.latitude.unwrap_or(location.point.latitude),
        p.longitude.unwrap_or(location.point.longitude),
    )?;
    if let Some(radius) = p.radius {
        location.radius_m = validate_radius(radius)?;
    }
    if let Some(is_locked) = p.is_locked {
        location.is_locked = is_locked;
    }

    conn.execute(
        "UPDATE locations
         SET name = ?, latitude = ?, longitude = ?, radius = ?, is_locked = ?
         WHERE id = ?",
        (
            &location.name,
            location.point.latitude,
            location.point.longitude,
            location.radius_m,
            location.is_locked as i64,
            &location.id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    tracing::info!(
        location_id = %location.id,
        is_locked = location.is_locked,
        radius_m = location.radius_m,
        "location updated"
    );

    Ok(json!({ "location": location }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let default_radius_m = state.default_radius_m;
    let result = match req.method.as_str() {
        "locations.create" => require_db(state)
            .and_then(|conn| locations_create(conn, default_radius_m, &req.params)),
        "locations.list" => require_db(state).and_then(locations_list),
        "locations.update" => require_db(state).and_then(|conn| locations_update(conn, &req.params)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
