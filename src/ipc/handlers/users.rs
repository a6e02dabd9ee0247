use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::{optional_text, parse_params, require_db, required_text};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_timestamp, Role};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub nip: Option<String>,
    pub nis: Option<String>,
    pub class: Option<String>,
    pub created_at: String,
}

const USER_COLUMNS: &str = "id, email, name, role, nip, nis, class, created_at";

fn user_from_row(r: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = r.get(3)?;
    Ok(User {
        id: r.get(0)?,
        email: r.get(1)?,
        name: r.get(2)?,
        role: role.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        nip: r.get(4)?,
        nis: r.get(5)?,
        class: r.get(6)?,
        created_at: r.get(7)?,
    })
}

pub fn find_user(conn: &Connection, user_id: &str) -> Result<Option<User>, HandlerErr> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    Ok(conn.query_row(&sql, [user_id], user_from_row).optional()?)
}

/// Loads the acting user; unknown ids are `not_found`.
pub fn load_actor(conn: &Connection, actor_id: &str) -> Result<User, HandlerErr> {
    find_user(conn, actor_id)?
        .ok_or_else(|| HandlerErr::not_found("user not found").with_details(json!({ "userId": actor_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUser {
    name: String,
    email: String,
    role: Role,
    #[serde(default)]
    nip: Option<String>,
    #[serde(default)]
    nis: Option<String>,
    #[serde(default)]
    class: Option<String>,
}

fn users_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: CreateUser = parse_params(params)?;
    let name = required_text(p.name, "name")?;
    let email = required_text(p.email, "email")?.to_lowercase();
    if !email.contains('@') {
        return Err(HandlerErr::bad_params("email must contain @"));
    }
    let nip = optional_text(p.nip);
    let nis = optional_text(p.nis);
    let class = optional_text(p.class);
    match p.role {
        Role::Student if nis.is_none() || class.is_none() => {
            return Err(HandlerErr::bad_params("students require nis and class"));
        }
        Role::Teacher if nip.is_none() => {
            return Err(HandlerErr::bad_params("teachers require nip"));
        }
        _ => {}
    }

    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(HandlerErr::bad_params("email already registered")
            .with_details(json!({ "email": email })));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        name,
        role: p.role,
        nip,
        nis,
        class,
        created_at: now_timestamp(),
    };
    conn.execute(
        "INSERT INTO users(id, email, name, role, nip, nis, class, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &user.id,
            &user.email,
            &user.name,
            user.role.as_str(),
            &user.nip,
            &user.nis,
            &user.class,
            &user.created_at,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "users" }))
    })?;
    tracing::info!(user_id = %user.id, role = %user.role, "user registered");

    Ok(json!({ "user": user }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUser {
    user_id: String,
}

fn users_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: GetUser = parse_params(params)?;
    let user = load_actor(conn, &p.user_id)?;
    Ok(json!({ "user": user }))
}

#[derive(Debug, Deserialize)]
struct ClassFilter {
    #[serde(default)]
    class: Option<String>,
}

fn list_by_role(
    conn: &Connection,
    role: Role,
    class: Option<&str>,
) -> Result<Vec<User>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM users
         WHERE role = ?1 AND (?2 IS NULL OR class = ?2)
         ORDER BY name, id",
        USER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map((role.as_str(), class), user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

fn users_students(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: ClassFilter = parse_params(params)?;
    let class = optional_text(p.class);
    let students: Vec<serde_json::Value> = list_by_role(conn, Role::Student, class.as_deref())?
        .into_iter()
        .map(|u| {
            json!({
                "id": u.id,
                "name": u.name,
                "nis": u.nis,
                "class": u.class,
                "email": u.email
            })
        })
        .collect();
    Ok(json!({ "students": students }))
}

fn users_teachers(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let teachers: Vec<serde_json::Value> = list_by_role(conn, Role::Teacher, None)?
        .into_iter()
        .map(|u| {
            json!({
                "id": u.id,
                "name": u.name,
                "nip": u.nip,
                "email": u.email
            })
        })
        .collect();
    Ok(json!({ "teachers": teachers }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.create" => require_db(state).and_then(|conn| users_create(conn, &req.params)),
        "users.get" => require_db(state).and_then(|conn| users_get(conn, &req.params)),
        "users.students" => require_db(state).and_then(|conn| users_students(conn, &req.params)),
        "users.teachers" => require_db(state).and_then(users_teachers),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
