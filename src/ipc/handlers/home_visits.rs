use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::users::{find_user, load_actor};
use crate::ipc::params::{optional_text, parse_params, require_db, required_date, required_text};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_timestamp, Role, VisitStatus};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VisitStudent {
    id: String,
    name: String,
    nis: Option<String>,
    class: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HomeVisit {
    id: String,
    student_id: String,
    counselor_id: String,
    date: String,
    purpose: String,
    parent_name: String,
    address: String,
    findings: String,
    recommendations: Option<String>,
    follow_up_actions: Option<String>,
    status: VisitStatus,
    created_at: String,
    student: VisitStudent,
}

fn visit_from_row(r: &Row<'_>) -> rusqlite::Result<HomeVisit> {
    let status: String = r.get(10)?;
    Ok(HomeVisit {
        id: r.get(0)?,
        student_id: r.get(1)?,
        counselor_id: r.get(2)?,
        date: r.get(3)?,
        purpose: r.get(4)?,
        parent_name: r.get(5)?,
        address: r.get(6)?,
        findings: r.get(7)?,
        recommendations: r.get(8)?,
        follow_up_actions: r.get(9)?,
        status: status.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, e.into())
        })?,
        created_at: r.get(11)?,
        student: VisitStudent {
            id: r.get(12)?,
            name: r.get(13)?,
            nis: r.get(14)?,
            class: r.get(15)?,
        },
    })
}

const SELECT_VISITS: &str = "SELECT hv.id, hv.student_id, hv.counselor_id, hv.date, hv.purpose,
        hv.parent_name, hv.address, hv.findings, hv.recommendations, hv.follow_up_actions,
        hv.status, hv.created_at, u.id, u.name, u.nis, u.class
     FROM home_visits hv
     JOIN users u ON u.id = hv.student_id";

fn load_visit(conn: &Connection, visit_id: &str) -> Result<HomeVisit, HandlerErr> {
    let sql = format!("{} WHERE hv.id = ?", SELECT_VISITS);
    conn.query_row(&sql, [visit_id], visit_from_row)
        .optional()?
        .ok_or_else(|| {
            HandlerErr::not_found("home visit not found").with_details(json!({ "visitId": visit_id }))
        })
}

fn require_student(conn: &Connection, student_id: &str) -> Result<(), HandlerErr> {
    match find_user(conn, student_id)? {
        Some(u) if u.role == Role::Student => Ok(()),
        Some(_) => Err(HandlerErr::bad_params("studentId does not refer to a student")),
        None => Err(HandlerErr::not_found("student not found")
            .with_details(json!({ "studentId": student_id }))),
    }
}

fn visits_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!("{} ORDER BY hv.date DESC, hv.created_at DESC", SELECT_VISITS);
    let mut stmt = conn.prepare(&sql)?;
    let visits = stmt
        .query_map([], visit_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "visits": visits }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateVisit {
    actor_id: String,
    student_id: String,
    date: String,
    purpose: String,
    parent_name: String,
    address: String,
    findings: String,
    #[serde(default)]
    recommendations: Option<String>,
    #[serde(default)]
    follow_up_actions: Option<String>,
    status: VisitStatus,
}

fn visits_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: CreateVisit = parse_params(params)?;
    let date = required_date(&p.date, "date")?;
    let purpose = required_text(p.purpose, "purpose")?;
    let parent_name = required_text(p.parent_name, "parentName")?;
    let address = required_text(p.address, "address")?;
    let findings = required_text(p.findings, "findings")?;
    let counselor = load_actor(conn, &p.actor_id)?;
    require_student(conn, &p.student_id)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO home_visits(
            id, student_id, counselor_id, date, purpose, parent_name, address,
            findings, recommendations, follow_up_actions, status, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &p.student_id,
            &counselor.id,
            date.format("%Y-%m-%d").to_string(),
            &purpose,
            &parent_name,
            &address,
            &findings,
            optional_text(p.recommendations),
            optional_text(p.follow_up_actions),
            p.status.as_str(),
            now_timestamp(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "home_visits" }))
    })?;

    Ok(json!({ "visit": load_visit(conn, &id)? }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateVisit {
    visit_id: String,
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(default)]
    parent_name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    findings: Option<String>,
    #[serde(default)]
    recommendations: Option<String>,
    #[serde(default)]
    follow_up_actions: Option<String>,
    #[serde(default)]
    status: Option<VisitStatus>,
}

fn visits_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: UpdateVisit = parse_params(params)?;
    let mut visit = load_visit(conn, &p.visit_id)?;

    if let Some(student_id) = p.student_id {
        require_student(conn, &student_id)?;
        visit.student_id = student_id;
    }
    if let Some(raw) = p.date {
        visit.date = required_date(&raw, "date")?.format("%Y-%m-%d").to_string();
    }
    if let Some(v) = p.purpose {
        visit.purpose = required_text(v, "purpose")?;
    }
    if let Some(v) = p.parent_name {
        visit.parent_name = required_text(v, "parentName")?;
    }
    if let Some(v) = p.address {
        visit.address = required_text(v, "address")?;
    }
    if let Some(v) = p.findings {
        visit.findings = required_text(v, "findings")?;
    }
    if p.recommendations.is_some() {
        visit.recommendations = optional_text(p.recommendations);
    }
    if p.follow_up_actions.is_some() {
        visit.follow_up_actions = optional_text(p.follow_up_actions);
    }
    if let Some(status) = p.status {
        visit.status = status;
    }

    conn.execute(
        "UPDATE home_visits
         SET student_id = ?, date = ?, purpose = ?, parent_name = ?, address = ?,
             findings = ?, recommendations = ?, follow_up_actions = ?, status = ?
         WHERE id = ?",
        (
            &visit.student_id,
            &visit.date,
            &visit.purpose,
            &visit.parent_name,
            &visit.address,
            &visit.findings,
            &visit.recommendations,
            &visit.follow_up_actions,
            visit.status.as_str(),
            &visit.id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    Ok(json!({ "visit": load_visit(conn, &visit.id)? }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteVisit {
    visit_id: String,
}

fn visits_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: DeleteVisit = parse_params(params)?;
    let removed = conn
        .execute("DELETE FROM home_visits WHERE id = ?", [&p.visit_id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    if removed == 0 {
        return Err(HandlerErr::not_found("home visit not found")
            .with_details(json!({ "visitId": p.visit_id })));
    }
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "homeVisits.list" => require_db(state).and_then(visits_list),
        "homeVisits.create" => require_db(state).and_then(|conn| visits_create(conn, &req.params)),
        "homeVisits.update" => require_db(state).and_then(|conn| visits_update(conn, &req.params)),
        "homeVisits.delete" => require_db(state).and_then(|conn| visits_delete(conn, &req.params)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
