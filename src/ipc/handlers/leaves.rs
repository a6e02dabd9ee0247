use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::users::load_actor;
use crate::ipc::params::{parse_params, require_db, required_date, required_text};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_timestamp, ApprovalStatus, Role};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Leave {
    id: String,
    user_id: String,
    start_date: String,
    end_date: String,
    #[serde(rename = "type")]
    kind: String,
    reason: String,
    status: ApprovalStatus,
    created_at: String,
}

const LEAVE_COLUMNS: &str =
    "lv.id, lv.user_id, lv.start_date, lv.end_date, lv.type, lv.reason, lv.status, lv.created_at";

fn leave_from_row(r: &Row<'_>) -> rusqlite::Result<Leave> {
    let status: String = r.get(6)?;
    Ok(Leave {
        id: r.get(0)?,
        user_id: r.get(1)?,
        start_date: r.get(2)?,
        end_date: r.get(3)?,
        kind: r.get(4)?,
        reason: r.get(5)?,
        status: status.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into())
        })?,
        created_at: r.get(7)?,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLeave {
    actor_id: String,
    start_date: String,
    end_date: String,
    #[serde(rename = "type")]
    kind: String,
    reason: String,
}

fn leaves_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: CreateLeave = parse_params(params)?;
    let start = required_date(&p.start_date, "startDate")?;
    let end = required_date(&p.end_date, "endDate")?;
    if end < start {
        return Err(HandlerErr::bad_params("endDate must not be before startDate"));
    }
    let kind = required_text(p.kind, "type")?;
    let reason = required_text(p.reason, "reason")?;
    let actor = load_actor(conn, &p.actor_id)?;

    let leave = Leave {
        id: Uuid::new_v4().to_string(),
        user_id: actor.id,
        start_date: start.format("%Y-%m-%d").to_string(),
        end_date: end.format("%Y-%m-%d").to_string(),
        kind,
        reason,
        status: ApprovalStatus::initial_for(actor.role),
        created_at: now_timestamp(),
    };
    conn.execute(
        "INSERT INTO leaves(id, user_id, start_date, end_date, type, reason, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &leave.id,
            &leave.user_id,
            &leave.start_date,
            &leave.end_date,
            &leave.kind,
            &leave.reason,
            leave.status.as_str(),
            &leave.created_at,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "leaves" }))
    })?;

    Ok(json!({ "leave": leave }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorOnly {
    actor_id: String,
}

fn leaves_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: ActorOnly = parse_params(params)?;
    let sql = format!(
        "SELECT {} FROM leaves lv WHERE lv.user_id = ? ORDER BY lv.created_at DESC, lv.id DESC",
        LEAVE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let leaves = stmt
        .query_map([&p.actor_id], leave_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "leaves": leaves }))
}

#[derive(Debug, Serialize)]
struct LeaveOwner {
    name: String,
    nis: Option<String>,
    class: Option<String>,
}

#[derive(Debug, Serialize)]
struct PendingLeave {
    #[serde(flatten)]
    leave: Leave,
    user: LeaveOwner,
}

fn leaves_pending(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {}, u.name, u.nis, u.class
         FROM leaves lv
         JOIN users u ON u.id = lv.user_id
         WHERE lv.status = ? AND u.role = ?
         ORDER BY lv.created_at DESC, lv.id DESC",
        LEAVE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let leaves = stmt
        .query_map(
            (ApprovalStatus::Pending.as_str(), Role::Student.as_str()),
            |r| {
                Ok(PendingLeave {
                    leave: leave_from_row(r)?,
                    user: LeaveOwner {
                        name: r.get(8)?,
                        nis: r.get(9)?,
                        class: r.get(10)?,
                    },
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "leaves": leaves }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetStatus {
    leave_id: String,
    status: String,
}

fn leaves_set_status(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: SetStatus = parse_params(params)?;
    let status = match p.status.parse::<ApprovalStatus>() {
        Ok(s @ (ApprovalStatus::Approved | ApprovalStatus::Rejected)) => s,
        _ => {
            return Err(HandlerErr::new("invalid_status", "Invalid status")
                .with_details(json!({ "status": p.status })))
        }
    };

    let changed = conn
        .execute(
            "UPDATE leaves SET status = ? WHERE id = ?",
            (status.as_str(), &p.leave_id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("leave not found")
            .with_details(json!({ "leaveId": p.leave_id })));
    }
    tracing::info!(leave_id = %p.leave_id, status = %status, "leave reviewed");

    let sql = format!("SELECT {} FROM leaves lv WHERE lv.id = ?", LEAVE_COLUMNS);
    let leave = conn
        .query_row(&sql, [&p.leave_id], leave_from_row)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("leave not found"))?;
    Ok(json!({ "leave": leave }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "leaves.create" => require_db(state).and_then(|conn| leaves_create(conn, &req.params)),
        "leaves.list" => require_db(state).and_then(|conn| leaves_list(conn, &req.params)),
        "leaves.pending" => require_db(state).and_then(leaves_pending),
        "leaves.setStatus" => require_db(state).and_then(|conn| leaves_set_status(conn, &req.params)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
