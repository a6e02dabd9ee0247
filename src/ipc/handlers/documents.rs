use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::users::load_actor;
use crate::ipc::params::{optional_text, parse_params, require_db, required_text};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_timestamp, Role};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    id: String,
    user_id: String,
    title: String,
    file_url: String,
    #[serde(rename = "type")]
    kind: String,
    created_at: String,
}

#[derive(Debug, Serialize)]
struct DocumentOwner {
    name: String,
    nis: Option<String>,
    class: Option<String>,
}

#[derive(Debug, Serialize)]
struct StudentDocument {
    #[serde(flatten)]
    document: Document,
    user: DocumentOwner,
}

const DOCUMENT_COLUMNS: &str = "d.id, d.user_id, d.title, d.file_url, d.type, d.created_at";

fn document_from_row(r: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: r.get(0)?,
        user_id: r.get(1)?,
        title: r.get(2)?,
        file_url: r.get(3)?,
        kind: r.get(4)?,
        created_at: r.get(5)?,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDocument {
    actor_id: String,
    title: String,
    file_url: String,
    #[serde(rename = "type")]
    kind: String,
}

fn documents_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: CreateDocument = parse_params(params)?;
    let title = required_text(p.title, "title")?;
    let file_url = required_text(p.file_url, "fileUrl")?;
    let kind = required_text(p.kind, "type")?;
    let owner = load_actor(conn, &p.actor_id)?;

    let document = Document {
        id: Uuid::new_v4().to_string(),
        user_id: owner.id,
        title,
        file_url,
        kind,
        created_at: now_timestamp(),
    };
    conn.execute(
        "INSERT INTO documents(id, user_id, title, file_url, type, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &document.id,
            &document.user_id,
            &document.title,
            &document.file_url,
            &document.kind,
            &document.created_at,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "documents" }))
    })?;

    Ok(json!({ "document": document }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorOnly {
    actor_id: String,
}

fn documents_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: ActorOnly = parse_params(params)?;
    let sql = format!(
        "SELECT {} FROM documents d WHERE d.user_id = ? ORDER BY d.created_at DESC, d.id DESC",
        DOCUMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let documents = stmt
        .query_map([&p.actor_id], document_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "documents": documents }))
}

#[derive(Debug, Deserialize)]
struct ClassFilter {
    #[serde(default)]
    class: Option<String>,
}

fn documents_students(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let p: ClassFilter = parse_params(params)?;
    let class = optional_text(p.class);
    let sql = format!(
        "SELECT {}, u.name, u.nis, u.class
         FROM documents d
         JOIN users u ON u.id = d.user_id
         WHERE u.role = ?1 AND (?2 IS NULL OR u.class = ?2)
         ORDER BY d.created_at DESC, d.id DESC",
        DOCUMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let documents = stmt
        .query_map((Role::Student.as_str(), class.as_deref()), |r| {
            Ok(StudentDocument {
                document: document_from_row(r)?,
                user: DocumentOwner {
                    name: r.get(6)?,
                    nis: r.get(7)?,
                    class: r.get(8)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "documents": documents }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "documents.create" => require_db(state).and_then(|conn| documents_create(conn, &req.params)),
        "documents.list" => require_db(state).and_then(|conn| documents_list(conn, &req.params)),
        "documents.students" => {
            require_db(state).and_then(|conn| documents_students(conn, &req.params))
        }
        _ => return None,
    };
    Some(respond(&req.id, result))
}
