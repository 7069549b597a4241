use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, opt_date, opt_str, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::schedule::Lesson;
use serde_json::{json, Value};
use uuid::Uuid;

/// Reference tables that only carry an id and a name.
#[derive(Clone, Copy)]
enum NamedTable {
    Rooms,
    AbsenceTypes,
    SubstitutionTypes,
}

impl NamedTable {
    fn table(self) -> &'static str {
        match self {
            Self::Rooms => "rooms",
            Self::AbsenceTypes => "absence_types",
            Self::SubstitutionTypes => "substitution_types",
        }
    }

    fn result_key(self) -> &'static str {
        match self {
            Self::Rooms => "rooms",
            Self::AbsenceTypes => "absenceTypes",
            Self::SubstitutionTypes => "substitutionTypes",
        }
    }
}

fn new_or_given_id(params: &Value) -> Result<String, HandlerErr> {
    Ok(opt_str(params, "id")?.unwrap_or_else(|| Uuid::new_v4().to_string()))
}

fn handle_named_list(state: &mut AppState, req: &Request, kind: NamedTable) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ kind.result_key(): [] }));
    };
    let sql = format!("SELECT id, name FROM {} ORDER BY name, id", kind.table());
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            Ok(json!({ "id": id, "name": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(items) => ok(&req.id, json!({ kind.result_key(): items })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn named_create(state: &mut AppState, req: &Request, kind: NamedTable) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let name = opt_str(&req.params, "name")?
        .ok_or_else(|| HandlerErr::field("name", "name must not be empty"))?;
    let id = new_or_given_id(&req.params)?;
    let sql = format!("INSERT INTO {}(id, name) VALUES(?, ?)", kind.table());
    conn.execute(&sql, (&id, &name))
        .map_err(|e| HandlerErr::update(e, kind.table()))?;
    Ok(json!({ "id": id, "name": name }))
}

fn handle_staff_list(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "staff": [] }));
    };
    let include_inactive = req
        .params
        .get("includeInactive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let mut stmt = match conn.prepare(
        "SELECT id, display_name, active
         FROM staff
         WHERE (? OR active = 1)
         ORDER BY sort_order, display_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([include_inactive], |row| {
            let id: String = row.get(0)?;
            let display_name: String = row.get(1)?;
            let active: i64 = row.get(2)?;
            Ok(json!({
                "id": id,
                "displayName": display_name,
                "active": active != 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(staff) => ok(&req.id, json!({ "staff": staff })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn staff_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let display_name = opt_str(&req.params, "displayName")?
        .ok_or_else(|| HandlerErr::field("displayName", "displayName must not be empty"))?;
    let active = match req.params.get("active") {
        None | Some(Value::Null) => true,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::field("active", "active must be boolean"))?,
    };
    let id = new_or_given_id(&req.params)?;
    let sort_order: i64 = conn
        .query_row("SELECT COALESCE(MAX(sort_order), -1) + 1 FROM staff", [], |r| r.get(0))
        .map_err(HandlerErr::query)?;
    conn.execute(
        "INSERT INTO staff(id, display_name, active, sort_order) VALUES(?, ?, ?, ?)",
        (&id, &display_name, active as i64, sort_order),
    )
    .map_err(|e| HandlerErr::update(e, "staff"))?;
    Ok(json!({ "id": id, "displayName": display_name, "active": active }))
}

fn lessons_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let from = opt_date(&req.params, "from")?;
    let to = opt_date(&req.params, "to")?;
    let lessons = match (from, to) {
        (Some(from), Some(to)) => {
            if to < from {
                return Err(HandlerErr::field("to", "to must not be before from"));
            }
            db::lessons_between(conn, from, to).map_err(HandlerErr::query)?
        }
        (None, None) => db::all_lessons(conn).map_err(HandlerErr::query)?,
        _ => return Err(HandlerErr::bad_params("from and to must be given together")),
    };
    let staff_id = opt_str(&req.params, "staffId")?;
    let lessons: Vec<&Lesson> = lessons
        .iter()
        .filter(|l| staff_id.as_deref().map_or(true, |s| l.staff_id == s))
        .collect();
    Ok(json!({ "lessons": to_json(&lessons)? }))
}

fn lessons_create(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut lesson: Lesson = serde_json::from_value(req.params.clone())
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    lesson.validate().map_err(|field| HandlerErr::field(field, "invalid lesson"))?;
    if lesson.id.trim().is_empty() {
        lesson.id = Uuid::new_v4().to_string();
    }
    if !db::row_exists(conn, "staff", &lesson.staff_id).map_err(HandlerErr::query)? {
        return Err(HandlerErr::not_found("staff", &lesson.staff_id));
    }
    if let Some(room_id) = &lesson.room_id {
        if !db::row_exists(conn, "rooms", room_id).map_err(HandlerErr::query)? {
            return Err(HandlerErr::not_found("room", room_id));
        }
    }
    for (idx, party) in lesson.attendees.iter().enumerate() {
        if party.id().trim().is_empty() {
            return Err(HandlerErr::field(
                format!("attendees[{}].id", idx),
                "attendee id must not be empty",
            ));
        }
        if let Some(staff_id) = party.staff_id() {
            if !db::row_exists(conn, "staff", staff_id).map_err(HandlerErr::query)? {
                return Err(HandlerErr::not_found("staff", staff_id));
            }
        }
    }
    db::insert_lesson(conn, &lesson).map_err(|e| HandlerErr::update(e, "lessons"))?;
    tracing::debug!(lesson = %lesson.id, staff = %lesson.staff_id, "lesson created");
    Ok(json!({ "lessonId": lesson.id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let named = |m: &str| match m {
        "rooms" => Some(NamedTable::Rooms),
        "absenceTypes" => Some(NamedTable::AbsenceTypes),
        "substitutionTypes" => Some(NamedTable::SubstitutionTypes),
        _ => None,
    };
    let (family, action) = req.method.split_once('.')?;
    if let Some(kind) = named(family) {
        return match action {
            "list" => Some(handle_named_list(state, req, kind)),
            "create" => Some(respond(req, named_create(state, req, kind))),
            _ => None,
        };
    }
    match req.method.as_str() {
        "staff.list" => Some(handle_staff_list(state, req)),
        "staff.create" => Some(respond(req, staff_create(state, req))),
        "lessons.list" => Some(respond(req, lessons_list(state, req))),
        "lessons.create" => Some(respond(req, lessons_create(state, req))),
        _ => None,
    }
}
