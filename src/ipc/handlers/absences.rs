use crate::absence::{covered_dates, normalize, AbsenceDraft, DateGroup, StaffAbsence, ValidationError};
use crate::db;
use crate::ipc::handlers::{cover, setup};
use crate::ipc::helpers::{db_conn, opt_date, opt_str, respond, string_list, to_json, typed_param, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

fn absences_list(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let filter = db::AbsenceFilter {
        staff_id: opt_str(&req.params, "staffId")?,
        from: opt_date(&req.params, "from")?,
        to: opt_date(&req.params, "to")?,
    };
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if to < from {
            return Err(HandlerErr::field("to", "to must not be before from"));
        }
    }
    let absences = db::list_absences(conn, &filter).map_err(HandlerErr::query)?;
    Ok(json!({ "absences": to_json(&absences)? }))
}

/// Reports a draft error against its position in the batch.
fn draft_err(idx: usize, e: ValidationError) -> HandlerErr {
    HandlerErr::field(format!("absences[{}].{}", idx, e.field()), e.to_string())
}

fn check_refs(conn: &Connection, idx: usize, absence: &StaffAbsence) -> Result<(), HandlerErr> {
    let exists = |table: &str, id: &str| db::row_exists(conn, table, id).map_err(HandlerErr::query);
    if !exists("staff", absence.staff_id.as_str())? {
        return Err(HandlerErr::field(
            format!("absences[{}].staffId", idx),
            format!("unknown staff member {}", absence.staff_id),
        ));
    }
    if !exists("absence_types", absence.absence_type_id.as_str())? {
        return Err(HandlerErr::field(
            format!("absences[{}].absenceTypeId", idx),
            format!("unknown absence type {}", absence.absence_type_id),
        ));
    }
    for g in &absence.long_term_leave_groups {
        if let Some(covering) = &g.covering_staff_id {
            if !exists("staff", covering.as_str())? {
                return Err(HandlerErr::field(
                    format!("absences[{}].longTermLeaveGroups", idx),
                    format!("unknown covering staff member {}", covering),
                ));
            }
        }
    }
    Ok(())
}

fn absences_save(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let drafts: Vec<AbsenceDraft> = typed_param(&req.params, "absences")?;
    if drafts.is_empty() {
        return Err(HandlerErr::field("absences", "absences must not be empty"));
    }
    let settings = setup::absence_settings(conn);

    // Build every record before touching the store.
    let mut records = Vec::with_capacity(drafts.len());
    for (idx, mut draft) in drafts.into_iter().enumerate() {
        if draft.absence_type_id.trim().is_empty() {
            if let Some(default_type) = &settings.default_absence_type_id {
                draft.absence_type_id = default_type.clone();
            }
        }
        let id = draft
            .id
            .clone()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let absence = draft.into_absence(id).map_err(|e| draft_err(idx, e))?;
        let day_count = covered_dates(&absence.intervals).len();
        if day_count > settings.max_dates_per_absence {
            return Err(HandlerErr::field(
                format!("absences[{}].dateGroups", idx),
                format!(
                    "absence covers {} days; the limit is {}",
                    day_count, settings.max_dates_per_absence
                ),
            ));
        }
        records.push(absence);
    }

    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    for (idx, absence) in records.iter().enumerate() {
        check_refs(&tx, idx, absence)?;
        db::upsert_absence(&tx, absence).map_err(|e| HandlerErr::update(e, "staff_absences"))?;
    }
    tx.commit().map_err(HandlerErr::commit)?;
    cover::refresh_displayed(state)?;

    let ids: Vec<&str> = records.iter().map(|a| a.id.as_str()).collect();
    tracing::info!(count = ids.len(), "absences saved");
    Ok(json!({ "absenceIds": ids }))
}

fn absences_delete(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let ids = string_list(&req.params, "absenceIds")?;
    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    let mut deleted = 0usize;
    for id in &ids {
        if db::delete_absence(&tx, id).map_err(|e| HandlerErr::update(e, "staff_absences"))? {
            deleted += 1;
        }
    }
    tx.commit().map_err(HandlerErr::commit)?;
    cover::refresh_displayed(state)?;
    tracing::info!(requested = ids.len(), deleted, "absences deleted");
    Ok(json!({ "deleted": deleted }))
}

/// Dry run of the normalizer for one date group.
fn absences_normalize(_state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let group: DateGroup = serde_json::from_value(req.params.clone())
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    if group.dates.is_empty() {
        return Err(ValidationError::EmptyDateGroup { group: 0 }.into());
    }
    let window = group.window(0)?;
    let dates: BTreeSet<_> = group.dates.iter().copied().collect();
    let intervals = normalize(&dates, window);
    Ok(json!({ "intervals": to_json(&intervals)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "absences.list" => absences_list(state, req),
        "absences.save" => absences_save(state, req),
        "absences.delete" => absences_delete(state, req),
        "absences.normalize" => absences_normalize(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
