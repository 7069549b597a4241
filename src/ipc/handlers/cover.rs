use crate::assign::SubstitutionAssignment;
use crate::clock;
use crate::cover::{project, CoverEvent, EventKey, ProjectionInput};
use crate::db;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    db_conn, required_date, respond, string_list, to_json, typed_param, HandlerErr,
};
use crate::ipc::types::{AppState, CoverWindow, Request};
use crate::schedule::{occurrences_between, Lesson, Occurrence};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

/// Builds the annotated cover projection for `window`.
pub fn project_window(conn: &Connection, window: &CoverWindow) -> Result<Vec<CoverEvent>, HandlerErr> {
    let lessons = db::lessons_between(conn, window.from, window.to).map_err(HandlerErr::query)?;
    let absences = db::list_absences(
        conn,
        &db::AbsenceFilter {
            staff_id: None,
            from: Some(window.from),
            to: Some(window.to),
        },
    )
    .map_err(HandlerErr::query)?;
    let substitutions =
        db::substitutions_by_key(conn, window.from, window.to).map_err(HandlerErr::query)?;
    let staff_filter: Option<HashSet<String>> = window
        .staff_ids
        .as_ref()
        .map(|ids| ids.iter().cloned().collect());

    Ok(project(&ProjectionInput {
        from: window.from,
        to: window.to,
        staff_filter: staff_filter.as_ref(),
        lessons: &lessons,
        absences: &absences,
        substitutions: &substitutions,
    }))
}

/// Re-fetches the displayed window, which clears the selection.
pub fn refresh_displayed(state: &mut AppState) -> Result<(), HandlerErr> {
    let Some(window) = state.displayed.clone() else {
        return Ok(());
    };
    let events = project_window(db_conn(state)?, &window)?;
    state.selection.load(events);
    Ok(())
}

fn check_assignment(conn: &Connection, idx: usize, a: &SubstitutionAssignment) -> Result<(), HandlerErr> {
    let field = |name: &str| format!("assignments[{}].{}", idx, name);
    if a.substitute_staff_id.trim().is_empty() {
        return Err(HandlerErr::field(field("substituteStaffId"), "substitute staff member is required"));
    }
    if a.substitution_type_id.trim().is_empty() {
        return Err(HandlerErr::field(field("substitutionTypeId"), "substitution type is required"));
    }
    let lesson = db::lesson_by_id(conn, &a.event_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("event", &a.event_id))?;
    if !lesson.occurs_on(a.start_time.date()) || lesson.start_time != a.start_time.time() {
        return Err(HandlerErr::field(
            field("startTime"),
            format!(
                "event {} has no occurrence at {}",
                a.event_id,
                clock::fmt_stamp(a.start_time)
            ),
        ));
    }
    if a.original_staff_id != lesson.staff_id {
        return Err(HandlerErr::field(
            field("originalStaffId"),
            format!("event {} is taught by {}", a.event_id, lesson.staff_id),
        ));
    }
    if let Some(absence_id) = &a.absence_id {
        let owner = db::absence_staff_id(conn, absence_id).map_err(HandlerErr::query)?;
        if owner.as_deref() != Some(lesson.staff_id.as_str()) {
            return Err(HandlerErr::field(
                field("absenceId"),
                format!("no absence {} for staff member {}", absence_id, lesson.staff_id),
            ));
        }
    }
    if !db::row_exists(conn, "staff", &a.substitute_staff_id).map_err(HandlerErr::query)? {
        return Err(HandlerErr::not_found("staff", &a.substitute_staff_id));
    }
    if !db::row_exists(conn, "substitution_types", &a.substitution_type_id)
        .map_err(HandlerErr::query)?
    {
        return Err(HandlerErr::not_found("substitution type", &a.substitution_type_id));
    }
    if let Some(room_id) = &a.room_id {
        if !db::row_exists(conn, "rooms", room_id).map_err(HandlerErr::query)? {
            return Err(HandlerErr::not_found("room", room_id));
        }
    }
    Ok(())
}

/// Writes a batch of assignments in one transaction.
pub fn persist_assignments(
    conn: &Connection,
    assignments: &[SubstitutionAssignment],
) -> Result<Vec<String>, HandlerErr> {
    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    let mut ids = Vec::with_capacity(assignments.len());
    for (idx, a) in assignments.iter().enumerate() {
        check_assignment(&tx, idx, a)?;
        let id = db::write_assignment(&tx, a).map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => HandlerErr::not_found(
                "substitution",
                a.existing_substitution_id.as_deref().unwrap_or_default(),
            ),
            other => HandlerErr::update(other, "substitutions"),
        })?;
        ids.push(id);
    }
    tx.commit().map_err(HandlerErr::commit)?;
    tracing::info!(count = ids.len(), "substitutions written");
    Ok(ids)
}

/// Deletes substitutions in one transaction; returns how many existed.
pub fn persist_removals(conn: &Connection, ids: &[String]) -> Result<usize, HandlerErr> {
    let tx = conn.unchecked_transaction().map_err(HandlerErr::tx)?;
    let mut removed = 0usize;
    for id in ids {
        if db::delete_substitution(&tx, id).map_err(|e| HandlerErr::update(e, "substitutions"))? {
            removed += 1;
        }
    }
    tx.commit().map_err(HandlerErr::commit)?;
    tracing::info!(requested = ids.len(), removed, "substitutions removed");
    Ok(removed)
}

fn cover_events(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let from = required_date(&req.params, "from")?;
    let to = required_date(&req.params, "to")?;
    if to < from {
        return Err(HandlerErr::field("to", "to must not be before from"));
    }
    let staff_ids = match req.params.get("staffIds") {
        None | Some(Value::Null) => None,
        Some(_) => Some(string_list(&req.params, "staffIds")?),
    };
    let window = CoverWindow { from, to, staff_ids };
    let events = project_window(db_conn(state)?, &window)?;

    state.selection.load(events);
    state.displayed = Some(window);
    let payload = to_json(&state.selection.events())?;
    tracing::debug!(from = %from, to = %to, "cover projection loaded");
    Ok(json!({
        "from": clock::fmt_date(from),
        "to": clock::fmt_date(to),
        "events": payload
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotRef {
    event_id: String,
    date: NaiveDate,
}

/// First day of the week containing `date`.
fn week_start(date: NaiveDate, starts_on: Weekday) -> NaiveDate {
    let offset = (date.weekday().num_days_from_monday() + 7 - starts_on.num_days_from_monday()) % 7;
    date - Duration::days(offset as i64)
}

fn occurrence_key(occ: &Occurrence<'_>) -> EventKey {
    EventKey {
        event_id: occ.lesson.id.clone(),
        start_time: occ.start(),
    }
}

fn clash_json(occ: &Occurrence<'_>, kind: &str) -> Value {
    json!({
        "eventId": occ.lesson.id,
        "title": occ.lesson.title,
        "startTime": clock::fmt_stamp(occ.start()),
        "endTime": clock::fmt_stamp(occ.end()),
        "kind": kind
    })
}

fn cover_candidates(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = db_conn(state)?;
    let refs: Vec<SlotRef> = typed_param(&req.params, "eventSlots")?;
    if refs.is_empty() {
        return Err(HandlerErr::field("eventSlots", "eventSlots must not be empty"));
    }
    let settings = setup::cover_settings(conn);

    let mut slot_lessons: Vec<(Lesson, NaiveDate)> = Vec::with_capacity(refs.len());
    for (idx, r) in refs.iter().enumerate() {
        let lesson = db::lesson_by_id(conn, &r.event_id)
            .map_err(HandlerErr::query)?
            .ok_or_else(|| HandlerErr::not_found("event", &r.event_id))?;
        if !lesson.occurs_on(r.date) {
            return Err(HandlerErr::field(
                format!("eventSlots[{}].date", idx),
                format!("event {} does not occur on {}", r.event_id, clock::fmt_date(r.date)),
            ));
        }
        slot_lessons.push((lesson, r.date));
    }
    let slots: Vec<Occurrence<'_>> = slot_lessons
        .iter()
        .map(|(lesson, date)| Occurrence { lesson, date: *date })
        .collect();
    let slot_keys: HashSet<EventKey> = slots.iter().map(occurrence_key).collect();

    let (mut first, mut last) = (slots[0].date, slots[0].date);
    for s in &slots {
        first = first.min(s.date);
        last = last.max(s.date);
    }

    let lessons = db::lessons_between(conn, first, last).map_err(HandlerErr::query)?;
    let occurrences = occurrences_between(&lessons, first, last);
    let by_key: HashMap<EventKey, &Occurrence<'_>> = occurrences
        .iter()
        .map(|o| (occurrence_key(o), o))
        .collect();
    let substitutions = db::substitutions_between(conn, first, last).map_err(HandlerErr::query)?;
    let absences = db::list_absences(
        conn,
        &db::AbsenceFilter {
            staff_id: None,
            from: Some(first),
            to: Some(last),
        },
    )
    .map_err(HandlerErr::query)?;

    // Slot keys already handed to someone else free the original staff member.
    let covered_keys: HashSet<&EventKey> = substitutions.iter().map(|s| &s.key).collect();
    let overlaps_any = |start: NaiveDateTime, end: NaiveDateTime| {
        slots.iter().any(|s| s.overlaps(start, end))
    };

    let mut stmt = conn
        .prepare("SELECT id, display_name FROM staff WHERE active = 1 ORDER BY sort_order, display_name")
        .map_err(HandlerErr::query)?;
    let staff: Vec<(String, String)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut ranked = Vec::with_capacity(staff.len());
    for (order, (staff_id, display_name)) in staff.into_iter().enumerate() {
        let is_absent = slots.iter().any(|s| {
            absences.iter().any(|a| {
                a.staff_id == staff_id
                    && a.window_on(s.date)
                        .is_some_and(|w| w.overlaps(s.lesson.start_time, s.lesson.end_time))
            })
        });
        if is_absent && !settings.candidate_includes_absent_staff {
            continue;
        }

        let mut clashes = Vec::new();
        for o in &occurrences {
            let key = occurrence_key(o);
            if slot_keys.contains(&key) || !o.involves_staff(&staff_id) {
                continue;
            }
            if o.lesson.staff_id == staff_id && covered_keys.contains(&key) {
                continue;
            }
            if overlaps_any(o.start(), o.end()) {
                clashes.push(clash_json(o, "lesson"));
            }
        }
        for s in substitutions
            .iter()
            .filter(|s| s.substitution.substitute_staff_id == staff_id)
        {
            if slot_keys.contains(&s.key) {
                continue;
            }
            if let Some(o) = by_key.get(&s.key) {
                if overlaps_any(o.start(), o.end()) {
                    clashes.push(clash_json(o, "cover"));
                }
            }
        }

        let week_from = week_start(first, settings.week_start);
        let week_to = week_from + Duration::days(6);
        let this_week = db::cover_count_between(conn, &staff_id, week_from, week_to)
            .map_err(HandlerErr::query)?;
        let total = db::cover_count_total(conn, &staff_id).map_err(HandlerErr::query)?;

        ranked.push((
            (!clashes.is_empty(), is_absent, this_week, order),
            json!({
                "staffId": staff_id,
                "displayName": display_name,
                "isAbsent": is_absent,
                "clashingEvents": clashes,
                "workloadStats": {
                    "weekStart": clock::fmt_date(week_from),
                    "coversThisWeek": this_week,
                    "coversTotal": total
                }
            }),
        ));
    }
    ranked.sort_by(|a, b| a.0.cmp(&b.0));
    let candidates: Vec<Value> = ranked.into_iter().map(|(_, v)| v).collect();
    Ok(json!({ "candidates": candidates }))
}

fn cover_apply(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let assignments: Vec<SubstitutionAssignment> = typed_param(&req.params, "assignments")?;
    if assignments.is_empty() {
        return Err(HandlerErr::field("assignments", "assignments must not be empty"));
    }
    let ids = persist_assignments(db_conn(state)?, &assignments)?;
    refresh_displayed(state)?;
    Ok(json!({ "substitutionIds": ids }))
}

fn cover_remove(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let ids = string_list(&req.params, "substitutionIds")?;
    if ids.is_empty() {
        return Err(HandlerErr::field("substitutionIds", "substitutionIds must not be empty"));
    }
    let removed = persist_removals(db_conn(state)?, &ids)?;
    refresh_displayed(state)?;
    Ok(json!({ "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "cover.events" => cover_events(state, req),
        "cover.candidates" => cover_candidates(state, req),
        "cover.apply" => cover_apply(state, req),
        "cover.remove" => cover_remove(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_start_honours_configured_first_day() {
        let wed = clock::parse_date("2024-01-10").expect("date");
        assert_eq!(week_start(wed, Weekday::Mon), clock::parse_date("2024-01-08").expect("date"));
        assert_eq!(week_start(wed, Weekday::Sun), clock::parse_date("2024-01-07").expect("date"));
        let sun = clock::parse_date("2024-01-07").expect("date");
        assert_eq!(week_start(sun, Weekday::Sun), sun);
        assert_eq!(week_start(sun, Weekday::Mon), clock::parse_date("2024-01-01").expect("date"));
    }
}
