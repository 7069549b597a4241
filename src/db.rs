use crate::absence::{AbsenceInterval, DayWindow, IntervalSpan, LongTermLeaveGroup, StaffAbsence};
use crate::assign::SubstitutionAssignment;
use crate::clock;
use crate::cover::{EventKey, Substitution};
use crate::schedule::Lesson;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "coverd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS absence_types(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS substitution_types(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id TEXT PRIMARY KEY,
            staff_id TEXT NOT NULL,
            title TEXT NOT NULL,
            subject_group_id TEXT,
            room_id TEXT,
            first_date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            weekly_until TEXT,
            attendees_json TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY(staff_id) REFERENCES staff(id),
            FOREIGN KEY(room_id) REFERENCES rooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_staff ON lessons(staff_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff_absences(
            id TEXT PRIMARY KEY,
            staff_id TEXT NOT NULL,
            absence_type_id TEXT NOT NULL,
            reason_text TEXT NOT NULL,
            is_long_term_leave INTEGER NOT NULL DEFAULT 0,
            first_date TEXT NOT NULL,
            last_date TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT,
            FOREIGN KEY(staff_id) REFERENCES staff(id),
            FOREIGN KEY(absence_type_id) REFERENCES absence_types(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_absences_staff ON staff_absences(staff_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_absences_dates ON staff_absences(first_date, last_date)",
        [],
    )?;
    // individual_dates holds comma-separated ISO dates.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS absence_intervals(
            absence_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            continuous_start TEXT,
            continuous_end TEXT,
            individual_dates TEXT,
            is_partial_day INTEGER NOT NULL DEFAULT 0,
            leaves_at TEXT,
            returns_at TEXT,
            PRIMARY KEY(absence_id, seq),
            FOREIGN KEY(absence_id) REFERENCES staff_absences(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS absence_long_term_groups(
            absence_id TEXT NOT NULL,
            group_id TEXT NOT NULL,
            covering_staff_id TEXT,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(absence_id, group_id),
            FOREIGN KEY(absence_id) REFERENCES staff_absences(id) ON DELETE CASCADE,
            FOREIGN KEY(covering_staff_id) REFERENCES staff(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS substitutions(
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            start_at TEXT NOT NULL,
            original_staff_id TEXT NOT NULL,
            substitute_staff_id TEXT NOT NULL,
            substitution_type_id TEXT NOT NULL,
            absence_id TEXT,
            room_id TEXT,
            note TEXT,
            created_at TEXT,
            updated_at TEXT,
            UNIQUE(event_id, start_at),
            FOREIGN KEY(event_id) REFERENCES lessons(id),
            FOREIGN KEY(substitute_staff_id) REFERENCES staff(id),
            FOREIGN KEY(substitution_type_id) REFERENCES substitution_types(id),
            FOREIGN KEY(absence_id) REFERENCES staff_absences(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_substitutions_start ON substitutions(start_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_substitutions_substitute ON substitutions(substitute_staff_id)",
        [],
    )?;

    tracing::debug!(workspace = %workspace.display(), "workspace schema ready");
    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn row_exists(conn: &Connection, table: &str, id: &str) -> rusqlite::Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    conn.query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()
        .map(|v| v.is_some())
}

// --- lessons ---

fn parse_date_col(raw: String, idx: usize) -> rusqlite::Result<NaiveDate> {
    clock::parse_date(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("bad date: {raw}").into(),
        )
    })
}

fn parse_time_col(raw: String, idx: usize) -> rusqlite::Result<chrono::NaiveTime> {
    clock::parse_time(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("bad time: {raw}").into(),
        )
    })
}

pub fn insert_lesson(conn: &Connection, lesson: &Lesson) -> rusqlite::Result<()> {
    let attendees = serde_json::to_string(&lesson.attendees).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO lessons(id, staff_id, title, subject_group_id, room_id, first_date, start_time, end_time, weekly_until, attendees_json)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            lesson.id,
            lesson.staff_id,
            lesson.title,
            lesson.subject_group_id,
            lesson.room_id,
            clock::fmt_date(lesson.first_date),
            clock::fmt_time(lesson.start_time),
            clock::fmt_time(lesson.end_time),
            lesson.weekly_until.map(clock::fmt_date),
            attendees,
        ],
    )?;
    Ok(())
}

const LESSON_COLS: &str = "id, staff_id, title, subject_group_id, room_id, first_date, start_time, end_time, weekly_until, attendees_json";

fn lesson_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Lesson> {
    let attendees_raw: String = r.get(9)?;
    Ok(Lesson {
        id: r.get(0)?,
        staff_id: r.get(1)?,
        title: r.get(2)?,
        subject_group_id: r.get(3)?,
        room_id: r.get(4)?,
        first_date: parse_date_col(r.get(5)?, 5)?,
        start_time: parse_time_col(r.get(6)?, 6)?,
        end_time: parse_time_col(r.get(7)?, 7)?,
        weekly_until: r
            .get::<_, Option<String>>(8)?
            .map(|s| parse_date_col(s, 8))
            .transpose()?,
        attendees: serde_json::from_str(&attendees_raw).unwrap_or_default(),
    })
}

/// Lessons that may have an occurrence inside `[from, to]`.
pub fn lessons_between(conn: &Connection, from: NaiveDate, to: NaiveDate) -> rusqlite::Result<Vec<Lesson>> {
    let sql = format!(
        "SELECT {LESSON_COLS}
         FROM lessons
         WHERE first_date <= ?1 AND COALESCE(weekly_until, first_date) >= ?2
         ORDER BY first_date, start_time, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([clock::fmt_date(to), clock::fmt_date(from)], lesson_from_row)?;
    rows.collect()
}

pub fn all_lessons(conn: &Connection) -> rusqlite::Result<Vec<Lesson>> {
    let sql = format!("SELECT {LESSON_COLS} FROM lessons ORDER BY first_date, start_time, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], lesson_from_row)?;
    rows.collect()
}

pub fn lesson_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Lesson>> {
    let sql = format!("SELECT {LESSON_COLS} FROM lessons WHERE id = ?");
    conn.query_row(&sql, [id], lesson_from_row).optional()
}

// --- absences ---

fn encode_dates(dates: &std::collections::BTreeSet<NaiveDate>) -> String {
    dates
        .iter()
        .map(|d| clock::fmt_date(*d))
        .collect::<Vec<_>>()
        .join(",")
}

/// Replaces the stored absence with the same id, or inserts it.
pub fn upsert_absence(conn: &Connection, absence: &StaffAbsence) -> rusqlite::Result<()> {
    let now = clock::now_ts();
    let first = absence.first_date().map(clock::fmt_date).unwrap_or_default();
    let last = absence.last_date().map(clock::fmt_date).unwrap_or_default();
    conn.execute(
        "INSERT INTO staff_absences(id, staff_id, absence_type_id, reason_text, is_long_term_leave, first_date, last_date, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(id) DO UPDATE SET
           staff_id = excluded.staff_id,
           absence_type_id = excluded.absence_type_id,
           reason_text = excluded.reason_text,
           is_long_term_leave = excluded.is_long_term_leave,
           first_date = excluded.first_date,
           last_date = excluded.last_date,
           updated_at = excluded.updated_at",
        params![
            absence.id,
            absence.staff_id,
            absence.absence_type_id,
            absence.reason_text,
            absence.is_long_term_leave as i64,
            first,
            last,
            now,
        ],
    )?;
    conn.execute("DELETE FROM absence_intervals WHERE absence_id = ?", [&absence.id])?;
    conn.execute(
        "DELETE FROM absence_long_term_groups WHERE absence_id = ?",
        [&absence.id],
    )?;

    for (seq, iv) in absence.intervals.iter().enumerate() {
        let (cs, ce, individual) = match &iv.span {
            IntervalSpan::Continuous { start, end } => {
                (Some(clock::fmt_date(*start)), Some(clock::fmt_date(*end)), None)
            }
            IntervalSpan::Individual(dates) => (None, None, Some(encode_dates(dates))),
        };
        let (leaves_at, returns_at) = match iv.window {
            DayWindow::FullDay => (None, None),
            DayWindow::Partial {
                leaves_at,
                returns_at,
            } => (Some(clock::fmt_time(leaves_at)), Some(clock::fmt_time(returns_at))),
        };
        conn.execute(
            "INSERT INTO absence_intervals(absence_id, seq, continuous_start, continuous_end, individual_dates, is_partial_day, leaves_at, returns_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                absence.id,
                seq as i64,
                cs,
                ce,
                individual,
                iv.window.is_partial() as i64,
                leaves_at,
                returns_at,
            ],
        )?;
    }
    for (i, g) in absence.long_term_leave_groups.iter().enumerate() {
        conn.execute(
            "INSERT INTO absence_long_term_groups(absence_id, group_id, covering_staff_id, sort_order)
             VALUES(?, ?, ?, ?)",
            params![absence.id, g.group_id, g.covering_staff_id, i as i64],
        )?;
    }
    Ok(())
}

pub fn delete_absence(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.execute("DELETE FROM absence_intervals WHERE absence_id = ?", [id])?;
    conn.execute("DELETE FROM absence_long_term_groups WHERE absence_id = ?", [id])?;
    conn.execute(
        "UPDATE substitutions SET absence_id = NULL WHERE absence_id = ?",
        [id],
    )?;
    let n = conn.execute("DELETE FROM staff_absences WHERE id = ?", [id])?;
    Ok(n > 0)
}

/// Staff member an absence belongs to.
pub fn absence_staff_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT staff_id FROM staff_absences WHERE id = ?", [id], |r| r.get(0))
        .optional()
}

#[derive(Debug, Clone, Default)]
pub struct AbsenceFilter {
    pub staff_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn load_intervals(conn: &Connection, absence_id: &str) -> rusqlite::Result<Vec<AbsenceInterval>> {
    let mut stmt = conn.prepare(
        "SELECT continuous_start, continuous_end, individual_dates, is_partial_day, leaves_at, returns_at
         FROM absence_intervals
         WHERE absence_id = ?
         ORDER BY seq",
    )?;
    let rows = stmt.query_map([absence_id], |r| {
        let cs: Option<String> = r.get(0)?;
        let ce: Option<String> = r.get(1)?;
        let individual: Option<String> = r.get(2)?;
        let partial = r.get::<_, i64>(3)? != 0;
        let leaves_at = r.get::<_, Option<String>>(4)?.and_then(|s| clock::parse_time(&s));
        let returns_at = r.get::<_, Option<String>>(5)?.and_then(|s| clock::parse_time(&s));

        let span = match (cs, ce) {
            (Some(s), Some(e)) => IntervalSpan::Continuous {
                start: parse_date_col(s, 0)?,
                end: parse_date_col(e, 1)?,
            },
            _ => IntervalSpan::Individual(
                individual
                    .unwrap_or_default()
                    .split(',')
                    .filter_map(clock::parse_date)
                    .collect(),
            ),
        };
        let window = DayWindow::from_parts(!partial, leaves_at, returns_at).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                "partial-day interval without a valid window".into(),
            )
        })?;
        Ok(AbsenceInterval { span, window })
    })?;
    rows.collect()
}

fn load_long_term_groups(conn: &Connection, absence_id: &str) -> rusqlite::Result<Vec<LongTermLeaveGroup>> {
    let mut stmt = conn.prepare(
        "SELECT group_id, covering_staff_id
         FROM absence_long_term_groups
         WHERE absence_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt.query_map([absence_id], |r| {
        Ok(LongTermLeaveGroup {
            group_id: r.get(0)?,
            covering_staff_id: r.get(1)?,
        })
    })?;
    rows.collect()
}

pub fn list_absences(conn: &Connection, filter: &AbsenceFilter) -> rusqlite::Result<Vec<StaffAbsence>> {
    let mut stmt = conn.prepare(
        "SELECT id, staff_id, absence_type_id, reason_text, is_long_term_leave, created_at, updated_at
         FROM staff_absences
         WHERE (?1 IS NULL OR staff_id = ?1)
           AND (?2 IS NULL OR last_date >= ?2)
           AND (?3 IS NULL OR first_date <= ?3)
         ORDER BY first_date, staff_id, id",
    )?;
    let heads = stmt
        .query_map(
            params![
                filter.staff_id,
                filter.from.map(clock::fmt_date),
                filter.to.map(clock::fmt_date),
            ],
            |r| {
                Ok(StaffAbsence {
                    id: r.get(0)?,
                    staff_id: r.get(1)?,
                    absence_type_id: r.get(2)?,
                    reason_text: r.get(3)?,
                    intervals: Vec::new(),
                    is_long_term_leave: r.get::<_, i64>(4)? != 0,
                    long_term_leave_groups: Vec::new(),
                    created_at: r.get(5)?,
                    updated_at: r.get(6)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(heads.len());
    for mut a in heads {
        a.intervals = load_intervals(conn, &a.id)?;
        a.long_term_leave_groups = load_long_term_groups(conn, &a.id)?;
        out.push(a);
    }
    Ok(out)
}

// --- substitutions ---

#[derive(Debug, Clone)]
pub struct StoredSubstitution {
    pub key: EventKey,
    pub substitution: Substitution,
}

/// Substitutions whose slot starts on a date inside `[from, to]`.
pub fn substitutions_between(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> rusqlite::Result<Vec<StoredSubstitution>> {
    let upper = to.succ_opt().unwrap_or(to);
    let mut stmt = conn.prepare(
        "SELECT id, event_id, start_at, substitute_staff_id, substitution_type_id, room_id, note
         FROM substitutions
         WHERE start_at >= ? AND start_at < ?
         ORDER BY start_at, event_id",
    )?;
    let rows = stmt.query_map([clock::fmt_date(from), clock::fmt_date(upper)], |r| {
        let start_raw: String = r.get(2)?;
        let start_time = clock::parse_stamp(&start_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("bad timestamp: {start_raw}").into(),
            )
        })?;
        Ok(StoredSubstitution {
            key: EventKey {
                event_id: r.get(1)?,
                start_time,
            },
            substitution: Substitution {
                substitution_id: r.get(0)?,
                substitute_staff_id: r.get(3)?,
                substitution_type_id: r.get(4)?,
                room_id: r.get(5)?,
                note: r.get(6)?,
            },
        })
    })?;
    rows.collect()
}

pub fn substitutions_by_key(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> rusqlite::Result<HashMap<EventKey, Substitution>> {
    Ok(substitutions_between(conn, from, to)?
        .into_iter()
        .map(|s| (s.key, s.substitution))
        .collect())
}

/// Writes one assignment. Overwrites `existing_substitution_id` when set,
/// otherwise replaces whatever covers the same slot.
pub fn write_assignment(conn: &Connection, a: &SubstitutionAssignment) -> rusqlite::Result<String> {
    let now = clock::now_ts();
    let start_at = clock::fmt_stamp(a.start_time);
    if let Some(existing) = &a.existing_substitution_id {
        let n = conn.execute(
            "UPDATE substitutions SET
               substitute_staff_id = ?, substitution_type_id = ?, room_id = ?, note = ?,
               absence_id = COALESCE(?, absence_id), updated_at = ?
             WHERE id = ? AND event_id = ? AND start_at = ?",
            params![
                a.substitute_staff_id,
                a.substitution_type_id,
                a.room_id,
                a.note,
                a.absence_id,
                now,
                existing,
                a.event_id,
                start_at,
            ],
        )?;
        if n == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        return Ok(existing.clone());
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO substitutions(id, event_id, start_at, original_staff_id, substitute_staff_id, substitution_type_id, absence_id, room_id, note, created_at, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
         ON CONFLICT(event_id, start_at) DO UPDATE SET
           substitute_staff_id = excluded.substitute_staff_id,
           substitution_type_id = excluded.substitution_type_id,
           absence_id = excluded.absence_id,
           room_id = excluded.room_id,
           note = excluded.note,
           updated_at = excluded.updated_at",
        params![
            id,
            a.event_id,
            start_at,
            a.original_staff_id,
            a.substitute_staff_id,
            a.substitution_type_id,
            a.absence_id,
            a.room_id,
            a.note,
            now,
        ],
    )?;
    conn.query_row(
        "SELECT id FROM substitutions WHERE event_id = ? AND start_at = ?",
        (&a.event_id, &start_at),
        |r| r.get(0),
    )
}

pub fn delete_substitution(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    Ok(conn.execute("DELETE FROM substitutions WHERE id = ?", [id])? > 0)
}

/// Number of slots `staff_id` covers with a start inside `[from, to]`.
pub fn cover_count_between(
    conn: &Connection,
    staff_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> rusqlite::Result<i64> {
    let upper = to.succ_opt().unwrap_or(to);
    conn.query_row(
        "SELECT COUNT(*) FROM substitutions
         WHERE substitute_staff_id = ? AND start_at >= ? AND start_at < ?",
        (staff_id, clock::fmt_date(from), clock::fmt_date(upper)),
        |r| r.get(0),
    )
}

pub fn cover_count_total(conn: &Connection, staff_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM substitutions WHERE substitute_staff_id = ?",
        [staff_id],
        |r| r.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::absence::AbsenceDraft;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    fn seed(conn: &Connection) {
        conn.execute("INSERT INTO staff(id, display_name, sort_order) VALUES('s1', 'Ada', 0)", [])
            .expect("staff");
        conn.execute("INSERT INTO absence_types(id, name) VALUES('sick', 'Sick')", [])
            .expect("type");
    }

    #[test]
    fn absence_round_trips_through_the_store() {
        let conn = open_db(&temp_workspace("coverd-db-absence")).expect("open");
        seed(&conn);
        let draft: AbsenceDraft = serde_json::from_value(serde_json::json!({
            "staffId": "s1",
            "absenceTypeId": "sick",
            "reasonText": "flu",
            "dateGroups": [
                { "dates": ["2024-01-01", "2024-01-02", "2024-01-05"] },
                { "dates": ["2024-01-09"], "isFullDay": false, "startTime": "13:00", "endTime": "15:00" }
            ]
        }))
        .expect("draft");
        let absence = draft.into_absence("a1".to_string()).expect("absence");
        upsert_absence(&conn, &absence).expect("upsert");

        let listed = list_absences(
            &conn,
            &AbsenceFilter {
                staff_id: Some("s1".to_string()),
                from: clock::parse_date("2024-01-09"),
                to: None,
            },
        )
        .expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].intervals, absence.intervals);

        let outside = list_absences(
            &conn,
            &AbsenceFilter {
                from: clock::parse_date("2024-02-01"),
                ..Default::default()
            },
        )
        .expect("list");
        assert!(outside.is_empty());

        assert!(delete_absence(&conn, "a1").expect("delete"));
        assert!(list_absences(&conn, &AbsenceFilter::default()).expect("list").is_empty());
    }
}
