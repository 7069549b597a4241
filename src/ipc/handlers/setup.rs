use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Weekday;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Absences,
    Cover,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "absences" => Some(Self::Absences),
            "cover" => Some(Self::Cover),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Absences => "setup.absences",
            Self::Cover => "setup.cover",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Absences => json!({
            "defaultAbsenceTypeId": null,
            "maxDatesPerAbsence": 366
        }),
        SetupSection::Cover => json!({
            "defaultSubstitutionTypeId": null,
            "candidateIncludesAbsentStaff": false,
            "weekStartsOn": "monday"
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_nullable_id(v: &Value, key: &str) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let s = v.as_str().ok_or_else(|| format!("{} must be string or null", key))?;
    let s = s.trim();
    if s.len() > 64 {
        return Err(format!("{} length must be <= 64", key));
    }
    if s.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::String(s.to_string()))
    }
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Absences => match k.as_str() {
                "defaultAbsenceTypeId" => {
                    obj.insert(k.clone(), parse_nullable_id(v, k)?);
                }
                "maxDatesPerAbsence" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 3660)?));
                }
                _ => return Err(format!("unknown absences field: {}", k)),
            },
            SetupSection::Cover => match k.as_str() {
                "defaultSubstitutionTypeId" => {
                    obj.insert(k.clone(), parse_nullable_id(v, k)?);
                }
                "candidateIncludesAbsentStaff" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "weekStartsOn" => {
                    let s = v
                        .as_str()
                        .ok_or_else(|| format!("{} must be string", k))?
                        .trim()
                        .to_ascii_lowercase();
                    if s != "monday" && s != "sunday" {
                        return Err("weekStartsOn must be one of: monday, sunday".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown cover field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed saved values fall back to defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

#[derive(Debug, Clone)]
pub struct AbsenceSettings {
    pub default_absence_type_id: Option<String>,
    pub max_dates_per_absence: usize,
}

#[derive(Debug, Clone)]
pub struct CoverSettings {
    pub default_substitution_type_id: Option<String>,
    pub candidate_includes_absent_staff: bool,
    pub week_start: Weekday,
}

pub fn absence_settings(conn: &rusqlite::Connection) -> AbsenceSettings {
    let obj = load_section(conn, SetupSection::Absences)
        .unwrap_or_else(|_| default_section(SetupSection::Absences));
    AbsenceSettings {
        default_absence_type_id: obj
            .get("defaultAbsenceTypeId")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        max_dates_per_absence: obj
            .get("maxDatesPerAbsence")
            .and_then(|v| v.as_u64())
            .unwrap_or(366) as usize,
    }
}

pub fn cover_settings(conn: &rusqlite::Connection) -> CoverSettings {
    let obj = load_section(conn, SetupSection::Cover)
        .unwrap_or_else(|_| default_section(SetupSection::Cover));
    CoverSettings {
        default_substitution_type_id: obj
            .get("defaultSubstitutionTypeId")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        candidate_includes_absent_staff: obj
            .get("candidateIncludesAbsentStaff")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        week_start: match obj.get("weekStartsOn").and_then(|v| v.as_str()) {
            Some("sunday") => Weekday::Sun,
            _ => Weekday::Mon,
        },
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let absences = match load_section(conn, SetupSection::Absences) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let cover = match load_section(conn, SetupSection::Cover) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "absences": absences, "cover": cover }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(section = section.key(), "setup updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
