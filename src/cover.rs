use crate::absence::StaffAbsence;
use crate::clock;
use crate::party::Party;
use crate::schedule::{occurrences_between, Lesson};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Identifies one occurrence of a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventKey {
    pub event_id: String,
    #[serde(with = "clock::stamp")]
    pub start_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substitution {
    pub substitution_id: String,
    pub substitute_staff_id: String,
    pub substitution_type_id: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverEvent {
    pub event_id: String,
    #[serde(with = "clock::stamp")]
    pub start_time: NaiveDateTime,
    #[serde(with = "clock::stamp")]
    pub end_time: NaiveDateTime,
    pub original_staff_id: String,
    pub title: String,
    pub absence_id: Option<String>,
    pub subject_group_id: Option<String>,
    pub room_id: Option<String>,
    pub attendees: Vec<Party>,
    pub substitution: Option<Substitution>,
    pub duplicates_at_same_time: Vec<CoverEvent>,
}

impl CoverEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            event_id: self.event_id.clone(),
            start_time: self.start_time,
        }
    }

    pub fn is_covered(&self) -> bool {
        self.substitution.is_some()
    }

    pub fn date(&self) -> NaiveDate {
        self.start_time.date()
    }
}

/// Marks every event whose substitute is also booked on another event at the
/// same start time. Only the given events are compared.
pub fn annotate_duplicates(events: Vec<CoverEvent>) -> Vec<CoverEvent> {
    let mut groups: HashMap<(String, NaiveDateTime), Vec<usize>> = HashMap::new();
    for (idx, ev) in events.iter().enumerate() {
        if let Some(sub) = &ev.substitution {
            groups
                .entry((sub.substitute_staff_id.clone(), ev.start_time))
                .or_default()
                .push(idx);
        }
    }

    let plain: Vec<CoverEvent> = events
        .iter()
        .map(|ev| CoverEvent {
            duplicates_at_same_time: Vec::new(),
            ..ev.clone()
        })
        .collect();

    events
        .into_iter()
        .enumerate()
        .map(|(idx, mut ev)| {
            let siblings: Vec<CoverEvent> = ev
                .substitution
                .as_ref()
                .and_then(|sub| groups.get(&(sub.substitute_staff_id.clone(), ev.start_time)))
                .filter(|members| members.len() > 1)
                .map(|members| {
                    members
                        .iter()
                        .filter(|&&j| j != idx)
                        .map(|&j| plain[j].clone())
                        .collect()
                })
                .unwrap_or_default();
            ev.duplicates_at_same_time = siblings;
            ev
        })
        .collect()
}

/// Inputs for building the cover projection of one date window.
pub struct ProjectionInput<'a> {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub staff_filter: Option<&'a HashSet<String>>,
    pub lessons: &'a [Lesson],
    pub absences: &'a [StaffAbsence],
    pub substitutions: &'a HashMap<EventKey, Substitution>,
}

/// Lesson occurrences that need cover (original staff member absent) or already
/// have it, annotated with substitute clashes inside the window.
pub fn project(input: &ProjectionInput<'_>) -> Vec<CoverEvent> {
    let mut absences_by_staff: HashMap<&str, Vec<&StaffAbsence>> = HashMap::new();
    for a in input.absences {
        absences_by_staff.entry(a.staff_id.as_str()).or_default().push(a);
    }

    let mut events = Vec::new();
    for occ in occurrences_between(input.lessons, input.from, input.to) {
        let lesson = occ.lesson;
        if let Some(filter) = input.staff_filter {
            if !filter.contains(&lesson.staff_id) {
                continue;
            }
        }
        let key = EventKey {
            event_id: lesson.id.clone(),
            start_time: occ.start(),
        };
        let substitution = input.substitutions.get(&key).cloned();

        let absence = absences_by_staff
            .get(lesson.staff_id.as_str())
            .and_then(|list| {
                list.iter().copied().find(|a| {
                    let Some(window) = a.window_on(occ.date) else {
                        return false;
                    };
                    if !window.overlaps(lesson.start_time, lesson.end_time) {
                        return false;
                    }
                    // Long-term groups carry their own cover.
                    let owned_by_group = lesson
                        .subject_group_id
                        .as_deref()
                        .is_some_and(|g| a.long_term_group_ids().contains(g));
                    !owned_by_group
                })
            });

        if absence.is_none() && substitution.is_none() {
            continue;
        }

        events.push(CoverEvent {
            event_id: lesson.id.clone(),
            start_time: occ.start(),
            end_time: occ.end(),
            original_staff_id: lesson.staff_id.clone(),
            title: lesson.title.clone(),
            absence_id: absence.map(|a| a.id.clone()),
            subject_group_id: lesson.subject_group_id.clone(),
            room_id: lesson.room_id.clone(),
            attendees: lesson.attendees.clone(),
            substitution,
            duplicates_at_same_time: Vec::new(),
        });
    }

    annotate_duplicates(events)
}
