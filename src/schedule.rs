use crate::clock;
use crate::party::Party;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A timetabled lesson, optionally repeating weekly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[serde(default)]
    pub id: String,
    pub staff_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subject_group_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    pub first_date: NaiveDate,
    #[serde(with = "clock::hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "clock::hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub weekly_until: Option<NaiveDate>,
    #[serde(default)]
    pub attendees: Vec<Party>,
}

/// One concrete slot of a lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence<'a> {
    pub lesson: &'a Lesson,
    pub date: NaiveDate,
}

impl Occurrence<'_> {
    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.lesson.start_time)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.date.and_time(self.lesson.end_time)
    }

    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start() < end && self.end() > start
    }

    /// True when `staff_id` teaches the lesson or attends it as staff.
    pub fn involves_staff(&self, staff_id: &str) -> bool {
        self.lesson.staff_id == staff_id
            || self
                .lesson
                .attendees
                .iter()
                .any(|p| p.staff_id() == Some(staff_id))
    }
}

impl Lesson {
    pub fn validate(&self) -> Result<(), String> {
        if self.staff_id.trim().is_empty() {
            return Err("staffId".to_string());
        }
        if self.end_time <= self.start_time {
            return Err("endTime".to_string());
        }
        if self.weekly_until.is_some_and(|u| u < self.first_date) {
            return Err("weeklyUntil".to_string());
        }
        Ok(())
    }

    /// Occurrence dates inside `[from, to]`.
    pub fn dates_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
        let last = self.weekly_until.unwrap_or(self.first_date).min(to);
        let mut out = Vec::new();
        let mut date = self.first_date;
        if date < from {
            let weeks = (from - date).num_days().div_euclid(7);
            date += Duration::weeks(weeks);
            if date < from {
                date += Duration::weeks(1);
            }
        }
        while date <= last {
            if date >= from {
                out.push(date);
            }
            if self.weekly_until.is_none() {
                break;
            }
            date += Duration::weeks(1);
        }
        out
    }

    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        self.dates_between(date, date).first() == Some(&date)
    }
}

/// Every occurrence of `lessons` inside `[from, to]`, ordered by start.
pub fn occurrences_between(lessons: &[Lesson], from: NaiveDate, to: NaiveDate) -> Vec<Occurrence<'_>> {
    let mut out: Vec<Occurrence<'_>> = lessons
        .iter()
        .flat_map(|lesson| {
            lesson
                .dates_between(from, to)
                .into_iter()
                .map(move |date| Occurrence { lesson, date })
        })
        .collect();
    out.sort_by(|a, b| {
        a.start()
            .cmp(&b.start())
            .then_with(|| a.lesson.id.cmp(&b.lesson.id))
    });
    out
}
