use crate::clock;
use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

/// Time-of-day restriction shared by every date of an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DayWindow {
    FullDay,
    Partial {
        leaves_at: NaiveTime,
        returns_at: NaiveTime,
    },
}

impl DayWindow {
    /// Builds the window from the form's flag and optional times. Times are
    /// ignored for a full day.
    pub fn from_parts(
        is_full_day: bool,
        start: Option<NaiveTime>,
        end: Option<NaiveTime>,
    ) -> Result<Self, WindowError> {
        if is_full_day {
            return Ok(Self::FullDay);
        }
        let leaves_at = start.ok_or(WindowError::MissingStart)?;
        let returns_at = end.ok_or(WindowError::MissingEnd)?;
        if returns_at <= leaves_at {
            return Err(WindowError::EndNotAfterStart);
        }
        Ok(Self::Partial {
            leaves_at,
            returns_at,
        })
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }

    /// True when a slot `[start, end)` on a covered date falls (partly) inside
    /// the absence.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        match *self {
            Self::FullDay => true,
            Self::Partial {
                leaves_at,
                returns_at,
            } => leaves_at < end && returns_at > start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowError {
    MissingStart,
    MissingEnd,
    EndNotAfterStart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalSpan {
    /// At least two consecutive days.
    Continuous { start: NaiveDate, end: NaiveDate },
    /// Non-empty, pairwise non-consecutive dates.
    Individual(BTreeSet<NaiveDate>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IntervalWire", into = "IntervalWire")]
pub struct AbsenceInterval {
    pub span: IntervalSpan,
    pub window: DayWindow,
}

impl AbsenceInterval {
    pub fn first_date(&self) -> Option<NaiveDate> {
        match &self.span {
            IntervalSpan::Continuous { start, .. } => Some(*start),
            IntervalSpan::Individual(dates) => dates.first().copied(),
        }
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        match &self.span {
            IntervalSpan::Continuous { end, .. } => Some(*end),
            IntervalSpan::Individual(dates) => dates.last().copied(),
        }
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        match &self.span {
            IntervalSpan::Continuous { start, end } => *start <= date && date <= *end,
            IntervalSpan::Individual(dates) => dates.contains(&date),
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        match &self.span {
            IntervalSpan::Continuous { start, end } => start
                .iter_days()
                .take_while(|d| d <= end)
                .collect(),
            IntervalSpan::Individual(dates) => dates.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntervalWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    continuous_start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    continuous_end: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    individual_dates: Vec<NaiveDate>,
    #[serde(default)]
    is_partial_day: bool,
    #[serde(default, with = "clock::hhmm_opt", skip_serializing_if = "Option::is_none")]
    leaves_at: Option<NaiveTime>,
    #[serde(default, with = "clock::hhmm_opt", skip_serializing_if = "Option::is_none")]
    returns_at: Option<NaiveTime>,
}

impl From<AbsenceInterval> for IntervalWire {
    fn from(iv: AbsenceInterval) -> Self {
        let (continuous_start, continuous_end, individual_dates) = match iv.span {
            IntervalSpan::Continuous { start, end } => (Some(start), Some(end), Vec::new()),
            IntervalSpan::Individual(dates) => (None, None, dates.into_iter().collect()),
        };
        let (leaves_at, returns_at) = match iv.window {
            DayWindow::FullDay => (None, None),
            DayWindow::Partial {
                leaves_at,
                returns_at,
            } => (Some(leaves_at), Some(returns_at)),
        };
        Self {
            continuous_start,
            continuous_end,
            individual_dates,
            is_partial_day: iv.window.is_partial(),
            leaves_at,
            returns_at,
        }
    }
}

impl TryFrom<IntervalWire> for AbsenceInterval {
    type Error = String;

    fn try_from(w: IntervalWire) -> Result<Self, Self::Error> {
        let span = match (w.continuous_start, w.continuous_end, w.individual_dates.is_empty()) {
            (Some(start), Some(end), true) => {
                if end <= start {
                    return Err("continuousEnd must be after continuousStart".to_string());
                }
                IntervalSpan::Continuous { start, end }
            }
            (None, None, false) => {
                IntervalSpan::Individual(w.individual_dates.into_iter().collect())
            }
            _ => {
                return Err(
                    "interval needs either continuousStart/continuousEnd or individualDates"
                        .to_string(),
                )
            }
        };
        let window = DayWindow::from_parts(!w.is_partial_day, w.leaves_at, w.returns_at)
            .map_err(|_| "partial-day interval needs leavesAt < returnsAt".to_string())?;
        Ok(Self { span, window })
    }
}

fn is_next_day(prev: NaiveDate, next: NaiveDate) -> bool {
    prev + Duration::days(1) == next
}

/// Folds a set of dates into the fewest intervals: one per run of two or more
/// consecutive days, plus one bag holding every isolated day.
pub fn normalize(dates: &BTreeSet<NaiveDate>, window: DayWindow) -> Vec<AbsenceInterval> {
    let sorted: Vec<NaiveDate> = dates.iter().copied().collect();
    let mut out = Vec::new();
    let mut singles = BTreeSet::new();
    let mut open: Option<(NaiveDate, NaiveDate)> = None;

    for (i, &date) in sorted.iter().enumerate() {
        let joins_prev = i > 0 && is_next_day(sorted[i - 1], date);
        let joins_next = sorted
            .get(i + 1)
            .is_some_and(|&next| is_next_day(date, next));

        if joins_prev {
            if let Some((_, end)) = open.as_mut() {
                *end = date;
            }
            if !joins_next {
                if let Some((start, end)) = open.take() {
                    out.push(AbsenceInterval {
                        span: IntervalSpan::Continuous { start, end },
                        window,
                    });
                }
            }
        } else if joins_next {
            open = Some((date, date));
        } else {
            singles.insert(date);
        }
    }

    if !singles.is_empty() {
        out.push(AbsenceInterval {
            span: IntervalSpan::Individual(singles),
            window,
        });
    }
    out
}

/// Every date covered by `intervals`.
pub fn covered_dates(intervals: &[AbsenceInterval]) -> BTreeSet<NaiveDate> {
    intervals.iter().flat_map(|iv| iv.dates()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTermLeaveGroup {
    pub group_id: String,
    #[serde(default)]
    pub covering_staff_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffAbsence {
    pub id: String,
    pub staff_id: String,
    pub absence_type_id: String,
    pub reason_text: String,
    pub intervals: Vec<AbsenceInterval>,
    pub is_long_term_leave: bool,
    pub long_term_leave_groups: Vec<LongTermLeaveGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl StaffAbsence {
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.intervals.iter().filter_map(|iv| iv.first_date()).min()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.intervals.iter().filter_map(|iv| iv.last_date()).max()
    }

    /// Window in force on `date`, if the absence covers it.
    pub fn window_on(&self, date: NaiveDate) -> Option<DayWindow> {
        self.intervals
            .iter()
            .find(|iv| iv.covers(date))
            .map(|iv| iv.window)
    }

    /// Subject groups whose cover is owned by a long-term arrangement.
    pub fn long_term_group_ids(&self) -> HashSet<&str> {
        if !self.is_long_term_leave {
            return HashSet::new();
        }
        self.long_term_leave_groups
            .iter()
            .map(|g| g.group_id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("staff member is required")]
    MissingStaff,
    #[error("absence type is required")]
    MissingAbsenceType,
    #[error("at least one date group is required")]
    NoDateGroups,
    #[error("date group {group} has no dates")]
    EmptyDateGroup { group: usize },
    #[error("date group {group} is partial-day but has no start time")]
    MissingStartTime { group: usize },
    #[error("date group {group} is partial-day but has no end time")]
    MissingEndTime { group: usize },
    #[error("date group {group} ends before it starts")]
    EndNotAfterStart { group: usize },
    #[error("{date} appears in more than one date group with different times")]
    ConflictingWindows { group: usize, date: NaiveDate },
    #[error("long-term leave must span at least two days")]
    LongTermTooShort,
    #[error("long-term leave groups require isLongTermLeave")]
    GroupsWithoutLongTermLeave,
    #[error("long-term leave group {group_id} is listed twice")]
    DuplicateLongTermGroup { group_id: String },
}

impl ValidationError {
    /// Form field the error belongs to.
    pub fn field(&self) -> String {
        match self {
            Self::MissingStaff => "staffId".to_string(),
            Self::MissingAbsenceType => "absenceTypeId".to_string(),
            Self::NoDateGroups | Self::LongTermTooShort => "dateGroups".to_string(),
            Self::EmptyDateGroup { group } | Self::ConflictingWindows { group, .. } => {
                format!("dateGroups[{group}].dates")
            }
            Self::MissingStartTime { group } => format!("dateGroups[{group}].startTime"),
            Self::MissingEndTime { group } | Self::EndNotAfterStart { group } => {
                format!("dateGroups[{group}].endTime")
            }
            Self::GroupsWithoutLongTermLeave | Self::DuplicateLongTermGroup { .. } => {
                "longTermLeaveGroups".to_string()
            }
        }
    }
}

fn default_true() -> bool {
    true
}

/// One block of dates picked in the form, sharing a full/partial-day setting.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateGroup {
    #[serde(default)]
    pub dates: Vec<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_full_day: bool,
    #[serde(default, with = "clock::hhmm_opt")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "clock::hhmm_opt")]
    pub end_time: Option<NaiveTime>,
}

impl DateGroup {
    pub fn window(&self, group: usize) -> Result<DayWindow, ValidationError> {
        DayWindow::from_parts(self.is_full_day, self.start_time, self.end_time).map_err(|e| {
            match e {
                WindowError::MissingStart => ValidationError::MissingStartTime { group },
                WindowError::MissingEnd => ValidationError::MissingEndTime { group },
                WindowError::EndNotAfterStart => ValidationError::EndNotAfterStart { group },
            }
        })
    }
}

/// Upsert request for one absence, as submitted by the form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsenceDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub staff_id: String,
    #[serde(default)]
    pub absence_type_id: String,
    #[serde(default)]
    pub reason_text: Option<String>,
    #[serde(default)]
    pub is_long_term_leave: bool,
    #[serde(default)]
    pub date_groups: Vec<DateGroup>,
    #[serde(default)]
    pub long_term_leave_groups: Vec<LongTermLeaveGroup>,
}

impl AbsenceDraft {
    /// Checks the draft and returns the dates of every group keyed by window.
    pub fn validate(&self) -> Result<BTreeMap<DayWindow, BTreeSet<NaiveDate>>, ValidationError> {
        if self.staff_id.trim().is_empty() {
            return Err(ValidationError::MissingStaff);
        }
        if self.absence_type_id.trim().is_empty() {
            return Err(ValidationError::MissingAbsenceType);
        }
        if self.date_groups.is_empty() {
            return Err(ValidationError::NoDateGroups);
        }
        if !self.is_long_term_leave && !self.long_term_leave_groups.is_empty() {
            return Err(ValidationError::GroupsWithoutLongTermLeave);
        }
        let mut seen_groups = HashSet::new();
        for g in &self.long_term_leave_groups {
            if !seen_groups.insert(g.group_id.as_str()) {
                return Err(ValidationError::DuplicateLongTermGroup {
                    group_id: g.group_id.clone(),
                });
            }
        }

        let mut by_window: BTreeMap<DayWindow, BTreeSet<NaiveDate>> = BTreeMap::new();
        let mut window_of: BTreeMap<NaiveDate, DayWindow> = BTreeMap::new();
        for (idx, group) in self.date_groups.iter().enumerate() {
            if group.dates.is_empty() {
                return Err(ValidationError::EmptyDateGroup { group: idx });
            }
            let window = group.window(idx)?;
            for &date in &group.dates {
                match window_of.insert(date, window) {
                    Some(prev) if prev != window => {
                        return Err(ValidationError::ConflictingWindows { group: idx, date });
                    }
                    _ => {}
                }
                by_window.entry(window).or_default().insert(date);
            }
        }
        Ok(by_window)
    }

    /// Validates, normalizes each window's dates once, and builds the record.
    pub fn into_absence(self, id: String) -> Result<StaffAbsence, ValidationError> {
        let by_window = self.validate()?;
        let mut intervals: Vec<AbsenceInterval> = by_window
            .iter()
            .flat_map(|(window, dates)| normalize(dates, *window))
            .collect();

        if self.is_long_term_leave {
            let all = covered_dates(&intervals);
            let (Some(&start), Some(&end)) = (all.first(), all.last()) else {
                return Err(ValidationError::NoDateGroups);
            };
            if start == end {
                return Err(ValidationError::LongTermTooShort);
            }
            intervals = vec![AbsenceInterval {
                span: IntervalSpan::Continuous { start, end },
                window: DayWindow::FullDay,
            }];
        } else {
            intervals.sort_by_key(|iv| (iv.first_date(), iv.window));
        }

        Ok(StaffAbsence {
            id,
            staff_id: self.staff_id.trim().to_string(),
            absence_type_id: self.absence_type_id.trim().to_string(),
            reason_text: self.reason_text.unwrap_or_default().trim().to_string(),
            intervals,
            is_long_term_leave: self.is_long_term_leave,
            long_term_leave_groups: self.long_term_leave_groups,
            created_at: None,
            updated_at: None,
        })
    }
}
