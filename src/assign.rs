use crate::clock;
use crate::cover::CoverEvent;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the operator picked in the assignment dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentChoice {
    #[serde(default)]
    pub substitute_staff_id: String,
    #[serde(default)]
    pub substitution_type_id: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChoiceError {
    #[error("substitute staff member is required")]
    MissingSubstitute,
    #[error("substitution type is required")]
    MissingSubstitutionType,
}

impl ChoiceError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingSubstitute => "substituteStaffId",
            Self::MissingSubstitutionType => "substitutionTypeId",
        }
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl AssignmentChoice {
    /// Trims the choice and rejects missing required picks.
    pub fn validated(self) -> Result<Self, ChoiceError> {
        let substitute_staff_id = self.substitute_staff_id.trim().to_string();
        if substitute_staff_id.is_empty() {
            return Err(ChoiceError::MissingSubstitute);
        }
        let substitution_type_id = self.substitution_type_id.trim().to_string();
        if substitution_type_id.is_empty() {
            return Err(ChoiceError::MissingSubstitutionType);
        }
        Ok(Self {
            substitute_staff_id,
            substitution_type_id,
            room_id: non_blank(self.room_id),
            note: non_blank(self.note),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstitutionAssignment {
    pub event_id: String,
    #[serde(with = "clock::stamp")]
    pub start_time: NaiveDateTime,
    pub original_staff_id: String,
    pub substitute_staff_id: String,
    #[serde(default)]
    pub absence_id: Option<String>,
    pub substitution_type_id: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    /// Set when the slot is already covered; the store overwrites it.
    #[serde(default)]
    pub existing_substitution_id: Option<String>,
}

/// One assignment per selected event, all sharing the chosen substitute.
pub fn resolve<'a, I>(selection: I, choice: &AssignmentChoice) -> Vec<SubstitutionAssignment>
where
    I: IntoIterator<Item = &'a CoverEvent>,
{
    selection
        .into_iter()
        .map(|ev| SubstitutionAssignment {
            event_id: ev.event_id.clone(),
            start_time: ev.start_time,
            original_staff_id: ev.original_staff_id.clone(),
            substitute_staff_id: choice.substitute_staff_id.clone(),
            absence_id: ev.absence_id.clone(),
            substitution_type_id: choice.substitution_type_id.clone(),
            note: choice.note.clone(),
            room_id: choice.room_id.clone(),
            existing_substitution_id: ev
                .substitution
                .as_ref()
                .map(|s| s.substitution_id.clone()),
        })
        .collect()
}
