use crate::assign::{resolve, AssignmentChoice, SubstitutionAssignment};
use crate::clock;
use crate::cover::{CoverEvent, EventKey};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Operator input, including the triggers that clear the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionInput {
    Toggle(EventKey),
    OpenMenu(EventKey),
    CloseMenu,
    /// Interaction outside every event card.
    OutsideClick,
    Escape,
    DataRefreshed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("event {} at {} is not in the displayed range", .0.event_id, clock::fmt_stamp(.0.start_time))]
    UnknownEvent(EventKey),
    #[error("selection is frozen while the context menu is open")]
    MenuOpen,
    #[error("selection cannot change while the assignment dialog is open")]
    DialogOpen,
    #[error("no assignment dialog is open")]
    NoDialog,
    #[error("nothing is selected")]
    NothingSelected,
    #[error("no selected event can be assigned cover")]
    NothingToApply,
    #[error("no selected event has a substitution to remove")]
    NothingToRemove,
}

/// Non-empty set of selected keys.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selected(BTreeSet<EventKey>);

impl Selected {
    fn one(key: EventKey) -> Self {
        Self(BTreeSet::from([key]))
    }

    /// Set with `key` added.
    fn with(mut self, key: EventKey) -> Self {
        self.0.insert(key);
        self
    }

    /// Set with `key` flipped; `None` once it empties.
    fn toggled(mut self, key: &EventKey) -> Option<Self> {
        if !self.0.remove(key) {
            self.0.insert(key.clone());
        }
        (!self.0.is_empty()).then_some(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum SelectionState {
    #[default]
    Idle,
    Selecting(Selected),
    /// `anchor` is always a member of `selected`.
    ContextMenuOpen { selected: Selected, anchor: EventKey },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Selecting,
    ContextMenuOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DialogMode {
    Apply,
    Edit,
}

/// Slot the candidate lookup is asked about.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSlot {
    pub event_id: String,
    pub date: NaiveDate,
    #[serde(with = "clock::stamp")]
    pub start_time: NaiveDateTime,
    #[serde(with = "clock::stamp")]
    pub end_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDialog {
    pub mode: DialogMode,
    pub keys: Vec<EventKey>,
    pub prefill: AssignmentChoice,
    pub event_slots: Vec<EventSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guards {
    pub can_apply: bool,
    pub can_edit: bool,
    pub can_remove: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSnapshot {
    pub phase: Phase,
    pub selected: Vec<EventKey>,
    pub menu_anchor: Option<EventKey>,
    #[serde(flatten)]
    pub guards: Guards,
    pub dialog: Option<AssignmentDialog>,
}

/// Owns the displayed cover events and the operator's selection over them.
#[derive(Debug, Default)]
pub struct CoverSelection {
    events: Vec<CoverEvent>,
    state: SelectionState,
    dialog: Option<AssignmentDialog>,
}

impl CoverSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the displayed events. Counts as fresh data: the selection
    /// is cleared.
    /// Swaps in a fresh projection; clears the selection and any dialog.
    pub fn load(&mut self, events: Vec<CoverEvent>) -> Phase {
        self.events = events;
        self.dispatch(SelectionInput::DataRefreshed).unwrap_or(Phase::Idle)
    }

    pub fn events(&self) -> &[CoverEvent] {
        &self.events
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            SelectionState::Idle => Phase::Idle,
            SelectionState::Selecting(_) => Phase::Selecting,
            SelectionState::ContextMenuOpen { .. } => Phase::ContextMenuOpen,
        }
    }

    pub fn selected_keys(&self) -> Vec<EventKey> {
        match &self.state {
            SelectionState::Idle => Vec::new(),
            SelectionState::Selecting(sel) | SelectionState::ContextMenuOpen { selected: sel, .. } => {
                sel.0.iter().cloned().collect()
            }
        }
    }

    pub fn menu_anchor(&self) -> Option<&EventKey> {
        match &self.state {
            SelectionState::ContextMenuOpen { anchor, .. } => Some(anchor),
            SelectionState::Idle | SelectionState::Selecting(_) => None,
        }
    }

    pub fn dialog(&self) -> Option<&AssignmentDialog> {
        self.dialog.as_ref()
    }

    /// Selected events in display order.
    pub fn selected_events(&self) -> Vec<&CoverEvent> {
        let keys: BTreeSet<EventKey> = self.selected_keys().into_iter().collect();
        self.events
            .iter()
            .filter(|ev| keys.contains(&ev.key()))
            .collect()
    }

    pub fn guards(&self) -> Guards {
        let selected = self.selected_events();
        Guards {
            can_apply: selected.iter().any(|ev| !ev.is_covered()),
            can_edit: selected.len() == 1 && selected[0].is_covered(),
            can_remove: selected.iter().any(|ev| ev.is_covered()),
        }
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            phase: self.phase(),
            selected: self.selected_keys(),
            menu_anchor: self.menu_anchor().cloned(),
            guards: self.guards(),
            dialog: self.dialog.clone(),
        }
    }

    fn reset(&mut self) {
        self.state = SelectionState::Idle;
        self.dialog = None;
    }

    fn ensure_known(&self, key: &EventKey) -> Result<(), SelectionError> {
        if self.events.iter().any(|ev| ev.event_id == key.event_id && ev.start_time == key.start_time) {
            Ok(())
        } else {
            Err(SelectionError::UnknownEvent(key.clone()))
        }
    }

    /// Applies one input to the state machine.
    pub fn dispatch(&mut self, input: SelectionInput) -> Result<Phase, SelectionError> {
        match input {
            SelectionInput::OutsideClick | SelectionInput::Escape | SelectionInput::DataRefreshed => {
                self.reset();
            }
            SelectionInput::Toggle(key) => {
                if self.dialog.is_some() {
                    return Err(SelectionError::DialogOpen);
                }
                if matches!(self.state, SelectionState::ContextMenuOpen { .. }) {
                    return Err(SelectionError::MenuOpen);
                }
                self.ensure_known(&key)?;
                self.state = match std::mem::take(&mut self.state) {
                    SelectionState::Idle => SelectionState::Selecting(Selected::one(key)),
                    SelectionState::Selecting(sel) => match sel.toggled(&key) {
                        Some(sel) => SelectionState::Selecting(sel),
                        None => SelectionState::Idle,
                    },
                    menu @ SelectionState::ContextMenuOpen { .. } => menu,
                };
            }
            SelectionInput::OpenMenu(key) => {
                if self.dialog.is_some() {
                    return Err(SelectionError::DialogOpen);
                }
                self.ensure_known(&key)?;
                let selected = match std::mem::take(&mut self.state) {
                    SelectionState::Idle => Selected::one(key.clone()),
                    SelectionState::Selecting(sel) => sel.with(key.clone()),
                    SelectionState::ContextMenuOpen { selected, .. } => selected.with(key.clone()),
                };
                self.state = SelectionState::ContextMenuOpen {
                    selected,
                    anchor: key,
                };
            }
            SelectionInput::CloseMenu => {
                self.state = match std::mem::take(&mut self.state) {
                    SelectionState::ContextMenuOpen { selected, .. } => {
                        SelectionState::Selecting(selected)
                    }
                    other => other,
                };
            }
        }
        Ok(self.phase())
    }

    /// Opens the assignment dialog for the current selection. A single
    /// covered event opens in edit mode prefilled from its substitution.
    pub fn open_dialog(&mut self) -> Result<&AssignmentDialog, SelectionError> {
        if self.dialog.is_some() {
            return Err(SelectionError::DialogOpen);
        }
        let selected = self.selected_events();
        if selected.is_empty() {
            return Err(SelectionError::NothingSelected);
        }
        let guards = self.guards();
        let (mode, prefill) = if guards.can_edit {
            let sub = selected[0]
                .substitution
                .as_ref()
                .ok_or(SelectionError::NothingToApply)?;
            (
                DialogMode::Edit,
                AssignmentChoice {
                    substitute_staff_id: sub.substitute_staff_id.clone(),
                    substitution_type_id: sub.substitution_type_id.clone(),
                    room_id: sub.room_id.clone(),
                    note: sub.note.clone(),
                },
            )
        } else if guards.can_apply {
            (DialogMode::Apply, AssignmentChoice::default())
        } else {
            return Err(SelectionError::NothingToApply);
        };

        let event_slots: BTreeSet<EventSlot> = selected
            .iter()
            .map(|ev| EventSlot {
                event_id: ev.event_id.clone(),
                date: ev.date(),
                start_time: ev.start_time,
                end_time: ev.end_time,
            })
            .collect();
        let keys: Vec<EventKey> = selected.iter().map(|ev| ev.key()).collect();

        // Choosing a menu action closes the menu.
        self.state = match std::mem::take(&mut self.state) {
            SelectionState::ContextMenuOpen { selected, .. } => SelectionState::Selecting(selected),
            other => other,
        };
        Ok(self.dialog.insert(AssignmentDialog {
            mode,
            keys,
            prefill,
            event_slots: event_slots.into_iter().collect(),
        }))
    }

    /// Fills an empty substitution type in an apply-mode dialog.
    pub fn prefill_substitution_type(&mut self, type_id: &str) {
        if let Some(dialog) = self.dialog.as_mut() {
            if dialog.mode == DialogMode::Apply && dialog.prefill.substitution_type_id.is_empty() {
                dialog.prefill.substitution_type_id = type_id.to_string();
            }
        }
    }

    /// Closes the dialog without side effects; the selection stays.
    pub fn cancel_dialog(&mut self) {
        self.dialog = None;
    }

    /// Resolves the dialog's batch into assignments. The dialog stays open
    /// until [`CoverSelection::complete`] is called after a successful save.
    pub fn submit(&self, choice: &AssignmentChoice) -> Result<Vec<SubstitutionAssignment>, SelectionError> {
        let dialog = self.dialog.as_ref().ok_or(SelectionError::NoDialog)?;
        let batch: Vec<&CoverEvent> = self
            .events
            .iter()
            .filter(|ev| dialog.keys.contains(&ev.key()))
            .collect();
        if batch.is_empty() {
            return Err(SelectionError::NothingSelected);
        }
        Ok(resolve(batch, choice))
    }

    /// Substitution ids of every selected covered event; uncovered events are
    /// skipped.
    pub fn removal_ids(&self) -> Result<Vec<String>, SelectionError> {
        let selected = self.selected_events();
        if selected.is_empty() {
            return Err(SelectionError::NothingSelected);
        }
        let ids: Vec<String> = selected
            .iter()
            .filter_map(|ev| ev.substitution.as_ref().map(|s| s.substitution_id.clone()))
            .collect();
        if ids.is_empty() {
            return Err(SelectionError::NothingToRemove);
        }
        Ok(ids)
    }

    /// Called after an apply or remove succeeded.
    pub fn complete(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::fixtures::event;

    fn engine() -> CoverSelection {
        let mut sel = CoverSelection::new();
        sel.load(vec![
            event("a", "2024-01-08T09:00", None),
            event("b", "2024-01-08T10:00", None),
            event("c", "2024-01-08T11:00", Some(("sub-c", "s5"))),
            event("d", "2024-01-09T09:00", Some(("sub-d", "s6"))),
        ]);
        sel
    }

    fn key(sel: &CoverSelection, id: &str) -> EventKey {
        sel.events()
            .iter()
            .find(|e| e.event_id == id)
            .map(|e| e.key())
            .expect("event")
    }

    fn ids(sel: &CoverSelection) -> Vec<String> {
        sel.selected_keys().into_iter().map(|k| k.event_id).collect()
    }

    #[test]
    fn toggling_twice_returns_to_idle() {
        let mut sel = engine();
        let a = key(&sel, "a");
        assert_eq!(sel.dispatch(SelectionInput::Toggle(a.clone())), Ok(Phase::Selecting));
        assert_eq!(sel.dispatch(SelectionInput::Toggle(a)), Ok(Phase::Idle));
        assert!(sel.selected_keys().is_empty());
    }

    #[test]
    fn right_click_adds_to_an_existing_selection() {
        let mut sel = engine();
        let (a, b, c) = (key(&sel, "a"), key(&sel, "b"), key(&sel, "c"));
        sel.dispatch(SelectionInput::Toggle(a)).expect("toggle a");
        sel.dispatch(SelectionInput::Toggle(b)).expect("toggle b");
        assert_eq!(sel.dispatch(SelectionInput::OpenMenu(c.clone())), Ok(Phase::ContextMenuOpen));
        assert_eq!(ids(&sel), vec!["a", "b", "c"]);
        assert_eq!(sel.menu_anchor(), Some(&c));
    }

    #[test]
    fn right_click_on_a_selected_event_keeps_the_set() {
        let mut sel = engine();
        let (a, b) = (key(&sel, "a"), key(&sel, "b"));
        sel.dispatch(SelectionInput::Toggle(a.clone())).expect("toggle");
        sel.dispatch(SelectionInput::Toggle(b)).expect("toggle");
        sel.dispatch(SelectionInput::OpenMenu(a)).expect("menu");
        assert_eq!(ids(&sel), vec!["a", "b"]);
    }

    #[test]
    fn closing_the_menu_keeps_the_selection() {
        let mut sel = engine();
        let a = key(&sel, "a");
        sel.dispatch(SelectionInput::OpenMenu(a)).expect("menu");
        assert_eq!(sel.dispatch(SelectionInput::CloseMenu), Ok(Phase::Selecting));
        assert_eq!(ids(&sel), vec!["a"]);
    }

    #[test]
    fn clear_triggers_empty_the_selection_from_any_phase() {
        for trigger in [
            SelectionInput::OutsideClick,
            SelectionInput::Escape,
            SelectionInput::DataRefreshed,
        ] {
            let mut sel = engine();
            let (a, b) = (key(&sel, "a"), key(&sel, "b"));
            sel.dispatch(SelectionInput::Toggle(a)).expect("toggle");
            sel.dispatch(SelectionInput::OpenMenu(b)).expect("menu");
            assert_eq!(sel.dispatch(trigger), Ok(Phase::Idle));
            assert!(sel.selected_keys().is_empty());
        }
    }

    #[test]
    fn toggle_is_rejected_while_the_menu_is_open() {
        let mut sel = engine();
        let (a, b) = (key(&sel, "a"), key(&sel, "b"));
        sel.dispatch(SelectionInput::OpenMenu(a)).expect("menu");
        assert_eq!(sel.dispatch(SelectionInput::Toggle(b)), Err(SelectionError::MenuOpen));
        assert_eq!(sel.phase(), Phase::ContextMenuOpen);
        assert_eq!(ids(&sel), vec!["a"]);
    }

    #[test]
    fn unknown_events_are_rejected() {
        let mut sel = engine();
        let ghost = EventKey {
            event_id: "zz".to_string(),
            start_time: key(&sel, "a").start_time,
        };
        assert!(matches!(
            sel.dispatch(SelectionInput::Toggle(ghost)),
            Err(SelectionError::UnknownEvent(_))
        ));
    }

    #[test]
    fn guards_for_mixed_selection() {
        let mut sel = engine();
        sel.dispatch(SelectionInput::Toggle(key(&sel, "a"))).expect("toggle");
        sel.dispatch(SelectionInput::Toggle(key(&sel, "c"))).expect("toggle");
        assert_eq!(
            sel.guards(),
            Guards {
                can_apply: true,
                can_edit: false,
                can_remove: true,
            }
        );
    }

    #[test]
    fn guards_for_single_covered_event() {
        let mut sel = engine();
        sel.dispatch(SelectionInput::Toggle(key(&sel, "c"))).expect("toggle");
        assert_eq!(
            sel.guards(),
            Guards {
                can_apply: false,
                can_edit: true,
                can_remove: true,
            }
        );
    }

    #[test]
    fn edit_dialog_is_prefilled_from_the_substitution() {
        let mut sel = engine();
        let c = key(&sel, "c");
        sel.dispatch(SelectionInput::OpenMenu(c)).expect("menu");
        let dialog = sel.open_dialog().expect("dialog").clone();
        assert_eq!(dialog.mode, DialogMode::Edit);
        assert_eq!(dialog.prefill.substitute_staff_id, "s5");
        assert_eq!(dialog.prefill.substitution_type_id, "cover");
        assert_eq!(sel.phase(), Phase::Selecting);
    }

    #[test]
    fn apply_dialog_collects_slots_and_submit_resolves_the_batch() {
        let mut sel = engine();
        for id in ["a", "b", "d"] {
            sel.dispatch(SelectionInput::Toggle(key(&sel, id))).expect("toggle");
        }
        let dialog = sel.open_dialog().expect("dialog").clone();
        assert_eq!(dialog.mode, DialogMode::Apply);
        assert_eq!(dialog.prefill, AssignmentChoice::default());
        assert_eq!(dialog.event_slots.len(), 3);
        assert_eq!(
            sel.dispatch(SelectionInput::Toggle(key(&sel, "c"))),
            Err(SelectionError::DialogOpen)
        );

        let choice = AssignmentChoice {
            substitute_staff_id: "s9".to_string(),
            substitution_type_id: "cover".to_string(),
            room_id: None,
            note: None,
        };
        let out = sel.submit(&choice).expect("resolve");
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].existing_substitution_id.as_deref(), Some("sub-d"));

        sel.complete();
        assert_eq!(sel.phase(), Phase::Idle);
        assert!(sel.dialog().is_none());
    }

    #[test]
    fn default_substitution_type_only_fills_apply_dialogs() {
        let mut sel = engine();
        sel.dispatch(SelectionInput::Toggle(key(&sel, "a"))).expect("toggle");
        sel.open_dialog().expect("dialog");
        sel.prefill_substitution_type("internal");
        assert_eq!(
            sel.dialog().map(|d| d.prefill.substitution_type_id.as_str()),
            Some("internal")
        );

        let mut edit = engine();
        edit.dispatch(SelectionInput::Toggle(key(&edit, "c"))).expect("toggle");
        edit.open_dialog().expect("dialog");
        edit.prefill_substitution_type("internal");
        assert_eq!(
            edit.dialog().map(|d| d.prefill.substitution_type_id.as_str()),
            Some("cover")
        );
    }

    #[test]
    fn cancelling_the_dialog_keeps_the_selection() {
        let mut sel = engine();
        sel.dispatch(SelectionInput::Toggle(key(&sel, "a"))).expect("toggle");
        sel.open_dialog().expect("dialog");
        sel.cancel_dialog();
        assert_eq!(ids(&sel), vec!["a"]);
        assert_eq!(
            sel.submit(&AssignmentChoice::default()),
            Err(SelectionError::NoDialog)
        );
    }

    #[test]
    fn removal_skips_uncovered_events() {
        let mut sel = engine();
        for id in ["a", "c", "d"] {
            sel.dispatch(SelectionInput::Toggle(key(&sel, id))).expect("toggle");
        }
        assert_eq!(
            sel.removal_ids(),
            Ok(vec!["sub-c".to_string(), "sub-d".to_string()])
        );

        let mut only_uncovered = engine();
        only_uncovered
            .dispatch(SelectionInput::Toggle(key(&only_uncovered, "b")))
            .expect("toggle");
        assert_eq!(only_uncovered.removal_ids(), Err(SelectionError::NothingToRemove));
    }

    #[test]
    fn loading_new_events_clears_selection_and_dialog() {
        let mut sel = engine();
        sel.dispatch(SelectionInput::Toggle(key(&sel, "a"))).expect("toggle");
        sel.open_dialog().expect("dialog");
        let phase = sel.load(vec![event("x", "2024-01-10T09:00", None)]);
        assert_eq!(phase, Phase::Idle);
        assert_eq!(sel.phase(), Phase::Idle);
        assert!(sel.dialog().is_none());
    }
}
