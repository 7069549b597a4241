use crate::assign::AssignmentChoice;
use crate::cover::EventKey;
use crate::ipc::handlers::{cover, setup};
use crate::ipc::helpers::{db_conn, required_str, respond, to_json, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::selection::SelectionInput;
use serde_json::{json, Value};

fn event_key(params: &Value) -> Result<EventKey, HandlerErr> {
    serde_json::from_value(params.clone()).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

fn snapshot(state: &AppState) -> Result<Value, HandlerErr> {
    to_json(&state.selection.snapshot())
}

fn dispatch(state: &mut AppState, input: SelectionInput) -> Result<Value, HandlerErr> {
    state.selection.dispatch(input)?;
    snapshot(state)
}

fn clear(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let input = match required_str(&req.params, "reason")?.as_str() {
        "outsideClick" => SelectionInput::OutsideClick,
        "escape" => SelectionInput::Escape,
        _ => {
            return Err(HandlerErr::field(
                "reason",
                "reason must be one of: outsideClick, escape",
            ))
        }
    };
    dispatch(state, input)
}

fn dialog_open(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    state.selection.open_dialog()?;
    if let Some(conn) = state.db.as_ref() {
        if let Some(default_type) = setup::cover_settings(conn).default_substitution_type_id {
            state.selection.prefill_substitution_type(&default_type);
        }
    }
    let dialog = state
        .selection
        .dialog()
        .ok_or_else(|| HandlerErr::new("invalid_action", "no assignment dialog is open"))?;
    to_json(dialog)
}

fn dialog_cancel(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    state.selection.cancel_dialog();
    snapshot(state)
}

fn submit(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let choice: AssignmentChoice = serde_json::from_value(req.params.clone())
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    let choice = choice.validated()?;
    let assignments = state.selection.submit(&choice)?;
    let ids = cover::persist_assignments(db_conn(state)?, &assignments)?;

    state.selection.complete();
    cover::refresh_displayed(state)?;
    Ok(json!({
        "substitutionIds": ids,
        "selection": snapshot(state)?
    }))
}

fn remove(state: &mut AppState, _req: &Request) -> Result<Value, HandlerErr> {
    let ids = state.selection.removal_ids()?;
    let removed = cover::persist_removals(db_conn(state)?, &ids)?;

    state.selection.complete();
    cover::refresh_displayed(state)?;
    Ok(json!({
        "removed": removed,
        "selection": snapshot(state)?
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "selection.state" => snapshot(state),
        "selection.toggle" => event_key(&req.params).and_then(|k| dispatch(state, SelectionInput::Toggle(k))),
        "selection.openMenu" => {
            event_key(&req.params).and_then(|k| dispatch(state, SelectionInput::OpenMenu(k)))
        }
        "selection.closeMenu" => dispatch(state, SelectionInput::CloseMenu),
        "selection.clear" => clear(state, req),
        "selection.dialogOpen" => dialog_open(state, req),
        "selection.dialogCancel" => dialog_cancel(state, req),
        "selection.submit" => submit(state, req),
        "selection.remove" => remove(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
