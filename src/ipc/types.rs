use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;

use crate::selection::CoverSelection;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Date window and staff filter of the cover projection on screen.
#[derive(Debug, Clone)]
pub struct CoverWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub staff_ids: Option<Vec<String>>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub selection: CoverSelection,
    pub displayed: Option<CoverWindow>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            selection: CoverSelection::new(),
            displayed: None,
        }
    }
}
