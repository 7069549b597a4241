pub mod absences;
pub mod catalog;
pub mod core;
pub mod cover;
pub mod selection;
pub mod setup;
