//! nudge library crate
//!
//! A personal task-reminder service: tasks are stored per user and a reminder
//! scheduler keeps nudging the owner inside a daily time window until the task
//! is marked done.

pub mod api;
pub mod cli;
pub mod composer;
pub mod models;
pub mod notify;
pub mod phrases;
pub mod schedule;
pub mod scheduler;
pub mod store;

pub use models::Core;
