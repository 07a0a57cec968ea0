pub mod config;
pub mod expansion;
pub mod push;
pub mod recurrence;
pub mod store;
pub mod types;

mod notifier;

pub use notifier::{
    DispatchOutcome, DispatchRunner, DispatchSummary, DueWindow, NotificationDispatcher, RunState,
};
