mod dispatcher;
mod run;
mod types;
mod window;

pub use dispatcher::NotificationDispatcher;
pub use run::DispatchRunner;
pub use types::{DispatchOutcome, DispatchSummary, RunState};
pub use window::DueWindow;
