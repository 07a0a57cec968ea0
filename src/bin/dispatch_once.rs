//! Run one dispatch cycle against the configured store.
//!
//! Invoked by an external timer (cron or similar) at most once per minute.
//! Expands every template over a rolling one-week window first, then runs the
//! due-window fan-out. An optional first argument scopes the cycle to one
//! owner; the run summary is printed as JSON.

use chrono::{Duration, Utc};
use tracing::warn;

use goalpulse::config::EngineConfig;
use goalpulse::expansion::expand;
use goalpulse::push::HttpPushTransport;
use goalpulse::store::SqliteStore;
use goalpulse::DispatchRunner;

const ROLLING_WINDOW_DAYS: i64 = 7;

fn main() {
    tracing_subscriber::fmt().init();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {}", err);
            std::process::exit(1);
        }
    };
    let store = match SqliteStore::new(config.db_path.clone()) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("failed to open store {}: {}", config.db_path.display(), err);
            std::process::exit(1);
        }
    };

    expand_rolling_window(&store, &config);

    let transport = HttpPushTransport::new(config.send_timeout());
    let owner_scope = std::env::args().nth(1);
    let mut runner = DispatchRunner::new(&store, &store, &transport, &config);
    match runner.run_cycle(owner_scope.as_deref()) {
        Ok(summary) => {
            let rendered = serde_json::to_string_pretty(&summary)
                .unwrap_or_else(|err| format!("{{\"error\":\"{}\"}}", err));
            println!("{}", rendered);
        }
        Err(err) => {
            eprintln!("dispatch cycle failed: {}", err);
            std::process::exit(1);
        }
    }
}

/// Keep instances materialized for the near future. A single template
/// failing to expand does not block the dispatch pass.
fn expand_rolling_window(store: &SqliteStore, config: &EngineConfig) {
    let today = Utc::now().with_timezone(&config.timezone).date_naive();
    let horizon = today + Duration::days(ROLLING_WINDOW_DAYS);
    let templates = match store.templates() {
        Ok(templates) => templates,
        Err(err) => {
            warn!("failed to load templates for expansion: {}", err);
            return;
        }
    };
    for template in &templates {
        if let Err(err) = expand(template, today, horizon, config.timezone, store) {
            warn!(template_id = %template.id, "expansion failed: {}", err);
        }
    }
}
