// SQLite treats NULLs as distinct in unique indexes, so the
// UNIQUE (template_id, date) constraint pins recurring instances to one row
// per template and date while leaving one-off instances (NULL template_id)
// free inserts.
pub(crate) const STORE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS task_templates (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    rule TEXT NOT NULL,
    goal_id TEXT,
    owner_id TEXT NOT NULL,
    start_of_day TEXT,
    end_of_day TEXT
);

CREATE TABLE IF NOT EXISTS task_instances (
    id TEXT PRIMARY KEY,
    template_id TEXT REFERENCES task_templates(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    date TEXT NOT NULL,
    start_time TEXT,
    end_time TEXT,
    completion TEXT NOT NULL DEFAULT 'pending',
    completed_at TEXT,
    owner_id TEXT NOT NULL,
    notified_at TEXT,
    UNIQUE (template_id, date)
);

CREATE INDEX IF NOT EXISTS idx_task_instances_due
    ON task_instances (date, start_time);

CREATE TABLE IF NOT EXISTS push_subscriptions (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    p256dh_key TEXT NOT NULL,
    auth_key TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_push_subscriptions_owner
    ON push_subscriptions (owner_id);
";
