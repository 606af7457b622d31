//! Reads the reminder log the `remind_me` tool appends to and marks
//! entries surfaced once the Auto Scheduler's reminder tick has acted
//! on them. The tool only ever appends a record; this module owns
//! rewriting the file, locked the same way `GoalStore` locks its
//! snapshot writes.
//!
//! `when` is free-form natural language (the tool accepts it as a
//! hint, not a parser target), so a record is only treated as
//! structured-due when it happens to parse as RFC3339; otherwise it
//! surfaces on the first tick after being added.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReminderRecord {
    pub text: String,
    pub when: String,
    pub added_at: String,
    pub surfaced: bool,
}

fn reminders_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".agent").join("reminders.jsonl")
}

fn is_due(record: &ReminderRecord, now: DateTime<Utc>) -> bool {
    if record.surfaced {
        return false;
    }
    if record.when.trim().is_empty() {
        return true;
    }
    DateTime::parse_from_rfc3339(record.when.trim()).map(|dt| dt.with_timezone(&Utc) <= now).unwrap_or(true)
}

/// Reminders not yet surfaced whose `when` has arrived, oldest first.
pub fn due_reminders(workspace_root: &Path, now: DateTime<Utc>) -> anyhow::Result<Vec<ReminderRecord>> {
    let path = reminders_path(workspace_root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(&path)?;
    Ok(raw.lines().filter_map(|line| serde_json::from_str::<ReminderRecord>(line).ok()).filter(|r| is_due(r, now)).collect())
}

/// Rewrites the reminder log, marking every record whose `added_at`
/// matches as surfaced. `added_at` carries sub-second precision and one
/// write per `remind_me` call, so collisions aren't a practical concern.
pub fn mark_surfaced(workspace_root: &Path, added_at: &str) -> anyhow::Result<()> {
    let path = reminders_path(workspace_root);
    if !path.exists() {
        return Ok(());
    }
    let raw = fs::read_to_string(&path)?;
    let updated: Vec<ReminderRecord> = raw
        .lines()
        .filter_map(|line| serde_json::from_str::<ReminderRecord>(line).ok())
        .map(|mut r| {
            if r.added_at == added_at {
                r.surfaced = true;
            }
            r
        })
        .collect();

    let mut file = fs::OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
    file.lock_exclusive()?;
    let result = (|| -> anyhow::Result<()> {
        for record in &updated {
            writeln!(file, "{}", serde_json::to_string(record)?)?;
        }
        Ok(())
    })();
    let _ = file.unlock();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_record(dir: &Path, record: &ReminderRecord) {
        fs::create_dir_all(dir.join(".agent")).unwrap();
        let mut file = fs::OpenOptions::new().create(true).append(true).open(reminders_path(dir)).unwrap();
        writeln!(file, "{}", serde_json::to_string(record).unwrap()).unwrap();
    }

    #[test]
    fn reminder_with_no_when_is_due_immediately() {
        let dir = tempfile::tempdir().unwrap();
        write_record(
            dir.path(),
            &ReminderRecord { text: "water plants".into(), when: String::new(), added_at: "a1".into(), surfaced: false },
        );
        assert_eq!(due_reminders(dir.path(), Utc::now()).unwrap().len(), 1);
    }

    #[test]
    fn surfaced_reminder_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        write_record(
            dir.path(),
            &ReminderRecord { text: "water plants".into(), when: String::new(), added_at: "a1".into(), surfaced: true },
        );
        assert!(due_reminders(dir.path(), Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn future_rfc3339_when_is_not_yet_due() {
        let dir = tempfile::tempdir().unwrap();
        let future = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        write_record(dir.path(), &ReminderRecord { text: "call mom".into(), when: future, added_at: "a1".into(), surfaced: false });
        assert!(due_reminders(dir.path(), Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn past_rfc3339_when_is_due() {
        let dir = tempfile::tempdir().unwrap();
        let past = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        write_record(dir.path(), &ReminderRecord { text: "call mom".into(), when: past, added_at: "a1".into(), surfaced: false });
        assert_eq!(due_reminders(dir.path(), Utc::now()).unwrap().len(), 1);
    }

    #[test]
    fn mark_surfaced_persists_and_excludes_afterward() {
        let dir = tempfile::tempdir().unwrap();
        write_record(
            dir.path(),
            &ReminderRecord { text: "water plants".into(), when: String::new(), added_at: "a1".into(), surfaced: false },
        );
        mark_surfaced(dir.path(), "a1").unwrap();
        assert!(due_reminders(dir.path(), Utc::now()).unwrap().is_empty());
    }
}
