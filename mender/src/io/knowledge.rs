//! Bounded cross-mission lesson store (`<state_dir>/knowledge.json`).
//!
//! Lifecycle: loaded once at mission start, appended to on a resolved
//! outcome, capped to the most recent `max_lessons` entries and saved with
//! write-then-replace immediately after every append.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub date: String,
    pub lesson: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeFile {
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// State handle owned by the recorder for one mission.
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    path: PathBuf,
    max_lessons: usize,
    data: KnowledgeFile,
}

impl KnowledgeStore {
    /// Load the store, treating a missing or unreadable file as empty. An
    /// unreadable file is replaced by the next save. Oversized files are
    /// capped in memory and persisted capped on the next save.
    pub fn load(path: &Path, max_lessons: usize) -> Result<Self> {
        if max_lessons == 0 {
            return Err(anyhow!("max_lessons must be > 0"));
        }
        let mut data = if path.exists() {
            read_file(path).unwrap_or_else(|err| {
                warn!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "knowledge store unreadable, starting empty"
                );
                KnowledgeFile::default()
            })
        } else {
            KnowledgeFile::default()
        };
        cap(&mut data.lessons, max_lessons);
        debug!(lessons = data.lessons.len(), "knowledge loaded");
        Ok(Self {
            path: path.to_path_buf(),
            max_lessons,
            data,
        })
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.data.lessons
    }

    /// Lessons rendered as `date: lesson` lines for the cycle context.
    pub fn context_lines(&self) -> Vec<String> {
        self.data
            .lessons
            .iter()
            .map(|l| format!("{}: {}", l.date, l.lesson))
            .collect()
    }

    /// Append the first non-empty line of `summary` as a lesson and save.
    /// Returns the stored lesson, or `None` when the summary is blank.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn record(&mut self, summary: &str, at: DateTime<Utc>) -> Result<Option<Lesson>> {
        let Some(line) = summary.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Ok(None);
        };
        let lesson = Lesson {
            date: at.format("%Y-%m-%d %H:%M").to_string(),
            lesson: line.to_string(),
        };
        self.data.lessons.push(lesson.clone());
        cap(&mut self.data.lessons, self.max_lessons);
        self.save()?;
        Ok(Some(lesson))
    }

    fn save(&self) -> Result<()> {
        let mut buf =
            serde_json::to_vec_pretty(&self.data).context("serialize knowledge store")?;
        buf.push(b'\n');
        write_atomic(&self.path, &buf)
    }
}

fn read_file(path: &Path) -> Result<KnowledgeFile> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Keep only the newest `max` entries, evicting the oldest first.
fn cap(lessons: &mut Vec<Lesson>, max: usize) {
    if lessons.len() > max {
        let excess = lessons.len() - max;
        lessons.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, minute, 0)
            .single()
            .expect("valid time")
    }

    #[test]
    fn missing_file_loads_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = KnowledgeStore::load(&temp.path().join("knowledge.json"), 5).expect("load");
        assert!(store.lessons().is_empty());
    }

    #[test]
    fn retains_only_the_most_recent_lessons() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("knowledge.json");
        for i in 0..6 {
            let mut store = KnowledgeStore::load(&path, 5).expect("load");
            store
                .record(&format!("lesson {i}\ndetails"), at(i))
                .expect("record");
        }
        let store = KnowledgeStore::load(&path, 5).expect("reload");
        let lessons: Vec<&str> = store.lessons().iter().map(|l| l.lesson.as_str()).collect();
        assert_eq!(lessons, vec!["lesson 1", "lesson 2", "lesson 3", "lesson 4", "lesson 5"]);
        assert_eq!(store.lessons()[0].date, "2026-10-19 09:01");
    }

    #[test]
    fn corrupt_file_loads_empty_and_is_replaced_on_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("knowledge.json");
        fs::write(&path, "{ not json").expect("write");

        let mut store = KnowledgeStore::load(&path, 5).expect("load");
        assert!(store.lessons().is_empty());
        store.record("nginx was down", at(3)).expect("record");

        let reloaded = KnowledgeStore::load(&path, 5).expect("reload");
        assert_eq!(reloaded.context_lines(), vec!["2026-10-19 09:03: nginx was down"]);
    }

    #[test]
    fn blank_summary_records_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("knowledge.json");
        let mut store = KnowledgeStore::load(&path, 5).expect("load");
        assert_eq!(store.record("  \n ", at(0)).expect("record"), None);
        assert!(!path.exists());
    }

    #[test]
    fn oversized_file_is_capped_on_load_and_context_lines_are_dated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("knowledge.json");
        let file = KnowledgeFile {
            lessons: (0..4)
                .map(|i| Lesson {
                    date: format!("d{i}"),
                    lesson: format!("l{i}"),
                })
                .collect(),
        };
        fs::write(&path, serde_json::to_string(&file).expect("json")).expect("write");
        let store = KnowledgeStore::load(&path, 2).expect("load");
        assert_eq!(store.context_lines(), vec!["d2: l2", "d3: l3"]);
    }
}
