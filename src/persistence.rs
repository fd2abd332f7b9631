use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    crawler::CrawlState,
    types::{Audit, AuditError},
};

const CRAWL_STATE_FILE: &str = "crawl_state.json";
const AUDITS_FILE: &str = "audits.json";

/// History cap; the oldest audit beyond it is silently dropped on insert.
pub const MAX_SAVED_AUDITS: usize = 10;

/// Durable storage for the live crawl checkpoint and the audit history, as
/// JSON files inside one state directory. The checkpoint exists only while a
/// crawl is in flight; the audit list is most-recent-first.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(StateStore { dir })
    }

    pub fn save_checkpoint(&self, state: &CrawlState) -> Result<(), AuditError> {
        self.write_json(CRAWL_STATE_FILE, state)
    }

    pub fn load_checkpoint(&self) -> Result<Option<CrawlState>, AuditError> {
        self.read_json(CRAWL_STATE_FILE)
    }

    pub fn clear_checkpoint(&self) -> Result<(), AuditError> {
        match fs::remove_file(self.dir.join(CRAWL_STATE_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Saved audits, most recent first.
    pub fn audits(&self) -> Result<Vec<Audit>, AuditError> {
        Ok(self.read_json(AUDITS_FILE)?.unwrap_or_default())
    }

    pub fn push_audit(&self, audit: &Audit) -> Result<(), AuditError> {
        let mut audits = self.audits()?;
        audits.insert(0, audit.clone());
        audits.truncate(MAX_SAVED_AUDITS);
        self.write_json(AUDITS_FILE, &audits)
    }

    pub fn delete_audit(&self, id: i64) -> Result<(), AuditError> {
        let mut audits = self.audits()?;
        audits.retain(|a| a.id != id);
        self.write_json(AUDITS_FILE, &audits)
    }

    // Write-to-temp plus rename so a crash mid-write never corrupts the
    // previous snapshot.
    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), AuditError> {
        let tmp = self.dir.join(format!("{}.tmp", name));
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, self.dir.join(name))?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AuditError> {
        match fs::read(self.dir.join(name)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::CrawlPhase;
    use chrono::Utc;
    use tempfile::TempDir;

    fn audit(id: i64) -> Audit {
        Audit {
            id,
            start_url: "https://example.com".into(),
            overall_score: 75,
            page_count: 0,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            pages: vec![],
            aggregate: None,
            completed: true,
        }
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        assert!(store.load_checkpoint().unwrap().is_none());

        let mut state = CrawlState::new("https://example.com");
        let seed = state.frontier.pop().unwrap();
        state.frontier.claim(&seed.url);
        state.frontier.enqueue("https://example.com/a", 1);
        store.save_checkpoint(&state).unwrap();

        let restored = store.load_checkpoint().unwrap().unwrap();
        assert_eq!(restored.status, CrawlPhase::Running);
        assert_eq!(restored.start_url, "https://example.com");
        assert!(restored.frontier.is_visited("https://example.com"));
        assert_eq!(restored.frontier.remaining(), 1);
    }

    #[test]
    fn clearing_a_missing_checkpoint_is_fine() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        store.clear_checkpoint().unwrap();

        store.save_checkpoint(&CrawlState::new("https://example.com")).unwrap();
        store.clear_checkpoint().unwrap();
        assert!(store.load_checkpoint().unwrap().is_none());
    }

    #[test]
    fn audit_history_is_capped_and_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).unwrap();

        for id in 0..12 {
            store.push_audit(&audit(id)).unwrap();
        }
        let audits = store.audits().unwrap();
        assert_eq!(audits.len(), MAX_SAVED_AUDITS);
        assert_eq!(audits[0].id, 11);
        assert_eq!(audits[9].id, 2);
    }

    #[test]
    fn delete_audit_by_id() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        store.push_audit(&audit(1)).unwrap();
        store.push_audit(&audit(2)).unwrap();

        store.delete_audit(1).unwrap();
        let audits = store.audits().unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].id, 2);
    }
}
