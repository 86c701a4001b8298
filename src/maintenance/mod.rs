//! Periodic upkeep of the stored users and content lists.
//!
//! A pass runs four independent steps concurrently: trim oversized lists
//! when storage is nearly full, deduplicate and re-sort every list, write a
//! single-slot backup, and validate every entry (restoring the backup on
//! any failure). A failing step is logged and never aborts its siblings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::MaintenanceConfig;
use crate::storage::{ContentStore, KvStore, SavedContent, UserDirectory, LAST_MAINTENANCE_KEY};

mod backup;
pub mod handlers;
mod scheduler;
mod validate;

pub use backup::BackupSnapshot;
pub use validate::is_valid_entry;

pub struct Maintenance {
    kv: Arc<dyn KvStore>,
    users: UserDirectory,
    contents: ContentStore,
    clock: Arc<dyn Clock>,
    config: MaintenanceConfig,
    passes: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl StepReport {
    fn from_result(step: &'static str, result: anyhow::Result<String>) -> Self {
        match result {
            Ok(detail) => Self {
                step,
                ok: true,
                detail,
            },
            Err(e) => {
                let detail = format!("{e:#}");
                error!(step, error = %detail, "maintenance step failed");
                Self {
                    step,
                    ok: false,
                    detail,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub steps: Vec<StepReport>,
    /// Whether `last_maintenance` was written for this pass.
    pub stamped: bool,
}

impl Maintenance {
    pub fn new(
        kv: Arc<dyn KvStore>,
        users: UserDirectory,
        contents: ContentStore,
        clock: Arc<dyn Clock>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            kv,
            users,
            contents,
            clock,
            config,
            passes: AtomicU64::new(0),
        }
    }

    /// Passes finished since construction.
    pub fn passes_completed(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Runs one full pass. The four steps share no lock, so their writes
    /// can interleave.
    pub async fn perform_maintenance(&self) -> MaintenanceReport {
        let (cleanup, optimize, backup, validate) = tokio::join!(
            self.cleanup_storage(),
            self.optimize_performance(),
            self.create_backup(),
            self.validate_data(),
        );

        let steps = vec![
            StepReport::from_result(
                "cleanup_storage",
                cleanup.map(|n| format!("trimmed {n} user lists")),
            ),
            StepReport::from_result(
                "optimize_performance",
                optimize.map(|n| format!("removed {n} duplicate entries")),
            ),
            StepReport::from_result(
                "create_backup",
                backup.map(|b| format!("snapshot of {} users", b.users.len())),
            ),
            StepReport::from_result(
                "validate_data",
                validate.map(|restored| {
                    if restored {
                        "invalid data found, restored from backup".to_string()
                    } else {
                        "all entries valid".to_string()
                    }
                }),
            ),
        ];

        let stamped = if steps.iter().any(|s| s.ok) {
            let now = self.clock.now_ms();
            match self.kv.set(LAST_MAINTENANCE_KEY, &now.to_string()).await {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, "failed to record maintenance time");
                    false
                }
            }
        } else {
            error!("every maintenance step failed");
            false
        };

        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        info!(pass, stamped, "maintenance pass finished");
        MaintenanceReport { steps, stamped }
    }

    /// Keeps the most recent `max_items_per_user` entries of every oversized
    /// list, but only when the store reports usage above the threshold.
    /// Returns the number of lists trimmed.
    pub async fn cleanup_storage(&self) -> anyhow::Result<usize> {
        let Some(estimate) = self.kv.estimate().await? else {
            debug!("storage estimate unavailable, skipping cleanup");
            return Ok(0);
        };
        let percent = estimate.used_percent();
        if percent <= self.config.warning_threshold {
            debug!(percent, "storage usage below threshold");
            return Ok(0);
        }
        warn!(
            percent,
            threshold = self.config.warning_threshold,
            "storage usage above threshold, trimming lists"
        );

        let cap = self.config.max_items_per_user;
        let mut trimmed = 0;
        for user_id in self.users.get_users().await?.into_keys() {
            let mut contents = self.contents.load_content(&user_id).await?;
            if contents.len() > cap {
                sort_newest_first(&mut contents);
                contents.truncate(cap);
                self.contents.save_content(&user_id, &contents).await?;
                info!(%user_id, kept = cap, "trimmed content list");
                trimmed += 1;
            }
        }
        Ok(trimmed)
    }

    /// Deduplicates every user's list by id and re-sorts it newest first.
    /// Returns the number of duplicates dropped.
    pub async fn optimize_performance(&self) -> anyhow::Result<usize> {
        let mut removed = 0;
        for user_id in self.users.get_users().await?.into_keys() {
            let contents = self.contents.load_content(&user_id).await?;
            if contents.is_empty() {
                continue;
            }
            let before = contents.len();
            let optimized = dedupe_newest_first(contents);
            removed += before - optimized.len();
            self.contents.save_content(&user_id, &optimized).await?;
        }
        if removed > 0 {
            info!(removed, "dropped duplicate entries");
        }
        Ok(removed)
    }

    /// Checks every stored entry; any invalid entry or unreadable list
    /// restores the whole store from the backup. Returns whether a restore
    /// was attempted.
    pub async fn validate_data(&self) -> anyhow::Result<bool> {
        let needs_restore = match self.find_invalid_users().await {
            Ok(invalid) if invalid.is_empty() => false,
            Ok(invalid) => {
                warn!(users = ?invalid, "invalid content entries found");
                true
            }
            Err(e) => {
                warn!(error = %e, "stored data unreadable during validation");
                true
            }
        };
        if needs_restore {
            self.restore_from_backup().await?;
        }
        Ok(needs_restore)
    }

    async fn find_invalid_users(&self) -> anyhow::Result<Vec<String>> {
        let mut invalid = Vec::new();
        for user_id in self.users.get_users().await?.into_keys() {
            let valid = match self.contents.load_content_raw(&user_id).await? {
                Some(serde_json::Value::Array(items)) => items.iter().all(is_valid_entry),
                Some(_) => false,
                None => true,
            };
            if !valid {
                invalid.push(user_id);
            }
        }
        Ok(invalid)
    }

    /// True when `last_maintenance` is missing, unreadable, in the future,
    /// or older than the interval.
    pub async fn is_overdue(&self) -> bool {
        let last = match self.kv.get(LAST_MAINTENANCE_KEY).await {
            Ok(Some(raw)) => raw.trim().parse::<i64>().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "could not read last maintenance time");
                None
            }
        };
        match last {
            Some(last) => {
                let interval_ms = i64::try_from(self.config.interval.as_millis()).unwrap_or(i64::MAX);
                let now = self.clock.now_ms();
                last > now || now.saturating_sub(last) > interval_ms
            }
            None => true,
        }
    }
}

/// Stable, so equal timestamps keep their relative order.
fn sort_newest_first(contents: &mut [SavedContent]) {
    contents.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// One entry per id, sorted newest first. A repeated id keeps the slot of
/// its first occurrence and the value of its last.
fn dedupe_newest_first(contents: Vec<SavedContent>) -> Vec<SavedContent> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(contents.len());
    let mut out: Vec<SavedContent> = Vec::with_capacity(contents.len());
    for item in contents {
        match slots.get(&item.id) {
            Some(&slot) => out[slot] = item,
            None => {
                slots.insert(item.id.clone(), out.len());
                out.push(item);
            }
        }
    }
    sort_newest_first(&mut out);
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::storage::{MemoryKv, BACKUP_KEY};

    pub(crate) const NOW: i64 = 1_700_000_000_000;

    pub(crate) struct Fixture {
        pub kv: Arc<MemoryKv>,
        pub clock: Arc<ManualClock>,
        pub users: UserDirectory,
        pub contents: ContentStore,
        pub maintenance: Maintenance,
    }

    pub(crate) fn fixture_with(kv: MemoryKv, config: MaintenanceConfig) -> Fixture {
        let kv = Arc::new(kv);
        let clock = Arc::new(ManualClock::at(NOW));
        let users = UserDirectory::new(kv.clone());
        let contents = ContentStore::with_limit(kv.clone(), config.max_items_per_user);
        let maintenance = Maintenance::new(
            kv.clone(),
            users.clone(),
            contents.clone(),
            clock.clone(),
            config,
        );
        Fixture {
            kv,
            clock,
            users,
            contents,
            maintenance,
        }
    }

    pub(crate) fn fixture() -> Fixture {
        fixture_with(MemoryKv::new(), MaintenanceConfig::default())
    }

    pub(crate) fn entry(id: &str, timestamp: i64) -> SavedContent {
        SavedContent {
            id: id.to_string(),
            name: format!("name-{id}"),
            content: format!("content-{id}"),
            timestamp,
        }
    }

    #[tokio::test]
    async fn optimize_keeps_last_duplicate_and_sorts_descending() {
        let f = fixture();
        f.users.save_user("alice", "h").await.unwrap();
        let mut late_dup = entry("a", 50);
        late_dup.content = "second".into();
        f.contents
            .save_content(
                "alice",
                &[entry("a", 10), entry("b", 30), late_dup.clone(), entry("c", 20)],
            )
            .await
            .unwrap();

        let removed = f.maintenance.optimize_performance().await.unwrap();
        assert_eq!(removed, 1);

        let list = f.contents.load_content("alice").await.unwrap();
        assert_eq!(list, vec![late_dup, entry("b", 30), entry("c", 20)]);
    }

    #[tokio::test]
    async fn optimize_leaves_empty_lists_unwritten() {
        let f = fixture();
        f.users.save_user("alice", "h").await.unwrap();
        f.maintenance.optimize_performance().await.unwrap();
        assert_eq!(f.kv.get("clipboard_data_alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cleanup_skips_without_estimate() {
        let config = MaintenanceConfig {
            max_items_per_user: 2,
            ..MaintenanceConfig::default()
        };
        let f = fixture_with(MemoryKv::new(), config);
        f.users.save_user("alice", "h").await.unwrap();
        // write past the cap directly, as an older client could have
        let list = vec![entry("1", 1), entry("2", 2), entry("3", 3)];
        f.kv.set("clipboard_data_alice", &serde_json::to_string(&list).unwrap())
            .await
            .unwrap();

        assert_eq!(f.maintenance.cleanup_storage().await.unwrap(), 0);
        assert_eq!(f.contents.load_content("alice").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cleanup_trims_to_most_recent_when_over_threshold() {
        let config = MaintenanceConfig {
            max_items_per_user: 2,
            warning_threshold: 1.0,
            ..MaintenanceConfig::default()
        };
        let f = fixture_with(MemoryKv::with_quota(10_000), config);
        f.users.save_user("alice", "h").await.unwrap();
        f.users.save_user("bob", "h").await.unwrap();
        let list = vec![entry("1", 1), entry("3", 3), entry("2", 2)];
        f.kv.set("clipboard_data_alice", &serde_json::to_string(&list).unwrap())
            .await
            .unwrap();
        f.contents.save_content("bob", &[entry("x", 9)]).await.unwrap();

        assert_eq!(f.maintenance.cleanup_storage().await.unwrap(), 1);
        assert_eq!(
            f.contents.load_content("alice").await.unwrap(),
            vec![entry("3", 3), entry("2", 2)]
        );
        assert_eq!(f.contents.load_content("bob").await.unwrap(), vec![entry("x", 9)]);
    }

    #[tokio::test]
    async fn cleanup_does_nothing_below_threshold() {
        let config = MaintenanceConfig {
            max_items_per_user: 1,
            ..MaintenanceConfig::default()
        };
        let f = fixture_with(MemoryKv::with_quota(1_000_000), config);
        f.users.save_user("alice", "h").await.unwrap();
        let list = vec![entry("1", 1), entry("2", 2)];
        f.kv.set("clipboard_data_alice", &serde_json::to_string(&list).unwrap())
            .await
            .unwrap();

        assert_eq!(f.maintenance.cleanup_storage().await.unwrap(), 0);
        assert_eq!(f.contents.load_content("alice").await.unwrap(), list);
    }

    #[tokio::test]
    async fn validate_restores_when_content_field_missing() {
        let f = fixture();
        f.users.save_user("alice", "h").await.unwrap();
        f.users.save_user("bob", "h").await.unwrap();
        f.contents.save_content("alice", &[entry("a", 2)]).await.unwrap();
        f.contents.save_content("bob", &[entry("b", 1)]).await.unwrap();
        let snapshot = f.maintenance.create_backup().await.unwrap();

        // bob's data is fine but gets rolled back too
        f.contents
            .save_content("bob", &[entry("b2", 5), entry("b", 1)])
            .await
            .unwrap();
        f.kv.set(
            "clipboard_data_alice",
            r#"[{"id":"a","name":"n","timestamp":2}]"#,
        )
        .await
        .unwrap();

        assert!(f.maintenance.validate_data().await.unwrap());
        for (user_id, list) in &snapshot.contents {
            assert_eq!(&f.contents.load_content(user_id).await.unwrap(), list);
        }
    }

    #[tokio::test]
    async fn validate_restores_on_non_array_list() {
        let f = fixture();
        f.users.save_user("alice", "h").await.unwrap();
        f.contents.save_content("alice", &[entry("a", 2)]).await.unwrap();
        f.maintenance.create_backup().await.unwrap();
        f.kv.set("clipboard_data_alice", r#"{"id":"a"}"#).await.unwrap();

        assert!(f.maintenance.validate_data().await.unwrap());
        assert_eq!(
            f.contents.load_content("alice").await.unwrap(),
            vec![entry("a", 2)]
        );
    }

    #[tokio::test]
    async fn validate_passes_clean_data() {
        let f = fixture();
        f.users.save_user("alice", "h").await.unwrap();
        f.contents.save_content("alice", &[entry("a", 2)]).await.unwrap();
        assert!(!f.maintenance.validate_data().await.unwrap());
    }

    #[tokio::test]
    async fn pass_stamps_last_maintenance() {
        let f = fixture();
        f.users.save_user("alice", "h").await.unwrap();
        f.contents
            .save_content("alice", &[entry("a", 1), entry("a", 2)])
            .await
            .unwrap();

        let report = f.maintenance.perform_maintenance().await;
        assert!(report.stamped);
        assert_eq!(report.steps.len(), 4);
        assert!(report.steps.iter().all(|s| s.ok));
        assert_eq!(
            f.kv.get(LAST_MAINTENANCE_KEY).await.unwrap(),
            Some(NOW.to_string())
        );
        assert!(f.kv.get(BACKUP_KEY).await.unwrap().is_some());
        assert_eq!(f.maintenance.passes_completed(), 1);
    }

    #[tokio::test]
    async fn pass_recovers_corrupted_list_from_earlier_backup() {
        let f = fixture();
        f.users.save_user("alice", "h").await.unwrap();
        f.contents
            .save_content("alice", &[entry("b", 2), entry("a", 1)])
            .await
            .unwrap();
        f.maintenance.create_backup().await.unwrap();
        f.kv.set("clipboard_data_alice", r#"[{"id":7}]"#).await.unwrap();

        let report = f.maintenance.perform_maintenance().await;
        assert!(report.stamped);
        assert_eq!(
            f.contents.load_content("alice").await.unwrap(),
            vec![entry("b", 2), entry("a", 1)]
        );
    }

    #[tokio::test]
    async fn no_stamp_when_every_step_fails() {
        let config = MaintenanceConfig {
            warning_threshold: 0.0,
            ..MaintenanceConfig::default()
        };
        let f = fixture_with(MemoryKv::with_quota(1_000_000), config);
        // unreadable directory and backup: nothing can be read or restored
        f.kv.set("clipboard_users", "{broken").await.unwrap();
        f.kv.set(BACKUP_KEY, "{broken").await.unwrap();

        let report = f.maintenance.perform_maintenance().await;
        assert!(report.steps.iter().all(|s| !s.ok));
        assert!(!report.stamped);
        assert_eq!(f.kv.get(LAST_MAINTENANCE_KEY).await.unwrap(), None);
    }

    #[test]
    fn dedupe_ties_keep_first_occurrence_slot() {
        let out = dedupe_newest_first(vec![
            entry("x", 5),
            entry("y", 5),
            entry("x", 5),
            entry("z", 9),
        ]);
        let ids: Vec<_> = out.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["z", "x", "y"]);
    }

    #[tokio::test]
    async fn overdue_detection() {
        let f = fixture();
        assert!(f.maintenance.is_overdue().await);

        let hour = 60 * 60 * 1000;
        f.kv.set(LAST_MAINTENANCE_KEY, &(NOW - hour).to_string())
            .await
            .unwrap();
        assert!(!f.maintenance.is_overdue().await);

        f.clock.advance(12 * hour);
        assert!(f.maintenance.is_overdue().await);

        f.kv.set(LAST_MAINTENANCE_KEY, "yesterday").await.unwrap();
        assert!(f.maintenance.is_overdue().await);
    }

    #[tokio::test]
    async fn extreme_stamps_count_as_overdue() {
        let f = fixture();
        f.kv.set(LAST_MAINTENANCE_KEY, &i64::MIN.to_string())
            .await
            .unwrap();
        assert!(f.maintenance.is_overdue().await);

        f.kv.set(LAST_MAINTENANCE_KEY, &i64::MAX.to_string())
            .await
            .unwrap();
        assert!(f.maintenance.is_overdue().await);

        f.kv.set(LAST_MAINTENANCE_KEY, &(NOW + 1).to_string())
            .await
            .unwrap();
        assert!(f.maintenance.is_overdue().await);
    }

    #[tokio::test]
    async fn concurrent_saves_can_clobber_each_other() {
        // read-modify-write without locking: both writers read the same
        // list and the later write silently wins
        let f = fixture();
        f.contents.save_content("alice", &[entry("a", 1)]).await.unwrap();

        let mut first = f.contents.load_content("alice").await.unwrap();
        let mut second = f.contents.load_content("alice").await.unwrap();
        first.insert(0, entry("from-first", 2));
        second.insert(0, entry("from-second", 3));
        f.contents.save_content("alice", &first).await.unwrap();
        f.contents.save_content("alice", &second).await.unwrap();

        let list = f.contents.load_content("alice").await.unwrap();
        assert!(list.iter().all(|e| e.id != "from-first"));
        assert_eq!(list.len(), 2);
    }
}
