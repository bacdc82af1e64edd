use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use duel_domain::{DuelId, DuelRecord, Lamports, TokenSymbol};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

/// Fixed reaper wake interval.
pub const REAPER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Clone)]
struct Entry {
    record: DuelRecord,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub created: u64,
    pub expired: u64,
    pub live: usize,
}

/// Process-lifetime duel storage: keyed records with per-entry expiry plus
/// the side collections the escrow engine needs for recovery and dust.
///
/// Authoritative only while the process lives; the on-ledger commitment
/// trail is the durable record.
#[derive(Debug, Default)]
pub struct DuelStore {
    entries: Mutex<HashMap<String, Entry>>,
    dust: Mutex<HashMap<TokenSymbol, Lamports>>,
    pending_recovery: Mutex<HashSet<String>>,
    failed_recovery: Mutex<HashSet<String>>,
    created: AtomicU64,
    expired: AtomicU64,
}

impl DuelStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert with an absolute expiry of `now + ttl`.
    pub fn set(&self, record: DuelRecord, ttl: Duration) -> Result<(), StoreError> {
        let key = record.duel_id.as_str().to_string();
        let entry = Entry {
            record,
            expires_at: Utc::now() + ttl,
        };
        let previous = self
            .entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(key, entry);
        if previous.is_none() {
            self.created.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Fetch a record; lazily evicts and reports absent when past expiry.
    pub fn get(&self, duel_id: &DuelId) -> Result<Option<DuelRecord>, StoreError> {
        let now = Utc::now();
        let mut guard = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        match guard.get(duel_id.as_str()) {
            Some(entry) if entry.expires_at < now => {
                guard.remove(duel_id.as_str());
                self.expired.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.record.clone())),
            None => Ok(None),
        }
    }

    pub fn delete(&self, duel_id: &DuelId) -> Result<(), StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(duel_id.as_str());
        Ok(())
    }

    /// Accumulate sub-minimum house fees; returns the new total.
    pub fn add_dust(&self, token: TokenSymbol, delta: Lamports) -> Result<Lamports, StoreError> {
        let mut guard = self.dust.lock().map_err(|_| StoreError::LockPoisoned)?;
        let total = guard.entry(token).or_insert(Lamports::ZERO);
        *total = Lamports(total.as_u128().saturating_add(delta.as_u128()));
        Ok(*total)
    }

    pub fn read_dust(&self, token: TokenSymbol) -> Result<Lamports, StoreError> {
        Ok(self
            .dust
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .get(&token)
            .copied()
            .unwrap_or(Lamports::ZERO))
    }

    pub fn reset_dust(&self, token: TokenSymbol) -> Result<(), StoreError> {
        self.dust
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(token, Lamports::ZERO);
        Ok(())
    }

    pub fn add_pending_recovery(&self, duel_id: &DuelId) -> Result<(), StoreError> {
        self.pending_recovery
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(duel_id.as_str().to_string());
        Ok(())
    }

    pub fn remove_pending_recovery(&self, duel_id: &DuelId) -> Result<(), StoreError> {
        self.pending_recovery
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(duel_id.as_str());
        Ok(())
    }

    pub fn list_pending_recovery(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .pending_recovery
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .iter()
            .cloned()
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn add_failed_recovery(&self, duel_id: &DuelId) -> Result<(), StoreError> {
        self.failed_recovery
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(duel_id.as_str().to_string());
        Ok(())
    }

    pub fn remove_failed_recovery(&self, duel_id: &DuelId) -> Result<(), StoreError> {
        self.failed_recovery
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(duel_id.as_str());
        Ok(())
    }

    pub fn list_failed_recovery(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .failed_recovery
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .iter()
            .cloned()
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            created: self.created.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            live: self.entries.lock().map(|g| g.len()).unwrap_or(0),
        }
    }

    /// Drop every entry past its expiry; returns how many were evicted.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut guard = self.entries.lock().map_err(|_| StoreError::LockPoisoned)?;
        let before = guard.len();
        guard.retain(|_, entry| entry.expires_at >= now);
        let evicted = before - guard.len();
        if evicted > 0 {
            self.expired.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        Ok(evicted)
    }

    /// Background reaper: wakes on a fixed interval and sweeps expired
    /// records until the shutdown channel flips. Holds no lock across an
    /// await point.
    pub async fn run_reaper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(REAPER_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_expired(Utc::now()) {
                        Ok(0) => {}
                        Ok(evicted) => debug!(evicted, "reaper swept expired duels"),
                        Err(err) => debug!(error = %err, "reaper sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("reaper stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_domain::{DuelStatus, Participant, StealthId};

    fn stealth(byte: u8) -> StealthId {
        StealthId::from_hex(hex_bytes(byte)).expect("stealth id")
    }

    fn hex_bytes(byte: u8) -> String {
        format!("{byte:02x}").repeat(32)
    }

    fn record() -> DuelRecord {
        let now = Utc::now();
        DuelRecord {
            duel_id: DuelId::generate(),
            status: DuelStatus::PendingStakes,
            player1: Participant::new(stealth(1), "c1", "P1", Lamports(100)),
            player2: Participant::new(stealth(2), "c2", "P2", Lamports(100)),
            token: TokenSymbol::Sol,
            house_fee_percent: 2,
            rules: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::seconds(1800),
            winner_stealth_id: None,
            settlement_tx_signatures: Vec::new(),
            combat_summary: None,
        }
    }

    #[test]
    fn set_get_delete_round_trip() {
        let store = DuelStore::new();
        let rec = record();
        let id = rec.duel_id.clone();
        store.set(rec.clone(), Duration::seconds(60)).expect("set");
        assert_eq!(store.get(&id).expect("get"), Some(rec));
        store.delete(&id).expect("delete");
        assert_eq!(store.get(&id).expect("get"), None);
    }

    #[test]
    fn get_evicts_past_expiry() {
        let store = DuelStore::new();
        let rec = record();
        let id = rec.duel_id.clone();
        store.set(rec, Duration::seconds(-1)).expect("set");
        assert_eq!(store.get(&id).expect("get"), None);
        let stats = store.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn upsert_counts_created_once_per_key() {
        let store = DuelStore::new();
        let rec = record();
        store.set(rec.clone(), Duration::seconds(60)).expect("set");
        store.set(rec, Duration::seconds(120)).expect("re-set");
        assert_eq!(store.stats().created, 1);
    }

    #[test]
    fn dust_accumulates_and_resets_per_token() {
        let store = DuelStore::new();
        assert_eq!(
            store
                .add_dust(TokenSymbol::Sol, Lamports(4_378_000))
                .expect("add"),
            Lamports(4_378_000)
        );
        assert_eq!(
            store
                .add_dust(TokenSymbol::Sol, Lamports(4_378_000))
                .expect("add"),
            Lamports(8_756_000)
        );
        assert_eq!(
            store.read_dust(TokenSymbol::Radr).expect("read"),
            Lamports::ZERO
        );
        store.reset_dust(TokenSymbol::Sol).expect("reset");
        assert_eq!(
            store.read_dust(TokenSymbol::Sol).expect("read"),
            Lamports::ZERO
        );
    }

    #[test]
    fn recovery_sets_are_independent() {
        let store = DuelStore::new();
        let a = DuelId::generate();
        let b = DuelId::generate();
        store.add_pending_recovery(&a).expect("pending");
        store.add_failed_recovery(&b).expect("failed");

        assert_eq!(
            store.list_pending_recovery().expect("list"),
            vec![a.as_str().to_string()]
        );
        assert_eq!(
            store.list_failed_recovery().expect("list"),
            vec![b.as_str().to_string()]
        );

        store.remove_pending_recovery(&a).expect("remove");
        assert!(store.list_pending_recovery().expect("list").is_empty());
        assert_eq!(store.list_failed_recovery().expect("list").len(), 1);
    }

    #[test]
    fn sweep_expired_only_drops_stale_entries() {
        let store = DuelStore::new();
        let fresh = record();
        let stale = record();
        let fresh_id = fresh.duel_id.clone();
        store.set(fresh, Duration::seconds(600)).expect("set");
        store.set(stale, Duration::seconds(-5)).expect("set");

        let evicted = store.sweep_expired(Utc::now()).expect("sweep");
        assert_eq!(evicted, 1);
        assert!(store.get(&fresh_id).expect("get").is_some());
        assert_eq!(store.stats().expired, 1);
    }

    #[tokio::test]
    async fn reaper_stops_on_shutdown_signal() {
        let store = Arc::new(DuelStore::new());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(store.clone().run_reaper(rx));
        tx.send(true).expect("signal shutdown");
        handle.await.expect("reaper task");
    }
}
