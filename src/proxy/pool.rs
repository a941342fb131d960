// Account pool: roster of upstream credentials with a status machine,
// selection policy, and fire-and-forget roster persistence.
//
// All mutable state sits behind one mutex; critical sections are short and
// CPU-bound. Token acquisition and the upstream POST happen strictly after
// the lock is released, carrying only the selected account's id, name, and
// credential blob forward.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::models::{Account, AccountCredentials, AccountStatus, AccountUsage};
use crate::modules::roster;

/// How long a rate-limited account stays in cooldown.
pub const COOLDOWN_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    RoundRobin,
    Random,
    LeastUsed,
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

/// What a dispatch carries out of the critical section.
#[derive(Debug, Clone)]
pub struct SelectedAccount {
    pub id: String,
    pub name: String,
    pub credentials: AccountCredentials,
}

struct PoolState {
    accounts: Vec<Account>,
    round_robin_index: usize,
    /// Bumped whenever an account enters cooldown, so a stale exit timer
    /// cannot re-activate an account that was rate-limited again meanwhile.
    cooldown_generation: HashMap<String, u64>,
}

pub struct AccountPool {
    state: Mutex<PoolState>,
    strategy: SelectionStrategy,
    roster_path: Option<PathBuf>,
    persist_tx: watch::Sender<u64>,
}

impl AccountPool {
    pub fn new(accounts: Vec<Account>, strategy: SelectionStrategy) -> Arc<Self> {
        let (persist_tx, _) = watch::channel(0u64);
        Arc::new(Self {
            state: Mutex::new(PoolState {
                accounts,
                round_robin_index: 0,
                cooldown_generation: HashMap::new(),
            }),
            strategy,
            roster_path: None,
            persist_tx,
        })
    }

    /// Load the roster from disk and start the background persistence writer.
    /// The pool is the sole writer of the roster file.
    pub fn load(path: PathBuf, strategy: SelectionStrategy) -> Result<Arc<Self>, String> {
        let accounts = roster::load(&path)?;
        info!("Loaded {} account(s) from {}", accounts.len(), path.display());
        let (persist_tx, _) = watch::channel(0u64);
        let pool = Arc::new(Self {
            state: Mutex::new(PoolState {
                accounts,
                round_robin_index: 0,
                cooldown_generation: HashMap::new(),
            }),
            strategy,
            roster_path: Some(path),
            persist_tx,
        });
        pool.spawn_persistence_writer();
        Ok(pool)
    }

    /// Background writer: waits for persistence generations and rewrites the
    /// roster from the latest snapshot. Bursts of mutations coalesce into a
    /// single write, and the final write always reflects the last committed
    /// in-memory state.
    fn spawn_persistence_writer(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        let mut rx = self.persist_tx.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = pool.snapshot();
                if let Some(path) = &pool.roster_path {
                    if let Err(e) = roster::save(path, &snapshot) {
                        warn!("Failed to persist account roster: {}", e);
                    }
                }
            }
        });
    }

    fn schedule_persist(&self) {
        self.persist_tx.send_modify(|generation| *generation += 1);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pick an account per the pool's strategy, bump its request counter, and
    /// stamp its last-use time, all in one atomic step under the pool lock.
    pub fn select_account(&self) -> Result<SelectedAccount, GatewayError> {
        let mut state = self.lock();

        let active: Vec<usize> = state
            .accounts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.status == AccountStatus::Active)
            .map(|(i, _)| i)
            .collect();
        if active.is_empty() {
            return Err(GatewayError::NoAccountAvailable);
        }

        let chosen = match self.strategy {
            SelectionStrategy::RoundRobin => {
                let slot = state.round_robin_index % active.len();
                state.round_robin_index = state.round_robin_index.wrapping_add(1);
                active[slot]
            }
            SelectionStrategy::Random => active[rand::thread_rng().gen_range(0..active.len())],
            SelectionStrategy::LeastUsed => active
                .iter()
                .copied()
                .min_by_key(|&i| state.accounts[i].request_count)
                .expect("active set is non-empty"),
        };

        let account = &mut state.accounts[chosen];
        account.request_count += 1;
        account.touch();
        let selected = SelectedAccount {
            id: account.id.clone(),
            name: account.name.clone(),
            credentials: account.credentials.clone(),
        };
        drop(state);

        self.schedule_persist();
        Ok(selected)
    }

    /// Record a rate-limit failure: the account enters cooldown and a
    /// one-shot timer schedules the return to active. The timer re-reads the
    /// status when it fires and only transitions if the account is still in
    /// cooldown under the same generation.
    pub fn record_rate_limit(self: &Arc<Self>, account_id: &str) {
        let generation = {
            let mut state = self.lock();
            let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) else {
                return;
            };
            account.error_count += 1;
            let entered_cooldown = if account.status == AccountStatus::Active {
                account.status = AccountStatus::Cooldown;
                true
            } else {
                false
            };
            if !entered_cooldown {
                None
            } else {
                let generation = state
                    .cooldown_generation
                    .entry(account_id.to_string())
                    .and_modify(|g| *g += 1)
                    .or_insert(1);
                Some(*generation)
            }
        };
        self.schedule_persist();
        let Some(generation) = generation else {
            return;
        };
        info!(
            "Account {} rate-limited, cooling down for {}s",
            account_id,
            COOLDOWN_INTERVAL.as_secs()
        );

        let pool = Arc::clone(self);
        let account_id = account_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(COOLDOWN_INTERVAL).await;
            pool.finish_cooldown(&account_id, generation);
        });
    }

    fn finish_cooldown(&self, account_id: &str, generation: u64) {
        let transitioned = {
            let mut state = self.lock();
            if state.cooldown_generation.get(account_id) != Some(&generation) {
                return;
            }
            // suppressed if an admin moved the account meanwhile
            match state.accounts.iter_mut().find(|a| a.id == account_id) {
                Some(account) if account.status == AccountStatus::Cooldown => {
                    account.status = AccountStatus::Active;
                    true
                }
                _ => false,
            }
        };
        if transitioned {
            debug!("Account {} cooldown expired, active again", account_id);
            self.schedule_persist();
        }
    }

    /// Record a non-throttling failure: only the error counter moves.
    pub fn record_error(&self, account_id: &str) {
        {
            let mut state = self.lock();
            if let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) {
                account.error_count += 1;
            }
        }
        self.schedule_persist();
    }

    /// Admin action after a persistent auth failure: the account is never
    /// selected again until re-enabled.
    pub fn mark_invalid(&self, account_id: &str) {
        self.set_status(account_id, AccountStatus::Invalid);
    }

    pub fn set_disabled(&self, account_id: &str, disabled: bool) {
        let status = if disabled {
            AccountStatus::Disabled
        } else {
            AccountStatus::Active
        };
        self.set_status(account_id, status);
    }

    fn set_status(&self, account_id: &str, status: AccountStatus) {
        {
            let mut state = self.lock();
            if let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) {
                account.status = status;
            }
        }
        self.schedule_persist();
    }

    /// Store a usage snapshot reported by the usage probe.
    pub fn update_usage(&self, account_id: &str, usage: AccountUsage) {
        {
            let mut state = self.lock();
            if let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) {
                account.usage = Some(usage);
            }
        }
        self.schedule_persist();
    }

    /// Write refreshed credentials back (called by the token provider).
    pub fn update_credentials(&self, account_id: &str, credentials: AccountCredentials) {
        {
            let mut state = self.lock();
            if let Some(account) = state.accounts.iter_mut().find(|a| a.id == account_id) {
                account.credentials = credentials;
            }
        }
        self.schedule_persist();
    }

    /// Latest credential blob for an account (the token provider re-reads
    /// after taking its refresh lock, in case another task already refreshed).
    pub fn credentials_of(&self, account_id: &str) -> Option<AccountCredentials> {
        let state = self.lock();
        state
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .map(|a| a.credentials.clone())
    }

    pub fn status_of(&self, account_id: &str) -> Option<AccountStatus> {
        let state = self.lock();
        state
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .map(|a| a.status)
    }

    pub fn snapshot(&self) -> Vec<Account> {
        self.lock().accounts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn account(id: &str) -> Account {
        Account::new(id.into(), format!("account-{id}"), AccountCredentials::default())
    }

    fn pool_of(ids: &[&str], strategy: SelectionStrategy) -> Arc<AccountPool> {
        AccountPool::new(ids.iter().map(|id| account(id)).collect(), strategy)
    }

    #[test]
    fn round_robin_cycles_all_active_accounts() {
        let pool = pool_of(&["a", "b", "c"], SelectionStrategy::RoundRobin);
        let picked: Vec<String> = (0..3)
            .map(|_| pool.select_account().unwrap().id)
            .collect();
        let distinct: HashSet<&String> = picked.iter().collect();
        assert_eq!(distinct.len(), 3);

        // next cycle repeats the same order
        let again: Vec<String> = (0..3)
            .map(|_| pool.select_account().unwrap().id)
            .collect();
        assert_eq!(picked, again);
    }

    #[test]
    fn least_used_picks_smallest_counter_with_stable_ties() {
        let pool = pool_of(&["a", "b"], SelectionStrategy::LeastUsed);
        assert_eq!(pool.select_account().unwrap().id, "a");
        assert_eq!(pool.select_account().unwrap().id, "b");
        assert_eq!(pool.select_account().unwrap().id, "a");
    }

    #[test]
    fn random_only_returns_active_accounts() {
        let pool = pool_of(&["a", "b", "c"], SelectionStrategy::Random);
        pool.mark_invalid("b");
        for _ in 0..50 {
            assert_ne!(pool.select_account().unwrap().id, "b");
        }
    }

    #[test]
    fn invalid_and_disabled_accounts_are_never_selected() {
        let pool = pool_of(&["a", "b"], SelectionStrategy::RoundRobin);
        pool.mark_invalid("a");
        pool.set_disabled("b", true);
        assert!(matches!(
            pool.select_account(),
            Err(GatewayError::NoAccountAvailable)
        ));

        pool.set_disabled("b", false);
        assert_eq!(pool.select_account().unwrap().id, "b");
        // invalid stays out
        assert_eq!(pool.select_account().unwrap().id, "b");
    }

    #[test]
    fn selection_bumps_counter_and_last_used() {
        let pool = pool_of(&["a"], SelectionStrategy::RoundRobin);
        pool.select_account().unwrap();
        pool.select_account().unwrap();
        let snapshot = pool.snapshot();
        assert_eq!(snapshot[0].request_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_enters_cooldown_and_recovers() {
        let pool = pool_of(&["a"], SelectionStrategy::RoundRobin);
        pool.record_rate_limit("a");
        assert_eq!(pool.status_of("a"), Some(AccountStatus::Cooldown));
        assert!(matches!(
            pool.select_account(),
            Err(GatewayError::NoAccountAvailable)
        ));

        tokio::time::sleep(COOLDOWN_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(pool.status_of("a"), Some(AccountStatus::Active));
        assert!(pool.select_account().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_exit_is_suppressed_after_admin_change() {
        let pool = pool_of(&["a"], SelectionStrategy::RoundRobin);
        pool.record_rate_limit("a");
        pool.set_disabled("a", true);

        tokio::time::sleep(COOLDOWN_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(pool.status_of("a"), Some(AccountStatus::Disabled));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cooldown_timer_does_not_cut_a_newer_cooldown_short() {
        let pool = pool_of(&["a"], SelectionStrategy::RoundRobin);
        pool.record_rate_limit("a");

        // halfway through, the account recovers and is rate-limited again
        tokio::time::sleep(COOLDOWN_INTERVAL / 2).await;
        pool.finish_cooldown("a", 1);
        assert_eq!(pool.status_of("a"), Some(AccountStatus::Active));
        pool.record_rate_limit("a");

        // the first timer firing at t=300s must not end the second cooldown
        tokio::time::sleep(COOLDOWN_INTERVAL / 2 + Duration::from_secs(1)).await;
        assert_eq!(pool.status_of("a"), Some(AccountStatus::Cooldown));

        tokio::time::sleep(COOLDOWN_INTERVAL).await;
        assert_eq!(pool.status_of("a"), Some(AccountStatus::Active));
    }

    #[test]
    fn non_throttle_error_only_bumps_counter() {
        let pool = pool_of(&["a"], SelectionStrategy::RoundRobin);
        pool.record_error("a");
        assert_eq!(pool.status_of("a"), Some(AccountStatus::Active));
        assert_eq!(pool.snapshot()[0].error_count, 1);
    }

    #[tokio::test]
    async fn concurrent_selections_never_share_a_counter_value() {
        let pool = pool_of(&["a", "b", "c"], SelectionStrategy::RoundRobin);
        let mut handles = Vec::new();
        for _ in 0..30 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                pool.select_account().unwrap().id
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let snapshot = pool.snapshot();
        let total: u64 = snapshot.iter().map(|a| a.request_count).sum();
        assert_eq!(total, 30);
    }
}
