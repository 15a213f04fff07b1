//! Token accounting: per-utterance cost, per-account quota with a lazy daily
//! reset, and the stores that own account state.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DebateError;

/// Default daily allowance for a new account.
pub const DEFAULT_TOKEN_LIMIT: u64 = 1000;

/// Share of the limit at which an account counts as running low.
pub const LOW_USAGE_PERCENT: u32 = 80;

/// Cost of an utterance: one token per four characters, rounded up.
pub fn token_cost(utterance: &str) -> u64 {
    (utterance.chars().count() as u64).div_ceil(4)
}

/// Usage state of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccount {
    pub used: u64,
    pub limit: u64,
    pub last_reset: DateTime<Utc>,
}

impl TokenAccount {
    pub fn new(limit: u64, now: DateTime<Utc>) -> Self {
        Self {
            used: 0,
            limit: limit.max(1),
            last_reset: now,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn percent_used(&self) -> u32 {
        if self.limit == 0 {
            return 100;
        }
        ((self.used as f64 / self.limit as f64) * 100.0).round() as u32
    }

    pub fn is_low(&self) -> bool {
        self.percent_used() >= LOW_USAGE_PERCENT
    }

    /// Zero usage if `now` falls on a later UTC calendar day than the last
    /// reset. Returns whether a reset happened.
    ///
    /// A clock that runs backwards never triggers a reset.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        if now.date_naive() > self.last_reset.date_naive() {
            self.used = 0;
            self.last_reset = now;
            true
        } else {
            false
        }
    }

    pub fn charge(&mut self, cost: u64) {
        self.used = self.used.saturating_add(cost);
    }

    /// Hold up to `amount` tokens of the remaining quota, counting them as
    /// used. Returns the amount held, or `None` when nothing remains.
    pub fn reserve(&mut self, amount: u64) -> Option<u64> {
        if self.is_exhausted() {
            return None;
        }
        let held = amount.clamp(1, self.remaining());
        self.charge(held);
        Some(held)
    }

    /// Replace a hold made in the period starting at `period_start` with the
    /// actual cost. A hold from a period that has since been reset is
    /// already gone, so only the cost is added.
    pub fn settle(&mut self, held: u64, period_start: DateTime<Utc>, cost: u64) {
        if self.last_reset == period_start {
            self.used = self.used.saturating_sub(held);
        }
        self.charge(cost);
    }
}

/// Tokens set aside for generations that have not finished yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub account_id: String,
    /// Tokens held against the quota.
    pub amount: u64,
    /// `last_reset` of the account when the hold was made.
    pub period_start: DateTime<Utc>,
}

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaCheck {
    /// The hold was made; the account state includes it.
    Reserved(Reservation, TokenAccount),
    /// Nothing remains; no hold was made.
    Exhausted(TokenAccount),
}

/// Owner of account state.
///
/// Every method applies the lazy daily reset first. `reserve` checks the
/// remaining quota and holds tokens in one step, so concurrent callers
/// cannot both pass the check on the last tokens.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Current state of the account. Unknown accounts are created with the
    /// store's default limit.
    async fn snapshot(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenAccount, DebateError>;

    /// Hold up to `amount` tokens if any quota remains.
    async fn reserve(
        &self,
        account_id: &str,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<QuotaCheck, DebateError>;

    /// Release a hold and charge the actual `cost` in its place.
    async fn settle(
        &self,
        reservation: &Reservation,
        cost: u64,
        now: DateTime<Utc>,
    ) -> Result<TokenAccount, DebateError>;
}

fn reserve_in(account_id: &str, account: &mut TokenAccount, amount: u64) -> QuotaCheck {
    match account.reserve(amount) {
        Some(held) => QuotaCheck::Reserved(
            Reservation {
                account_id: account_id.to_string(),
                amount: held,
                period_start: account.last_reset,
            },
            account.clone(),
        ),
        None => QuotaCheck::Exhausted(account.clone()),
    }
}

/// Reserves and settles quota through an [`AccountStore`].
#[derive(Clone)]
pub struct TokenLedger {
    store: Arc<dyn AccountStore>,
    max_tokens_per_turn: u32,
}

impl TokenLedger {
    pub fn new(store: Arc<dyn AccountStore>, max_tokens_per_turn: u32) -> Self {
        Self {
            store,
            max_tokens_per_turn: max_tokens_per_turn.max(1),
        }
    }

    /// Hold quota for `turns` turns, or report that none remains.
    pub async fn reserve(
        &self,
        account_id: &str,
        turns: u32,
        now: DateTime<Utc>,
    ) -> Result<QuotaCheck, DebateError> {
        let amount = u64::from(self.max_tokens_per_turn) * u64::from(turns.max(1));
        let check = self.store.reserve(account_id, amount, now).await?;
        match &check {
            QuotaCheck::Reserved(reservation, account) => {
                debug!(
                    account_id,
                    held = reservation.amount,
                    used = account.used,
                    "Reserved tokens"
                );
            }
            QuotaCheck::Exhausted(account) => {
                info!(account_id, used = account.used, limit = account.limit, "Quota exhausted");
            }
        }
        Ok(check)
    }

    /// Generation cap for the next turn, once `spent` of the hold is used up.
    pub fn turn_budget(&self, reservation: &Reservation, spent: u64) -> u32 {
        let left = reservation.amount.saturating_sub(spent).max(1);
        u32::try_from(left)
            .unwrap_or(u32::MAX)
            .min(self.max_tokens_per_turn)
    }

    /// Charge the actual cost of the generated turns in place of the hold.
    pub async fn settle(
        &self,
        reservation: &Reservation,
        cost: u64,
        now: DateTime<Utc>,
    ) -> Result<TokenAccount, DebateError> {
        let account = self.store.settle(reservation, cost, now).await?;
        debug!(
            account_id = %reservation.account_id,
            cost,
            used = account.used,
            "Charged tokens"
        );
        Ok(account)
    }

    /// Give a hold back without charging anything.
    pub async fn release(
        &self,
        reservation: &Reservation,
        now: DateTime<Utc>,
    ) -> Result<TokenAccount, DebateError> {
        self.store.settle(reservation, 0, now).await
    }
}

fn lock_poisoned<T>(_: T) -> DebateError {
    DebateError::StoreError("account store lock poisoned".to_string())
}

/// Process-local account store.
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, TokenAccount>>,
    default_limit: u64,
}

impl MemoryAccountStore {
    pub fn new(default_limit: u64) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            default_limit,
        }
    }

    /// Seed or replace an account.
    pub fn insert(
        &self,
        account_id: impl Into<String>,
        account: TokenAccount,
    ) -> Result<(), DebateError> {
        self.accounts
            .lock()
            .map_err(lock_poisoned)?
            .insert(account_id.into(), account);
        Ok(())
    }

    fn with_account<T>(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut TokenAccount) -> T,
    ) -> Result<T, DebateError> {
        let mut accounts = self.accounts.lock().map_err(lock_poisoned)?;
        let account = accounts
            .entry(account_id.to_string())
            .or_insert_with(|| TokenAccount::new(self.default_limit, now));
        account.refresh(now);
        Ok(f(account))
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LIMIT)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn snapshot(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenAccount, DebateError> {
        self.with_account(account_id, now, |account| account.clone())
    }

    async fn reserve(
        &self,
        account_id: &str,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<QuotaCheck, DebateError> {
        self.with_account(account_id, now, |account| {
            reserve_in(account_id, account, amount)
        })
    }

    async fn settle(
        &self,
        reservation: &Reservation,
        cost: u64,
        now: DateTime<Utc>,
    ) -> Result<TokenAccount, DebateError> {
        self.with_account(&reservation.account_id, now, |account| {
            account.settle(reservation.amount, reservation.period_start, cost);
            account.clone()
        })
    }
}

/// Account store backed by a JSON file mapping account ids to accounts.
///
/// Every mutation rewrites the whole file under an async mutex, so
/// read-reset-reserve-write is a single step within this process.
pub struct JsonFileAccountStore {
    path: PathBuf,
    default_limit: u64,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileAccountStore {
    pub fn new(path: impl Into<PathBuf>, default_limit: u64) -> Self {
        Self {
            path: path.into(),
            default_limit,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, TokenAccount>, DebateError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, accounts: &BTreeMap<String, TokenAccount>) -> Result<(), DebateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(accounts)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Load, apply `update` to the (possibly new) account, and persist if
    /// the account changed.
    async fn update<T, F>(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
        update: F,
    ) -> Result<T, DebateError>
    where
        F: FnOnce(&mut TokenAccount) -> T + Send,
    {
        let _guard = self.lock.lock().await;
        let mut accounts = self.read_all().await?;

        let is_new = !accounts.contains_key(account_id);
        let account = accounts
            .entry(account_id.to_string())
            .or_insert_with(|| TokenAccount::new(self.default_limit, now));
        let before = account.clone();
        if account.refresh(now) {
            info!(account_id, "Daily token reset");
        }
        let result = update(account);

        if is_new || *account != before {
            self.write_all(&accounts).await?;
        }
        Ok(result)
    }
}

#[async_trait]
impl AccountStore for JsonFileAccountStore {
    async fn snapshot(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenAccount, DebateError> {
        self.update(account_id, now, |account| account.clone()).await
    }

    async fn reserve(
        &self,
        account_id: &str,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<QuotaCheck, DebateError> {
        self.update(account_id, now, |account| {
            reserve_in(account_id, account, amount)
        })
        .await
    }

    async fn settle(
        &self,
        reservation: &Reservation,
        cost: u64,
        now: DateTime<Utc>,
    ) -> Result<TokenAccount, DebateError> {
        self.update(&reservation.account_id, now, |account| {
            account.settle(reservation.amount, reservation.period_start, cost);
            account.clone()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_token_cost_rounds_up() {
        assert_eq!(token_cost(""), 0);
        assert_eq!(token_cost("a"), 1);
        assert_eq!(token_cost("abcd"), 1);
        assert_eq!(token_cost("abcde"), 2);
        assert_eq!(token_cost("Taxes are unfair"), 4);
    }

    #[test]
    fn test_token_cost_counts_characters_and_is_monotone() {
        assert_eq!(token_cost("ééé"), 1);
        let mut previous = 0;
        for len in 0..40 {
            let cost = token_cost(&"x".repeat(len));
            assert!(cost >= previous);
            previous = cost;
        }
    }

    #[test]
    fn test_remaining_and_usage_flags() {
        let mut account = TokenAccount::new(1000, at(1, 9));
        assert_eq!(account.remaining(), 1000);
        account.charge(800);
        assert_eq!(account.percent_used(), 80);
        assert!(account.is_low());
        account.charge(500);
        assert_eq!(account.remaining(), 0);
        assert!(account.is_exhausted());
    }

    #[test]
    fn test_refresh_fires_once_per_day() {
        let mut account = TokenAccount::new(100, at(1, 9));
        account.charge(60);

        assert!(!account.refresh(at(1, 23)));
        assert_eq!(account.used, 60);

        assert!(account.refresh(at(2, 1)));
        assert_eq!(account.used, 0);
        account.charge(10);

        assert!(!account.refresh(at(2, 22)));
        assert_eq!(account.used, 10);
    }

    #[test]
    fn test_refresh_ignores_clock_going_backwards() {
        let mut account = TokenAccount::new(100, at(5, 9));
        account.charge(30);
        assert!(!account.refresh(at(4, 9)));
        assert_eq!(account.used, 30);
    }

    #[test]
    fn test_reserve_and_settle_account() {
        let mut account = TokenAccount::new(100, at(1, 9));
        account.charge(90);
        assert_eq!(account.reserve(500), Some(10));
        assert!(account.is_exhausted());
        assert_eq!(account.reserve(500), None);

        account.settle(10, at(1, 9), 4);
        assert_eq!(account.used, 94);
    }

    #[test]
    fn test_settle_after_reset_only_adds_cost() {
        let mut account = TokenAccount::new(100, at(1, 9));
        let held = account.reserve(50).unwrap();
        assert!(account.refresh(at(2, 0)));
        account.settle(held, at(1, 9), 7);
        assert_eq!(account.used, 7);
    }

    fn reserved(check: QuotaCheck) -> (Reservation, TokenAccount) {
        match check {
            QuotaCheck::Reserved(reservation, account) => (reservation, account),
            QuotaCheck::Exhausted(account) => panic!("quota exhausted: {:?}", account),
        }
    }

    #[tokio::test]
    async fn test_ledger_reserve_budget_and_settle() {
        let store = Arc::new(MemoryAccountStore::new(1000));
        let ledger = TokenLedger::new(store.clone(), 500);

        let (hold, account) = reserved(ledger.reserve("alice", 2, at(1, 9)).await.unwrap());
        assert_eq!(hold.amount, 1000);
        assert_eq!(account.used, 1000);
        assert_eq!(ledger.turn_budget(&hold, 0), 500);
        assert_eq!(ledger.turn_budget(&hold, 700), 300);
        assert_eq!(ledger.turn_budget(&hold, 1000), 1);

        let account = ledger.settle(&hold, 900, at(1, 10)).await.unwrap();
        assert_eq!(account.used, 900);

        let (hold, _) = reserved(ledger.reserve("alice", 1, at(1, 11)).await.unwrap());
        assert_eq!(hold.amount, 100);
        assert_eq!(ledger.turn_budget(&hold, 0), 100);
        assert!(matches!(
            ledger.reserve("alice", 1, at(1, 12)).await.unwrap(),
            QuotaCheck::Exhausted(_)
        ));

        ledger.settle(&hold, 100, at(1, 12)).await.unwrap();
        assert!(matches!(
            ledger.reserve("alice", 1, at(1, 13)).await.unwrap(),
            QuotaCheck::Exhausted(_)
        ));
        assert!(matches!(
            ledger.reserve("alice", 1, at(2, 0)).await.unwrap(),
            QuotaCheck::Reserved(..)
        ));
    }

    #[tokio::test]
    async fn test_release_returns_the_hold() {
        let store = Arc::new(MemoryAccountStore::new(1000));
        let ledger = TokenLedger::new(store.clone(), 500);

        let (hold, _) = reserved(ledger.reserve("carol", 1, at(1, 9)).await.unwrap());
        assert_eq!(store.snapshot("carol", at(1, 9)).await.unwrap().used, 500);
        ledger.release(&hold, at(1, 9)).await.unwrap();
        assert_eq!(store.snapshot("carol", at(1, 9)).await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_json_store_persists_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");

        let store = JsonFileAccountStore::new(&path, 50);
        let account = store.snapshot("bob", at(1, 9)).await.unwrap();
        assert_eq!(account.limit, 50);
        assert!(path.exists());

        let (hold, account) = reserved(store.reserve("bob", 30, at(1, 10)).await.unwrap());
        assert_eq!(account.used, 30);
        store.settle(&hold, 20, at(1, 10)).await.unwrap();

        let reopened = JsonFileAccountStore::new(&path, 50);
        assert_eq!(reopened.snapshot("bob", at(1, 11)).await.unwrap().used, 20);

        let after_midnight = reopened.snapshot("bob", at(2, 0)).await.unwrap();
        assert_eq!(after_midnight.used, 0);
        assert_eq!(after_midnight.last_reset, at(2, 0));

        let (hold, _) = reserved(reopened.reserve("bob", 10, at(2, 8)).await.unwrap());
        let same_day = reopened.settle(&hold, 5, at(2, 8)).await.unwrap();
        assert_eq!(same_day.used, 5);
        assert_eq!(same_day.last_reset, at(2, 0));
    }

    #[tokio::test]
    async fn test_json_store_refuses_once_holds_use_the_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileAccountStore::new(dir.path().join("accounts.json"), 10));

        let (first, second) = tokio::join!(
            store.reserve("dana", 10, at(1, 9)),
            store.reserve("dana", 10, at(1, 9))
        );
        let outcomes = [first.unwrap(), second.unwrap()];
        let granted = outcomes
            .iter()
            .filter(|c| matches!(c, QuotaCheck::Reserved(..)))
            .count();
        assert_eq!(granted, 1);
        assert_eq!(store.snapshot("dana", at(1, 9)).await.unwrap().used, 10);
    }
}
