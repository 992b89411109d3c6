//! Wallet Ledger
//!
//! Every balance-changing operation goes through [`WalletLedger::adjust`],
//! which appends exactly one transaction row carrying the post-change
//! balance. Balances are therefore always re-derivable as the sum of the
//! account's transactions (the seed is itself a `seed-credit` row).

use crate::config::Config;
use crate::store::memory::MarketStore;
use crate::tasks::types::now_ms;
use crate::wallet::types::{
    Credits, PlatformLedger, TxMeta, TxType, User, WalletTransaction, PLATFORM_USER_ID,
};

use std::sync::Arc;
use thiserror::Error;

/// Upper bound for a single sandbox deposit, in credits.
pub const MAX_SANDBOX_DEPOSIT: f64 = 10_000.0;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("wallet sandbox is disabled")]
    SandboxDisabled,
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("amount overflow")]
    Overflow,
}

pub struct WalletLedger {
    store: Arc<MarketStore>,
    sandbox_enabled: bool,
    dev_initial_wallet: Credits,
}

impl WalletLedger {
    pub fn new(store: Arc<MarketStore>, config: &Config) -> Arc<Self> {
        Arc::new(Self {
            store,
            sandbox_enabled: config.wallet_sandbox_enabled,
            dev_initial_wallet: config.dev_initial_wallet,
        })
    }

    /// Returns the user for a session, creating one with the development
    /// seed balance when the session is unknown.
    pub fn resolve_session(&self, session_id: &str) -> User {
        if let Some(user) = self.store.user_by_session(session_id) {
            return user;
        }

        let user = self.create_user(session_id, vec!["customer".to_string()]);
        if self.dev_initial_wallet > Credits::ZERO {
            match self.adjust(
                &user.id,
                self.dev_initial_wallet,
                TxType::SeedCredit,
                TxMeta::reason("dev-seed"),
            ) {
                Ok(_) => {}
                Err(e) => tracing::error!("Failed to seed wallet for {}: {}", user.id, e),
            }
        }

        // Re-read so the returned snapshot carries the seeded balance.
        self.store
            .user_by_session(session_id)
            .unwrap_or(user)
    }

    /// Returns the account a payout should credit, creating it with a zero
    /// balance when the worker has never been seen as a caller.
    pub fn ensure_worker_account(&self, worker_id: &str) -> User {
        if let Some(user) = self.store.user_by_session(worker_id) {
            return user;
        }
        self.create_user(worker_id, vec!["worker".to_string()])
    }

    fn create_user(&self, session_id: &str, roles: Vec<String>) -> User {
        let now = now_ms();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            wallet_balance: Credits::ZERO,
            roles,
            created_at: now,
            updated_at: now,
        };
        self.store.put_user(user.clone());
        tracing::info!("Created user {} for session {}", user.id, session_id);
        user
    }

    pub fn get_user(&self, user_id: &str) -> Option<User> {
        self.store.users.get(user_id).map(|entry| entry.clone())
    }

    pub fn user_by_session(&self, session_id: &str) -> Option<User> {
        self.store.user_by_session(session_id)
    }

    /// Applies a signed balance change and appends the transaction row.
    ///
    /// A change that would drive the balance negative is rejected, except
    /// for `chunk-debit`: with budget checks disabled a customer may
    /// overdraw, and the ledger records what actually happened.
    pub fn adjust(
        &self,
        user_id: &str,
        amount: Credits,
        tx_type: TxType,
        meta: TxMeta,
    ) -> Result<WalletTransaction, LedgerError> {
        let user = self
            .get_user(user_id)
            .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))?;

        let new_balance = user
            .wallet_balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        if new_balance.is_negative() && tx_type != TxType::ChunkDebit {
            return Err(LedgerError::InsufficientFunds);
        }
        if new_balance.is_negative() {
            tracing::warn!(
                "Account {} overdrawn to {} by {:?}",
                user_id,
                new_balance,
                tx_type
            );
        }

        let tx = WalletTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            tx_type,
            amount,
            balance_after: new_balance,
            meta,
            created_at: now_ms(),
            seq: self.store.next_tx_seq(),
        };
        self.store
            .wallet_transactions
            .insert(tx.id.clone(), tx.clone());

        let mut updated = user;
        updated.wallet_balance = new_balance;
        updated.updated_at = tx.created_at;
        self.store.put_user(updated);

        tracing::debug!(
            "Applied {:?} of {} to {} (balance {})",
            tx_type,
            amount,
            user_id,
            new_balance
        );

        Ok(tx)
    }

    /// Sandbox-only credit. The amount is normalised to two decimals.
    pub fn deposit(
        &self,
        user_id: &str,
        amount: f64,
    ) -> Result<(User, WalletTransaction), LedgerError> {
        if !self.sandbox_enabled {
            return Err(LedgerError::SandboxDisabled);
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount("deposit must be positive".into()));
        }
        if amount > MAX_SANDBOX_DEPOSIT {
            return Err(LedgerError::InvalidAmount(format!(
                "deposit exceeds the {} credit sandbox limit",
                MAX_SANDBOX_DEPOSIT
            )));
        }

        let credited = Credits::from_major_2dp(amount);
        let tx = self.adjust(
            user_id,
            credited,
            TxType::WalletDeposit,
            TxMeta::reason("sandbox-deposit"),
        )?;
        let user = self
            .get_user(user_id)
            .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))?;
        Ok((user, tx))
    }

    /// Sandbox-only debit; requires `amount <= current balance`.
    pub fn withdraw(
        &self,
        user_id: &str,
        amount: f64,
    ) -> Result<(User, WalletTransaction), LedgerError> {
        if !self.sandbox_enabled {
            return Err(LedgerError::SandboxDisabled);
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(
                "withdrawal must be positive".into(),
            ));
        }

        let debited = Credits::from_major_2dp(amount);
        let user = self
            .get_user(user_id)
            .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))?;
        if debited > user.wallet_balance {
            return Err(LedgerError::InsufficientFunds);
        }

        let tx = self.adjust(
            user_id,
            debited.neg(),
            TxType::WalletWithdrawal,
            TxMeta::reason("sandbox-withdrawal"),
        )?;
        let user = self
            .get_user(user_id)
            .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))?;
        Ok((user, tx))
    }

    /// Credits a completed external checkout to the user's wallet.
    /// Not sandbox-gated; the external provider already captured the money.
    pub fn apply_checkout(
        &self,
        user_id: &str,
        amount: Credits,
        reference: &str,
    ) -> Result<WalletTransaction, LedgerError> {
        if amount <= Credits::ZERO {
            return Err(LedgerError::InvalidAmount("checkout amount".into()));
        }
        self.adjust(
            user_id,
            amount,
            TxType::WalletDeposit,
            TxMeta::reason(reference),
        )
    }

    /// Accrues the platform's share of a payout and appends the matching
    /// `platform-fee` row under the synthetic `platform` user id.
    pub fn accrue_platform(&self, amount: Credits, meta: TxMeta) -> WalletTransaction {
        let now = now_ms();
        let total_after = {
            let mut ledger = self
                .store
                .platform_ledger
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            ledger.total_earnings = ledger.total_earnings.saturating_add(amount);
            ledger.updated_at = now;
            ledger.total_earnings
        };

        let tx = WalletTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: PLATFORM_USER_ID.to_string(),
            tx_type: TxType::PlatformFee,
            amount,
            balance_after: total_after,
            meta,
            created_at: now,
            seq: self.store.next_tx_seq(),
        };
        self.store
            .wallet_transactions
            .insert(tx.id.clone(), tx.clone());
        tx
    }

    pub fn platform_snapshot(&self) -> PlatformLedger {
        self.store
            .platform_ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Most recent transactions for a user, newest first, plus the total count.
    pub fn transactions_for(&self, user_id: &str, limit: usize) -> (Vec<WalletTransaction>, usize) {
        let mut rows = self.store.transactions_for_user(user_id);
        let total = rows.len();
        rows.reverse();
        rows.truncate(limit);
        (rows, total)
    }
}
