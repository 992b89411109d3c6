//! Wallet Module Tests
//!
//! Covers the fixed-point money type, the append-only ledger discipline,
//! and the sandbox gates.

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::store::memory::MarketStore;
    use crate::wallet::ledger::{LedgerError, WalletLedger, MAX_SANDBOX_DEPOSIT};
    use crate::wallet::types::{Credits, TxMeta, TxType, PLATFORM_USER_ID};
    use std::sync::Arc;

    fn ledger_with(seed: f64, sandbox: bool) -> (Arc<MarketStore>, Arc<WalletLedger>) {
        let store = MarketStore::new();
        let config = Config {
            dev_initial_wallet: Credits::from_major(seed),
            wallet_sandbox_enabled: sandbox,
            ..Config::default()
        };
        let ledger = WalletLedger::new(store.clone(), &config);
        (store, ledger)
    }

    // ============================================================
    // TEST 1: Credits - fixed-point arithmetic
    // ============================================================

    #[test]
    fn test_credits_external_amounts_are_two_decimal() {
        assert_eq!(Credits::from_major_2dp(10.123).to_major(), 10.12);
        assert_eq!(Credits::from_major_2dp(10.999).to_major(), 11.0);
        assert_eq!(Credits::from_major_2dp(0.01).micros(), 10_000);
    }

    #[test]
    fn test_credits_percent_share_rounds_half_to_even() {
        // 5 micros at 50% is 2.5 micros; ties go to the even neighbour.
        assert_eq!(Credits::from_micros(5).percent_share(50.0).micros(), 2);
        assert_eq!(Credits::from_micros(15).percent_share(50.0).micros(), 8);
        // The common case stays exact.
        assert_eq!(
            Credits::from_major(2.0).percent_share(10.0),
            Credits::from_major(0.2)
        );
    }

    #[test]
    fn test_credits_serialises_as_decimal_number() {
        let encoded = serde_json::to_string(&Credits::from_major(1.8)).unwrap();
        assert_eq!(encoded, "1.8");

        let decoded: Credits = serde_json::from_str("2.5").unwrap();
        assert_eq!(decoded, Credits::from_major(2.5));
    }

    // ============================================================
    // TEST 2: Session resolution and seeding
    // ============================================================

    #[test]
    fn test_unknown_session_gets_seeded_user() {
        let (_store, ledger) = ledger_with(100.0, false);

        let user = ledger.resolve_session("session-1");
        assert_eq!(user.wallet_balance, Credits::from_major(100.0));

        let (rows, total) = ledger.transactions_for(&user.id, 25);
        assert_eq!(total, 1);
        assert_eq!(rows[0].tx_type, TxType::SeedCredit);
        assert_eq!(rows[0].balance_after, Credits::from_major(100.0));
    }

    #[test]
    fn test_resolving_same_session_twice_returns_same_user() {
        let (_store, ledger) = ledger_with(50.0, false);

        let first = ledger.resolve_session("session-1");
        let second = ledger.resolve_session("session-1");

        assert_eq!(first.id, second.id);
        assert_eq!(second.wallet_balance, Credits::from_major(50.0));
    }

    #[test]
    fn test_worker_account_starts_at_zero() {
        let (_store, ledger) = ledger_with(100.0, false);

        let worker = ledger.ensure_worker_account("w1");
        assert_eq!(worker.wallet_balance, Credits::ZERO);

        // A second lookup must not create a duplicate.
        let again = ledger.ensure_worker_account("w1");
        assert_eq!(worker.id, again.id);
    }

    // ============================================================
    // TEST 3: adjust() - the append-only discipline
    // ============================================================

    #[test]
    fn test_every_adjustment_appends_one_row_with_balance_after() {
        let (store, ledger) = ledger_with(10.0, false);
        let user = ledger.resolve_session("s");

        ledger
            .adjust(
                &user.id,
                Credits::from_major(5.0),
                TxType::ChunkCredit,
                TxMeta::for_bucket("t1", 0),
            )
            .unwrap();
        ledger
            .adjust(
                &user.id,
                Credits::from_major(-3.0),
                TxType::ChunkDebit,
                TxMeta::for_bucket("t1", 1),
            )
            .unwrap();

        let rows = store.transactions_for_user(&user.id);
        assert_eq!(rows.len(), 3); // seed + credit + debit
        assert_eq!(rows[1].balance_after, Credits::from_major(15.0));
        assert_eq!(rows[2].balance_after, Credits::from_major(12.0));

        // Balance equals the sum of all transactions.
        let sum: i64 = rows.iter().map(|row| row.amount.micros()).sum();
        let user = ledger.get_user(&user.id).unwrap();
        assert_eq!(user.wallet_balance.micros(), sum);
    }

    #[test]
    fn test_overdraw_is_rejected_except_for_chunk_debit() {
        let (_store, ledger) = ledger_with(1.0, false);
        let user = ledger.resolve_session("s");

        let rejected = ledger.adjust(
            &user.id,
            Credits::from_major(-5.0),
            TxType::WalletWithdrawal,
            TxMeta::default(),
        );
        assert!(matches!(rejected, Err(LedgerError::InsufficientFunds)));

        // With budget checks disabled a chunk debit may overdraw; the
        // ledger records what actually happened.
        let allowed = ledger.adjust(
            &user.id,
            Credits::from_major(-5.0),
            TxType::ChunkDebit,
            TxMeta::for_bucket("t1", 0),
        );
        assert!(allowed.is_ok());
        assert_eq!(
            ledger.get_user(&user.id).unwrap().wallet_balance,
            Credits::from_major(-4.0)
        );
    }

    // ============================================================
    // TEST 4: Sandbox deposit / withdrawal
    // ============================================================

    #[test]
    fn test_deposit_requires_sandbox_mode() {
        let (_store, ledger) = ledger_with(0.0, false);
        let user = ledger.resolve_session("s");

        let result = ledger.deposit(&user.id, 10.0);
        assert!(matches!(result, Err(LedgerError::SandboxDisabled)));
    }

    #[test]
    fn test_deposit_normalises_to_two_decimals() {
        let (_store, ledger) = ledger_with(0.0, true);
        let user = ledger.resolve_session("s");

        let (user, tx) = ledger.deposit(&user.id, 10.555).unwrap();
        assert_eq!(tx.amount, Credits::from_major(10.56));
        assert_eq!(user.wallet_balance, Credits::from_major(10.56));
    }

    #[test]
    fn test_oversized_deposit_is_rejected() {
        let (_store, ledger) = ledger_with(0.0, true);
        let user = ledger.resolve_session("s");

        let result = ledger.deposit(&user.id, MAX_SANDBOX_DEPOSIT + 1.0);
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_withdrawal_requires_sufficient_balance() {
        let (_store, ledger) = ledger_with(5.0, true);
        let user = ledger.resolve_session("s");

        let result = ledger.withdraw(&user.id, 6.0);
        assert!(matches!(result, Err(LedgerError::InsufficientFunds)));

        let (user, _tx) = ledger.withdraw(&user.id, 5.0).unwrap();
        assert_eq!(user.wallet_balance, Credits::ZERO);
    }

    // ============================================================
    // TEST 5: Checkout application
    // ============================================================

    #[test]
    fn test_checkout_credits_wallet_without_sandbox() {
        let (_store, ledger) = ledger_with(0.0, false);
        let user = ledger.resolve_session("s");

        // 2500 cents -> 25.00 credits.
        let tx = ledger
            .apply_checkout(&user.id, Credits::from_micros(2500 * 10_000), "stripe-checkout")
            .unwrap();
        assert_eq!(tx.tx_type, TxType::WalletDeposit);
        assert_eq!(
            ledger.get_user(&user.id).unwrap().wallet_balance,
            Credits::from_major(25.0)
        );
    }

    // ============================================================
    // TEST 6: Platform accrual
    // ============================================================

    #[test]
    fn test_platform_accrual_appends_fee_rows() {
        let (store, ledger) = ledger_with(0.0, false);

        ledger.accrue_platform(Credits::from_major(0.2), TxMeta::for_bucket("t1", 0));
        ledger.accrue_platform(Credits::from_major(0.2), TxMeta::for_bucket("t1", 1));

        assert_eq!(
            ledger.platform_snapshot().total_earnings,
            Credits::from_major(0.4)
        );

        let rows = store.transactions_for_user(PLATFORM_USER_ID);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.tx_type == TxType::PlatformFee));
        assert_eq!(rows[1].balance_after, Credits::from_major(0.4));
    }

    // ============================================================
    // TEST 7: Transaction listing
    // ============================================================

    #[test]
    fn test_transactions_are_listed_newest_first_with_total() {
        let (_store, ledger) = ledger_with(0.0, true);
        let user = ledger.resolve_session("s");

        for _ in 0..30 {
            ledger.deposit(&user.id, 1.0).unwrap();
        }

        let (rows, total) = ledger.transactions_for(&user.id, 25);
        assert_eq!(total, 30);
        assert_eq!(rows.len(), 25);
        // Newest first: the last deposit left the highest balance.
        assert_eq!(rows[0].balance_after, Credits::from_major(30.0));
    }
}
