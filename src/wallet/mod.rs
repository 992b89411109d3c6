//! Wallet & Ledger Module
//!
//! Accounting for the marketplace: customer and worker balances, the
//! append-only transaction log, and the platform fee ledger.
//!
//! ## Core Concepts
//! - **Fixed-point money**: amounts are integer micro-credits (6 fractional
//!   digits). External surfaces are normalised to 2 decimals before they are
//!   persisted; internal fee splits keep the full resolution.
//! - **Append-only log**: every balance change appends exactly one
//!   transaction row carrying the post-change balance, so a balance can
//!   always be re-derived as the sum of its transactions.
//! - **Synthetic platform account**: platform fee accruals are recorded
//!   against the reserved user id `platform`.
//! - **Sessions**: an opaque session id identifies the caller and doubles as
//!   the worker id; unknown sessions get a user created on the fly with a
//!   seeded development balance.

pub mod handlers;
pub mod ledger;
pub mod protocol;
pub mod stripe;
pub mod types;

#[cfg(test)]
mod tests;
