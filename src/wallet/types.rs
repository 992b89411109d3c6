use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved user id for the platform's own ledger entries.
pub const PLATFORM_USER_ID: &str = "platform";

pub const CREDIT_DECIMALS: u32 = 6;
pub const CREDIT_BASE_UNIT: i64 = 1_000_000; // 10^6

/// A signed amount of marketplace credits, stored as integer micro-credits.
///
/// Six fractional digits are kept internally so platform fee splits stay
/// exact; anything crossing the external API is rounded to two decimals
/// first. Serialises as a plain decimal number on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Credits(i64);

impl Credits {
    pub const ZERO: Self = Self(0);

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Converts a decimal amount, keeping up to six fractional digits.
    pub fn from_major(amount: f64) -> Self {
        Self((amount * CREDIT_BASE_UNIT as f64).round_ties_even() as i64)
    }

    /// Converts a decimal amount normalised to two fractional digits,
    /// the resolution used by every external surface.
    pub fn from_major_2dp(amount: f64) -> Self {
        let cents = (amount * 100.0).round_ties_even() as i64;
        Self(cents * (CREDIT_BASE_UNIT / 100))
    }

    pub fn micros(&self) -> i64 {
        self.0
    }

    pub fn to_major(&self) -> f64 {
        self.0 as f64 / CREDIT_BASE_UNIT as f64
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn neg(&self) -> Self {
        Self(-self.0)
    }

    /// Banker's-rounded share of this amount, at micro-credit resolution.
    ///
    /// `percent` is expressed in [0, 100].
    pub fn percent_share(&self, percent: f64) -> Self {
        let raw = self.0 as f64 * percent / 100.0;
        Self(raw.round_ties_even() as i64)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.to_major())
    }
}

impl Serialize for Credits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Credits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Ok(Self::from_major(amount))
    }
}

/// The kind of a wallet transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TxType {
    SeedCredit,
    WalletDeposit,
    WalletWithdrawal,
    ChunkDebit,
    ChunkCredit,
    PlatformFee,
}

/// Free-form context attached to a transaction row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TxMeta {
    pub fn for_bucket(task_id: &str, chunk_index: u64) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            chunk_index: Some(chunk_index),
            reason: None,
        }
    }

    pub fn reason(reason: &str) -> Self {
        Self {
            task_id: None,
            chunk_index: None,
            reason: Some(reason.to_string()),
        }
    }
}

/// One row of the append-only transaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    /// Signed amount; debits are negative.
    pub amount: Credits,
    /// Balance of the account after this row was applied.
    pub balance_after: Credits,
    pub meta: TxMeta,
    pub created_at: u64,
    /// Monotonic insertion counter; disambiguates rows created in the same
    /// millisecond. Never leaves the process.
    #[serde(skip)]
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// Opaque caller identity; also used as the worker id.
    pub session_id: String,
    pub wallet_balance: Credits,
    pub roles: Vec<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Singleton accrual record for the platform's share of payouts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformLedger {
    pub total_earnings: Credits,
    pub updated_at: u64,
}
