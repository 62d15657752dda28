//! Ledger kinds and their canonical record shapes.
//!
//! Every ledger stores full records keyed by [`RecordId`]. Callers submit an
//! `Input` (all non-id, non-derived fields); derived fields are computed from
//! it whenever a record is written and are never independently editable.

use core::fmt::Debug;
use core::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::date::{normalize_user_date, year_of};
use crate::error::{DomainError, DomainResult};
use crate::id::RecordId;

/// The five record categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// Treasury (income / expense, partitioned by year).
    Khazina,
    /// Employee advances.
    Sulf,
    /// Loans.
    Qard,
    /// Household.
    Bait,
    /// InstaPay payments.
    #[serde(rename = "instapay")]
    InstaPay,
}

impl LedgerKind {
    pub const ALL: [LedgerKind; 5] = [
        LedgerKind::Khazina,
        LedgerKind::Sulf,
        LedgerKind::Qard,
        LedgerKind::Bait,
        LedgerKind::InstaPay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Khazina => "khazina",
            LedgerKind::Sulf => "sulf",
            LedgerKind::Qard => "qard",
            LedgerKind::Bait => "bait",
            LedgerKind::InstaPay => "instapay",
        }
    }

    /// Key of the serialized collection in device storage.
    pub fn storage_key(&self) -> &'static str {
        match self {
            LedgerKind::Khazina => "khazina_data",
            LedgerKind::Sulf => "sulf_data",
            LedgerKind::Qard => "qard_data",
            LedgerKind::Bait => "bait_data",
            LedgerKind::InstaPay => "instapay_data",
        }
    }
}

impl core::fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LedgerKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown ledger kind '{s}'")))
    }
}

/// A canonical ledger record.
pub trait LedgerRecord:
    Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// User-editable fields.
    type Input: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    const KIND: LedgerKind;

    fn id(&self) -> &RecordId;

    /// Date in `DD-MM-YYYY` form.
    fn date(&self) -> &str;

    /// Build a stored record, computing derived fields.
    fn from_input(id: RecordId, input: Self::Input) -> Self;

    /// The user-editable part of a stored record.
    fn to_input(&self) -> Self::Input;

    /// Validate user input and canonicalize its date.
    fn normalize_input(input: Self::Input) -> DomainResult<Self::Input>;

    /// Partition key (Khazina's year); `None` for unpartitioned ledgers.
    fn partition(&self) -> Option<i32> {
        None
    }
}

fn check_amount(field: &str, value: f64) -> DomainResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DomainError::validation(format!("{field} must be a finite number")))
    }
}

/// Treasury entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KhazinaRecord {
    pub id: RecordId,
    pub year: i32,
    pub date: String,
    pub income: f64,
    pub expense: f64,
    /// `income - expense`.
    pub total: f64,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KhazinaInput {
    pub date: String,
    pub income: f64,
    pub expense: f64,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub notes: String,
}

impl LedgerRecord for KhazinaRecord {
    type Input = KhazinaInput;

    const KIND: LedgerKind = LedgerKind::Khazina;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn date(&self) -> &str {
        &self.date
    }

    fn from_input(id: RecordId, input: KhazinaInput) -> Self {
        Self {
            id,
            year: year_of(&input.date).unwrap_or_default(),
            total: input.income - input.expense,
            date: input.date,
            income: input.income,
            expense: input.expense,
            balance: input.balance,
            notes: input.notes,
        }
    }

    fn to_input(&self) -> KhazinaInput {
        KhazinaInput {
            date: self.date.clone(),
            income: self.income,
            expense: self.expense,
            balance: self.balance,
            notes: self.notes.clone(),
        }
    }

    fn normalize_input(mut input: KhazinaInput) -> DomainResult<KhazinaInput> {
        input.date = normalize_user_date(&input.date)?;
        check_amount("income", input.income)?;
        check_amount("expense", input.expense)?;
        check_amount("balance", input.balance)?;
        Ok(input)
    }

    fn partition(&self) -> Option<i32> {
        Some(self.year)
    }
}

/// Ledgers kept per counterparty: a principal, payments against it, and the
/// derived remainder.
macro_rules! counterparty_ledger {
    ($(#[$doc:meta])* $record:ident, $input:ident, $kind:expr, $principal:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $record {
            pub id: RecordId,
            #[serde(default)]
            pub name: String,
            pub $principal: f64,
            pub payment: f64,
            /// Principal minus payment.
            #[serde(default)]
            pub remaining: f64,
            pub date: String,
            #[serde(default)]
            pub notes: String,
        }

        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $input {
            #[serde(default)]
            pub name: String,
            pub $principal: f64,
            pub payment: f64,
            pub date: String,
            #[serde(default)]
            pub notes: String,
        }

        impl LedgerRecord for $record {
            type Input = $input;

            const KIND: LedgerKind = $kind;

            fn id(&self) -> &RecordId {
                &self.id
            }

            fn date(&self) -> &str {
                &self.date
            }

            fn from_input(id: RecordId, input: $input) -> Self {
                Self {
                    id,
                    remaining: input.$principal - input.payment,
                    name: input.name,
                    $principal: input.$principal,
                    payment: input.payment,
                    date: input.date,
                    notes: input.notes,
                }
            }

            fn to_input(&self) -> $input {
                $input {
                    name: self.name.clone(),
                    $principal: self.$principal,
                    payment: self.payment,
                    date: self.date.clone(),
                    notes: self.notes.clone(),
                }
            }

            fn normalize_input(mut input: $input) -> DomainResult<$input> {
                input.date = normalize_user_date(&input.date)?;
                check_amount(stringify!($principal), input.$principal)?;
                check_amount("payment", input.payment)?;
                Ok(input)
            }
        }
    };
}

counterparty_ledger!(
    /// Employee advance.
    SulfRecord,
    SulfInput,
    LedgerKind::Sulf,
    advance
);

counterparty_ledger!(
    /// Loan.
    QardRecord,
    QardInput,
    LedgerKind::Qard,
    amount
);

counterparty_ledger!(
    /// Household entry.
    BaitRecord,
    BaitInput,
    LedgerKind::Bait,
    advance
);

counterparty_ledger!(
    /// InstaPay transfer.
    InstaPayRecord,
    InstaPayInput,
    LedgerKind::InstaPay,
    advance
);
