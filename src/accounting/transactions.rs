use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub account: AccountId,
    pub amount: Decimal,
    pub memo: Option<String>,
}

impl Posting {
    pub fn new(account: AccountId, amount: Decimal) -> Posting {
        Posting {
            account,
            amount,
            memo: None,
        }
    }

    pub fn with_memo(mut self, memo: Option<String>) -> Posting {
        self.memo = memo;
        self
    }
}

/// A transaction as it is stored in the ledger. All postings are in `currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub date: NaiveDate,
    pub currency: String,
    pub description: String,
    pub notes: Option<String>,
    pub postings: Vec<Posting>,
}

impl LedgerTransaction {
    pub fn new(date: NaiveDate, currency: &str, description: String) -> LedgerTransaction {
        LedgerTransaction {
            date,
            currency: currency.to_string(),
            description,
            notes: None,
            postings: Vec::new(),
        }
    }

    pub fn push_posting(&mut self, posting: Posting) {
        self.postings.push(posting);
    }

    pub fn total(&self) -> Decimal {
        self.postings.iter().map(|posting| posting.amount).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.postings.len() >= 2 && self.total().is_zero()
    }
}
