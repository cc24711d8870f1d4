use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::{Account, AccountId, AccountPath, NewAccount};
use super::transactions::LedgerTransaction;
use super::LedgerError;

/// In-memory account tree and transaction journal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    accounts: Vec<Account>,
    transactions: Vec<LedgerTransaction>,
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger {
            accounts: Vec::new(),
            transactions: Vec::new(),
        }
    }

    pub fn find_account(&self, parent: Option<AccountId>, name: &str) -> Option<AccountId> {
        self.accounts
            .iter()
            .find(|account| account.parent() == parent && account.name() == name)
            .map(Account::id)
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        usize::try_from(id.0).ok().and_then(|index| self.accounts.get(index))
    }

    pub fn add_account(&mut self, parent: Option<AccountId>, spec: NewAccount) -> Result<AccountId, LedgerError> {
        if let Some(parent) = parent {
            if self.account(parent).is_none() {
                return Err(LedgerError::UnknownAccount(parent));
            }
        }
        if self.find_account(parent, &spec.name).is_some() {
            return Err(LedgerError::DuplicateAccount(spec.name));
        }

        let id = AccountId(self.accounts.len() as i64);
        self.accounts.push(Account::new(id, parent, spec));
        Ok(id)
    }

    /// Balanced transactions against known accounts are appended to the journal, anything else is
    /// rejected without changing the ledger.
    pub fn execute_transaction(&mut self, transaction: LedgerTransaction) -> Result<(), LedgerError> {
        if !transaction.is_balanced() {
            let total = transaction.total();
            return Err(LedgerError::Unbalanced {
                description: transaction.description,
                total,
            });
        }
        if let Some(posting) = transaction.postings.iter().find(|posting| self.account(posting.account).is_none()) {
            return Err(LedgerError::UnknownAccount(posting.account));
        }

        self.transactions.push(transaction);
        Ok(())
    }

    pub fn balance(&self, id: AccountId) -> Decimal {
        self.transactions
            .iter()
            .flat_map(|transaction| transaction.postings.iter())
            .filter(|posting| posting.account == id)
            .map(|posting| posting.amount)
            .sum()
    }

    /// Full path of an account, following parents up to the root.
    pub fn path_of(&self, id: AccountId) -> Option<AccountPath> {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let account = self.account(id)?;
            segments.push(account.name().clone());
            current = account.parent();
        }
        segments.reverse();
        AccountPath::new(segments)
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn transactions(&self) -> &[LedgerTransaction] {
        &self.transactions
    }
}
