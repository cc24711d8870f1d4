use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
    Unspecified,
}

impl AccountKind {
    /// Kind of a top-level account, guessed from its name.
    pub fn infer(name: &str) -> AccountKind {
        match name {
            "Assets" | "Asset" => AccountKind::Asset,
            "Liabilities" | "Liability" => AccountKind::Liability,
            "Equity" => AccountKind::Equity,
            "Income" => AccountKind::Income,
            "Expenses" | "Expense" => AccountKind::Expense,
            _ => AccountKind::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Asset => "asset",
            AccountKind::Liability => "liability",
            AccountKind::Equity => "equity",
            AccountKind::Income => "income",
            AccountKind::Expense => "expense",
            AccountKind::Unspecified => "unspecified",
        }
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asset" => Ok(AccountKind::Asset),
            "liability" => Ok(AccountKind::Liability),
            "equity" => Ok(AccountKind::Equity),
            "income" => Ok(AccountKind::Income),
            "expense" => Ok(AccountKind::Expense),
            "unspecified" => Ok(AccountKind::Unspecified),
            other => Err(format!("unknown account kind {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, CopyGetters)]
pub struct Account {
    #[getset(get_copy = "pub")]
    id: AccountId,
    #[getset(get_copy = "pub")]
    parent: Option<AccountId>,
    #[getset(get = "pub")]
    name: String,
    #[getset(get_copy = "pub")]
    kind: AccountKind,
    /// Placeholder accounts only group children.
    #[getset(get_copy = "pub")]
    placeholder: bool,
    #[getset(get = "pub")]
    currency: String,
}

impl Account {
    pub fn new(id: AccountId, parent: Option<AccountId>, spec: NewAccount) -> Account {
        Account {
            id,
            parent,
            name: spec.name,
            kind: spec.kind,
            placeholder: spec.placeholder,
            currency: spec.currency,
        }
    }
}

/// Everything needed to create an account below some parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub name: String,
    pub kind: AccountKind,
    pub placeholder: bool,
    pub currency: String,
}

/// Names from the root of the account tree down to one account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountPath(Vec<String>);

impl AccountPath {
    /// Returns `None` if there are no segments or one of them is empty.
    pub fn new(segments: Vec<String>) -> Option<AccountPath> {
        if segments.is_empty() || segments.iter().any(|segment| segment.is_empty()) {
            None
        } else {
            Some(AccountPath(segments))
        }
    }

    /// Splits `raw` on `separator`, trimming whitespace around each segment.
    pub fn parse(raw: &str, separator: char) -> Option<AccountPath> {
        AccountPath::new(raw.split(separator).map(|segment| segment.trim().to_string()).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn leaf(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    pub fn join(&self, separator: char) -> String {
        self.0.join(&separator.to_string())
    }
}

impl Display for AccountPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.join(':'))
    }
}
