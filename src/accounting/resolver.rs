use log::info;
use thiserror::Error;

use super::account::{AccountId, AccountKind, AccountPath, NewAccount};
use super::{LedgerBackend, LedgerError};

const CLASS_SEPARATOR: char = '/';

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("category {0:?} contains an empty account name")]
    EmptySegment(String),
    #[error("cannot resolve account {path}: {source}")]
    Ledger {
        path: AccountPath,
        #[source]
        source: LedgerError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub path: AccountPath,
    pub id: AccountId,
}

/// Maps QIF category strings onto the ledger's account tree, creating missing accounts like
/// `mkdir -p` creates directories.
#[derive(Debug, Clone)]
pub struct AccountResolver {
    separator: char,
    currency: String,
    imbalance_account: String,
}

impl AccountResolver {
    pub fn new(separator: char, currency: &str, imbalance_account: &str) -> AccountResolver {
        AccountResolver {
            separator,
            currency: currency.to_string(),
            imbalance_account: imbalance_account.to_string(),
        }
    }

    /// Account path a category refers to. `[Checking]` (a transfer) names the account `Checking`
    /// and a `/Class` suffix is dropped, unless `/` is the account separator. Empty categories go to
    /// the imbalance account.
    pub fn category_path(&self, category: Option<&str>) -> Result<AccountPath, ResolveError> {
        let raw = category.map(str::trim).unwrap_or_default();
        let raw = match raw.strip_prefix('[') {
            Some(transfer) => transfer.split(']').next().unwrap_or_default(),
            None if self.separator == CLASS_SEPARATOR => raw,
            None => raw.split(CLASS_SEPARATOR).next().unwrap_or_default(),
        };

        let raw = raw.trim();
        let raw = if raw.is_empty() { self.imbalance_account.as_str() } else { raw };

        AccountPath::parse(raw, self.separator).ok_or_else(|| ResolveError::EmptySegment(raw.to_string()))
    }

    pub fn resolve<B: LedgerBackend>(&self, backend: &mut B, category: Option<&str>) -> Result<ResolvedAccount, ResolveError> {
        let path = self.category_path(category)?;
        let id = self.resolve_path(backend, &path)?;
        Ok(ResolvedAccount { path, id })
    }

    /// Walks the tree from the root, matching names case-sensitively and creating what is missing.
    /// Created intermediate accounts are placeholders, the leaf is a postable account.
    pub fn resolve_path<B: LedgerBackend>(&self, backend: &mut B, path: &AccountPath) -> Result<AccountId, ResolveError> {
        let ledger_error = |source| ResolveError::Ledger {
            path: path.clone(),
            source,
        };

        let segments = path.segments();
        let mut parent: Option<AccountId> = None;
        let mut parent_kind: Option<AccountKind> = None;

        for (depth, name) in segments.iter().enumerate() {
            let (id, kind) = match backend.find_account(parent, name).map_err(ledger_error)? {
                Some(id) => (id, backend.account(id).map_err(ledger_error)?.kind()),
                None => {
                    let is_leaf = depth + 1 == segments.len();
                    let kind = parent_kind.unwrap_or_else(|| AccountKind::infer(name));
                    info!(
                        "adding account {} ({})",
                        AccountPath::new(segments[..=depth].to_vec()).unwrap_or_else(|| path.clone()),
                        if is_leaf { "leaf" } else { "placeholder" }
                    );
                    let account = NewAccount {
                        name: name.clone(),
                        kind,
                        placeholder: !is_leaf,
                        currency: self.currency.clone(),
                    };
                    (backend.create_account(parent, account).map_err(ledger_error)?, kind)
                },
            };

            parent_kind = Some(kind);
            parent = Some(id);
        }

        parent.ok_or_else(|| ResolveError::EmptySegment(path.to_string()))
    }
}
