use miette::Diagnostic;
use strata_catalog::CatalogError;
use strata_transaction::TxnError;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("catalog error")]
    #[diagnostic(code(strata::catalog))]
    Catalog(#[from] CatalogError),

    #[error("transaction error")]
    #[diagnostic(
        code(strata::transaction),
        help("roll the transaction back and retry it")
    )]
    Transaction(#[from] TxnError),
}

impl Error {
    /// Returns true when retrying the transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Catalog(e) => e.is_conflict(),
            Self::Transaction(TxnError::Evicted(_)) => true,
            Self::Transaction(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
