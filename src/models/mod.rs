pub mod account;
pub mod bank_transaction;
pub mod classification;
pub mod company_scope;
pub mod summary;

pub use account::{AccountKind, AccountRef, AccountStatus, OpenAccount, Payable, Receivable};
pub use bank_transaction::BankTransaction;
pub use classification::{Classification, ExceptionKind};
pub use company_scope::CompanyScope;
pub use summary::{ReconciliationSummary, TransactionCounts};
