//! Store module
//!
//! Row-addressed access to accounts, assets and purchase grants.
//! Methods taking a `Transaction` must run inside the caller's transaction;
//! the locks they acquire are held until that transaction ends.

mod accounts;
mod assets;
pub mod error;
mod grants;
mod users;

pub use accounts::AccountStore;
pub use assets::{AssetCatalog, PurchaseTerms};
pub use grants::GrantRegistry;
pub use users::UserDirectory;
