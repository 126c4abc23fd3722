//! Ledger module: chart of accounts, journal, templates and the facade

pub mod account;
pub mod core;
pub mod journal;
pub mod template;

pub use account::*;
pub use self::core::*;
pub use journal::*;
pub use template::*;
