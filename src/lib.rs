// Error taxonomy
pub mod error;

// Users, plans, linked accounts, admission policy, encrypted storage
pub mod accounts;

// Normalized notifications and their store
pub mod notify;

// OAuth authorization flows (standard and PKCE)
pub mod oauth;

// Token refresh and notification sync engine
pub mod sync;

pub use error::{Error, Result};
