//! # Aegis Ledger
//!
//! The vault that holds the pooled underlying asset. Every participant owns
//! attributions (proportional ownership units) and may owe debt; no other
//! component moves the asset directly.
//!
//! ## Components
//!
//! - [`Vault`]: attributions, debt, the capital-source registry and the
//!   yield controller
//! - [`TokenBook`]: per-holder balances of the underlying asset
//! - [`Controller`]: bookkeeping of the optional yield strategy

pub mod controller;
pub mod token;
pub mod vault;

pub use controller::Controller;
pub use token::TokenBook;
pub use vault::Vault;
