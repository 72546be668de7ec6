//! Referral-reward ledger.
//!
//! The crate keeps referral relationships, accrues and pays out
//! token-denominated rewards and enforces administrative limits under
//! role-based permissioning:
//!
//! * [`access`]: role membership and admin-of-role checks.
//! * [`config`]: bounded tunables (minimum claim, per-user cap, referral limit).
//! * [`referral`]: the one-level referrer → referrals graph.
//! * [`rewards`]: per-user pending/claimed balances and the global sums.
//! * [`pool`]: custodial payout balance on top of an external token.
//! * [`pause`]: halt switch and the non-reentrant section flag.
//! * [`ledger`]: the dispatcher composing all of the above.
//!
//! The host (a chain-style executor) hands every request to
//! [`ReferralLedger::apply`] one at a time together with the verified caller,
//! and consumes the emitted [`LedgerEvent`]s from the returned [`Receipt`].

pub mod access;
pub mod address;
pub mod config;
pub mod events;
pub mod ledger;
pub mod pause;
pub mod pool;
pub mod referral;
pub mod rewards;

mod error;

pub use access::Role;
pub use address::{Address, Amount};
pub use config::LedgerConfig;
pub use error::{ErrorKind, InvariantViolation, LedgerError, TokenError};
pub use events::LedgerEvent;
pub use ledger::{Genesis, Operation, Query, QueryResponse, Receipt, ReferralLedger};
pub use pool::{InMemoryToken, TokenPort};
