//! Application layer containing the settlement orchestration.
//!
//! `SettlementEngine` is the entry point for charges, reversals and gateway
//! reports. `LedgerService` serializes work per account through `KeyedLocks`
//! so concurrent handlers can share one engine without a global lock.

pub mod engine;
pub mod ledger;
pub mod locks;
pub mod poller;
pub mod refund;
