//! Domain layer: ledger accounts, allocation, gateway sessions and settled
//! charges, plus the ports the application layer talks to.

pub mod allocation;
pub mod charge;
pub mod gateway;
pub mod journal;
pub mod member_card;
pub mod money;
pub mod points;
pub mod ports;
