pub mod access;
pub mod client;
pub mod installment;
pub mod ledger;
pub mod loan;
pub mod money;
pub mod notification;
pub mod payment;
pub mod ports;
pub mod schedule;
