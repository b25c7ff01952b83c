//! Inventory Service - Parts stock ledger with bulk charge-outs, recounts and a
//! monthly issued counter.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
