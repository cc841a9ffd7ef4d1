pub mod support;

mod chain_integrity;
mod fault_tolerance;
mod ledger_flow;
mod membership;
mod restart;
