//! Billing and payment reconciliation engine for a property-management
//! backend. The surrounding platform (auth, CRUD, notification transport)
//! talks to the engine through the traits in [`billing::repository`]; the
//! engine owns the financial invariants.

pub mod billing;
pub mod config;
pub mod error;
pub mod telemetry;
