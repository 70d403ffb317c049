//! Domain Layer - Core price synchronization types and rules.
//!
//! This layer contains the connection state machine, the subscription
//! bookkeeping and the price table. Nothing here performs I/O or reads a
//! clock on its own; callers pass timestamps in.

/// Connection lifecycle states and observable status.
pub mod connection;

/// Price records, pending batches and the price table.
pub mod price;

/// Consumer interest tracking and reconciliation.
pub mod subscription;
