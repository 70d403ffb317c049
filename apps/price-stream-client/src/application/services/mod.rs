//! Application Services
//!
//! Timer-owning services the feed session drives from its event loop.
//!
//! - `SubscriptionReconciler`: Debounced desired-set reconciliation
//! - `UpdateBatcher`: Windowed coalescing of price updates into the table
//! - `Deadline`: Re-armable one-shot timer shared by both

mod batcher;
mod reconciler;
mod timer;

pub use batcher::{DEFAULT_BATCH_WINDOW, UpdateBatcher};
pub use reconciler::{DEFAULT_DEBOUNCE, SubscriptionReconciler};
pub use timer::Deadline;
