//! Wood stain formula lookup and batch scaling.
//!
//! The library side of the application: a CSV-backed formula store, the
//! batch calculator, and the batch-table CSV export. The companion
//! `stainbatch-updater-lib` crate handles self-updating; the binary in
//! `main.rs` wires both together.

pub mod batch;
pub mod csvio;
pub mod export;
pub mod store;

pub use batch::{calculate_batch, BatchLineItem, BatchUnit};
pub use store::{Finish, FormulaStore, Ingredient, LoadReport, StoreError};
