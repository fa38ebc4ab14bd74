//! Layered abstract interpretation of method bodies for contract checking
//! and inference.
//!
//! The member crates are re-exported by concern; [`prelude`] pulls in what
//! a host needs to run a batch.

pub use covenant_analysis as analysis;
pub use covenant_driver as driver;
pub use covenant_ir as ir;
pub use covenant_layer as layer;

pub mod prelude {
    pub use covenant_analysis::{FactBase, Predicate, SymbolicValue};
    pub use covenant_driver::*;
    pub use covenant_ir::*;
    pub use covenant_layer::{Slot, WideningStrategy};
}
