//! Model-aware allocation of cached content.
//!
//! - [`models`] — the per-model limit table: [`ModelPolicy`] tags each model
//!   as send-all or budgeted, [`KnownModel`] lists the built-ins, and
//!   [`ModelTable`] is the id-keyed lookup the allocator uses.
//! - [`allocate`] — [`ModelAllocationPolicy`], which turns a store and a
//!   model id into an [`Allocation`] that never exceeds a budgeted model's
//!   safe token budget.

pub mod allocate;
pub mod models;

pub use allocate::{
    Allocation, AllocationError, CAPPED_PERCENT, ModelAllocationPolicy, WARNING_PERCENT,
};
pub use models::{KnownModel, ModelInfo, ModelLimits, ModelPolicy, ModelTable};
