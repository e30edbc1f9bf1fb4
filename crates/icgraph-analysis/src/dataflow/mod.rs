//! Def-use tracing of function pointers.
//!
//! The multi-layer analysis loses precision whenever a function pointer is
//! stored through an opaque pointer. These helpers recover the cases where
//! the stored value can be followed back to its definitions: through
//! private slots, direct-call returns and parameters whose callers are all
//! visible.

mod argument_flow;
mod trace;

pub use argument_flow::{ArgumentFlow, ParamFlow};
pub use trace::{private_slot_stores, trace_function_pointer, Trace};
