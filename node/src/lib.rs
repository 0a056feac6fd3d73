//! STRATA Node Implementation
//!
//! Hosts the composite platform state for the lifetime of the process:
//! - bootstrap from disk or from genesis
//! - periodic flushes
//! - ordered shutdown

mod node;
mod runtime;

pub use node::*;
pub use runtime::*;
