//! STRATA State Management
//!
//! Platform chain state split in two independently persisted domains that
//! share one base database:
//! - metadata: chain time, supply, last accepted block
//! - transactions: UTXOs, current stakers, sub-chains, tx statuses
//!
//! [`CompositeState`] combines them and fixes their lifecycle order.

pub mod store;
pub mod memory;
pub mod persistent;
pub mod genesis;
pub mod reward;
pub mod metrics;
pub mod metadata;
pub mod transactions;
pub mod composite;

pub use store::*;
pub use memory::*;
pub use persistent::*;
pub use genesis::*;
pub use reward::*;
pub use metrics::*;
pub use metadata::*;
pub use transactions::*;
pub use composite::*;
