//! vmc - a small local VM manager on top of VirtualBox.
//!
//! The library holds everything but argument parsing:
//! - [`hypervisor`]: the narrow contract vmc needs from the virtualization engine
//! - [`vm`]: machine lifecycle and the two-phase shutdown
//! - [`ip`] and [`network`]: address allocation and host network selection
//! - [`provision`]: declarative provisioning from an INI file
//! - [`image`]: the OVA image store
//! - [`guest`]: ssh/scp access to running guests

pub mod config;
pub mod context;
pub mod error;
pub mod guest;
pub mod hypervisor;
pub mod image;
pub mod ip;
pub mod network;
pub mod provision;
pub mod registry;
pub mod vm;

pub use context::Context;
pub use error::{Error, Result};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
