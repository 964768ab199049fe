//! # spv-spend
//!
//! A lightweight (SPV) Bitcoin client workflow: find funds belonging to a
//! key without downloading full blocks, then spend them and confirm the
//! peer accepted the transaction.
//!
//! ## Architecture
//!
//! The crate is layered bottom-up:
//! - Codecs and crypto (hashes, encoding, script, tx, keys)
//! - Protocol validation (headers, merkle, bloom)
//! - Transport (wire, peer)
//! - Orchestration (scanner, workflow) driven by an injected [`Config`]
//!
//! ## Design Principles
//!
//! 1. **Validation is pure**: proof-of-work, chain linkage, and merkle
//!    inclusion are checked by side-effect-free functions over parsed data
//! 2. **Every wait is bounded**: no peer interaction can hang the process
//! 3. **Exact version pinning**: consensus-critical crypto dependencies are
//!    pinned to exact versions
//! 4. **Soft failure is explicit**: a broadcast the peer never echoes is an
//!    [`workflow::Confirmation::Unconfirmed`] outcome, not a success and
//!    not an error
//!
//! ## Usage
//!
//! ```rust
//! use spv_spend::{Config, SpendWorkflow};
//!
//! let workflow = SpendWorkflow::new(Config::default()).unwrap();
//! // The address whose funds the run would spend
//! println!("watching {}", workflow.wallet_address());
//! ```

pub mod bloom;
pub mod config;
pub mod constants;
pub mod encoding;
pub mod error;
pub mod hashes;
pub mod headers;
pub mod keys;
pub mod merkle;
pub mod peer;
pub mod scanner;
pub mod script;
pub mod tx;
pub mod types;
pub mod wire;
pub mod workflow;

// Re-export the types a caller of the workflow needs
pub use config::Config;
pub use error::{Result, SpvError};
pub use types::{BlockHeader, FundingOutput, Network, OutPoint, Transaction};
pub use workflow::{Confirmation, SpendOutcome, SpendWorkflow, WorkflowState};
