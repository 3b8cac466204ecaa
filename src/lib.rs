//! Local execution harness for Web3 Functions.
//!
//! A function is built from its directory (manifest plus compiled handler), then run
//! against a bounded context: user args, chain metadata, secrets, a key/value storage
//! snapshot, multi-chain JSON-RPC providers and outbound HTTP. Every run yields one
//! normalized [`RunOutcome`](runtime::RunOutcome).

pub mod cli;
pub mod context;
pub mod functions;
pub mod rpc;
pub mod runtime;
pub mod store;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use utils::{HarnessError, Result};
