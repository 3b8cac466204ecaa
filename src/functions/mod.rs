//! Built-in Web3 Functions, compiled into the harness.
//!
//! Each module exposes `register(&mut Web3Function)`; the matching manifest lives in
//! `web3-functions/<name>/schema.json`.

pub mod advertising_board;
pub mod event_listener;
pub mod hello_world;
pub mod oracle;

use crate::runtime::module::FunctionCatalog;

pub fn builtin_catalog() -> FunctionCatalog {
    FunctionCatalog::new()
        .with(hello_world::NAME, hello_world::register)
        .with(advertising_board::NAME, advertising_board::register)
        .with(oracle::NAME, oracle::register)
        .with(event_listener::NAME, event_listener::register)
}
