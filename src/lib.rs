#![forbid(unsafe_code)]

pub mod backend;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod debounce;
pub mod error;
pub mod handoff;
pub mod keepalive;
pub mod keys;
pub mod layout;
pub mod logging;
pub mod poll;
pub mod proxy;
pub mod recovery;
pub mod session;
pub mod store;
pub mod viewer;
