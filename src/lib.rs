#![forbid(unsafe_code)]

pub mod cli;
pub mod formats;
pub mod language;
pub mod logging;
pub mod manifest;
pub mod parity;
pub mod policy;
pub mod probe;
pub mod repair;
pub mod store;
pub mod summary;
pub mod table;
pub mod validate;
