//! vaultkeep: a personal secret vault backend.
//!
//! Users keep credentials, payment cards and files. Every signed-in device
//! holds its own session, and a change made on one device is pushed to the
//! user's other live sessions.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod storage;
pub mod sync;
pub mod transfer;
pub mod util;
pub mod vault;
