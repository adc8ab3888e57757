//! Marketplace auth/session layer.
//!
//! ARCHITECTURE
//! ============
//! Client side, leaf to root: [`storage`] (token + user mirror), [`net`]
//! (availability probe and auth API client), [`session`] (backends, the
//! controller, route guards). Server side: [`routes`] and [`services`] make up
//! the auth proxy that reshapes backend JSON for the frontend.

pub mod config;
pub mod error;
pub mod net;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
pub mod storage;
pub mod user;

#[cfg(test)]
mod test_helpers;
