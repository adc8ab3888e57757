//! Proxy services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own backend I/O and payload shaping so route handlers can
//! stay focused on extracting the token and choosing the upstream call.

pub mod reshape;
pub mod upstream;
