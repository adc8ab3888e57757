//! HTTP plumbing on the client side of the session layer.

pub mod api;
pub mod availability;

pub use api::{AuthApi, AuthResponse, Credentials};
pub use availability::{AvailabilityProber, AvailabilityStatus, BackendProbe, StaticProbe};
