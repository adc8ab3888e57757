//! Client-side session lifecycle: backend selection, the controller that owns
//! the token/user pair, and route guards that read it.

pub mod backend;
pub mod controller;
pub mod guard;

pub use backend::{BackendKind, MockBackend, RemoteBackend, SessionBackend, demo_user};
pub use controller::{LoginOutcome, RegisterOutcome, Session, SessionController, SessionPhase};
pub use guard::{GuardDecision, RouteScope, evaluate, scope_for, should_redirect_unauth};
