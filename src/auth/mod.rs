//! Identity contract: bearer tokens carrying a driver (or admin) subject.
//! Verification returns tagged results; authorization failures are domain
//! errors, never panics or control-flow exceptions.

mod jwt;
mod middleware;
mod models;
mod service;

pub use jwt::JwtHandler;
pub use middleware::{auth_middleware, AuthRejection};
pub use models::{Claims, Identity, Role};
pub use service::{login_driver, register_driver, LoginRequest, RegisterRequest, TokenResponse};
