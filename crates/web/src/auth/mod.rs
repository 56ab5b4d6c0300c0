//! Authentication middleware: HTTP basic and JWT bearer.

mod basic;
mod expr;
mod jwks;
mod jwt;

pub use basic::BasicAuth;
pub use jwt::{JwtAuth, JwtAuthBuilder};
