//! Token validation against the tenant's own auth endpoint.

pub mod validator;

pub use validator::{HttpTokenValidator, TokenValidator};
