//! SMS login, verification codes, and JWT sessions.

pub mod codes;
pub mod jwt;
pub mod middleware;
pub mod service;
pub mod sms;

pub use jwt::{Claims, JwtService, TokenPair};
pub use service::{AuthService, LoginResult};
