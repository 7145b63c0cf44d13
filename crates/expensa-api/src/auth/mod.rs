//! Bearer token verification. Tokens are issued by the external identity provider; this
//! service only checks the HS256 signature and expiry and reads the subject.

pub mod jwt;
pub mod middleware;

pub use jwt::{JwtClaims, JwtVerifier};
pub use middleware::{auth_middleware, AuthUser};
