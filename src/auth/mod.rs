pub mod claims;
pub mod context;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use context::AuthContext;
pub use jwt::JwtVerifier;
pub use middleware::RequireAuth;
