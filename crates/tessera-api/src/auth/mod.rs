//! Authentication and session management
//!
//! - [`password`]: Argon2id credential hashing and verification
//! - [`jwt`]: HS256 access token issuance and validation
//! - [`refresh`]: opaque refresh token generation, storage and rotation
//! - [`service`]: the session orchestrator tying the three together
//! - [`middleware`]: bearer-token request authentication

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod refresh;
pub mod service;

pub use jwt::{AccessClaims, AccessTokenCodec, JwtError};
pub use middleware::{auth_middleware, bearer_token, AuthenticatedAccount};
pub use password::{CredentialVerifier, PasswordError};
pub use refresh::{ClientContext, RefreshTokenError, RefreshTokenManager, Rotation};
pub use service::{
    AuthResponse, ErrorCategory, LoginRequest, RefreshRequest, RegisterRequest, SessionError,
    SessionService, SetupError,
};
