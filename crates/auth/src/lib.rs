//! `ssogate-auth`: token issuance/validation and the authentication flows.
//!
//! This crate is decoupled from HTTP and from concrete storage: it talks to
//! the repository traits of `ssogate-core` and returns [`AuthError`] values
//! that the transport maps to status codes.

pub mod audit;
pub mod claims;
pub mod config;
pub mod error;
pub mod issuer;
pub mod password;
pub mod service;
pub mod sso;
pub mod validation;
pub mod validator;

mod bounded;

pub use audit::LoginAuditRecorder;
pub use claims::{ClaimsError, TokenClaims, validate_claims};
pub use config::AuthConfig;
pub use error::AuthError;
pub use issuer::{IssuedToken, TokenIssuer};
pub use service::{
    AuthService, AuthStores, ClientInfo, ExternalLoginAudit, LoginInput, LoginOutput, RegisterInput,
    ValidatedToken,
};
pub use sso::{
    HandshakeRequest, HandshakeState, LoginFormInput, LoginSubmission, SessionPrincipal,
    SsoHandshake, SsoOutcome,
};
pub use validation::ValidationErrors;
pub use validator::TokenValidator;
