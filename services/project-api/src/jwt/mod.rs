//! Bearer token authentication against the authority's rotating key set.

pub mod claims;
pub mod key_ring;
pub mod key_source;
pub mod token;
pub mod validator;

pub use claims::Claims;
pub use key_ring::{KeyRing, KeyRingError, KeyRingSettings, KeySet, SigningKey};
pub use key_source::{HttpKeySetSource, Jwk, Jwks, KeySetSource};
pub use token::{ClaimRules, SignatureVerified, Token, TokenState, Unvalidated, Validated};
pub use validator::{bearer_token, TokenValidator};
