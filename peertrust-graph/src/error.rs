use peertrust_jwk::error::Error as JWKError;
use peertrust_jws::error::Error as JWSError;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Grant payload does not have the expected shape, mixes scope
    /// encodings, or carries an inverted validity interval
    #[error("Malformed grant")]
    MalformedGrant,
    /// Grant has no attached signature
    #[error("Missing signature")]
    MissingSignature,
    /// Grant is past its expiration plus the grace window
    #[error("Grant expired")]
    Expired,
    /// Grant is revoked
    #[error("Grant revoked")]
    Revoked,
    /// No valid grant chain authorizes the query
    #[error("Not authorized")]
    NotAuthorized,
    /// Grant chain has a broken, revoked, or expired link
    #[error("Invalid grant chain")]
    InvalidChain,
    /// Grant chain grants to a revoked key
    #[error("Chain link revoked")]
    LinkRevoked,
    /// Final grant of a chain is not signed by a recognised authority
    #[error("Root authority unverified")]
    RootUnverified,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    JWS(#[from] JWSError),
    #[error(transparent)]
    JWK(#[from] JWKError),
}
