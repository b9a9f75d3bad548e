use peertrust_jwk::error::Error as JWKError;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// System clock is before the Unix epoch
    #[error("Invalid system time")]
    InvalidTime,
    /// Subject name or SAN entry cannot be encoded
    #[error("Invalid certificate name: {0}")]
    InvalidName(String),
    #[error(transparent)]
    JWK(#[from] JWKError),
    #[error(transparent)]
    Der(#[from] der::Error),
    #[error(transparent)]
    Spki(#[from] x509_cert::spki::Error),
    #[error(transparent)]
    Builder(#[from] x509_cert::builder::Error),
}
