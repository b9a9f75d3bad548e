//! Error types for `peertrust-jwk` crate
use base64::DecodeError as Base64Error;
use thiserror::Error;

/// Error type for `peertrust-jwk`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// JWK does not have the expected shape
    #[error("Malformed JWK: {0}")]
    MalformedKey(String),
    /// Missing curve in JWK
    #[error("Missing curve in JWK")]
    MissingCurve,
    /// Missing elliptic curve point in JWK
    #[error("Missing elliptic curve point in JWK")]
    MissingPoint,
    /// Missing private key parameter in JWK
    #[error("Missing private key parameter in JWK")]
    MissingPrivateKey,
    /// Missing modulus in RSA key
    #[error("Missing modulus in RSA key")]
    MissingModulus,
    /// Missing exponent in RSA key
    #[error("Missing exponent in RSA key")]
    MissingExponent,
    /// Missing prime factor in RSA key
    #[error("Missing prime factor in RSA key")]
    MissingPrime,
    /// Key type is not supported
    #[error("Key type not supported")]
    UnsupportedKeyType,
    /// Curve not implemented
    #[error("Curve not implemented: '{0}'")]
    CurveNotImplemented(String),
    /// Key parameters do not form a valid key
    #[error("Invalid key")]
    InvalidKey,
    /// Modulus too small for use
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(usize),
    /// Coordinate or scalar octet string has the wrong width for the curve
    #[error("Invalid number of octets: got {found}, expected {expected}")]
    InvalidOctetLength { expected: usize, found: usize },
    /// Declared key ID does not match the computed fingerprint
    #[error("Key ID does not match fingerprint: {0}")]
    FingerprintMismatch(String),
    /// Key generation failed
    #[error("Key generation failed: {0}")]
    KeyGen(String),
    /// Not a parseable X.509 certificate
    #[error("Malformed certificate")]
    MalformedCertificate,
    /// Error decoding Base64
    #[error(transparent)]
    Base64(#[from] Base64Error),
    /// Error from `rsa` crate
    #[error(transparent)]
    Rsa(#[from] rsa::errors::Error),
}
