use peertrust_jwk::error::Error as JWKError;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Compact form does not have the expected structure
    #[error("Malformed token")]
    MalformedToken,
    /// `alg` header value outside the supported set
    #[error("Unknown signature algorithm")]
    UnknownAlgorithm,
    /// Algorithm in JWS header is not supported by the key
    #[error("Algorithm in JWS header does not match key")]
    AlgorithmMismatch,
    /// No embedded `jwk`, no `x5c`, and no caller-supplied key
    #[error("Missing public key")]
    MissingKey,
    /// Signature did not verify
    #[error("Invalid signature")]
    BadSignature,
    /// Signature octet string has the wrong shape for the algorithm
    #[error("Malformed signature")]
    MalformedSignature,
    /// `x5c` certificate chain failed to parse or verify
    #[error("Certificate chain invalid")]
    CertificateChainInvalid,
    /// Nested JWS exceeds the recursion bound
    #[error("JWS nesting too deep")]
    NestingTooDeep,
    /// Error decoding base64url
    #[error("Illegal base64url string")]
    BadEncoding(#[from] base64::DecodeError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    JWK(#[from] JWKError),
    /// Errors from the p256, p384, p521 and rsa signers
    #[error(transparent)]
    CryptoErr(#[from] p256::ecdsa::Error),
}
