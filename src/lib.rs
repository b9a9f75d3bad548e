//! Identity and trust for mutually authenticated peer-to-peer services
//! without a classical PKI.
//!
//! Each participant owns an asymmetric key pair whose public key *is* its
//! identity, rendered as a stable colon-quartet fingerprint. Trust between
//! identities is expressed as signed delegation statements ([`Grant`]s)
//! organised into a namespaced directed graph ([`TrustGraph`]), and mutual
//! TLS is bootstrapped with ephemeral X.509 certificates wrapping the
//! identity keys.
//!
//! The subsystems live in their own crates and are re-exported here:
//!
//! - [`jwk`]: key generation, JWK encoding, fingerprints
//! - [`jws`]: compact JWS signing and verification, nested signatures
//! - [`cert`]: X.509 issuance for TLS bootstrap
//! - [`graph`]: grants and the authorization resolver

pub use peertrust_cert as cert;
pub use peertrust_graph as graph;
pub use peertrust_jwk as jwk;
pub use peertrust_jws as jws;

pub use peertrust_graph::{is_sub_name, Grant, TrustGraph};
pub use peertrust_jwk::{Algorithm, KeyAlgorithm, JWK};

pub mod filter;
pub mod keyfiles;
