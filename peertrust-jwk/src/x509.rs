//! Extraction of JWKs from X.509 material.
//!
//! Peer certificates in this stack are ephemeral wrappers around identity
//! keys, so the only thing we ever need from a certificate is its subject
//! public key. Chain semantics stay with the caller.

use const_oid::db::rfc5912::{
    ID_EC_PUBLIC_KEY, RSA_ENCRYPTION, SECP_256_R_1, SECP_384_R_1, SECP_521_R_1,
};
use der::asn1::ObjectIdentifier;
use der::Decode;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::traits::PublicKeyParts;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::Certificate;

use crate::error::Error;
use crate::{ECParams, Params, RSAParams, JWK};

/// Parse a DER certificate and extract its subject public key as a JWK.
pub fn from_certificate_der(bytes: &[u8]) -> Result<JWK, Error> {
    let certificate = Certificate::from_der(bytes).map_err(|_| Error::MalformedCertificate)?;
    from_spki(&certificate.tbs_certificate.subject_public_key_info)
}

/// Convert a SubjectPublicKeyInfo into a JWK.
pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<JWK, Error> {
    let key_bytes = spki
        .subject_public_key
        .as_bytes()
        .ok_or(Error::MalformedCertificate)?;
    if spki.algorithm.oid == ID_EC_PUBLIC_KEY {
        let curve_oid: ObjectIdentifier = spki
            .algorithm
            .parameters
            .as_ref()
            .ok_or(Error::MalformedCertificate)?
            .decode_as()
            .map_err(|_| Error::MalformedCertificate)?;
        let params = if curve_oid == SECP_256_R_1 {
            ECParams::try_from(
                &p256::PublicKey::from_sec1_bytes(key_bytes).map_err(|_| Error::InvalidKey)?,
            )?
        } else if curve_oid == SECP_384_R_1 {
            ECParams::try_from(
                &p384::PublicKey::from_sec1_bytes(key_bytes).map_err(|_| Error::InvalidKey)?,
            )?
        } else if curve_oid == SECP_521_R_1 {
            ECParams::try_from(
                &p521::PublicKey::from_sec1_bytes(key_bytes).map_err(|_| Error::InvalidKey)?,
            )?
        } else {
            return Err(Error::CurveNotImplemented(curve_oid.to_string()));
        };
        Ok(JWK::from(Params::EC(params)))
    } else if spki.algorithm.oid == RSA_ENCRYPTION {
        let public_key =
            rsa::RsaPublicKey::from_pkcs1_der(key_bytes).map_err(|_| Error::InvalidKey)?;
        Ok(JWK::from(Params::RSA(RSAParams::new_public(
            &public_key.e().to_bytes_be(),
            &public_key.n().to_bytes_be(),
        ))))
    } else {
        Err(Error::UnsupportedKeyType)
    }
}
