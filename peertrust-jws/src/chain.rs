//! Validation of `x5c` certificate chains.
//!
//! Only signature plumbing happens here: each certificate must be signed by
//! the next one in the chain. Whether the chain's keys are actually trusted
//! delegators is the resolver's decision, and anchoring the final
//! certificate is the TLS stack's.

use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512, SHA_256_WITH_RSA_ENCRYPTION,
    SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use der::{Decode, Encode};
use x509_cert::Certificate;

use peertrust_jwk::{Params, JWK};

use crate::error::Error;

/// Parse and signature-check an `x5c` chain (standard base64 DER entries,
/// leaf first). Returns the leaf's subject public key.
pub(crate) fn verify_chain(x5c: &[String]) -> Result<JWK, Error> {
    if x5c.is_empty() {
        return Err(Error::CertificateChainInvalid);
    }
    let mut certificates = Vec::with_capacity(x5c.len());
    for entry in x5c {
        let der = base64::decode(entry).map_err(|_| Error::CertificateChainInvalid)?;
        let certificate =
            Certificate::from_der(&der).map_err(|_| Error::CertificateChainInvalid)?;
        certificates.push(certificate);
    }
    for pair in certificates.windows(2) {
        verify_certificate_signature(&pair[0], &pair[1])?;
    }
    peertrust_jwk::x509::from_spki(&certificates[0].tbs_certificate.subject_public_key_info)
        .map_err(|_| Error::CertificateChainInvalid)
}

/// Check that `certificate` was signed by `issuer`'s subject key.
fn verify_certificate_signature(
    certificate: &Certificate,
    issuer: &Certificate,
) -> Result<(), Error> {
    use p256::ecdsa::signature::Verifier;
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    let tbs = certificate
        .tbs_certificate
        .to_der()
        .map_err(|_| Error::CertificateChainInvalid)?;
    let signature = certificate
        .signature
        .as_bytes()
        .ok_or(Error::CertificateChainInvalid)?;
    let issuer_key =
        peertrust_jwk::x509::from_spki(&issuer.tbs_certificate.subject_public_key_info)
            .map_err(|_| Error::CertificateChainInvalid)?;
    let oid = certificate.signature_algorithm.oid;

    // X.509 mandates DER ECDSA signatures, unlike the fixed-width JWS form.
    match &issuer_key.params {
        Params::EC(ec) => {
            if oid == ECDSA_WITH_SHA_256 {
                let public_key =
                    p256::PublicKey::try_from(ec).map_err(|_| Error::CertificateChainInvalid)?;
                let verifying_key = p256::ecdsa::VerifyingKey::from(public_key);
                let sig = p256::ecdsa::DerSignature::try_from(signature)
                    .map_err(|_| Error::CertificateChainInvalid)?;
                verifying_key
                    .verify(&tbs, &sig)
                    .map_err(|_| Error::CertificateChainInvalid)
            } else if oid == ECDSA_WITH_SHA_384 {
                let public_key =
                    p384::PublicKey::try_from(ec).map_err(|_| Error::CertificateChainInvalid)?;
                let verifying_key = p384::ecdsa::VerifyingKey::from(public_key);
                let sig = p384::ecdsa::DerSignature::try_from(signature)
                    .map_err(|_| Error::CertificateChainInvalid)?;
                verifying_key
                    .verify(&tbs, &sig)
                    .map_err(|_| Error::CertificateChainInvalid)
            } else if oid == ECDSA_WITH_SHA_512 {
                let public_key =
                    p521::PublicKey::try_from(ec).map_err(|_| Error::CertificateChainInvalid)?;
                let verifying_key = p521::ecdsa::VerifyingKey::from_sec1_bytes(
                    public_key.to_encoded_point(false).as_bytes(),
                )
                .map_err(|_| Error::CertificateChainInvalid)?;
                let sig = p521::ecdsa::Signature::from_der(signature)
                    .map_err(|_| Error::CertificateChainInvalid)?;
                verifying_key
                    .verify(&tbs, &sig)
                    .map_err(|_| Error::CertificateChainInvalid)
            } else {
                Err(Error::CertificateChainInvalid)
            }
        }
        Params::RSA(rsa_params) => {
            if oid == SHA_256_WITH_RSA_ENCRYPTION {
                verify_rsa::<sha2::Sha256>(rsa_params, &tbs, signature)
            } else if oid == SHA_384_WITH_RSA_ENCRYPTION {
                verify_rsa::<sha2::Sha384>(rsa_params, &tbs, signature)
            } else if oid == SHA_512_WITH_RSA_ENCRYPTION {
                verify_rsa::<sha2::Sha512>(rsa_params, &tbs, signature)
            } else {
                Err(Error::CertificateChainInvalid)
            }
        }
    }
}

fn verify_rsa<D>(
    rsa_params: &peertrust_jwk::RSAParams,
    tbs: &[u8],
    signature: &[u8],
) -> Result<(), Error>
where
    D: sha2::Digest + const_oid::AssociatedOid,
{
    use p256::ecdsa::signature::Verifier;
    let public_key =
        rsa::RsaPublicKey::try_from(rsa_params).map_err(|_| Error::CertificateChainInvalid)?;
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<D>::new(public_key);
    let sig = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|_| Error::CertificateChainInvalid)?;
    verifying_key
        .verify(tbs, &sig)
        .map_err(|_| Error::CertificateChainInvalid)
}
