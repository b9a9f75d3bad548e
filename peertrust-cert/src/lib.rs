//! X.509 certificate issuance for identity keys.
//!
//! TLS stacks speak X.509, not JWKs, so peers mint short-lived certificates
//! that bind a key fingerprint to its endpoints: self-signed server and
//! client certificates for their own key, and CA-delegation certificates
//! that vouch for a trusted peer's key so a standard path validator accepts
//! it. Freshness comes from the surrounding key trust, not the certificate,
//! hence the fixed serial and the generous validity window.

use std::net::IpAddr;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use const_oid::db::rfc5280::{ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH};
use der::asn1::{Ia5String, OctetString, UtcTime};
use der::Encode;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName,
};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{
    DynSignatureAlgorithmIdentifier, EncodePublicKey, SignatureBitStringEncoding,
    SubjectPublicKeyInfoOwned,
};
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate;

use p256::ecdsa::signature::{Keypair, Signer};
use peertrust_jwk::{Params, JWK};

pub mod error;
pub use error::Error;

const VALIDITY_BACKDATE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const VALIDITY_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Shape of one side (subject or issuer) of a certificate.
struct CertTemplateInfo {
    common_name: String,
    domains: Vec<String>,
    ip_addresses: Vec<IpAddr>,
    is_ca: bool,
    client_auth: bool,
    server_auth: bool,
}

impl CertTemplateInfo {
    fn new(common_name: String) -> Self {
        Self {
            common_name,
            domains: Vec::new(),
            ip_addresses: Vec::new(),
            is_ca: false,
            client_auth: false,
            server_auth: false,
        }
    }
}

/// Create a self-signed certificate for the given key, to be used by TLS
/// servers answering for the given domains and IP addresses.
pub fn generate_self_signed_server_cert(
    key: &JWK,
    domains: &[String],
    ip_addresses: &[IpAddr],
) -> Result<Certificate, Error> {
    let info = CertTemplateInfo {
        domains: domains.to_vec(),
        ip_addresses: ip_addresses.to_vec(),
        server_auth: true,
        ..CertTemplateInfo::new(key.fingerprint()?)
    };
    generate_cert(key, key, &info, &info)
}

/// Create a self-signed certificate for the given key, to be used by TLS
/// clients.
pub fn generate_self_signed_client_cert(key: &JWK) -> Result<Certificate, Error> {
    let info = CertTemplateInfo {
        client_auth: true,
        ..CertTemplateInfo::new(key.fingerprint()?)
    };
    generate_cert(key, key, &info, &info)
}

/// Create a CA certificate vouching for the trusted peer's key: the subject
/// is the trusted key, the issuer is the local signing key.
pub fn generate_ca_cert(signer: &JWK, trusted_key: &JWK) -> Result<Certificate, Error> {
    let subject_info = CertTemplateInfo {
        is_ca: true,
        ..CertTemplateInfo::new(trusted_key.fingerprint()?)
    };
    let issuer_info = CertTemplateInfo::new(signer.fingerprint()?);
    generate_cert(trusted_key, signer, &subject_info, &issuer_info)
}

/// Create one CA-delegation certificate per trusted key, for insertion into
/// a TLS stack's root certificate store. Any certificate issued by one of
/// the trusted keys will then pass X.509 path validation.
pub fn generate_ca_cert_pool(
    signer: &JWK,
    trusted_keys: &[JWK],
) -> Result<Vec<Certificate>, Error> {
    trusted_keys
        .iter()
        .map(|trusted_key| generate_ca_cert(signer, trusted_key))
        .collect()
}

/// DER-encode a certificate.
pub fn certificate_der(certificate: &Certificate) -> Result<Vec<u8>, Error> {
    Ok(certificate.to_der()?)
}

fn generate_cert(
    subject_key: &JWK,
    issuer_key: &JWK,
    subject_info: &CertTemplateInfo,
    issuer_info: &CertTemplateInfo,
) -> Result<Certificate, Error> {
    let spki = spki_for_key(subject_key)?;
    match &issuer_key.params {
        Params::EC(ec) => {
            let curve = ec.curve.as_ref().ok_or(peertrust_jwk::Error::MissingCurve)?;
            match curve.as_str() {
                "P-256" => {
                    let secret_key = p256::SecretKey::try_from(ec)?;
                    let signer = p256::ecdsa::SigningKey::from(secret_key);
                    issue::<_, p256::ecdsa::DerSignature>(subject_info, issuer_info, spki, &signer)
                }
                "P-384" => {
                    let secret_key = p384::SecretKey::try_from(ec)?;
                    let signer = p384::ecdsa::SigningKey::from(secret_key);
                    issue::<_, p384::ecdsa::DerSignature>(subject_info, issuer_info, spki, &signer)
                }
                "P-521" => {
                    let secret_key = p521::SecretKey::try_from(ec)?;
                    let signer = ecdsa::SigningKey::<p521::NistP521>::from(secret_key);
                    issue::<_, ecdsa::der::Signature<p521::NistP521>>(
                        subject_info,
                        issuer_info,
                        spki,
                        &signer,
                    )
                }
                other => Err(peertrust_jwk::Error::CurveNotImplemented(other.to_string()).into()),
            }
        }
        Params::RSA(rsa_params) => {
            let private_key = rsa::RsaPrivateKey::try_from(rsa_params)?;
            let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private_key);
            issue::<_, rsa::pkcs1v15::Signature>(subject_info, issuer_info, spki, &signer)
        }
    }
}

fn issue<S, Sig>(
    subject_info: &CertTemplateInfo,
    issuer_info: &CertTemplateInfo,
    spki: SubjectPublicKeyInfoOwned,
    signer: &S,
) -> Result<Certificate, Error>
where
    S: Keypair + DynSignatureAlgorithmIdentifier + Signer<Sig>,
    S::VerifyingKey: EncodePublicKey,
    Sig: SignatureBitStringEncoding,
{
    let profile = Profile::Manual {
        issuer: Some(distinguished_name(&issuer_info.common_name)?),
    };
    let serial_number = SerialNumber::new(&[0u8])?;
    let subject = distinguished_name(&subject_info.common_name)?;
    let mut builder = CertificateBuilder::new(
        profile,
        serial_number,
        validity()?,
        subject,
        spki,
        signer,
    )?;
    if subject_info.is_ca {
        builder.add_extension(&BasicConstraints {
            ca: true,
            path_len_constraint: None,
        })?;
        builder.add_extension(&KeyUsage(KeyUsages::KeyCertSign.into()))?;
    }
    let mut extended_key_usage = Vec::new();
    if subject_info.client_auth {
        extended_key_usage.push(ID_KP_CLIENT_AUTH);
    }
    if subject_info.server_auth {
        extended_key_usage.push(ID_KP_SERVER_AUTH);
    }
    if !extended_key_usage.is_empty() {
        builder.add_extension(&ExtendedKeyUsage(extended_key_usage))?;
    }
    if !subject_info.domains.is_empty() || !subject_info.ip_addresses.is_empty() {
        let mut names = Vec::new();
        for domain in &subject_info.domains {
            let name = Ia5String::new(domain)
                .map_err(|_| Error::InvalidName(domain.clone()))?;
            names.push(GeneralName::DnsName(name));
        }
        for ip in &subject_info.ip_addresses {
            let octets = match ip {
                IpAddr::V4(v4) => v4.octets().to_vec(),
                IpAddr::V6(v6) => v6.octets().to_vec(),
            };
            names.push(GeneralName::IpAddress(OctetString::new(octets)?));
        }
        builder.add_extension(&SubjectAltName(names))?;
    }
    Ok(builder.build::<Sig>()?)
}

/// Certificates are valid from the past week to 10 years from now; the
/// surrounding key trust provides freshness.
fn validity() -> Result<Validity, Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| Error::InvalidTime)?;
    let not_before = UtcTime::from_unix_duration(now - VALIDITY_BACKDATE)?;
    let not_after = UtcTime::from_unix_duration(now + VALIDITY_LIFETIME)?;
    Ok(Validity {
        not_before: Time::UtcTime(not_before),
        not_after: Time::UtcTime(not_after),
    })
}

fn distinguished_name(common_name: &str) -> Result<Name, Error> {
    Name::from_str(&format!("CN={common_name}"))
        .map_err(|_| Error::InvalidName(common_name.to_string()))
}

fn spki_for_key(key: &JWK) -> Result<SubjectPublicKeyInfoOwned, Error> {
    use der::Decode;
    let document = match &key.params {
        Params::EC(ec) => {
            let curve = ec.curve.as_ref().ok_or(peertrust_jwk::Error::MissingCurve)?;
            match curve.as_str() {
                "P-256" => p256::PublicKey::try_from(ec)?.to_public_key_der()?,
                "P-384" => p384::PublicKey::try_from(ec)?.to_public_key_der()?,
                "P-521" => p521::PublicKey::try_from(ec)?.to_public_key_der()?,
                other => {
                    return Err(
                        peertrust_jwk::Error::CurveNotImplemented(other.to_string()).into(),
                    )
                }
            }
        }
        Params::RSA(rsa_params) => rsa::RsaPublicKey::try_from(rsa_params)?.to_public_key_der()?,
    };
    Ok(SubjectPublicKeyInfoOwned::from_der(document.as_bytes())?)
}
