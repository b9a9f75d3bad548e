//! JSON Web Signature support for the peertrust identity layer.
//!
//! Produces and validates compact-form JWSs whose protected header embeds
//! the signer's public JWK, including the nested (`cty: "JWT"`) form used to
//! counter-sign an existing token. The nested layout follows the identity
//! token format: the outer payload is the inner compact string verbatim, so
//! the outer signature covers `header_b64 || "." || inner-compact`.

use serde::{Deserialize, Serialize};

use peertrust_jwk::{ec_octet_width, Algorithm, Params, JWK};

pub mod error;
pub use error::Error;

mod chain;

// RFC 7515 - JSON Web Signature (JWS)

/// Maximum depth of nested (`cty: "JWT"`) signatures accepted by the
/// verifier.
pub const MAX_NESTING_DEPTH: usize = 8;

/// JWS protected header.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Header {
    #[serde(rename = "alg")]
    pub algorithm: Algorithm,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<JWK>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "kid")]
    pub key_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "x5c")]
    pub x509_certificate_chain: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "typ")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "cty")]
    pub content_type: Option<String>,
}

impl Header {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            jwk: None,
            key_id: None,
            x509_certificate_chain: None,
            type_: None,
            content_type: None,
        }
    }

    fn is_nested(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|cty| cty.eq_ignore_ascii_case("JWT"))
            == Some(true)
    }
}

/// Hash selector for RSA signing; EC keys disregard it because the curve
/// pins the algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

/// Outcome of verifying a compact JWS: the public keys that signed each
/// layer (outermost first) and the innermost payload.
#[derive(Debug, Clone)]
pub struct Verification {
    pub signer_keys: Vec<JWK>,
    pub payload: Vec<u8>,
}

fn base64_encode_json<T: Serialize>(object: &T) -> Result<String, Error> {
    let json = serde_json::to_string(&object)?;
    Ok(base64::encode_config(json, base64::URL_SAFE_NO_PAD))
}

/// The JWS algorithm the given key produces for the requested hash.
pub fn signature_algorithm(key: &JWK, hash: HashAlgorithm) -> Result<Algorithm, Error> {
    match &key.params {
        Params::EC(_) => key.get_algorithm().ok_or(Error::UnknownAlgorithm),
        Params::RSA(_) => Ok(match hash {
            HashAlgorithm::Sha256 => Algorithm::RS256,
            HashAlgorithm::Sha384 => Algorithm::RS384,
            HashAlgorithm::Sha512 => Algorithm::RS512,
        }),
    }
}

/// Sign raw data, returning the signature and the algorithm used.
pub fn sign_with_hash(
    key: &JWK,
    data: &[u8],
    hash: HashAlgorithm,
) -> Result<(Vec<u8>, Algorithm), Error> {
    let algorithm = signature_algorithm(key, hash)?;
    let signature = sign_bytes(algorithm, data, key)?;
    Ok((signature, algorithm))
}

pub fn sign_bytes(algorithm: Algorithm, data: &[u8], key: &JWK) -> Result<Vec<u8>, Error> {
    use p256::ecdsa::signature::{SignatureEncoding, Signer};
    let signature = match &key.params {
        Params::RSA(rsa_params) => {
            rsa_params.validate_key_size()?;
            let private_key = rsa::RsaPrivateKey::try_from(rsa_params)?;
            match algorithm {
                Algorithm::RS256 => {
                    let signing_key = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(private_key);
                    let sig: rsa::pkcs1v15::Signature = signing_key.try_sign(data)?;
                    sig.to_vec()
                }
                Algorithm::RS384 => {
                    let signing_key = rsa::pkcs1v15::SigningKey::<sha2::Sha384>::new(private_key);
                    let sig: rsa::pkcs1v15::Signature = signing_key.try_sign(data)?;
                    sig.to_vec()
                }
                Algorithm::RS512 => {
                    let signing_key = rsa::pkcs1v15::SigningKey::<sha2::Sha512>::new(private_key);
                    let sig: rsa::pkcs1v15::Signature = signing_key.try_sign(data)?;
                    sig.to_vec()
                }
                _ => return Err(Error::AlgorithmMismatch),
            }
        }
        // EC signatures are the fixed-width concatenation of R and S, each
        // zero-padded to the curve octet width. Never ASN.1 DER.
        Params::EC(ec) => match algorithm {
            Algorithm::ES256 => {
                let secret_key = p256::SecretKey::try_from(ec)?;
                let signing_key = p256::ecdsa::SigningKey::from(secret_key);
                let sig: p256::ecdsa::Signature = signing_key.try_sign(data)?;
                sig.to_bytes().to_vec()
            }
            Algorithm::ES384 => {
                let secret_key = p384::SecretKey::try_from(ec)?;
                let signing_key = p384::ecdsa::SigningKey::from(secret_key);
                let sig: p384::ecdsa::Signature = signing_key.try_sign(data)?;
                sig.to_bytes().to_vec()
            }
            Algorithm::ES512 => {
                let secret_key = p521::SecretKey::try_from(ec)?;
                let signing_key = p521::ecdsa::SigningKey::from_bytes(&secret_key.to_bytes())?;
                let sig: p521::ecdsa::Signature = signing_key.try_sign(data)?;
                sig.to_bytes().to_vec()
            }
            _ => return Err(Error::AlgorithmMismatch),
        },
    };
    Ok(signature)
}

pub fn sign_bytes_b64(algorithm: Algorithm, data: &[u8], key: &JWK) -> Result<String, Error> {
    let signature = sign_bytes(algorithm, data, key)?;
    Ok(base64::encode_config(signature, base64::URL_SAFE_NO_PAD))
}

pub fn verify_bytes(
    algorithm: Algorithm,
    data: &[u8],
    key: &JWK,
    signature: &[u8],
) -> Result<(), Error> {
    use p256::ecdsa::signature::Verifier;
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    match &key.params {
        Params::RSA(rsa_params) => {
            rsa_params.validate_key_size()?;
            let public_key = rsa::RsaPublicKey::try_from(rsa_params)?;
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|_| Error::MalformedSignature)?;
            match algorithm {
                Algorithm::RS256 => rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(public_key)
                    .verify(data, &sig)
                    .map_err(|_| Error::BadSignature)?,
                Algorithm::RS384 => rsa::pkcs1v15::VerifyingKey::<sha2::Sha384>::new(public_key)
                    .verify(data, &sig)
                    .map_err(|_| Error::BadSignature)?,
                Algorithm::RS512 => rsa::pkcs1v15::VerifyingKey::<sha2::Sha512>::new(public_key)
                    .verify(data, &sig)
                    .map_err(|_| Error::BadSignature)?,
                _ => return Err(Error::AlgorithmMismatch),
            }
        }
        Params::EC(ec) => {
            let curve = ec.curve.as_ref().ok_or(peertrust_jwk::Error::MissingCurve)?;
            let expected = match (algorithm, curve.as_str()) {
                (Algorithm::ES256, "P-256") => 2 * ec_octet_width(curve)?,
                (Algorithm::ES384, "P-384") => 2 * ec_octet_width(curve)?,
                (Algorithm::ES512, "P-521") => 2 * ec_octet_width(curve)?,
                _ => return Err(Error::AlgorithmMismatch),
            };
            if signature.len() != expected {
                return Err(Error::MalformedSignature);
            }
            match algorithm {
                Algorithm::ES256 => {
                    let public_key = p256::PublicKey::try_from(ec)?;
                    let verifying_key = p256::ecdsa::VerifyingKey::from(public_key);
                    let sig = p256::ecdsa::Signature::from_slice(signature)
                        .map_err(|_| Error::MalformedSignature)?;
                    verifying_key
                        .verify(data, &sig)
                        .map_err(|_| Error::BadSignature)?;
                }
                Algorithm::ES384 => {
                    let public_key = p384::PublicKey::try_from(ec)?;
                    let verifying_key = p384::ecdsa::VerifyingKey::from(public_key);
                    let sig = p384::ecdsa::Signature::from_slice(signature)
                        .map_err(|_| Error::MalformedSignature)?;
                    verifying_key
                        .verify(data, &sig)
                        .map_err(|_| Error::BadSignature)?;
                }
                Algorithm::ES512 => {
                    let public_key = p521::PublicKey::try_from(ec)?;
                    let verifying_key = p521::ecdsa::VerifyingKey::from_sec1_bytes(
                        public_key.to_encoded_point(false).as_bytes(),
                    )?;
                    let sig = p521::ecdsa::Signature::from_slice(signature)
                        .map_err(|_| Error::MalformedSignature)?;
                    verifying_key
                        .verify(data, &sig)
                        .map_err(|_| Error::BadSignature)?;
                }
                _ => return Err(Error::AlgorithmMismatch),
            }
        }
    }
    Ok(())
}

/// Split a compact JWS into (header, payload, signature) parts.
pub fn split_jws(jws: &str) -> Result<(&str, &str, &str), Error> {
    let mut parts = jws.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c)) if !c.contains('.') => Ok((a, b, c)),
        _ => Err(Error::MalformedToken),
    }
}

/// Sign a payload, embedding the signer's public JWK in the protected
/// header.
pub fn encode_sign(algorithm: Algorithm, payload: &str, key: &JWK) -> Result<String, Error> {
    let header = Header {
        jwk: Some(key.to_public_with_key_id()?),
        ..Header::new(algorithm)
    };
    encode_sign_custom_header(payload, key, &header)
}

/// Sign a payload, additionally carrying an `x5c` certificate chain (DER
/// certificates, leaf first).
pub fn encode_sign_with_chain(
    algorithm: Algorithm,
    payload: &str,
    key: &JWK,
    chain: &[Vec<u8>],
) -> Result<String, Error> {
    let header = Header {
        jwk: Some(key.to_public_with_key_id()?),
        x509_certificate_chain: Some(chain.iter().map(|der| base64::encode(der)).collect()),
        ..Header::new(algorithm)
    };
    encode_sign_custom_header(payload, key, &header)
}

pub fn encode_sign_custom_header(
    payload: &str,
    key: &JWK,
    header: &Header,
) -> Result<String, Error> {
    let header_b64 = base64_encode_json(header)?;
    let payload_b64 = base64::encode_config(payload, base64::URL_SAFE_NO_PAD);
    let signing_input = header_b64 + "." + &payload_b64;
    let sig_b64 = sign_bytes_b64(header.algorithm, signing_input.as_bytes(), key)?;
    Ok([signing_input, sig_b64].join("."))
}

/// Wrap an existing compact JWS in an outer signature (`cty: "JWT"`). The
/// inner compact string becomes the outer payload verbatim.
pub fn counter_sign(jws: &str, key: &JWK) -> Result<String, Error> {
    let algorithm = key.get_algorithm().ok_or(Error::UnknownAlgorithm)?;
    let header = Header {
        jwk: Some(key.to_public_with_key_id()?),
        content_type: Some("JWT".to_string()),
        ..Header::new(algorithm)
    };
    let header_b64 = base64_encode_json(&header)?;
    let signing_input = header_b64 + "." + jws;
    let sig_b64 = sign_bytes_b64(algorithm, signing_input.as_bytes(), key)?;
    Ok(signing_input + "." + &sig_b64)
}

fn decode_header(header_b64: &str) -> Result<Header, Error> {
    let header_json = base64::decode_config(header_b64, base64::URL_SAFE_NO_PAD)?;
    let value: serde_json::Value =
        serde_json::from_slice(&header_json).map_err(|_| Error::MalformedToken)?;
    match value.get("alg").and_then(|alg| alg.as_str()) {
        Some("RS256" | "RS384" | "RS512" | "ES256" | "ES384" | "ES512") => {}
        Some(_) => return Err(Error::UnknownAlgorithm),
        None => return Err(Error::MalformedToken),
    }
    serde_json::from_value(value).map_err(|_| Error::MalformedToken)
}

/// Resolve the verification key for one JWS layer: embedded `jwk`, else the
/// `x5c` leaf, else the caller-supplied key. A present `x5c` chain is always
/// validated.
fn resolve_key(header: &Header, external_key: Option<&JWK>) -> Result<JWK, Error> {
    let chain_leaf = match header.x509_certificate_chain {
        Some(ref x5c) => Some(chain::verify_chain(x5c)?),
        None => None,
    };
    if let Some(ref jwk) = header.jwk {
        jwk.validate()?;
        if let Some(ref kid) = jwk.key_id {
            if *kid != jwk.fingerprint()? {
                return Err(peertrust_jwk::Error::FingerprintMismatch(kid.clone()).into());
            }
        }
        return Ok(jwk.clone());
    }
    if let Some(leaf) = chain_leaf {
        return Ok(leaf);
    }
    external_key.cloned().ok_or(Error::MissingKey)
}

/// Verify a compact JWS, recursing into nested (`cty: "JWT"`) payloads.
/// Returns all signer keys, outermost first, and the innermost payload.
pub fn verify_compact(jws: &str, external_key: Option<&JWK>) -> Result<Verification, Error> {
    verify_at_depth(jws, external_key, 0)
}

fn verify_at_depth(
    jws: &str,
    external_key: Option<&JWK>,
    depth: usize,
) -> Result<Verification, Error> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::NestingTooDeep);
    }
    let (header_b64, rest) = jws.split_once('.').ok_or(Error::MalformedToken)?;
    let header = decode_header(header_b64)?;
    let key = resolve_key(&header, external_key)?;
    if header.is_nested() {
        // The signature never contains a dot, so the inner compact form is
        // everything between the first and last dots.
        let (inner, signature_b64) = rest.rsplit_once('.').ok_or(Error::MalformedToken)?;
        if inner.is_empty() || signature_b64.is_empty() {
            return Err(Error::MalformedToken);
        }
        let signature = base64::decode_config(signature_b64, base64::URL_SAFE_NO_PAD)?;
        let signing_input = [header_b64.as_bytes(), b".", inner.as_bytes()].concat();
        verify_bytes(header.algorithm, &signing_input, &key, &signature)?;
        let nested = verify_at_depth(inner, external_key, depth + 1)?;
        let mut signer_keys = vec![key.to_public()];
        signer_keys.extend(nested.signer_keys);
        Ok(Verification {
            signer_keys,
            payload: nested.payload,
        })
    } else {
        let (payload_b64, signature_b64) = split_rest(rest)?;
        let payload = base64::decode_config(payload_b64, base64::URL_SAFE_NO_PAD)?;
        let signature = base64::decode_config(signature_b64, base64::URL_SAFE_NO_PAD)?;
        let signing_input = [header_b64.as_bytes(), b".", payload_b64.as_bytes()].concat();
        verify_bytes(header.algorithm, &signing_input, &key, &signature)?;
        Ok(Verification {
            signer_keys: vec![key.to_public()],
            payload,
        })
    }
}

/// Decode a compact JWS without checking signatures: outermost header plus
/// the innermost payload.
pub fn decode_unverified(jws: &str) -> Result<(Header, Vec<u8>), Error> {
    let (outer_header_b64, _) = jws.split_once('.').ok_or(Error::MalformedToken)?;
    let outer_header = decode_header(outer_header_b64)?;
    let mut current = jws;
    for _ in 0..MAX_NESTING_DEPTH {
        let (header_b64, rest) = current.split_once('.').ok_or(Error::MalformedToken)?;
        let header = decode_header(header_b64)?;
        if header.is_nested() {
            let (inner, signature_b64) = rest.rsplit_once('.').ok_or(Error::MalformedToken)?;
            if inner.is_empty() || signature_b64.is_empty() {
                return Err(Error::MalformedToken);
            }
            current = inner;
        } else {
            let (payload_b64, _signature_b64) = split_rest(rest)?;
            let payload = base64::decode_config(payload_b64, base64::URL_SAFE_NO_PAD)?;
            return Ok((outer_header, payload));
        }
    }
    Err(Error::NestingTooDeep)
}

fn split_rest(rest: &str) -> Result<(&str, &str), Error> {
    match rest.split_once('.') {
        Some((payload_b64, signature_b64)) if !signature_b64.contains('.') => {
            Ok((payload_b64, signature_b64))
        }
        _ => Err(Error::MalformedToken),
    }
}
