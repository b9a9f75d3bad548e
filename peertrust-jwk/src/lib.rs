//! JSON Web Key types for the peertrust identity layer.
//!
//! A public key *is* an identity here: every key renders to a stable
//! colon-quartet fingerprint ([`JWK::fingerprint`]) which the rest of the
//! stack uses as the key ID.

use std::convert::TryFrom;
use std::str::FromStr;

use num_bigint_dig::{BigUint, ModInverse};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

pub mod error;
pub use error::Error;

mod fingerprint;
pub mod x509;

// RFC 7517 - JSON Web Key (JWK)
// RFC 7518 - JSON Web Algorithms (JWA)

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Hash, Eq)]
pub struct JWK {
    #[serde(rename = "kid")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Host patterns this key is trusted for. Extended (non-RFC) member
    /// carried on entries of trusted-key sets.
    #[serde(rename = "hosts")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
    #[serde(flatten)]
    pub params: Params,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Hash, Eq, Zeroize)]
#[serde(tag = "kty")]
pub enum Params {
    EC(ECParams),
    RSA(RSAParams),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Hash, Eq, Zeroize)]
pub struct ECParams {
    // Parameters for Elliptic Curve Public Keys
    #[serde(rename = "crv")]
    pub curve: Option<String>,
    #[serde(rename = "x")]
    pub x_coordinate: Option<Base64urlUInt>,
    #[serde(rename = "y")]
    pub y_coordinate: Option<Base64urlUInt>,

    // Parameters for Elliptic Curve Private Keys
    #[serde(rename = "d")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecc_private_key: Option<Base64urlUInt>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default, Hash, Eq, Zeroize)]
pub struct RSAParams {
    // Parameters for RSA Public Keys
    #[serde(rename = "n")]
    pub modulus: Option<Base64urlUInt>,
    #[serde(rename = "e")]
    pub exponent: Option<Base64urlUInt>,

    // Parameters for RSA Private Keys
    #[serde(rename = "d")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_exponent: Option<Base64urlUInt>,
    #[serde(rename = "p")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_prime_factor: Option<Base64urlUInt>,
    #[serde(rename = "q")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_prime_factor: Option<Base64urlUInt>,
    #[serde(rename = "dp")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_prime_factor_crt_exponent: Option<Base64urlUInt>,
    #[serde(rename = "dq")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_prime_factor_crt_exponent: Option<Base64urlUInt>,
    #[serde(rename = "qi")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_crt_coefficient: Option<Base64urlUInt>,
    #[serde(rename = "oth")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_primes_info: Option<Vec<Prime>>,
}

/// Factor entry of a multi-prime RSA key (`oth` member).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Hash, Eq, Zeroize)]
pub struct Prime {
    #[serde(rename = "r")]
    pub prime_factor: Base64urlUInt,
    #[serde(rename = "d")]
    pub factor_crt_exponent: Base64urlUInt,
    #[serde(rename = "t")]
    pub factor_crt_coefficient: Base64urlUInt,
}

impl Drop for ECParams {
    fn drop(&mut self) {
        // Zeroize private key
        if let Some(ref mut d) = self.ecc_private_key {
            d.zeroize();
        }
    }
}

impl Drop for RSAParams {
    fn drop(&mut self) {
        // Zeroize private key fields
        if let Some(ref mut d) = self.private_exponent {
            d.zeroize();
        }
        if let Some(ref mut p) = self.first_prime_factor {
            p.zeroize();
        }
        if let Some(ref mut q) = self.second_prime_factor {
            q.zeroize();
        }
        if let Some(ref mut dp) = self.first_prime_factor_crt_exponent {
            dp.zeroize();
        }
        if let Some(ref mut dq) = self.second_prime_factor_crt_exponent {
            dq.zeroize();
        }
        if let Some(ref mut qi) = self.first_crt_coefficient {
            qi.zeroize();
        }
        if let Some(ref mut primes) = self.other_primes_info {
            for prime in primes {
                prime.zeroize();
            }
        }
    }
}

/// Big-endian octet string serialised as an unpadded base64url string.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Hash, Eq, Zeroize)]
#[serde(try_from = "String")]
#[serde(into = "Base64urlUIntString")]
pub struct Base64urlUInt(pub Vec<u8>);
type Base64urlUIntString = String;

/// JWS signature algorithms supported by the identity layer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Hash, Eq)]
pub enum Algorithm {
    RS256,
    RS384,
    RS512,
    ES256,
    ES384,
    ES512,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
        }
    }
}

/// Key generation parameter: curve for EC keys, modulus size for RSA keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    P256,
    P384,
    P521,
    RSA2048,
    RSA3072,
    RSA4096,
}

impl JWK {
    /// Generate a new private key for the given curve or RSA modulus size.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<JWK, Error> {
        match algorithm {
            KeyAlgorithm::P256 => Self::generate_p256(),
            KeyAlgorithm::P384 => Self::generate_p384(),
            KeyAlgorithm::P521 => Self::generate_p521(),
            KeyAlgorithm::RSA2048 => Self::generate_rsa2048(),
            KeyAlgorithm::RSA3072 => Self::generate_rsa3072(),
            KeyAlgorithm::RSA4096 => Self::generate_rsa4096(),
        }
    }

    pub fn generate_p256() -> Result<JWK, Error> {
        let mut rng = rand::rngs::OsRng {};
        let secret_key = p256::SecretKey::random(&mut rng);
        let ec_params = ECParams::try_from(&secret_key)?;
        Ok(JWK::from(Params::EC(ec_params)))
    }

    pub fn generate_p384() -> Result<JWK, Error> {
        let mut rng = rand::rngs::OsRng {};
        let secret_key = p384::SecretKey::random(&mut rng);
        let ec_params = ECParams::try_from(&secret_key)?;
        Ok(JWK::from(Params::EC(ec_params)))
    }

    pub fn generate_p521() -> Result<JWK, Error> {
        let mut rng = rand::rngs::OsRng {};
        let secret_key = p521::SecretKey::random(&mut rng);
        let ec_params = ECParams::try_from(&secret_key)?;
        Ok(JWK::from(Params::EC(ec_params)))
    }

    pub fn generate_rsa2048() -> Result<JWK, Error> {
        Self::generate_rsa(2048)
    }

    pub fn generate_rsa3072() -> Result<JWK, Error> {
        Self::generate_rsa(3072)
    }

    pub fn generate_rsa4096() -> Result<JWK, Error> {
        Self::generate_rsa(4096)
    }

    fn generate_rsa(bits: usize) -> Result<JWK, Error> {
        let mut rng = rand::rngs::OsRng {};
        let key =
            rsa::RsaPrivateKey::new(&mut rng, bits).map_err(|e| Error::KeyGen(e.to_string()))?;
        Ok(JWK::from(Params::RSA(RSAParams::try_from(&key)?)))
    }

    /// The signature algorithm this key produces. EC keys are pinned to the
    /// algorithm of their curve; RSA keys default to RS256.
    pub fn get_algorithm(&self) -> Option<Algorithm> {
        match &self.params {
            Params::RSA(_) => Some(Algorithm::RS256),
            Params::EC(ec_params) => {
                let curve = ec_params.curve.as_ref()?;
                match &curve[..] {
                    "P-256" => Some(Algorithm::ES256),
                    "P-384" => Some(Algorithm::ES384),
                    "P-521" => Some(Algorithm::ES512),
                    _ => None,
                }
            }
        }
    }

    /// Strip private key material
    pub fn to_public(&self) -> Self {
        let mut key = self.clone();
        key.params = key.params.to_public();
        key
    }

    /// Public view with the `kid` member set to the computed fingerprint,
    /// as embedded in JWS protected headers.
    pub fn to_public_with_key_id(&self) -> Result<Self, Error> {
        let mut key = self.to_public();
        key.key_id = Some(key.fingerprint()?);
        Ok(key)
    }

    pub fn is_private(&self) -> bool {
        match &self.params {
            Params::EC(params) => params.ecc_private_key.is_some(),
            Params::RSA(params) => params.private_exponent.is_some(),
        }
    }

    /// Compare JWK equality by public key parameters.
    pub fn equals_public(&self, other: &JWK) -> bool {
        match (&self.params, &other.params) {
            (
                Params::RSA(RSAParams {
                    modulus: Some(n1),
                    exponent: Some(e1),
                    ..
                }),
                Params::RSA(RSAParams {
                    modulus: Some(n2),
                    exponent: Some(e2),
                    ..
                }),
            ) => n1 == n2 && e1 == e2,
            (
                Params::EC(ECParams {
                    curve: Some(crv1),
                    x_coordinate: Some(x1),
                    y_coordinate: Some(y1),
                    ..
                }),
                Params::EC(ECParams {
                    curve: Some(crv2),
                    x_coordinate: Some(x2),
                    y_coordinate: Some(y2),
                    ..
                }),
            ) => crv1 == crv2 && x1 == x2 && y1 == y2,
            _ => false,
        }
    }

    /// Strict decode: parses the JWK JSON, validates the parameters against
    /// the declared curve or modulus, and checks a present `kid` against the
    /// computed fingerprint.
    pub fn from_slice(data: &[u8]) -> Result<JWK, Error> {
        let key: JWK =
            serde_json::from_slice(data).map_err(|e| Error::MalformedKey(e.to_string()))?;
        key.validate()?;
        if let Some(ref kid) = key.key_id {
            if *kid != key.fingerprint()? {
                return Err(Error::FingerprintMismatch(kid.clone()));
            }
        }
        Ok(key)
    }

    /// Check that the parameters form a valid key of the declared type.
    pub fn validate(&self) -> Result<(), Error> {
        match &self.params {
            Params::EC(params) => params.validate(),
            Params::RSA(params) => params.validate(),
        }
    }
}

impl FromStr for JWK {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(s.as_bytes())
    }
}

impl From<Params> for JWK {
    fn from(params: Params) -> Self {
        Self {
            params,
            key_id: None,
            hosts: None,
        }
    }
}

impl Params {
    /// Strip private key material
    pub fn to_public(&self) -> Self {
        match self {
            Self::EC(params) => Self::EC(params.to_public()),
            Self::RSA(params) => Self::RSA(params.to_public()),
        }
    }
}

/// Octet width of coordinates and scalars on the given curve. The scalar
/// width coincides with the coordinate width for the NIST curves because the
/// group order has the same bit length as the field.
pub fn ec_octet_width(curve: &str) -> Result<usize, Error> {
    match curve {
        "P-256" => Ok(32),
        "P-384" => Ok(48),
        "P-521" => Ok(66),
        other => Err(Error::CurveNotImplemented(other.to_string())),
    }
}

impl ECParams {
    /// Strip private key material
    pub fn to_public(&self) -> Self {
        Self {
            curve: self.curve.clone(),
            x_coordinate: self.x_coordinate.clone(),
            y_coordinate: self.y_coordinate.clone(),
            ecc_private_key: None,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let curve = self.curve.as_ref().ok_or(Error::MissingCurve)?;
        let width = ec_octet_width(curve)?;
        let x = self.x_coordinate.as_ref().ok_or(Error::MissingPoint)?;
        let y = self.y_coordinate.as_ref().ok_or(Error::MissingPoint)?;
        for coordinate in [x, y] {
            if coordinate.0.len() != width {
                return Err(Error::InvalidOctetLength {
                    expected: width,
                    found: coordinate.0.len(),
                });
            }
        }
        if let Some(ref d) = self.ecc_private_key {
            if d.0.len() != width {
                return Err(Error::InvalidOctetLength {
                    expected: width,
                    found: d.0.len(),
                });
            }
        }
        // Reject points that are not on the declared curve.
        match &curve[..] {
            "P-256" => {
                p256::PublicKey::try_from(self)?;
                if self.ecc_private_key.is_some() {
                    p256::SecretKey::try_from(self)?;
                }
            }
            "P-384" => {
                p384::PublicKey::try_from(self)?;
                if self.ecc_private_key.is_some() {
                    p384::SecretKey::try_from(self)?;
                }
            }
            "P-521" => {
                p521::PublicKey::try_from(self)?;
                if self.ecc_private_key.is_some() {
                    p521::SecretKey::try_from(self)?;
                }
            }
            other => return Err(Error::CurveNotImplemented(other.to_string())),
        }
        Ok(())
    }
}

impl RSAParams {
    /// Strip private key material
    pub fn to_public(&self) -> Self {
        Self {
            modulus: self.modulus.clone(),
            exponent: self.exponent.clone(),
            private_exponent: None,
            first_prime_factor: None,
            second_prime_factor: None,
            first_prime_factor_crt_exponent: None,
            second_prime_factor_crt_exponent: None,
            first_crt_coefficient: None,
            other_primes_info: None,
        }
    }

    /// Construct a RSA public key
    pub fn new_public(exponent: &[u8], modulus: &[u8]) -> Self {
        Self {
            modulus: Some(Base64urlUInt(modulus.to_vec())),
            exponent: Some(Base64urlUInt(exponent.to_vec())),
            private_exponent: None,
            first_prime_factor: None,
            second_prime_factor: None,
            first_prime_factor_crt_exponent: None,
            second_prime_factor_crt_exponent: None,
            first_crt_coefficient: None,
            other_primes_info: None,
        }
    }

    /// Validate key size is at least 2048 bits, per [RFC 7518 section 3.3](https://www.rfc-editor.org/rfc/rfc7518#section-3.3).
    pub fn validate_key_size(&self) -> Result<(), Error> {
        let n = &self.modulus.as_ref().ok_or(Error::MissingModulus)?.0;
        if n.len() < 256 {
            return Err(Error::InvalidKeyLength(n.len()));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.validate_key_size()?;
        self.exponent.as_ref().ok_or(Error::MissingExponent)?;
        rsa::RsaPublicKey::try_from(self).map_err(|_| Error::InvalidKey)?;
        if self.private_exponent.is_some() {
            let key = rsa::RsaPrivateKey::try_from(self).map_err(|_| Error::InvalidKey)?;
            key.validate().map_err(|_| Error::InvalidKey)?;
        }
        Ok(())
    }
}

impl From<&Base64urlUInt> for BigUint {
    fn from(uint: &Base64urlUInt) -> Self {
        Self::from_bytes_be(&uint.0)
    }
}

impl TryFrom<&RSAParams> for rsa::RsaPublicKey {
    type Error = Error;
    fn try_from(params: &RSAParams) -> Result<Self, Self::Error> {
        let n = params.modulus.as_ref().ok_or(Error::MissingModulus)?;
        let e = params.exponent.as_ref().ok_or(Error::MissingExponent)?;
        Ok(Self::new(n.into(), e.into())?)
    }
}

impl TryFrom<&RSAParams> for rsa::RsaPrivateKey {
    type Error = Error;
    #[allow(clippy::many_single_char_names)]
    fn try_from(params: &RSAParams) -> Result<Self, Self::Error> {
        let n = params.modulus.as_ref().ok_or(Error::MissingModulus)?;
        let e = params.exponent.as_ref().ok_or(Error::MissingExponent)?;
        let d = params
            .private_exponent
            .as_ref()
            .ok_or(Error::MissingExponent)?;
        let p = params
            .first_prime_factor
            .as_ref()
            .ok_or(Error::MissingPrime)?;
        let q = params
            .second_prime_factor
            .as_ref()
            .ok_or(Error::MissingPrime)?;
        let mut primes = vec![p.into(), q.into()];
        for prime in params.other_primes_info.iter().flatten() {
            primes.push((&prime.prime_factor).into());
        }
        Ok(Self::from_components(n.into(), e.into(), d.into(), primes)?)
    }
}

impl TryFrom<&rsa::RsaPrivateKey> for RSAParams {
    type Error = Error;
    fn try_from(key: &rsa::RsaPrivateKey) -> Result<Self, Self::Error> {
        let primes = key.primes();
        if primes.len() < 2 {
            return Err(Error::MissingPrime);
        }
        let d = key.d();
        let p = &primes[0];
        let q = &primes[1];
        let one = BigUint::from(1u8);
        // CRT precomputation: dp = d mod (p-1), dq = d mod (q-1),
        // qi = q^-1 mod p, and per extra prime r_i the exponent
        // d mod (r_i - 1) with coefficient (r_1*...*r_{i-1})^-1 mod r_i.
        let dp = d % (p - &one);
        let dq = d % (q - &one);
        let qi = q
            .mod_inverse(p)
            .and_then(|i| i.to_biguint())
            .ok_or(Error::InvalidKey)?;
        let mut other_primes_info = Vec::new();
        let mut product = p * q;
        for r in &primes[2..] {
            let factor_crt_exponent = d % (r - &one);
            let factor_crt_coefficient = (&product)
                .mod_inverse(r)
                .and_then(|i| i.to_biguint())
                .ok_or(Error::InvalidKey)?;
            other_primes_info.push(Prime {
                prime_factor: Base64urlUInt(r.to_bytes_be()),
                factor_crt_exponent: Base64urlUInt(factor_crt_exponent.to_bytes_be()),
                factor_crt_coefficient: Base64urlUInt(factor_crt_coefficient.to_bytes_be()),
            });
            product *= r;
        }
        Ok(Self {
            modulus: Some(Base64urlUInt(key.n().to_bytes_be())),
            exponent: Some(Base64urlUInt(key.e().to_bytes_be())),
            private_exponent: Some(Base64urlUInt(d.to_bytes_be())),
            first_prime_factor: Some(Base64urlUInt(p.to_bytes_be())),
            second_prime_factor: Some(Base64urlUInt(q.to_bytes_be())),
            first_prime_factor_crt_exponent: Some(Base64urlUInt(dp.to_bytes_be())),
            second_prime_factor_crt_exponent: Some(Base64urlUInt(dq.to_bytes_be())),
            first_crt_coefficient: Some(Base64urlUInt(qi.to_bytes_be())),
            other_primes_info: if other_primes_info.is_empty() {
                None
            } else {
                Some(other_primes_info)
            },
        })
    }
}

macro_rules! ec_param_conversions {
    ($curve_mod:ident, $curve_name:literal) => {
        impl TryFrom<&ECParams> for $curve_mod::SecretKey {
            type Error = Error;
            fn try_from(params: &ECParams) -> Result<Self, Self::Error> {
                let curve = params.curve.as_ref().ok_or(Error::MissingCurve)?;
                if curve != $curve_name {
                    return Err(Error::CurveNotImplemented(curve.to_string()));
                }
                let private_key = params
                    .ecc_private_key
                    .as_ref()
                    .ok_or(Error::MissingPrivateKey)?;
                let width = ec_octet_width($curve_name)?;
                if private_key.0.len() != width {
                    return Err(Error::InvalidOctetLength {
                        expected: width,
                        found: private_key.0.len(),
                    });
                }
                $curve_mod::SecretKey::from_bytes($curve_mod::FieldBytes::from_slice(
                    &private_key.0,
                ))
                .map_err(|_| Error::InvalidKey)
            }
        }

        impl TryFrom<&ECParams> for $curve_mod::PublicKey {
            type Error = Error;
            fn try_from(params: &ECParams) -> Result<Self, Self::Error> {
                let curve = params.curve.as_ref().ok_or(Error::MissingCurve)?;
                if curve != $curve_name {
                    return Err(Error::CurveNotImplemented(curve.to_string()));
                }
                const EC_UNCOMPRESSED_POINT_TAG: &[u8] = &[0x04];
                let x = &params.x_coordinate.as_ref().ok_or(Error::MissingPoint)?.0;
                let y = &params.y_coordinate.as_ref().ok_or(Error::MissingPoint)?.0;
                let pk_data = [EC_UNCOMPRESSED_POINT_TAG, x.as_slice(), y.as_slice()].concat();
                $curve_mod::PublicKey::from_sec1_bytes(&pk_data).map_err(|_| Error::InvalidKey)
            }
        }

        impl TryFrom<&$curve_mod::PublicKey> for ECParams {
            type Error = Error;
            fn try_from(pk: &$curve_mod::PublicKey) -> Result<Self, Self::Error> {
                use $curve_mod::elliptic_curve::sec1::ToEncodedPoint;
                let encoded_point = pk.to_encoded_point(false);
                let x = encoded_point.x().ok_or(Error::MissingPoint)?;
                let y = encoded_point.y().ok_or(Error::MissingPoint)?;
                Ok(ECParams {
                    curve: Some($curve_name.to_string()),
                    x_coordinate: Some(Base64urlUInt(x.to_vec())),
                    y_coordinate: Some(Base64urlUInt(y.to_vec())),
                    ecc_private_key: None,
                })
            }
        }

        impl TryFrom<&$curve_mod::SecretKey> for ECParams {
            type Error = Error;
            fn try_from(k: &$curve_mod::SecretKey) -> Result<Self, Self::Error> {
                let pk = k.public_key();
                let mut params = ECParams::try_from(&pk)?;
                params.ecc_private_key = Some(Base64urlUInt(k.to_bytes().to_vec()));
                Ok(params)
            }
        }
    };
}

ec_param_conversions!(p256, "P-256");
ec_param_conversions!(p384, "P-384");
ec_param_conversions!(p521, "P-521");

impl TryFrom<String> for Base64urlUInt {
    type Error = base64::DecodeError;
    fn try_from(data: String) -> Result<Self, Self::Error> {
        Ok(Base64urlUInt(base64::decode_config(
            data,
            base64::URL_SAFE,
        )?))
    }
}

impl From<&Base64urlUInt> for String {
    fn from(data: &Base64urlUInt) -> String {
        base64::encode_config(&data.0, base64::URL_SAFE_NO_PAD)
    }
}

impl From<Base64urlUInt> for Base64urlUIntString {
    fn from(data: Base64urlUInt) -> Base64urlUIntString {
        String::from(&data)
    }
}
