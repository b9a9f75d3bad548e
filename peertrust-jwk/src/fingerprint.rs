//! Deterministic key fingerprints.
//!
//! A fingerprint is the SHA-256 of the public parameters truncated to 240
//! bits and rendered as twelve colon-separated base32 quartets, e.g.
//! `ABCD:EFGH:IJKL:MNOP:QRST:UVWX:YZ23:4567:ABCD:EFGH:IJKL:MNOP`. It is a
//! pure function of the public key and survives JWK round-trips.

use data_encoding::BASE32;
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::{Params, JWK};

/// Number of digest octets kept: 240 bits, which is a whole number of
/// base32 characters, so the rendering never needs padding.
const FINGERPRINT_OCTETS: usize = 30;

impl JWK {
    /// Compute the fingerprint of the public key.
    ///
    /// For EC keys the digest input is `"EC" || crv || X || Y`; for RSA keys
    /// it is `"RSA" || N || E` with E in its minimal big-endian form. The
    /// integer inputs are minimal big-endian octet strings (no zero
    /// padding), independent of the fixed-width JWK coordinate encoding.
    pub fn fingerprint(&self) -> Result<String, Error> {
        let mut hasher = Sha256::new();
        match &self.params {
            Params::EC(params) => {
                let curve = params.curve.as_ref().ok_or(Error::MissingCurve)?;
                let x = params.x_coordinate.as_ref().ok_or(Error::MissingPoint)?;
                let y = params.y_coordinate.as_ref().ok_or(Error::MissingPoint)?;
                hasher.update(b"EC");
                hasher.update(curve.as_bytes());
                hasher.update(trim_leading_zeros(&x.0));
                hasher.update(trim_leading_zeros(&y.0));
            }
            Params::RSA(params) => {
                let n = params.modulus.as_ref().ok_or(Error::MissingModulus)?;
                let e = params.exponent.as_ref().ok_or(Error::MissingExponent)?;
                hasher.update(b"RSA");
                hasher.update(trim_leading_zeros(&n.0));
                hasher.update(trim_leading_zeros(&e.0));
            }
        }
        let digest = hasher.finalize();
        Ok(key_id_encode(&digest[..FINGERPRINT_OCTETS]))
    }
}

/// Minimal big-endian form of an unsigned integer: all leading zero octets
/// stripped, the empty string for zero.
pub(crate) fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b != 0) {
        Some(i) => &bytes[i..],
        None => &[],
    }
}

fn key_id_encode(digest: &[u8]) -> String {
    let encoded = BASE32.encode(digest);
    let encoded = encoded.trim_end_matches('=');
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 4);
    for (i, c) in encoded.chars().enumerate() {
        if i != 0 && i % 4 == 0 {
            out.push(':');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn p256_fingerprint_vector() {
        // RFC 7515 appendix A.3 key; expected value is
        // SHA-256("EC" || "P-256" || X || Y)[..30] in base32 quartets.
        let key = JWK::from_str(
            r#"{
                "kty": "EC",
                "crv": "P-256",
                "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
                "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"
            }"#,
        )
        .unwrap();
        assert_eq!(
            key.fingerprint().unwrap(),
            "RZFR:G44Q:67FO:6RQO:VBEF:XGZD:LVCO:SEVQ:S5NY:3FJN:JXYU:7NG3"
        );
    }

    #[test]
    fn rsa_fingerprint_vector() {
        // RFC 7515 appendix A.2 modulus with e = 65537.
        let key = JWK::from_str(
            r#"{
                "kty": "RSA",
                "n": "ofgWCuLjybRlzo0tZWJjNiuSfb4p4fAkd_wWJcyQoTbji9k0l8W26mPddxHmfHQp-Vaw-4qPCJrcS2mJPMEzP1Pt0Bm4d4QlL-yRT-SFd2lZS-pCgNMsD1W_YpRPEwOWvG6b32690r2jZ47soMZo9wGzjb_7OMg0LOL-bSf63kpaSHSXndS5z5rexMdbBYUsLA9e-KXBdQOS-UTo7WTBEMa2R2CapHg665xsmtdVMTBQY4uDZlxvb3qCo5ZwKh9kG4LT6_I5IhlJH7aGhyxXFvUK-DWNmoudF8NAco9_h9iaGNj8q2ethFkMLs91kzk2PAcDTW9gb54h4FRWyuXpoQ",
                "e": "AQAB"
            }"#,
        )
        .unwrap();
        assert_eq!(
            key.fingerprint().unwrap(),
            "RYEH:72T4:SJUF:66U2:GCMW:I2B2:HVGU:IVC7:JHLB:3PAM:KWTS:WLZ5"
        );
    }

    #[test]
    fn fingerprint_shape() {
        let key = JWK::generate_p256().unwrap();
        let fingerprint = key.fingerprint().unwrap();
        let groups: Vec<&str> = fingerprint.split(':').collect();
        assert_eq!(groups.len(), 12);
        for group in groups {
            assert_eq!(group.len(), 4);
        }
        // Stable across encode/decode round-trips.
        let json = serde_json::to_string(&key.to_public()).unwrap();
        let decoded = JWK::from_slice(json.as_bytes()).unwrap();
        assert_eq!(decoded.fingerprint().unwrap(), fingerprint);
    }
}
