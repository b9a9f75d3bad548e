use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use peertrust_jwk::JWK;

use crate::error::Error;
use crate::graph::EXPIRATION_GRACE_SECS;

/// Grant represents a transfer of permission from one part of the trust
/// graph to another. This is the only way to delegate permission between
/// two different sub trees in the graph.
///
/// The serialised field order is fixed; the signing form is the four-space
/// indented JSON rendering of these fields.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Namespace being granted.
    #[serde(rename = "Subject")]
    pub subject: String,

    /// Allowed action tokens.
    #[serde(rename = "Scopes")]
    pub scopes: Vec<String>,

    /// Whether the grantee may further grant the scopes over the subject.
    #[serde(rename = "Delegated")]
    pub delegated: bool,

    /// Whether the scopes and delegation are revoked, taking precedence
    /// over matching grants issued earlier.
    #[serde(rename = "Revoked")]
    pub revoked: bool,

    /// The node being granted a permission scope: either a namespace path
    /// (always starting with '/') or a key fingerprint.
    #[serde(rename = "Grantee")]
    pub grantee: String,

    /// Latest time at which the grant is considered valid, modulo the
    /// resolver's grace window.
    #[serde(rename = "Expiration")]
    pub expiration: DateTime<Utc>,

    /// Used to resolve conflicts between otherwise identical grants.
    #[serde(rename = "IssuedAt")]
    pub issued_at: DateTime<Utc>,

    /// Attached compact JWS, retained for verification.
    #[serde(skip)]
    signature: Option<String>,
}

impl Grant {
    /// New unsigned grant, issued now and valid for a year.
    pub fn new(
        subject: impl Into<String>,
        grantee: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        let issued_at = Utc::now();
        Grant {
            subject: subject.into(),
            scopes,
            delegated: false,
            revoked: false,
            grantee: grantee.into(),
            expiration: issued_at + Duration::days(365),
            issued_at,
            signature: None,
        }
    }

    /// Canonical signing form: four-space-indented JSON in declared field
    /// order.
    pub fn canonical_json(&self) -> Result<String, Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Sign the grant, attaching a JWS over its canonical form.
    pub fn sign(&mut self, key: &JWK) -> Result<(), Error> {
        let algorithm = key
            .get_algorithm()
            .ok_or(peertrust_jws::Error::UnknownAlgorithm)?;
        let payload = self.canonical_json()?;
        self.signature = Some(peertrust_jws::encode_sign(algorithm, &payload, key)?);
        Ok(())
    }

    /// Sign the grant, carrying an `x5c` certificate chain in the JWS
    /// header (DER certificates, leaf first).
    pub fn sign_with_chain(&mut self, key: &JWK, chain: &[Vec<u8>]) -> Result<(), Error> {
        let algorithm = key
            .get_algorithm()
            .ok_or(peertrust_jws::Error::UnknownAlgorithm)?;
        let payload = self.canonical_json()?;
        self.signature = Some(peertrust_jws::encode_sign_with_chain(
            algorithm, &payload, key, chain,
        )?);
        Ok(())
    }

    /// The attached compact JWS.
    pub fn jws(&self) -> Result<&str, Error> {
        self.signature.as_deref().ok_or(Error::MissingSignature)
    }

    /// Verify the attached signature, returning every key that signed it
    /// (outermost first for counter-signed grants).
    pub fn verify(&self) -> Result<Vec<JWK>, Error> {
        let jws = self.jws()?;
        let verification = peertrust_jws::verify_compact(jws, None)?;
        Ok(verification.signer_keys)
    }

    /// Parse a grant from its signed JWS form, retaining the signature for
    /// later [`Grant::verify`]. Legacy string-coded delegation scopes are
    /// normalised to the boolean form; mixed encodings are rejected.
    pub fn load(data: &[u8]) -> Result<Grant, Error> {
        let jws = std::str::from_utf8(data).map_err(|_| Error::MalformedGrant)?;
        let (_header, payload) = peertrust_jws::decode_unverified(jws)?;
        let mut grant: Grant =
            serde_json::from_slice(&payload).map_err(|_| Error::MalformedGrant)?;
        if grant.issued_at >= grant.expiration {
            return Err(Error::MalformedGrant);
        }
        grant.normalize_scopes()?;
        grant.signature = Some(jws.to_string());
        Ok(grant)
    }

    /// Translate the legacy scope encoding (`"delegate"`, `"delegate_<x>"`)
    /// into the boolean `Delegated` form. A grant carrying both encodings,
    /// or mixing delegation tokens with plain action tokens, is rejected.
    fn normalize_scopes(&mut self) -> Result<(), Error> {
        let has_legacy = self
            .scopes
            .iter()
            .any(|scope| scope == "delegate" || scope.starts_with("delegate_"));
        if !has_legacy {
            return Ok(());
        }
        if self.delegated {
            return Err(Error::MalformedGrant);
        }
        let mut scopes = Vec::with_capacity(self.scopes.len());
        for scope in &self.scopes {
            if scope == "delegate" {
                scopes.push("any".to_string());
            } else if let Some(action) = scope.strip_prefix("delegate_") {
                scopes.push(action.to_string());
            } else {
                return Err(Error::MalformedGrant);
            }
        }
        self.scopes = scopes;
        self.delegated = true;
        Ok(())
    }

    /// Validity of this grant at the given instant.
    pub fn status(&self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.revoked {
            return Err(Error::Revoked);
        }
        if now > self.expiration + Duration::seconds(EXPIRATION_GRACE_SECS) {
            return Err(Error::Expired);
        }
        Ok(())
    }
}
