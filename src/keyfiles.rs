//! Document formats for exchanging trusted keys.
//!
//! These are the interface contracts consumed by the file-storage and TLS
//! bootstrap collaborators; only (de)serialisation lives in the core.

use serde::{Deserialize, Serialize};

use peertrust_jwk::JWK;

/// Entry of the trusted-host-keys document: pins a peer address to its
/// public key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TrustedHostKey {
    /// `host:port` of the peer.
    pub address: String,
    #[serde(rename = "publicKey")]
    pub public_key: JWK,
}

/// `{"trustedHostKeys": [...]}` document consumed when dialing peers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct HostKeysFile {
    #[serde(rename = "trustedHostKeys")]
    pub trusted_host_keys: Vec<TrustedHostKey>,
}

/// Entry of the trusted-clients document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TrustedClientKey {
    pub comment: String,
    #[serde(rename = "publicKey")]
    pub public_key: JWK,
}

/// `{"trustedClientKeys": [...]}` document consumed by servers accepting
/// mutual-TLS clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct TrustedClientsFile {
    #[serde(rename = "trustedClientKeys")]
    pub trusted_client_keys: Vec<TrustedClientKey>,
}

/// Generic JWK set document (`{"keys": [...]}`).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct JWKSet {
    pub keys: Vec<JWK>,
}

impl JWKSet {
    pub fn add_key(&mut self, key: JWK) {
        self.keys.push(key);
    }
}

macro_rules! document_codec {
    ($type:ty) => {
        impl $type {
            /// Parse the document from its JSON form.
            pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
                serde_json::from_slice(data)
            }

            /// Render the document as four-space-indented JSON.
            pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
                let mut buf = Vec::new();
                let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
                let mut serializer =
                    serde_json::Serializer::with_formatter(&mut buf, formatter);
                self.serialize(&mut serializer)?;
                Ok(buf)
            }
        }
    };
}

document_codec!(HostKeysFile);
document_codec!(TrustedClientsFile);
document_codec!(JWKSet);
