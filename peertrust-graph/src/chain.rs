use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use peertrust_jwk::JWK;

use crate::error::Error;
use crate::grant::Grant;
use crate::graph::{is_sub_name, EXPIRATION_GRACE_SECS};

/// A set of root authorities and key revocations used to validate grant
/// chains retrieved from the graph.
///
/// [`crate::TrustGraph::get_grants`] proves that a chain exists; this type
/// checks that the chain actually bottoms out at a key that is authoritative
/// for the namespace it hands down. A valid chain is ordered from the
/// querying key outward, each link's grantee contained in the previous
/// link's subject, and its final subject must fall under a namespace
/// controlled by one of the keys that signed the final grant.
#[derive(Debug, Default, Clone)]
pub struct ChainAuthority {
    /// Fingerprint of each root key, mapped to the namespace it controls.
    authorities: BTreeMap<String, String>,
    /// Fingerprints whose keys are no longer trusted anywhere.
    revocation_list: BTreeSet<String>,
}

impl ChainAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `fingerprint` authoritative for `namespace`.
    pub fn add_authority(
        &mut self,
        fingerprint: impl Into<String>,
        namespace: impl Into<String>,
    ) {
        self.authorities
            .insert(fingerprint.into(), namespace.into());
    }

    /// Distrust a key entirely: chains granting to it stop validating.
    pub fn revoke_key(&mut self, fingerprint: impl Into<String>) {
        self.revocation_list.insert(fingerprint.into());
    }

    /// Validate a grant chain at the given instant. `root_signers` are the
    /// keys that signed the final grant of the chain (from
    /// [`Grant::verify`]).
    pub fn verify_chain(
        &self,
        chain: &[Arc<Grant>],
        root_signers: &[JWK],
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let root = chain.last().ok_or(Error::InvalidChain)?;
        let grace = Duration::seconds(EXPIRATION_GRACE_SECS);
        for (i, link) in chain.iter().enumerate() {
            if let Some(next) = chain.get(i + 1) {
                if !is_sub_name(&next.grantee, &link.subject) {
                    return Err(Error::InvalidChain);
                }
            }
            if link.revoked || now > link.expiration + grace {
                return Err(Error::InvalidChain);
            }
            if self.revocation_list.contains(&link.grantee) {
                return Err(Error::LinkRevoked);
            }
        }
        for signer in root_signers {
            let fingerprint = signer.fingerprint()?;
            if let Some(namespace) = self.authorities.get(&fingerprint) {
                if is_sub_name(&root.subject, namespace) {
                    return Ok(());
                }
            }
        }
        Err(Error::RootUnverified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrustGraph;

    fn signed(grant: &mut Grant, key: &JWK) -> Arc<Grant> {
        grant.sign(key).unwrap();
        Arc::new(grant.clone())
    }

    #[test]
    fn chain_from_graph_validates_against_authority() {
        let now = Utc::now();
        let authority_key = JWK::generate_p256().unwrap();
        let deployer = JWK::generate_p256().unwrap();
        let worker = JWK::generate_p256().unwrap();

        let mut delegation = Grant::new(
            "/app",
            &deployer.fingerprint().unwrap(),
            vec!["deploy".to_string()],
        );
        delegation.delegated = true;
        let delegation = signed(&mut delegation, &authority_key);

        let mut leaf = Grant::new(
            "/app/service",
            &worker.fingerprint().unwrap(),
            vec!["deploy".to_string()],
        );
        let leaf = signed(&mut leaf, &deployer);

        let graph = TrustGraph::new(vec![(*delegation).clone(), (*leaf).clone()]);
        let chains = graph
            .get_grants(&worker, "/app/service/pod", "deploy")
            .unwrap();
        assert_eq!(chains.len(), 1);
        let chain = &chains[0];

        let mut authority = ChainAuthority::new();
        authority.add_authority(authority_key.fingerprint().unwrap(), "/app");

        // The final grant was issued under the deployer's delegated key.
        let root_signers = chain.last().unwrap().verify().unwrap();
        assert!(root_signers[0].equals_public(&deployer));

        // The deployer is not a configured authority, so the chain only
        // validates once its key is recognised for the namespace.
        match authority.verify_chain(chain, &root_signers, now) {
            Err(Error::RootUnverified) => {}
            other => panic!("expected unverified root, got {other:?}"),
        }
        authority.add_authority(deployer.fingerprint().unwrap(), "/app");
        authority.verify_chain(chain, &root_signers, now).unwrap();
    }

    #[test]
    fn broken_linkage_rejected() {
        let now = Utc::now();
        let key = JWK::generate_p256().unwrap();
        let mut first = Grant::new("/a", "/x", vec!["read".to_string()]);
        let mut second = Grant::new("/b", "/unrelated", vec!["read".to_string()]);
        let chain = vec![signed(&mut first, &key), signed(&mut second, &key)];
        let authority = ChainAuthority::new();
        match authority.verify_chain(&chain, &[key.to_public()], now) {
            Err(Error::InvalidChain) => {}
            other => panic!("expected invalid chain, got {other:?}"),
        }
    }

    #[test]
    fn revoked_grantee_rejected() {
        let now = Utc::now();
        let key = JWK::generate_p256().unwrap();
        let grantee = JWK::generate_p256().unwrap();
        let fingerprint = grantee.fingerprint().unwrap();
        let mut grant = Grant::new("/a", &fingerprint, vec!["read".to_string()]);
        let chain = vec![signed(&mut grant, &key)];

        let mut authority = ChainAuthority::new();
        authority.add_authority(key.fingerprint().unwrap(), "/a");
        authority
            .verify_chain(&chain, &[key.to_public()], now)
            .unwrap();

        authority.revoke_key(fingerprint);
        match authority.verify_chain(&chain, &[key.to_public()], now) {
            Err(Error::LinkRevoked) => {}
            other => panic!("expected revoked link, got {other:?}"),
        }
    }

    #[test]
    fn expired_link_rejected() {
        let now = Utc::now();
        let key = JWK::generate_p256().unwrap();
        let mut grant = Grant::new("/a", "/x", vec!["read".to_string()]);
        grant.expiration = now - Duration::seconds(30);
        let chain = vec![signed(&mut grant, &key)];
        let mut authority = ChainAuthority::new();
        authority.add_authority(key.fingerprint().unwrap(), "/a");
        match authority.verify_chain(&chain, &[key.to_public()], now) {
            Err(Error::InvalidChain) => {}
            other => panic!("expected invalid chain, got {other:?}"),
        }
    }

    #[test]
    fn empty_chain_rejected() {
        let authority = ChainAuthority::new();
        match authority.verify_chain(&[], &[], Utc::now()) {
            Err(Error::InvalidChain) => {}
            other => panic!("expected invalid chain, got {other:?}"),
        }
    }
}
