//! End-to-end flows across the identity, signature, certificate, and graph
//! layers.

use std::sync::Arc;

use peertrust::cert::{certificate_der, generate_ca_cert, generate_self_signed_client_cert};
use peertrust::graph::Clock;
use peertrust::{Grant, TrustGraph, JWK};

/// Keys issue grants, grants travel as JWS, and the verifier resolves
/// authorization over the reloaded set.
#[test]
fn grant_transport_and_resolution() {
    let owner = JWK::generate_p256().unwrap();
    let deployer = JWK::generate_p256().unwrap();
    let worker = JWK::generate_p256().unwrap();

    let mut delegation = Grant::new(
        "/app",
        &deployer.fingerprint().unwrap(),
        vec!["deploy".to_string()],
    );
    delegation.delegated = true;
    delegation.sign(&owner).unwrap();

    let mut leaf = Grant::new(
        "/app/service",
        &worker.fingerprint().unwrap(),
        vec!["deploy".to_string()],
    );
    leaf.sign(&deployer).unwrap();

    // Transport both grants as their JWS forms and reload on the verifier.
    let mut loaded = Vec::new();
    for wire in [
        delegation.jws().unwrap().to_string(),
        leaf.jws().unwrap().to_string(),
    ] {
        let grant = Grant::load(wire.as_bytes()).unwrap();
        let signers = grant.verify().unwrap();
        assert_eq!(signers.len(), 1);
        loaded.push(grant);
    }
    assert!(loaded[0].delegated);

    let graph = TrustGraph::new(loaded);
    assert!(graph.verify(&worker, "/app/service/pod", "deploy").unwrap());
    assert!(!graph.verify(&worker, "/app/other", "deploy").unwrap());
    assert!(graph.verify(&deployer, "/app/service", "deploy").unwrap());
    assert!(!graph.verify(&owner, "/app", "deploy").unwrap());

    let chains = graph
        .get_grants(&worker, "/app/service/pod", "deploy")
        .unwrap();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].len(), 1);
    assert_eq!(chains[0][0].subject, "/app/service");
}

/// A grant signed with an attached certificate chain verifies, and the
/// chain's leaf certificate wraps the signer's key.
#[test]
fn grant_with_certificate_chain() {
    let peer = JWK::generate_p256().unwrap();
    let verifier = JWK::generate_p256().unwrap();

    // The verifier vouches for the peer's key; the peer self-signs a
    // client certificate with that same key.
    let leaf = generate_self_signed_client_cert(&peer).unwrap();
    let ca = generate_ca_cert(&verifier, &peer).unwrap();
    let chain = vec![
        certificate_der(&leaf).unwrap(),
        certificate_der(&ca).unwrap(),
    ];

    let mut grant = Grant::new(
        "/registry",
        &peer.fingerprint().unwrap(),
        vec!["push".to_string()],
    );
    grant.sign_with_chain(&peer, &chain).unwrap();

    let loaded = Grant::load(grant.jws().unwrap().as_bytes()).unwrap();
    let signers = loaded.verify().unwrap();
    assert_eq!(signers.len(), 1);
    assert!(signers[0].equals_public(&peer));
}

/// A broken certificate chain is rejected even when the signature itself
/// is fine.
#[test]
fn broken_certificate_chain_rejected() {
    let peer = JWK::generate_p256().unwrap();
    let verifier = JWK::generate_p256().unwrap();
    let unrelated = JWK::generate_p256().unwrap();

    let leaf = generate_self_signed_client_cert(&peer).unwrap();
    // The CA certificate vouches for an unrelated key, so the leaf is not
    // signed by the chain's next subject.
    let ca = generate_ca_cert(&verifier, &unrelated).unwrap();
    let chain = vec![
        certificate_der(&leaf).unwrap(),
        certificate_der(&ca).unwrap(),
    ];

    let mut grant = Grant::new(
        "/registry",
        &peer.fingerprint().unwrap(),
        vec!["push".to_string()],
    );
    grant.sign_with_chain(&peer, &chain).unwrap();
    let loaded = Grant::load(grant.jws().unwrap().as_bytes()).unwrap();
    assert!(loaded.verify().is_err());
}

/// Revocations travel like any other grant and suppress what they match.
#[test]
fn revocation_round_trip() {
    let owner = JWK::generate_p256().unwrap();
    let subject_key = JWK::generate_p256().unwrap();
    let fingerprint = subject_key.fingerprint().unwrap();

    let mut grant = Grant::new("/project", &fingerprint, vec!["read".to_string()]);
    grant.sign(&owner).unwrap();

    let mut revocation = Grant::new("/project", &fingerprint, vec!["read".to_string()]);
    revocation.revoked = true;
    revocation.issued_at = grant.issued_at + chrono_seconds(1);
    revocation.sign(&owner).unwrap();

    let loaded_grant = Grant::load(grant.jws().unwrap().as_bytes()).unwrap();
    let loaded_revocation = Grant::load(revocation.jws().unwrap().as_bytes()).unwrap();

    let graph = TrustGraph::new(vec![loaded_grant.clone()]);
    assert!(graph.verify(&subject_key, "/project", "read").unwrap());

    let graph = TrustGraph::new(vec![loaded_grant, loaded_revocation]);
    assert!(!graph.verify(&subject_key, "/project", "read").unwrap());
}

/// The graph accepts an injected clock, so verifiers can pin time.
#[test]
fn injected_clock_governs_expiry() {
    struct FixedClock(chrono::DateTime<chrono::Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            self.0
        }
    }

    let key = JWK::generate_p256().unwrap();
    let mut grant = Grant::new(
        "/project",
        &key.fingerprint().unwrap(),
        vec!["read".to_string()],
    );
    let expiry = grant.expiration;

    let before = Arc::new(FixedClock(expiry + chrono_seconds(10)));
    let graph = TrustGraph::with_clock(vec![grant.clone()], before);
    assert!(graph.verify(&key, "/project", "read").unwrap());

    let after = Arc::new(FixedClock(expiry + chrono_seconds(30)));
    let graph = TrustGraph::with_clock(vec![grant], after);
    assert!(!graph.verify(&key, "/project", "read").unwrap());
}

fn chrono_seconds(seconds: i64) -> chrono::Duration {
    chrono::Duration::seconds(seconds)
}
