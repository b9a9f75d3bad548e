use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use peertrust_jwk::JWK;

use crate::error::Error;
use crate::grant::Grant;

/// Seconds a grant keeps being honored after its nominal expiration.
pub const EXPIRATION_GRACE_SECS: i64 = 15;

/// Wall-clock source, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Host wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permission {
    NotPermitted,
    Delegated,
    Permitted,
}

#[derive(Default)]
struct GrantNode {
    grants: Vec<usize>,
    children: BTreeMap<String, GrantNode>,
}

/// In-memory trust graph built from a static list of grants. The graph is
/// immutable after creation; any alteration should build a new instance and
/// swap the reference.
///
/// Grants are held once in an arena and referenced by index from every node
/// along their grantee path, so a grant is never copied and cyclic
/// delegation terminates through the per-query visited set.
pub struct TrustGraph {
    arena: Vec<Arc<Grant>>,
    roots: BTreeMap<String, GrantNode>,
    clock: Arc<dyn Clock>,
    grace: Duration,
}

/// `name` is contained in `sub`: equal to it, or a strict descendant path.
/// A bare string prefix is not containment (`/userabc` is not under
/// `/user`).
pub fn is_sub_name(name: &str, sub: &str) -> bool {
    match name.strip_prefix(sub) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn scope_permission(scope: &str, grant: &Grant) -> Permission {
    let in_scope = grant
        .scopes
        .iter()
        .any(|granted| granted == scope || granted == "any");
    if !in_scope {
        Permission::NotPermitted
    } else if grant.delegated {
        Permission::Delegated
    } else {
        Permission::Permitted
    }
}

fn scope_set(scopes: &[String]) -> BTreeSet<&str> {
    scopes.iter().map(String::as_str).collect()
}

impl TrustGraph {
    /// Build a graph from a list of grants using the host clock.
    pub fn new(grants: Vec<Grant>) -> Self {
        Self::with_clock(grants, Arc::new(SystemClock))
    }

    pub fn with_clock(grants: Vec<Grant>, clock: Arc<dyn Clock>) -> Self {
        let mut arena: Vec<Arc<Grant>> = grants.into_iter().map(Arc::new).collect();

        // Revocation pass: a revoked grant replaces every non-revoked grant
        // with the same (grantee, subject, scope set) issued earlier.
        // Replacing the arena slot updates every node that references it.
        let revocations: Vec<Arc<Grant>> =
            arena.iter().filter(|grant| grant.revoked).cloned().collect();
        for revocation in &revocations {
            for slot in arena.iter_mut() {
                if !slot.revoked
                    && slot.grantee == revocation.grantee
                    && slot.subject == revocation.subject
                    && scope_set(&slot.scopes) == scope_set(&revocation.scopes)
                    && slot.issued_at < revocation.issued_at
                {
                    *slot = revocation.clone();
                }
            }
        }

        // Index each grant at every non-root segment of its grantee path.
        let mut roots: BTreeMap<String, GrantNode> = BTreeMap::new();
        for (index, grant) in arena.iter().enumerate() {
            let mut nodes = &mut roots;
            for part in grant.grantee.split('/') {
                let node = nodes.entry(part.to_string()).or_default();
                if !part.is_empty() {
                    node.grants.push(index);
                }
                nodes = &mut node.children;
            }
        }

        TrustGraph {
            arena,
            roots,
            clock,
            grace: Duration::seconds(EXPIRATION_GRACE_SECS),
        }
    }

    fn grants_at(&self, name: &str) -> &[usize] {
        let mut nodes = &self.roots;
        let mut node = None;
        for part in name.split('/') {
            match nodes.get(part) {
                Some(found) => {
                    nodes = &found.children;
                    node = Some(found);
                }
                None => return &[],
            }
        }
        node.map(|n| n.grants.as_slice()).unwrap_or(&[])
    }

    /// Depth-first walk from `start`. Valid grants whose subject contains
    /// `target` are reported through `found`; delegated grants that do not
    /// yet reach the target queue their subject for recursion. The shared
    /// visited set makes cyclic grant references terminate.
    fn walk<F>(
        &self,
        start: &str,
        target: &str,
        scope: &str,
        chain: &[usize],
        visited: &mut HashSet<usize>,
        collect: bool,
        found: &mut F,
    ) -> bool
    where
        F: FnMut(usize, &[usize]) -> bool,
    {
        let now = self.clock.now();
        let mut sub_grants = Vec::new();
        for &index in self.grants_at(start) {
            if !visited.insert(index) {
                continue;
            }
            let grant = &self.arena[index];
            if grant.revoked || self.is_expired(grant, now) {
                continue;
            }
            match scope_permission(scope, grant) {
                Permission::Permitted => {
                    if is_sub_name(target, &grant.subject) && found(index, chain) {
                        return true;
                    }
                }
                Permission::Delegated => {
                    if is_sub_name(target, &grant.subject) {
                        if found(index, chain) {
                            return true;
                        }
                    } else {
                        sub_grants.push(index);
                    }
                }
                Permission::NotPermitted => {}
            }
        }
        for index in sub_grants {
            let link: Vec<usize> = if collect {
                let mut extended = chain.to_vec();
                extended.push(index);
                extended
            } else {
                Vec::new()
            };
            let subject = self.arena[index].subject.clone();
            if self.walk(&subject, target, scope, &link, visited, collect, found) {
                return true;
            }
        }
        false
    }

    fn is_expired(&self, grant: &Grant, now: DateTime<Utc>) -> bool {
        now > grant.expiration + self.grace
    }

    /// May `key` perform `scope` on `target`? The only error channel is
    /// malformed query input; an unauthorized query is simply `false`.
    pub fn verify(&self, key: &JWK, target: &str, scope: &str) -> Result<bool, Error> {
        let start = key.fingerprint()?;
        let mut visited = HashSet::new();
        let mut found = |_: usize, _: &[usize]| true;
        Ok(self.walk(&start, target, scope, &[], &mut visited, false, &mut found))
    }

    /// Like [`TrustGraph::verify`], surfacing the negative outcome as an
    /// error for callers that want an explanatory variant.
    pub fn check(&self, key: &JWK, target: &str, scope: &str) -> Result<(), Error> {
        if self.verify(key, target, scope)? {
            Ok(())
        } else {
            Err(Error::NotAuthorized)
        }
    }

    /// Every grant chain that authorizes `scope` on `target` for `key`, in
    /// DFS discovery order. Each chain ends with the grant whose subject
    /// contains the target.
    pub fn get_grants(
        &self,
        key: &JWK,
        target: &str,
        scope: &str,
    ) -> Result<Vec<Vec<Arc<Grant>>>, Error> {
        let start = key.fingerprint()?;
        let mut chains: Vec<Vec<usize>> = Vec::new();
        let mut visited = HashSet::new();
        let mut collect = |index: usize, chain: &[usize]| {
            let mut full = chain.to_vec();
            full.push(index);
            chains.push(full);
            false
        };
        self.walk(&start, target, scope, &[], &mut visited, true, &mut collect);
        Ok(chains
            .into_iter()
            .map(|chain| {
                chain
                    .into_iter()
                    .map(|index| self.arena[index].clone())
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn delegate_any(subject: &str, grantee: &str) -> Grant {
        let mut grant = Grant::new(subject, grantee, vec!["any".to_string()]);
        grant.delegated = true;
        grant
    }

    fn create_test_keys_and_grants(count: usize) -> (Vec<Grant>, Vec<JWK>) {
        let mut grants = Vec::with_capacity(count);
        let mut keys = Vec::with_capacity(count);
        for i in 0..count {
            let key = JWK::generate_p256().unwrap();
            grants.push(delegate_any(
                &format!("/user-{}", i + 1),
                &key.fingerprint().unwrap(),
            ));
            keys.push(key);
        }
        (grants, keys)
    }

    fn assert_verified(graph: &TrustGraph, key: &JWK, target: &str, scope: &str) {
        assert!(
            graph.verify(key, target, scope).unwrap(),
            "key failed verification for {target}"
        );
    }

    fn assert_not_verified(graph: &TrustGraph, key: &JWK, target: &str, scope: &str) {
        assert!(
            !graph.verify(key, target, scope).unwrap(),
            "key should have failed verification for {target}"
        );
    }

    #[test]
    fn verify_walks_delegation() {
        let (mut grants, keys) = create_test_keys_and_grants(4);
        grants.push(delegate_any("/user-3", "/user-2"));
        grants.push(delegate_any("/user-3/sub-project", "/user-4"));
        grants.push(Grant::new(
            "/user-4",
            "/user-1",
            vec!["read".to_string(), "write".to_string()],
        ));

        let graph = TrustGraph::new(grants);

        assert_verified(&graph, &keys[0], "/user-1", "test");
        assert_verified(&graph, &keys[0], "/user-1/some-project/sub-value", "test");
        assert_verified(&graph, &keys[0], "/user-4", "write");
        assert_verified(&graph, &keys[1], "/user-2/", "test");
        assert_verified(&graph, &keys[2], "/user-3/sub-value", "test");
        assert_verified(&graph, &keys[1], "/user-3/sub-value", "test");
        assert_verified(&graph, &keys[1], "/user-3", "test");
        assert_verified(&graph, &keys[3], "/user-3/sub-project", "test");
        assert_verified(&graph, &keys[3], "/user-3/sub-project/app", "test");
        assert_verified(&graph, &keys[3], "/user-4", "test");

        assert_not_verified(&graph, &keys[0], "/user-2", "test");
        assert_not_verified(&graph, &keys[0], "/user-3/sub-value", "test");
        assert_not_verified(&graph, &keys[0], "/user-4", "test");
        assert_not_verified(&graph, &keys[1], "/user-1/", "test");
        assert_not_verified(&graph, &keys[2], "/user-2", "test");
        assert_not_verified(&graph, &keys[1], "/user-4", "test");
        assert_not_verified(&graph, &keys[3], "/user-3", "test");
    }

    #[test]
    fn cyclic_grants_terminate() {
        let (mut grants, keys) = create_test_keys_and_grants(3);
        grants.push(delegate_any("/user-2", "/user-1"));
        grants.push(delegate_any("/user-1", "/user-2"));

        let graph = TrustGraph::new(grants);

        assert_verified(&graph, &keys[0], "/user-1", "test");
        assert_verified(&graph, &keys[0], "/user-2", "test");
        assert_verified(&graph, &keys[1], "/user-2", "test");
        assert_verified(&graph, &keys[1], "/user-1", "test");
        assert_verified(&graph, &keys[2], "/user-3", "test");

        // A target neither side reaches terminates and denies.
        assert_not_verified(&graph, &keys[0], "/user-3", "test");
        assert_not_verified(&graph, &keys[1], "/user-3", "test");
    }

    #[test]
    fn get_grants_returns_discovery_ordered_chains() {
        let (mut grants, keys) = create_test_keys_and_grants(5);
        grants.push(delegate_any("/user-3/friend-project", "/user-2/friends"));
        grants.push(delegate_any("/user-3/sub-project", "/user-4"));
        grants.push(delegate_any("/user-2/friends", "/user-5/fun-project"));
        grants.push(delegate_any("/user-5/fun-project", "/user-1"));

        let graph = TrustGraph::new(grants);

        let chains = graph
            .get_grants(&keys[3], "/user-3/sub-project/specific-app", "test")
            .unwrap();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].len(), 2);
        assert_eq!(chains[0][0].subject, "/user-4");
        assert_eq!(chains[0][1].subject, "/user-3/sub-project");

        let chains = graph
            .get_grants(&keys[0], "/user-3/friend-project/fun-app", "test")
            .unwrap();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].len(), 4);
        assert_eq!(chains[0][0].subject, "/user-1");
        assert_eq!(chains[0][1].subject, "/user-5/fun-project");
        assert_eq!(chains[0][2].subject, "/user-2/friends");
        assert_eq!(chains[0][3].subject, "/user-3/friend-project");

        // Adjacent chain links satisfy namespace containment, and replaying
        // the chain's query through verify agrees.
        for pair in chains[0].windows(2) {
            assert!(is_sub_name(&pair[1].grantee, &pair[0].subject));
        }
        assert_verified(&graph, &keys[0], "/user-3/friend-project/fun-app", "test");
    }

    #[test]
    fn expiration_has_grace_window() {
        let now = Utc::now();
        let key = JWK::generate_p256().unwrap();
        let mut grant = Grant::new("/project", &key.fingerprint().unwrap(), vec!["read".to_string()]);
        grant.expiration = now - Duration::seconds(10);

        let clock = Arc::new(FixedClock(now));
        let graph = TrustGraph::with_clock(vec![grant.clone()], clock.clone());
        assert!(graph.verify(&key, "/project", "read").unwrap());

        grant.expiration = now - Duration::seconds(30);
        let graph = TrustGraph::with_clock(vec![grant], clock);
        assert!(!graph.verify(&key, "/project", "read").unwrap());
    }

    #[test]
    fn delegated_chain_of_length_two() {
        let key2 = JWK::generate_p256().unwrap();
        let key3 = JWK::generate_p256().unwrap();

        let mut delegation = Grant::new(
            "/app",
            &key2.fingerprint().unwrap(),
            vec!["deploy".to_string()],
        );
        delegation.delegated = true;
        let leaf = Grant::new(
            "/app/service",
            &key3.fingerprint().unwrap(),
            vec!["deploy".to_string()],
        );

        let graph = TrustGraph::new(vec![delegation, leaf]);
        assert!(graph.verify(&key3, "/app/service/pod", "deploy").unwrap());
        assert!(!graph.verify(&key3, "/app/other", "deploy").unwrap());
        // A delegated grant authorizes within its own subject and only
        // recurses outside it.
        assert!(graph.verify(&key2, "/app/anything", "deploy").unwrap());
        assert!(!graph.verify(&key2, "/elsewhere", "deploy").unwrap());
    }

    #[test]
    fn revocation_precedence() {
        let now = Utc::now();
        let key = JWK::generate_p256().unwrap();
        let fingerprint = key.fingerprint().unwrap();

        let mut grant = Grant::new("/project", &fingerprint, vec!["read".to_string()]);
        grant.issued_at = now;
        let mut revocation = grant.clone();
        revocation.revoked = true;
        revocation.issued_at = now + Duration::seconds(1);

        let graph = TrustGraph::new(vec![grant.clone(), revocation.clone()]);
        assert!(!graph.verify(&key, "/project", "read").unwrap());

        // A revocation issued before the grant does not suppress it.
        revocation.issued_at = now - Duration::seconds(1);
        let graph = TrustGraph::new(vec![grant.clone(), revocation.clone()]);
        assert!(graph.verify(&key, "/project", "read").unwrap());

        // Differing scope sets leave the grant alone.
        revocation.issued_at = now + Duration::seconds(1);
        revocation.scopes = vec!["write".to_string()];
        let graph = TrustGraph::new(vec![grant, revocation]);
        assert!(graph.verify(&key, "/project", "read").unwrap());
    }

    #[test]
    fn sub_name_containment() {
        assert!(!is_sub_name("/userabc", "/user"));
        assert!(is_sub_name("/user/abc", "/user"));
        assert!(is_sub_name("/user", "/user"));
        assert!(!is_sub_name("/use", "/user"));
        assert!(is_sub_name("/user/a/b", "/user/a"));
    }

    #[test]
    fn scope_any_is_wildcard() {
        let key = JWK::generate_p256().unwrap();
        let grant = Grant::new(
            "/project",
            &key.fingerprint().unwrap(),
            vec!["any".to_string()],
        );
        let graph = TrustGraph::new(vec![grant]);
        assert!(graph.verify(&key, "/project", "deploy").unwrap());
        assert!(graph.verify(&key, "/project/x", "read").unwrap());
    }

    #[test]
    fn check_surfaces_not_authorized() {
        let key = JWK::generate_p256().unwrap();
        let graph = TrustGraph::new(Vec::new());
        match graph.check(&key, "/project", "read") {
            Err(Error::NotAuthorized) => {}
            other => panic!("expected not authorized, got {other:?}"),
        }
    }

    #[test]
    fn deterministic_chains() {
        let (mut grants, keys) = create_test_keys_and_grants(3);
        grants.push(delegate_any("/user-2", "/user-1"));
        grants.push(delegate_any("/user-3", "/user-1"));
        let build = |grants: Vec<Grant>| TrustGraph::new(grants);
        let first = build(grants.clone());
        let second = build(grants);
        let chains_a = first.get_grants(&keys[0], "/user-2/app", "test").unwrap();
        let chains_b = second.get_grants(&keys[0], "/user-2/app", "test").unwrap();
        let shape = |chains: &[Vec<Arc<Grant>>]| -> Vec<Vec<String>> {
            chains
                .iter()
                .map(|chain| chain.iter().map(|g| g.subject.clone()).collect())
                .collect()
        };
        assert_eq!(shape(&chains_a), shape(&chains_b));
    }
}
