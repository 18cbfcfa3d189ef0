//! The five-level fixed-fanout hashed tree: inner nodes (levels 1..4) and
//! leaves (level 5) holding [Link] records.

use std::sync::{Arc, RwLock};

use crate::{
    hash::degree_and_residual,
    link::{Extent, Link},
};

enum Body {
    Inner(RwLock<Vec<Arc<Node>>>),
    Leaf(RwLock<Vec<Arc<Link>>>),
}

/// A single node of the tree. Inner nodes (`level` 1..4) hold sorted child
/// nodes; the leaf (`level` 5) holds the Links that share the same 4-level
/// hashed prefix.
pub struct Node {
    level: u8,
    degree_index: u16,
    body: Body,
}

/// Outcome of a put against a leaf: the Link now on record, whether a Link
/// with this digest already existed, and whether the caller's version was
/// accepted (i.e. the Link's extent should be (re)written).
pub struct PutOutcome {
    pub link: Arc<Link>,
    pub existed: bool,
    pub accepted: bool,
}

impl Node {
    pub fn new_root() -> Node {
        Node::new_inner(1, 0)
    }

    fn new_inner(level: u8, degree_index: u16) -> Node {
        Node {
            level,
            degree_index,
            body: Body::Inner(RwLock::new(Vec::new())),
        }
    }

    fn new_leaf(degree_index: u16) -> Node {
        Node {
            level: 5,
            degree_index,
            body: Body::Leaf(RwLock::new(Vec::new())),
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn degree_index(&self) -> u16 {
        self.degree_index
    }

    /// Insert or update the Link identified by `digest` along the path
    /// addressed by `flexible_key`. `hash_key` is the full, unsplit 64-bit
    /// hash: it is stored verbatim on a freshly created Link (needed for
    /// leaf-level range comparisons during selection) while `flexible_key`
    /// is the residual still to be consumed at this node's level.
    pub fn put(&self, digest: &str, hash_key: u64, flexible_key: u64, version: i32) -> PutOutcome {
        match &self.body {
            Body::Inner(children) => {
                let (degree, residual) = degree_and_residual(self.level, flexible_key);
                let child = self.child_or_create(children, degree);
                child.put(digest, hash_key, residual, version)
            }
            Body::Leaf(links) => self.put_leaf(links, digest, hash_key, version),
        }
    }

    fn child_or_create(&self, children: &RwLock<Vec<Arc<Node>>>, degree: u16) -> Arc<Node> {
        {
            let guard = children.read().unwrap();
            if let Ok(pos) = guard.binary_search_by_key(&degree, |n| n.degree_index) {
                return Arc::clone(&guard[pos]);
            }
        }
        let mut guard = children.write().unwrap();
        match guard.binary_search_by_key(&degree, |n| n.degree_index) {
            Ok(pos) => Arc::clone(&guard[pos]),
            Err(pos) => {
                let next_level = self.level + 1;
                let child = Arc::new(if next_level == 5 {
                    Node::new_leaf(degree)
                } else {
                    Node::new_inner(next_level, degree)
                });
                guard.insert(pos, Arc::clone(&child));
                child
            }
        }
    }

    fn put_leaf(&self, links: &RwLock<Vec<Arc<Link>>>, digest: &str, hash_key: u64, version: i32) -> PutOutcome {
        {
            let guard = links.read().unwrap();
            if let Ok(pos) = guard.binary_search_by(|l| l.digest().cmp(digest)) {
                let link = Arc::clone(&guard[pos]);
                let accepted = link.try_bump_version(version);
                return PutOutcome {
                    link,
                    existed: true,
                    accepted,
                };
            }
        }
        let mut guard = links.write().unwrap();
        match guard.binary_search_by(|l| l.digest().cmp(digest)) {
            Ok(pos) => {
                let link = Arc::clone(&guard[pos]);
                let accepted = link.try_bump_version(version);
                PutOutcome {
                    link,
                    existed: true,
                    accepted,
                }
            }
            Err(pos) => {
                let link = Arc::new(Link::new(digest.to_string(), hash_key, version));
                guard.insert(pos, Arc::clone(&link));
                PutOutcome {
                    link,
                    existed: false,
                    accepted: true,
                }
            }
        }
    }

    /// Replay a persisted index record during recovery: like [Node::put]
    /// but also Fits the extent when the version is accepted.
    pub fn recover_record(
        &self,
        digest: &str,
        hash_key: u64,
        flexible_key: u64,
        extent: Extent,
    ) -> (Arc<Link>, bool) {
        match &self.body {
            Body::Inner(children) => {
                let (degree, residual) = degree_and_residual(self.level, flexible_key);
                let child = self.child_or_create(children, degree);
                child.recover_record(digest, hash_key, residual, extent)
            }
            Body::Leaf(links) => self.recover_leaf(links, digest, hash_key, extent),
        }
    }

    fn recover_leaf(
        &self,
        links: &RwLock<Vec<Arc<Link>>>,
        digest: &str,
        hash_key: u64,
        extent: Extent,
    ) -> (Arc<Link>, bool) {
        let mut guard = links.write().unwrap();
        match guard.binary_search_by(|l| l.digest().cmp(digest)) {
            Ok(pos) => {
                let link = Arc::clone(&guard[pos]);
                let accepted = link.version() < extent.version;
                if accepted {
                    link.fit(extent.seek_start_index, extent.seek_start, extent.seek_last, extent.version);
                }
                (link, accepted)
            }
            Err(pos) => {
                let link = Arc::new(Link::from_extent(digest.to_string(), hash_key, extent));
                guard.insert(pos, Arc::clone(&link));
                (link, true)
            }
        }
    }

    pub fn get(&self, digest: &str, flexible_key: u64) -> Option<Arc<Link>> {
        match &self.body {
            Body::Inner(children) => {
                let (degree, residual) = degree_and_residual(self.level, flexible_key);
                let guard = children.read().unwrap();
                let pos = guard.binary_search_by_key(&degree, |n| n.degree_index).ok()?;
                let child = Arc::clone(&guard[pos]);
                drop(guard);
                child.get(digest, residual)
            }
            Body::Leaf(links) => {
                let guard = links.read().unwrap();
                let pos = guard.binary_search_by(|l| l.digest().cmp(digest)).ok()?;
                Some(Arc::clone(&guard[pos]))
            }
        }
    }

    /// Remove the Link matching `digest` from its leaf, returning it if
    /// present. Used by `Form::del` and by delete-mode selects.
    pub fn remove(&self, digest: &str, flexible_key: u64) -> Option<Arc<Link>> {
        match &self.body {
            Body::Inner(children) => {
                let (degree, residual) = degree_and_residual(self.level, flexible_key);
                let guard = children.read().unwrap();
                let pos = guard.binary_search_by_key(&degree, |n| n.degree_index).ok()?;
                let child = Arc::clone(&guard[pos]);
                drop(guard);
                child.remove(digest, residual)
            }
            Body::Leaf(links) => {
                let mut guard = links.write().unwrap();
                let pos = guard.binary_search_by(|l| l.digest().cmp(digest)).ok()?;
                Some(guard.remove(pos))
            }
        }
    }

    /// Visit every child (inner levels) in ascending degree-index order.
    pub fn children_sorted(&self) -> Vec<Arc<Node>> {
        match &self.body {
            Body::Inner(children) => children.read().unwrap().clone(),
            Body::Leaf(_) => Vec::new(),
        }
    }

    /// Visit every Link of a leaf in ascending digest order.
    pub fn links_sorted(&self) -> Vec<Arc<Link>> {
        match &self.body {
            Body::Leaf(links) => links.read().unwrap().clone(),
            Body::Inner(_) => Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, Body::Leaf(_))
    }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
