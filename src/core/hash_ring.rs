//! Consistent hashing with virtual nodes.
//!
//! Physical nodes are projected onto an ordered ring as `virtual_node_num`
//! replicas each; a key maps to the first ring entry clockwise from its
//! hash, wrapping to the start. Nodes and lookup keys must share one hash
//! function or placement breaks, so [`fnv_jenkins_hash`] is also what the
//! client-ip strategies use.
use std::collections::BTreeMap;

/// FNV-1a 32-bit followed by a Jenkins-style avalanche mix, folded to a
/// non-negative `i32`.
pub fn fnv_jenkins_hash(input: &str) -> i32 {
    const FNV_PRIME: i32 = 16_777_619;
    let mut hash = 2_166_136_261u32 as i32;
    for ch in input.chars() {
        hash = (hash ^ ch as i32).wrapping_mul(FNV_PRIME);
    }
    hash = hash.wrapping_add(hash << 13);
    hash ^= hash >> 7;
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 17;
    hash = hash.wrapping_add(hash << 5);
    if hash < 0 {
        hash = hash.wrapping_abs();
    }
    hash
}

/// Hash ring mapping keys onto physical node identifiers.
pub struct ConsistentHashRing {
    virtual_node_num: usize,
    ring: BTreeMap<i32, String>,
}

impl ConsistentHashRing {
    pub fn new(nodes: &[String], virtual_node_num: usize) -> Self {
        let mut this = Self {
            virtual_node_num,
            ring: BTreeMap::new(),
        };
        for node in nodes {
            this.add_node(node);
        }
        this
    }

    /// Insert a physical node as `virtual_node_num` ring entries.
    pub fn add_node(&mut self, node: &str) {
        for replica in 0..self.virtual_node_num {
            let virtual_node = format!("{node}&&VN{replica}");
            self.ring
                .insert(fnv_jenkins_hash(&virtual_node), node.to_string());
        }
    }

    /// Remove every replica of a physical node.
    pub fn remove_node(&mut self, node: &str) {
        for replica in 0..self.virtual_node_num {
            let virtual_node = format!("{node}&&VN{replica}");
            self.ring.remove(&fnv_jenkins_hash(&virtual_node));
        }
    }

    /// Clockwise lookup: smallest ring entry at or after the key's hash,
    /// wrapping to the first entry.
    pub fn get_node(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }
        let hash = fnv_jenkins_hash(key);
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node.as_str())
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
