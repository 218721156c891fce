//! Binary prefix trie with longest-prefix-match
//!
//! One key bit is consumed per level. Nodes live in an arena addressed by
//! `u32` handles; nodes emptied by a removal are pruned and recycled through
//! a free list, so a cache that keeps rebinding slots does not grow the arena
//! without bound.

use std::net::IpAddr;

use crate::error::IndexError;
use crate::net::{address_key, key_bit, Network, KEY_BITS};

type NodeId = u32;

const ROOT: NodeId = 0;

/// Trie node
struct Node<T> {
    children: [Option<NodeId>; 2],
    /// Network ending at this node and the handle registered for it
    entry: Option<(Network, T)>,
}

impl<T> Node<T> {
    fn empty() -> Self {
        Self {
            children: [None, None],
            entry: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children[0].is_none() && self.children[1].is_none()
    }
}

/// Prefix index mapping canonical networks to handles of type `T`
pub struct PrefixTrie<T> {
    nodes: Vec<Node<T>>,
    free_list: Vec<NodeId>,
    len: usize,
}

impl<T: Copy> PrefixTrie<T> {
    /// Create an empty trie
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::empty()],
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Register `network` with `value`
    ///
    /// Never overwrites: registering a network that is already present fails
    /// with [`IndexError::Conflict`] and leaves the trie unchanged.
    pub fn insert(&mut self, network: Network, value: T) -> Result<(), IndexError> {
        let key = network.key();
        let mut cur = ROOT;

        for depth in 0..network.key_len() {
            let bit = key_bit(key, depth);
            cur = match self.nodes[cur as usize].children[bit] {
                Some(next) => next,
                None => {
                    let next = self.alloc_node();
                    self.nodes[cur as usize].children[bit] = Some(next);
                    next
                }
            };
        }

        let node = &mut self.nodes[cur as usize];
        if node.entry.is_some() {
            return Err(IndexError::Conflict(network));
        }
        node.entry = Some((network, value));
        self.len += 1;
        Ok(())
    }

    /// Unregister the exact `network`, returning its handle
    pub fn remove(&mut self, network: &Network) -> Result<T, IndexError> {
        let key = network.key();
        let key_len = network.key_len();
        let mut path = [(ROOT, 0usize); KEY_BITS as usize];
        let mut cur = ROOT;

        for depth in 0..key_len {
            let bit = key_bit(key, depth);
            match self.nodes[cur as usize].children[bit] {
                Some(next) => {
                    path[depth as usize] = (cur, bit);
                    cur = next;
                }
                None => return Err(IndexError::NotFound(*network)),
            }
        }

        let (_, value) = self.nodes[cur as usize]
            .entry
            .take()
            .ok_or(IndexError::NotFound(*network))?;
        self.len -= 1;

        // Prune the now-dead tail of the path
        let mut depth = key_len as usize;
        while depth > 0 {
            let node = &self.nodes[cur as usize];
            if node.entry.is_some() || !node.is_leaf() {
                break;
            }
            depth -= 1;
            let (parent, bit) = path[depth];
            self.nodes[parent as usize].children[bit] = None;
            self.free_node(cur);
            cur = parent;
        }

        Ok(value)
    }

    /// Most specific registered network containing `addr`
    pub fn longest_match(&self, addr: IpAddr) -> Option<(Network, T)> {
        let key = address_key(addr);
        let mut cur = ROOT;
        let mut best = self.nodes[ROOT as usize].entry;

        for depth in 0..KEY_BITS {
            match self.nodes[cur as usize].children[key_bit(key, depth)] {
                Some(next) => {
                    cur = next;
                    if let Some(entry) = self.nodes[cur as usize].entry {
                        best = Some(entry);
                    }
                }
                None => break,
            }
        }

        best
    }

    /// Handle registered for exactly `network`
    pub fn get(&self, network: &Network) -> Option<T> {
        let key = network.key();
        let mut cur = ROOT;
        for depth in 0..network.key_len() {
            cur = self.nodes[cur as usize].children[key_bit(key, depth)]?;
        }
        self.nodes[cur as usize].entry.map(|(_, value)| value)
    }

    /// Remove every entry whose handle equals `value`, returning the removed networks
    pub fn purge(&mut self, value: T) -> Vec<Network>
    where
        T: PartialEq,
    {
        let mut doomed = Vec::new();
        self.for_each(|network, v| {
            if *v == value {
                doomed.push(*network);
            }
        });
        for network in &doomed {
            // Collected from live entries above, cannot be missing
            let _ = self.remove(network);
        }
        doomed
    }

    /// Visit every registered entry (arena order)
    pub fn for_each<F: FnMut(&Network, &T)>(&self, mut f: F) {
        for node in &self.nodes {
            if let Some((network, value)) = &node.entry {
                f(network, value);
            }
        }
    }

    /// Number of registered networks
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the trie empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of live nodes, root included
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    fn alloc_node(&mut self) -> NodeId {
        if let Some(id) = self.free_list.pop() {
            id
        } else {
            self.nodes.push(Node::empty());
            (self.nodes.len() - 1) as NodeId
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.nodes[id as usize] = Node::empty();
        self.free_list.push(id);
    }
}

impl<T: Copy> Default for PrefixTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}
