// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! A trie over domain labels in reverse order, used for
//! longest-suffix upstream routing.
//!
//! A payload attached at `cn` matches any name ending in `cn`, but a
//! payload at `baidu.cn` wins for names under it: lookups walk from
//! the rightmost label inward and keep the deepest payload seen.

use std::collections::HashMap;

////////////////////////////////////////////////////////////////////////
// SUFFIX TREE                                                        //
////////////////////////////////////////////////////////////////////////

/// A suffix tree mapping domain-name suffixes to payloads of type
/// `V`. Labels are matched ASCII-case-insensitively.
#[derive(Debug)]
pub struct SuffixTree<V> {
    root: Node<V>,
}

#[derive(Debug)]
struct Node<V> {
    value: Option<V>,
    children: HashMap<String, Node<V>>,
}

impl<V> Node<V> {
    fn new() -> Self {
        Self {
            value: None,
            children: HashMap::new(),
        }
    }
}

impl<V> SuffixTree<V> {
    pub fn new() -> Self {
        Self { root: Node::new() }
    }

    /// Returns whether the tree holds no payloads at all.
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Attaches `value` at the node reached by walking `labels` from
    /// the rightmost label inward, creating intermediate nodes as
    /// needed. Inserting at an occupied node replaces its payload.
    pub fn insert(&mut self, labels: &[&str], value: V) {
        if labels.is_empty() {
            return;
        }
        let mut node = &mut self.root;
        for label in labels.iter().rev() {
            node = node
                .children
                .entry(label.to_ascii_lowercase())
                .or_insert_with(Node::new);
        }
        node.value = Some(value);
    }

    /// Finds the payload of the deepest suffix of `labels` that has
    /// one.
    pub fn lookup(&self, labels: &[&str]) -> Option<&V> {
        let mut node = &self.root;
        let mut deepest = None;
        for label in labels.iter().rev() {
            match node.children.get(&label.to_ascii_lowercase()) {
                Some(child) => {
                    if child.value.is_some() {
                        deepest = child.value.as_ref();
                    }
                    node = child;
                }
                None => break,
            }
        }
        deepest
    }
}

impl<V> Default for SuffixTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_suffixes_are_found() {
        let mut tree = SuffixTree::new();
        tree.insert(&["baidu", "cn"], 1);
        assert_eq!(tree.lookup(&["baidu", "cn"]), Some(&1));
    }

    #[test]
    fn an_ancestor_payload_matches_longer_names() {
        let mut tree = SuffixTree::new();
        tree.insert(&["cn"], 1);
        assert_eq!(tree.lookup(&["www", "baidu", "cn"]), Some(&1));
    }

    #[test]
    fn the_deepest_payload_wins() {
        let mut tree = SuffixTree::new();
        tree.insert(&["cn"], 1);
        tree.insert(&["baidu", "cn"], 2);
        assert_eq!(tree.lookup(&["www", "baidu", "cn"]), Some(&2));
        assert_eq!(tree.lookup(&["www", "sina", "cn"]), Some(&1));
    }

    #[test]
    fn unrelated_names_miss() {
        let mut tree = SuffixTree::new();
        tree.insert(&["baidu", "cn"], 1);
        assert_eq!(tree.lookup(&["example", "com"]), None);
        // A prefix of a stored suffix does not match unless it has its
        // own payload.
        assert_eq!(tree.lookup(&["cn"]), None);
        assert_eq!(tree.lookup(&[]), None);
    }

    #[test]
    fn labels_match_case_insensitively() {
        let mut tree = SuffixTree::new();
        tree.insert(&["Baidu", "CN"], 1);
        assert_eq!(tree.lookup(&["www", "baidu", "cn"]), Some(&1));
    }

    #[test]
    fn inserting_twice_replaces_the_payload() {
        let mut tree = SuffixTree::new();
        tree.insert(&["cn"], 1);
        tree.insert(&["cn"], 2);
        assert_eq!(tree.lookup(&["foo", "cn"]), Some(&2));
    }
}
