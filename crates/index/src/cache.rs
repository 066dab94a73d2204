//! Nested lookup cache for one key shape of one table.
//!
//! The cache maps each key field's value, in shape order, to the next level;
//! the last level holds the facts matching the full key. It is filled once
//! from the table when created and afterwards only folded with real adds and
//! removes.

use crate::shape::KeyShape;
use hashbrown::HashMap;
use std::rc::Rc;
use tessera_core::{Fact, Value};

#[derive(Debug)]
enum Node {
    Branch(HashMap<Value, Node>),
    Leaf(Vec<Rc<Fact>>),
}

impl Node {
    fn with_depth(depth: usize) -> Self {
        if depth == 0 {
            Node::Leaf(Vec::new())
        } else {
            Node::Branch(HashMap::new())
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Node::Branch(children) => children.is_empty(),
            Node::Leaf(facts) => facts.is_empty(),
        }
    }

    fn insert(&mut self, key: &[&Value], fact: Rc<Fact>) {
        match self {
            Node::Leaf(facts) => facts.push(fact),
            Node::Branch(children) => {
                let (head, rest) = match key.split_first() {
                    Some(split) => split,
                    None => return,
                };
                children
                    .entry((*head).clone())
                    .or_insert_with(|| Node::with_depth(rest.len()))
                    .insert(rest, fact);
            }
        }
    }

    fn remove(&mut self, key: &[&Value], fact: &Rc<Fact>) -> bool {
        match self {
            Node::Leaf(facts) => {
                let pos = facts
                    .iter()
                    .position(|f| Rc::ptr_eq(f, fact))
                    .or_else(|| facts.iter().position(|f| f == fact));
                match pos {
                    Some(pos) => {
                        facts.remove(pos);
                        true
                    }
                    None => false,
                }
            }
            Node::Branch(children) => {
                let (head, rest) = match key.split_first() {
                    Some(split) => split,
                    None => return false,
                };
                let child = match children.get_mut(*head) {
                    Some(child) => child,
                    None => return false,
                };
                let removed = child.remove(rest, fact);
                if child.is_empty() {
                    children.remove(*head);
                }
                removed
            }
        }
    }

    fn get(&self, key: &[&Value]) -> &[Rc<Fact>] {
        match self {
            Node::Leaf(facts) => facts,
            Node::Branch(children) => match key.split_first() {
                Some((head, rest)) => children.get(*head).map(|c| c.get(rest)).unwrap_or(&[]),
                None => &[],
            },
        }
    }
}

/// Incrementally maintained index over one key shape.
#[derive(Debug)]
pub struct IndexCache {
    shape: KeyShape,
    root: Node,
    len: usize,
}

impl IndexCache {
    /// Creates an empty cache for a shape.
    pub fn new(shape: KeyShape) -> Self {
        let root = Node::with_depth(shape.len());
        Self {
            shape,
            root,
            len: 0,
        }
    }

    /// Creates a cache filled from a table's current facts.
    pub fn build(shape: KeyShape, facts: &[Rc<Fact>]) -> Self {
        let mut cache = Self::new(shape);
        cache.collect(facts, &[]);
        cache
    }

    /// Returns the key shape.
    pub fn shape(&self) -> &KeyShape {
        &self.shape
    }

    /// Returns the number of indexed facts.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no fact is indexed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Folds real adds and removes into the cache.
    ///
    /// Facts lacking one of the key fields are not indexed, so no lookup on
    /// this shape can return them.
    pub fn collect(&mut self, adds: &[Rc<Fact>], removes: &[Rc<Fact>]) {
        for fact in removes {
            if let Some(key) = self.shape.extract(fact) {
                if self.root.remove(&key, fact) {
                    self.len -= 1;
                }
            }
        }
        for fact in adds {
            if let Some(key) = self.shape.extract(fact) {
                self.root.insert(&key, Rc::clone(fact));
                self.len += 1;
            }
        }
    }

    /// Returns the facts whose key fields equal the query's, in insertion order.
    ///
    /// A miss at any level, or a query lacking a key field, is an empty result.
    pub fn lookup(&self, query: &Fact) -> Vec<Rc<Fact>> {
        match self.shape.extract(query) {
            Some(key) => self.root.get(&key).to_vec(),
            None => Vec::new(),
        }
    }

    /// Returns the facts matching key values given in shape order.
    pub fn get(&self, key: &[&Value]) -> &[Rc<Fact>] {
        if key.len() != self.shape.len() {
            return &[];
        }
        self.root.get(key)
    }

    /// Drops every indexed fact, keeping the shape.
    pub fn clear(&mut self) {
        self.root = Node::with_depth(self.shape.len());
        self.len = 0;
    }
}
