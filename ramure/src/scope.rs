//! Lexical scope chain
//!
//! Each node holds the bindings introduced by one frame and links to its
//! parent. Nodes are never mutated after creation: rebinding a name creates a
//! new overlay on top, so ancestors seen by other frames stay intact.

use crate::value::Value;
use indexmap::IndexMap;
use std::rc::Rc;

/// The plain name → value mapping a top-level render starts from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    vars: IndexMap<String, Value>,
}

impl Context {
    /// An empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Builder-style [`Context::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// The variable `name`, if set
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// The variables, in insertion order
    pub fn into_vars(self) -> IndexMap<String, Value> {
        self.vars
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One node of the scope chain
#[derive(Debug, Default)]
pub struct Scope {
    bindings: IndexMap<String, Value>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    /// A root scope with no parent
    pub fn root(bindings: impl IntoIterator<Item = (String, Value)>) -> Rc<Scope> {
        Rc::new(Scope {
            bindings: bindings.into_iter().collect(),
            parent: None,
        })
    }

    /// A new child node with `bindings`, falling back to `self` for other names
    pub fn overlay(self: &Rc<Self>, bindings: impl IntoIterator<Item = (String, Value)>) -> Rc<Scope> {
        Rc::new(Scope {
            bindings: bindings.into_iter().collect(),
            parent: Some(Rc::clone(self)),
        })
    }

    /// Find the innermost binding for `name`.
    ///
    /// A binding whose value is itself undefined still counts as found.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let mut node = Some(self);
        while let Some(scope) = node {
            if let Some(value) = scope.bindings.get(name) {
                return Some(value);
            }
            node = scope.parent.as_deref();
        }
        None
    }

    /// Look up `name`, yielding the undefined marker when nothing binds it
    pub fn lookup(&self, name: &str) -> Value {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| Value::undefined(name))
    }

    /// Whether some node of the chain binds `name`
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bindings introduced by this node only
    pub fn local_bindings(&self) -> &IndexMap<String, Value> {
        &self.bindings
    }

    /// The enclosing node, `None` at the root
    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    /// Number of nodes from here to the root, inclusive
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut node = self.parent.as_deref();
        while let Some(scope) = node {
            depth += 1;
            node = scope.parent.as_deref();
        }
        depth
    }

    /// All visible names, sorted (for diagnostics)
    pub fn available_vars(&self) -> Vec<String> {
        let mut vars = Vec::new();
        let mut node = Some(self);
        while let Some(scope) = node {
            vars.extend(scope.bindings.keys().cloned());
            node = scope.parent.as_deref();
        }
        vars.sort();
        vars.dedup();
        vars
    }
}
