//! Block registry and override resolution
//!
//! Every block name maps to a chain of executors ordered from least
//! specific (defined by the root-most ancestor) to most specific (defined by
//! the template that started rendering). Templates register during their
//! setup phase, child first, so each registration lands on the
//! least-specific end of the chain.
//!
//! Overrides are addressed relative to the most specific executor:
//! `levels_up = 0` is the override-most definition, `levels_up = 1` the one
//! it overrides, and so on. A block body reaching for its parent definition
//! only ever asks for its own level plus one.

use crate::error::{LookupError, Result};
use crate::state::RuntimeState;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Executes one definition of a block against a runtime state
pub type BlockFn = Arc<dyn Fn(&mut RuntimeState<'_>) -> Result<()> + Send + Sync>;

/// Box a closure as a [`BlockFn`]
pub fn block_fn<F>(f: F) -> BlockFn
where
    F: Fn(&mut RuntimeState<'_>) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Pick the executor `levels_up` steps away from the most specific one
pub fn resolve_override(chain: &[BlockFn], levels_up: usize) -> Option<&BlockFn> {
    let index = chain.len().checked_sub(levels_up.checked_add(1)?)?;
    chain.get(index)
}

/// Convert the negative-level convention (`-1` = most specific, `-2` = the
/// next ancestor, ...) into a `levels_up` count
pub fn levels_up_from_level(level: isize) -> Option<usize> {
    if level < 0 {
        usize::try_from(-(level + 1)).ok()
    } else {
        None
    }
}

/// Per-render table of block executors
#[derive(Clone, Default)]
pub struct BlockRegistry {
    chains: HashMap<String, Vec<BlockFn>>,
}

impl fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, chain) in &self.chains {
            map.entry(name, &format!("<{} executor(s)>", chain.len()));
        }
        map.finish()
    }
}

impl BlockRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition that is less specific than every one already present
    pub fn register(&mut self, name: impl Into<String>, executor: BlockFn) {
        let name = name.into();
        let chain = self.chains.entry(name.clone()).or_default();
        chain.insert(0, executor);
        tracing::trace!(block = %name, depth = chain.len(), "registered block");
    }

    /// All definitions of `name`, least specific first
    pub fn chain(&self, name: &str) -> Option<&[BlockFn]> {
        self.chains.get(name).map(Vec::as_slice)
    }

    /// How many definitions of `name` are registered
    pub fn depth(&self, name: &str) -> usize {
        self.chains.get(name).map_or(0, Vec::len)
    }

    /// Whether any definition of `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    /// Registered block names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.chains.keys().cloned().collect();
        names.sort();
        names
    }

    /// Find the executor for `name`, `levels_up` steps from the most specific one
    pub fn resolve(&self, name: &str, levels_up: usize) -> Result<BlockFn> {
        let chain = self.chain(name).ok_or_else(|| LookupError::BlockNotFound {
            name: name.to_string(),
            known: self.names(),
        })?;
        let executor =
            resolve_override(chain, levels_up).ok_or_else(|| LookupError::BlockLevelOverflow {
                name: name.to_string(),
                levels_up,
                depth: chain.len(),
            })?;
        tracing::trace!(block = %name, levels_up, depth = chain.len(), "resolved block");
        Ok(Arc::clone(executor))
    }

    /// Like [`BlockRegistry::resolve`], with the negative-level convention
    pub fn resolve_level(&self, name: &str, level: isize) -> Result<BlockFn> {
        match levels_up_from_level(level) {
            Some(levels_up) => self.resolve(name, levels_up),
            None => Err(LookupError::InvalidBlockLevel {
                name: name.to_string(),
                level,
            }
            .into()),
        }
    }
}
