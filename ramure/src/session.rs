//! Per-render session
//!
//! One [`Session`] is created per top-level render. Every template reached
//! from there (through extends, include or import) runs under a session
//! derived from it:
//!
//! - all derived sessions share the template cache, so a name is loaded at
//!   most once per render;
//! - an `extends` session shares the block registry with its child, so the
//!   parent's definitions are appended to the overrides already collected;
//! - `include` and `import` sessions start with an empty registry.
//!
//! The root session owns the registry; derived sessions only borrow it for
//! the duration of the render. Nothing here is shared between renders.

use crate::blocks::{BlockFn, BlockRegistry};
use crate::config::{Config, FilterTable, TestTable};
use crate::error::{LookupError, Result};
use crate::template::Template;
use crate::value::{Module, Value};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// How a derived session relates to the session it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// The derived template is the parent of the current one
    Extends,
    /// The derived template renders inline
    Include,
    /// The derived template renders into a module
    Import,
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Behavior::Extends => "extends",
            Behavior::Include => "include",
            Behavior::Import => "import",
        })
    }
}

type TemplateCache = HashMap<String, Arc<Template>>;

/// Runtime information for one template instance within a render
pub struct Session {
    config: Arc<Config>,
    template_name: Option<String>,
    autoescape: Cell<bool>,
    filters: Arc<FilterTable>,
    tests: Arc<TestTable>,
    blocks: Rc<RefCell<BlockRegistry>>,
    templates: Rc<RefCell<TemplateCache>>,
    exports: RefCell<IndexMap<String, Value>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("template_name", &self.template_name)
            .field("autoescape", &self.autoescape.get())
            .field("blocks", &self.blocks.borrow())
            .field("cached_templates", &self.templates.borrow().len())
            .field("exports", &self.exports.borrow())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A fresh top-level session
    pub fn new(config: Arc<Config>, template_name: Option<&str>) -> Self {
        Self {
            autoescape: Cell::new(config.get_autoescape_default(template_name)),
            filters: config.get_filters(),
            tests: config.get_tests(),
            template_name: template_name.map(str::to_string),
            blocks: Rc::default(),
            templates: Rc::default(),
            exports: RefCell::default(),
            config,
        }
    }

    /// A session for `template_name`, reached from this one
    pub fn derive(&self, template_name: &str, behavior: Behavior) -> Session {
        tracing::debug!(
            from = self.template_name.as_deref().unwrap_or("<root>"),
            to = template_name,
            %behavior,
            "deriving session"
        );
        let blocks = match behavior {
            Behavior::Extends => Rc::clone(&self.blocks),
            Behavior::Include | Behavior::Import => Rc::default(),
        };
        Session {
            config: Arc::clone(&self.config),
            template_name: Some(template_name.to_string()),
            autoescape: Cell::new(self.config.get_autoescape_default(Some(template_name))),
            filters: Arc::clone(&self.filters),
            tests: Arc::clone(&self.tests),
            blocks,
            templates: Rc::clone(&self.templates),
            exports: RefCell::default(),
        }
    }

    /// The shared configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Name of the template this session runs, `None` for an unnamed root
    pub fn template_name(&self) -> Option<&str> {
        self.template_name.as_deref()
    }

    /// Whether emitted values are currently escaped
    pub fn autoescape(&self) -> bool {
        self.autoescape.get()
    }

    /// Turn escaping of emitted values on or off
    pub fn set_autoescape(&self, enabled: bool) {
        self.autoescape.set(enabled);
    }

    /// Whether both sessions see the same block registry
    pub fn shares_blocks_with(&self, other: &Session) -> bool {
        Rc::ptr_eq(&self.blocks, &other.blocks)
    }

    /// Whether both sessions see the same template cache
    pub fn shares_templates_with(&self, other: &Session) -> bool {
        Rc::ptr_eq(&self.templates, &other.templates)
    }

    /// Add a definition of `name` behind those already registered
    pub fn register_block(&self, name: &str, executor: BlockFn) {
        self.blocks.borrow_mut().register(name, executor);
    }

    /// The executor for `name`, `levels_up` steps from the most specific one
    pub fn resolve_block(&self, name: &str, levels_up: usize) -> Result<BlockFn> {
        // the borrow ends here, before the executor runs
        self.blocks.borrow().resolve(name, levels_up)
    }

    /// How many definitions of `name` are registered
    pub fn block_depth(&self, name: &str) -> usize {
        self.blocks.borrow().depth(name)
    }

    /// Registered block names, sorted
    pub fn block_names(&self) -> Vec<String> {
        self.blocks.borrow().names()
    }

    /// Fetch a template by its resolved name, loading it on first use
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>> {
        if let Some(template) = self.templates.borrow().get(name) {
            tracing::trace!(template = name, "template cache hit");
            return Ok(Arc::clone(template));
        }

        tracing::debug!(template = name, "loading template");
        let template = self.config.get_template(name)?;
        self.templates
            .borrow_mut()
            .insert(name.to_string(), Arc::clone(&template));
        Ok(template)
    }

    /// The first of `names` that can be loaded, with its name
    pub fn select_template<'n>(&self, names: &[&'n str]) -> Result<(&'n str, Arc<Template>)> {
        for &name in names {
            match self.get_template(name) {
                Ok(template) => return Ok((name, template)),
                Err(e) if e.is_template_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(LookupError::NoTemplateSelected {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
        .into())
    }

    /// Whether a template is already in this render's cache
    pub fn is_cached(&self, name: &str) -> bool {
        self.templates.borrow().contains_key(name)
    }

    /// Apply filter `name` to `value`
    pub fn call_filter(&self, name: &str, value: &Value, args: &[Value]) -> Result<Value> {
        let filter = self.filters.get(name).ok_or_else(|| LookupError::UnknownFilter {
            name: name.to_string(),
            known: sorted_keys(&*self.filters),
        })?;
        filter(value, args)
    }

    /// Evaluate test `name` against `value`
    pub fn call_test(&self, name: &str, value: &Value, args: &[Value]) -> Result<bool> {
        let test = self.tests.get(name).ok_or_else(|| LookupError::UnknownTest {
            name: name.to_string(),
            known: sorted_keys(&*self.tests),
        })?;
        test(value, args)
    }

    /// Record a top-level variable so importers can see it
    pub fn export_var(&self, name: &str, value: Value) {
        self.exports.borrow_mut().insert(name.to_string(), value);
    }

    /// Top-level variables recorded so far, in assignment order
    pub fn exports(&self) -> IndexMap<String, Value> {
        self.exports.borrow().clone()
    }

    /// Package this session's exports and the captured output as a module
    pub fn make_module(&self, name: &str, body: String) -> Module {
        Module::new(name, self.exports(), body)
    }
}

fn sorted_keys<V>(table: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<_> = table.keys().cloned().collect();
    keys.sort();
    keys
}
