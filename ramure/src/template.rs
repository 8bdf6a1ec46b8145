//! Compiled templates
//!
//! A [`Template`] is what a compiler hands to the runtime: a root render
//! function, the template's block definitions and an optional setup
//! function. Templates are immutable and shared behind `Arc`, so one compiled
//! template can serve any number of concurrent renders.

use crate::blocks::{block_fn, BlockFn};
use crate::config::Config;
use crate::error::Result;
use crate::scope::Context;
use crate::session::Session;
use crate::state::RuntimeState;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A compiled render or setup function
pub type RenderFn = BlockFn;

/// A compiled template
pub struct Template {
    name: String,
    root: RenderFn,
    setup: Option<RenderFn>,
    blocks: IndexMap<String, BlockFn>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("blocks", &self.blocks.keys().collect::<Vec<_>>())
            .field("custom_setup", &self.setup.is_some())
            .finish_non_exhaustive()
    }
}

impl Template {
    /// Start building the template registered as `name`
    pub fn builder(name: impl Into<String>) -> TemplateBuilder {
        TemplateBuilder {
            name: name.into(),
            root: None,
            setup: None,
            blocks: IndexMap::new(),
        }
    }

    /// Name the template is registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block definitions of this template, in source order
    pub fn blocks(&self) -> &IndexMap<String, BlockFn> {
        &self.blocks
    }

    /// Add this template's block definitions to the session's registry
    pub fn register_blocks(&self, session: &Session) {
        for (name, executor) in &self.blocks {
            session.register_block(name, BlockFn::clone(executor));
        }
    }

    /// Run setup, then the root render function.
    ///
    /// Without a custom setup function, setup registers [`Template::blocks`].
    pub fn run(&self, rt: &mut RuntimeState<'_>) -> Result<()> {
        match &self.setup {
            Some(setup) => setup(rt)?,
            None => self.register_blocks(rt.session()),
        }
        (self.root)(rt)
    }

    /// Render this template on its own, in a fresh session
    pub fn render(&self, config: &Arc<Config>, context: Context) -> Result<String> {
        config.render(self, context)
    }
}

/// Builder for [`Template`]
pub struct TemplateBuilder {
    name: String,
    root: Option<RenderFn>,
    setup: Option<RenderFn>,
    blocks: IndexMap<String, BlockFn>,
}

impl TemplateBuilder {
    /// The root render function
    pub fn root<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RuntimeState<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.root = Some(block_fn(f));
        self
    }

    /// A setup function replacing the default block registration
    pub fn setup<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RuntimeState<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.setup = Some(block_fn(f));
        self
    }

    /// Define block `name`
    pub fn block<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut RuntimeState<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.blocks.insert(name.into(), block_fn(f));
        self
    }

    /// Finish the template; a missing root renders nothing
    pub fn build(self) -> Template {
        Template {
            name: self.name,
            root: self.root.unwrap_or_else(|| block_fn(|_| Ok(()))),
            setup: self.setup,
            blocks: self.blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_setup_registers_blocks_before_root() {
        let template = Template::builder("page")
            .block("title", |rt| rt.write("Hello"))
            .root(|rt| {
                rt.write("<h1>")?;
                rt.evaluate_block("title", 0)?;
                rt.write("</h1>")
            })
            .build();

        let config = Arc::new(Config::default());
        let out = config.render(&template, Context::new()).unwrap();
        assert_eq!(out, "<h1>Hello</h1>");
    }

    #[test]
    fn custom_setup_replaces_registration() {
        let template = Template::builder("page")
            .block("title", |rt| rt.write("never"))
            .setup(|rt| {
                rt.assign("greeting", "hi");
                Ok(())
            })
            .root(|rt| {
                let greeting = rt.lookup("greeting");
                rt.emit(&greeting)?;
                assert!(rt.session().block_names().is_empty());
                Ok(())
            })
            .build();

        let config = Arc::new(Config::default());
        assert_eq!(template.render(&config, Context::new()).unwrap(), "hi");
    }

    #[test]
    fn debug_lists_block_names() {
        let template = Template::builder("t")
            .block("a", |_| Ok(()))
            .block("b", |_| Ok(()))
            .build();
        assert_eq!(
            format!("{template:?}"),
            r#"Template { name: "t", blocks: ["a", "b"], custom_setup: false, .. }"#
        );
    }
}
