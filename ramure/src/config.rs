//! Render configuration
//!
//! A [`Config`] is built once and shared behind `Arc`. It carries the
//! filter and test tables, the template loader, path joining and the
//! policies for autoescaping, undefined values and tuple unpacking.
//!
//! ```
//! use ramure::{Config, Context, Template, Value};
//! use std::sync::Arc;
//!
//! let config = Arc::new(
//!     Config::builder()
//!         .autoescape(true)
//!         .filter("shout", |v, _| Ok(Value::from(v.render_to_string().to_uppercase())))
//!         .build(),
//! );
//!
//! let template = Template::builder("hello")
//!     .root(|rt| {
//!         rt.write("Hello ")?;
//!         let name = rt.lookup("name");
//!         let loud = rt.call_filter("shout", &name, &[])?;
//!         rt.emit(&loud)
//!     })
//!     .build();
//!
//! let out = config
//!     .render(&template, Context::new().with("name", "<world>"))
//!     .unwrap();
//! assert_eq!(out, "Hello &lt;WORLD&gt;");
//! ```

use crate::error::Result;
use crate::loader::{InMemoryLoader, TemplateLoader};
use crate::loops::Unpacking;
use crate::scope::{Context, Scope};
use crate::session::Session;
use crate::state::RuntimeState;
use crate::template::Template;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// A filter: `value | name(args...)`
pub type FilterFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value> + Send + Sync>;

/// A test: `value is name(args...)`
pub type TestFn = Arc<dyn Fn(&Value, &[Value]) -> Result<bool> + Send + Sync>;

/// Filters by name
pub type FilterTable = HashMap<String, FilterFn>;
/// Tests by name
pub type TestTable = HashMap<String, TestFn>;

/// Resolves a template reference relative to the referencing template
pub type PathJoiner = Arc<dyn Fn(&str, Option<&str>) -> String + Send + Sync>;

/// How the initial autoescape flag of a template is chosen
#[derive(Clone)]
pub enum Autoescape {
    /// The same for every template
    Always(bool),
    /// Decided from the template name
    ByName(Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>),
}

impl fmt::Debug for Autoescape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Autoescape::Always(enabled) => f.debug_tuple("Always").field(enabled).finish(),
            Autoescape::ByName(_) => f.write_str("ByName(..)"),
        }
    }
}

/// What happens when an undefined value is emitted or iterated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UndefinedPolicy {
    /// Render as empty output, iterate as an empty sequence
    #[default]
    Lenient,
    /// Fail with [`UndefinedError`](crate::UndefinedError)
    Strict,
}

/// Shared render configuration
pub struct Config {
    autoescape: Autoescape,
    filters: Arc<FilterTable>,
    tests: Arc<TestTable>,
    loader: Arc<dyn TemplateLoader>,
    path_joiner: Option<PathJoiner>,
    undefined: UndefinedPolicy,
    unpacking: Unpacking,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<_> = self.filters.keys().collect();
        filters.sort();
        let mut tests: Vec<_> = self.tests.keys().collect();
        tests.sort();
        f.debug_struct("Config")
            .field("autoescape", &self.autoescape)
            .field("filters", &filters)
            .field("tests", &tests)
            .field("undefined", &self.undefined)
            .field("unpacking", &self.unpacking)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

impl Config {
    /// Start building a configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Initial autoescape flag for `template_name`
    pub fn get_autoescape_default(&self, template_name: Option<&str>) -> bool {
        match &self.autoescape {
            Autoescape::Always(enabled) => *enabled,
            Autoescape::ByName(decide) => decide(template_name),
        }
    }

    /// The filter table sessions are created with
    pub fn get_filters(&self) -> Arc<FilterTable> {
        Arc::clone(&self.filters)
    }

    /// The test table sessions are created with
    pub fn get_tests(&self) -> Arc<TestTable> {
        Arc::clone(&self.tests)
    }

    /// Load `name` from the configured loader, bypassing any render cache
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>> {
        self.loader.load(name)
    }

    /// Resolve `name` as referenced from `from`; identity unless a joiner is set
    pub fn join_path(&self, name: &str, from: Option<&str>) -> String {
        match &self.path_joiner {
            Some(join) => join(name, from),
            None => name.to_string(),
        }
    }

    /// The undefined policy in effect
    pub fn undefined_policy(&self) -> UndefinedPolicy {
        self.undefined
    }

    /// How tuple bindings in loops and assignments destructure
    pub fn unpacking(&self) -> Unpacking {
        self.unpacking
    }

    /// Run `template` against `context`, writing to `out`.
    ///
    /// Pass a `session` to render inside an existing one (sharing its block
    /// registry and template cache); otherwise a fresh session is created.
    pub fn evaluate_template(
        self: &Arc<Self>,
        template: &Template,
        context: Context,
        out: &mut dyn fmt::Write,
        session: Option<Rc<Session>>,
    ) -> Result<()> {
        let span = tracing::debug_span!("render", template = template.name());
        let _guard = span.enter();

        let session = session
            .unwrap_or_else(|| Rc::new(Session::new(Arc::clone(self), Some(template.name()))));
        tracing::debug!(autoescape = session.autoescape(), "rendering template");

        let scope = Scope::root(context.into_vars());
        let mut state = RuntimeState::new(session, scope, out);
        template.run(&mut state)
    }

    /// Render `template` to a string
    pub fn render(self: &Arc<Self>, template: &Template, context: Context) -> Result<String> {
        let mut out = String::new();
        self.evaluate_template(template, context, &mut out, None)?;
        Ok(out)
    }

    /// Load `name` through the loader and render it to a string
    pub fn render_named(self: &Arc<Self>, name: &str, context: Context) -> Result<String> {
        let session = Rc::new(Session::new(Arc::clone(self), Some(name)));
        let template = session.get_template(name)?;
        let mut out = String::new();
        self.evaluate_template(&template, context, &mut out, Some(session))?;
        Ok(out)
    }
}

/// Builder for [`Config`]
pub struct ConfigBuilder {
    autoescape: Autoescape,
    filters: FilterTable,
    tests: TestTable,
    loader: Arc<dyn TemplateLoader>,
    path_joiner: Option<PathJoiner>,
    undefined: UndefinedPolicy,
    unpacking: Unpacking,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            autoescape: Autoescape::Always(false),
            filters: HashMap::new(),
            tests: HashMap::new(),
            loader: Arc::new(InMemoryLoader::new()),
            path_joiner: None,
            undefined: UndefinedPolicy::default(),
            unpacking: Unpacking::default(),
        }
    }
}

impl ConfigBuilder {
    /// Autoescape every template, or none
    pub fn autoescape(mut self, enabled: bool) -> Self {
        self.autoescape = Autoescape::Always(enabled);
        self
    }

    /// Decide autoescaping per template name
    pub fn autoescape_with<F>(mut self, decide: F) -> Self
    where
        F: Fn(Option<&str>) -> bool + Send + Sync + 'static,
    {
        self.autoescape = Autoescape::ByName(Arc::new(decide));
        self
    }

    /// Register filter `name`, replacing any previous one
    pub fn filter<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(f));
        self
    }

    /// Register test `name`, replacing any previous one
    pub fn test<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<bool> + Send + Sync + 'static,
    {
        self.tests.insert(name.into(), Arc::new(f));
        self
    }

    /// Where extends, include and import find templates
    pub fn loader(mut self, loader: impl TemplateLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Resolve template references relative to the referencing template
    pub fn path_joiner<F>(mut self, join: F) -> Self
    where
        F: Fn(&str, Option<&str>) -> String + Send + Sync + 'static,
    {
        self.path_joiner = Some(Arc::new(join));
        self
    }

    /// How undefined values behave when emitted or iterated
    pub fn undefined(mut self, policy: UndefinedPolicy) -> Self {
        self.undefined = policy;
        self
    }

    /// How tuple bindings treat elements that don't fit
    pub fn unpacking(mut self, unpacking: Unpacking) -> Self {
        self.unpacking = unpacking;
        self
    }

    /// Finish the configuration
    pub fn build(self) -> Config {
        Config {
            autoescape: self.autoescape,
            filters: Arc::new(self.filters),
            tests: Arc::new(self.tests),
            loader: self.loader,
            path_joiner: self.path_joiner,
            undefined: self.undefined,
            unpacking: self.unpacking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_defaults_to_identity() {
        let config = Config::default();
        assert_eq!(config.join_path("a.html", Some("dir/b.html")), "a.html");

        let config = Config::builder()
            .path_joiner(|name, from| match from.and_then(|f| f.rsplit_once('/')) {
                Some((dir, _)) => format!("{dir}/{name}"),
                None => name.to_string(),
            })
            .build();
        assert_eq!(config.join_path("a.html", Some("dir/b.html")), "dir/a.html");
        assert_eq!(config.join_path("a.html", None), "a.html");
    }

    #[test]
    fn autoescape_defaults() {
        assert!(!Config::default().get_autoescape_default(Some("x.html")));
        let config = Config::builder()
            .autoescape_with(|name| name.is_some_and(|n| n.ends_with(".html")))
            .build();
        assert!(config.get_autoescape_default(Some("x.html")));
        assert!(!config.get_autoescape_default(Some("x.txt")));
        assert!(!config.get_autoescape_default(None));
    }

    #[test]
    fn debug_lists_filter_names() {
        let config = Config::builder()
            .filter("b", |v, _| Ok(v.clone()))
            .filter("a", |v, _| Ok(v.clone()))
            .test("defined", |v, _| Ok(!v.is_undefined()))
            .build();
        insta::assert_snapshot!(format!("{config:?}"), @r#"Config { autoescape: Always(false), filters: ["a", "b"], tests: ["defined"], undefined: Lenient, unpacking: Unpacking { strict: false, allow_non_iterable: false }, .. }"#);
    }

    #[test]
    fn render_named_uses_the_loader() {
        let loader = InMemoryLoader::new().with(
            Template::builder("greet")
                .root(|rt| {
                    rt.write("hi ")?;
                    let who = rt.lookup("who");
                    rt.emit(&who)
                })
                .build(),
        );
        let config = Arc::new(Config::builder().loader(loader).build());
        let out = config
            .render_named("greet", Context::new().with("who", "there"))
            .unwrap();
        assert_eq!(out, "hi there");

        let err = config.render_named("nope", Context::new()).unwrap_err();
        assert!(err.is_template_not_found());
    }
}
