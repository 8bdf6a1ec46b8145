//! Template loading
//!
//! A [`TemplateLoader`] turns a resolved template name into a compiled
//! [`Template`]. The runtime caches the result per render, so loaders are
//! free to do expensive work.

use crate::error::{LookupError, Result};
use crate::template::Template;
use std::collections::HashMap;
use std::sync::Arc;

/// Source of compiled templates
pub trait TemplateLoader: Send + Sync {
    /// Load the template registered under `name`.
    ///
    /// A missing template must be reported as
    /// [`LookupError::TemplateNotFound`] so optional includes can skip it.
    fn load(&self, name: &str) -> Result<Arc<Template>>;
}

impl<F> TemplateLoader for F
where
    F: Fn(&str) -> Result<Arc<Template>> + Send + Sync,
{
    fn load(&self, name: &str) -> Result<Arc<Template>> {
        self(name)
    }
}

/// Templates held in memory, keyed by name
#[derive(Debug, Default, Clone)]
pub struct InMemoryLoader {
    templates: HashMap<String, Arc<Template>>,
}

impl InMemoryLoader {
    /// An empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `template` under its own name, replacing any previous one
    pub fn add(&mut self, template: Template) {
        self.templates
            .insert(template.name().to_string(), Arc::new(template));
    }

    /// Builder-style [`InMemoryLoader::add`]
    pub fn with(mut self, template: Template) -> Self {
        self.add(template);
        self
    }

    /// Number of registered templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no template is registered
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateLoader for InMemoryLoader {
    fn load(&self, name: &str) -> Result<Arc<Template>> {
        self.templates.get(name).cloned().ok_or_else(|| {
            LookupError::TemplateNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }
}
