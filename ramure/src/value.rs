//! Runtime values
//!
//! Everything compiled template code moves around is a [`Value`]. Looking
//! up a name that is not bound yields [`Value::Undefined`], which remembers
//! the name so the finalize step (or a strict policy) can report it later.

use crate::error::{Result, TypeError};
use crate::loops::LoopContext;
use crate::markup::Markup;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// The marker produced for a name that resolved to nothing.
///
/// Distinct from every real value, including `0`, `""` and [`Value::None`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Undefined {
    name: Arc<str>,
}

impl Undefined {
    /// The marker for a lookup of `name`
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
        }
    }

    /// The name whose lookup produced this marker
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Text produced by rendering a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedText {
    /// The rendered text
    pub text: String,
    /// `true` when the text must not be escaped again
    pub safe: bool,
}

impl RenderedText {
    /// Text that still needs escaping
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            safe: false,
        }
    }

    /// Text that is already safe markup
    pub fn safe(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            safe: true,
        }
    }
}

/// Capability to turn something into emittable text.
///
/// Plain values, [`Markup`] and custom objects all go through this, so
/// escaping never has to guess whether a value is already safe.
pub trait RenderAsText {
    /// The text to emit and whether it is already safe
    fn render_as_text(&self) -> RenderedText;
}

/// A host object exposed to templates.
///
/// Implementors decide how they render and which attributes they answer.
pub trait Object: RenderAsText + fmt::Debug + Send + Sync {
    /// Resolve `obj.name`. `None` becomes the undefined marker.
    fn get_attr(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Short type name used in error messages
    fn type_name(&self) -> &'static str {
        "object"
    }
}

/// The result of importing a template: its exported top-level variables
/// and the output it produced while running.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    name: String,
    exports: IndexMap<String, Value>,
    body: String,
}

impl Module {
    /// A filter failure with a message
    pub fn new(name: impl Into<String>, exports: IndexMap<String, Value>, body: String) -> Self {
        Self {
            name: name.into(),
            exports,
            body,
        }
    }

    /// Resolved name of the imported template
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-level variables, in assignment order
    pub fn exports(&self) -> &IndexMap<String, Value> {
        &self.exports
    }

    /// Output the template produced while being imported
    pub fn body(&self) -> &str {
        &self.body
    }

    /// The exported variable `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.exports.get(name)
    }
}

/// A runtime value in the template
#[derive(Debug, Clone)]
pub enum Value {
    /// A name that resolved to nothing
    Undefined(Undefined),
    /// The explicit absence of a value
    None,
    /// A boolean
    Bool(bool),
    /// An integer
    Int(i64),
    /// A floating point number
    Float(f64),
    /// Plain text, escaped on output when autoescape is on
    String(String),
    /// Text that must not be escaped when emitted
    Markup(Markup),
    /// An ordered sequence
    List(Vec<Value>),
    /// Keyed collection; iteration order is insertion order
    Map(IndexMap<String, Value>),
    /// Snapshot of the enclosing loop's metadata (the `loop` variable)
    Loop(Arc<LoopContext>),
    /// An imported template
    Module(Arc<Module>),
    /// A host object with its own rendering
    Object(Arc<dyn Object>),
}

impl Value {
    /// The undefined marker for `name`
    pub fn undefined(name: &str) -> Self {
        Value::Undefined(Undefined::new(name))
    }

    /// Whether this is the undefined marker
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined(_))
    }

    /// Truthiness in conditions: empty and zero values are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined(_) | Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Markup(m) => !m.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Loop(_) | Value::Module(_) | Value::Object(_) => true,
        }
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined(_) => "undefined",
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Markup(_) => "markup",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Loop(_) => "loop",
            Value::Module(_) => "module",
            Value::Object(obj) => obj.type_name(),
        }
    }

    /// The value's string form, without any escaping
    pub fn render_to_string(&self) -> String {
        match self {
            Value::Undefined(_) | Value::None => String::new(),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Markup(m) => m.as_str().to_string(),
            Value::List(l) => {
                let items: Vec<_> = l.iter().map(|v| v.render_to_string()).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Map(_) => "[object]".to_string(),
            Value::Loop(ctx) => format!("<loop {}/{}>", ctx.index(), ctx.length()),
            Value::Module(module) => module.body().to_string(),
            Value::Object(obj) => obj.render_as_text().text,
        }
    }

    /// The ordered elements this value iterates over, if it is iterable.
    ///
    /// Maps iterate over their keys, strings over their characters.
    pub fn as_sequence(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.clone()),
            Value::Map(map) => Some(map.keys().map(|k| Value::String(k.clone())).collect()),
            Value::String(s) => Some(s.chars().map(|c| Value::String(c.to_string())).collect()),
            _ => None,
        }
    }

    /// Resolve `value.name`; anything unresolvable is the undefined marker
    pub fn get_attr(&self, name: &str) -> Value {
        let found = match self {
            Value::Map(map) => map.get(name).cloned(),
            Value::Module(module) => module.get(name).cloned(),
            Value::Loop(ctx) => return ctx.get_attr(name),
            Value::Object(obj) => obj.get_attr(name),
            _ => None,
        };
        found.unwrap_or_else(|| Value::undefined(name))
    }

    /// Resolve `value[key]`; negative list and string indices count from the end
    pub fn get_item(&self, key: &Value) -> Value {
        let found = match (self, key) {
            (Value::List(list), Value::Int(i)) => {
                resolve_index(*i, list.len()).and_then(|i| list.get(i).cloned())
            }
            (Value::String(s), Value::Int(i)) => {
                let len = s.chars().count();
                resolve_index(*i, len)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(c.to_string()))
            }
            (Value::Map(_) | Value::Module(_) | Value::Loop(_) | Value::Object(_), Value::String(k)) => {
                return self.get_attr(k);
            }
            _ => None,
        };
        found.unwrap_or_else(|| Value::undefined(&key.render_to_string()))
    }

    /// Call a method exposed by the value (`loop.cycle(...)`)
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value> {
        match (self, name) {
            (Value::Loop(ctx), "cycle") => ctx.cycle(args),
            _ => Err(TypeError {
                expected: format!("a value with a `{name}` method"),
                found: self.type_name().to_string(),
                context: "calling a method".to_string(),
            }
            .into()),
        }
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index < 0 {
        len.checked_sub(usize::try_from(index.unsigned_abs()).ok()?)
    } else {
        usize::try_from(index).ok()
    }
}

impl RenderAsText for Value {
    fn render_as_text(&self) -> RenderedText {
        match self {
            Value::Markup(m) => RenderedText::safe(m.as_str()),
            // a module renders as output that was already finalized
            Value::Module(module) => RenderedText::safe(module.body()),
            Value::Object(obj) => obj.render_as_text(),
            other => RenderedText::plain(other.render_to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined(a), Value::Undefined(b)) => a == b,
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Markup(a), Value::Markup(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Loop(a), Value::Loop(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Markup> for Value {
    fn from(m: Markup) -> Self {
        Value::Markup(m)
    }
}

impl From<Module> for Value {
    fn from(m: Module) -> Self {
        Value::Module(Arc::new(m))
    }
}

impl From<LoopContext> for Value {
    fn from(ctx: LoopContext) -> Self {
        Value::Loop(Arc::new(ctx))
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::None, Into::into)
    }
}
