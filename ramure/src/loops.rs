//! Loop iteration protocol
//!
//! The iterable is normalized into an ordered sequence up front so the
//! length is known before the first element, which is what makes `last`,
//! `revindex` and `revindex0` available without re-scanning. A single
//! [`LoopContext`] is advanced in place across iterations.

use crate::error::{Result, TypeError, UnpackError};
use crate::value::Value;
use std::ops::ControlFlow;
use std::sync::Arc;

/// Positional metadata for the current iteration
#[derive(Debug, Clone, PartialEq)]
pub struct LoopContext {
    index0: usize,
    length: usize,
    parent: Option<Arc<LoopContext>>,
}

impl LoopContext {
    /// Context for the first element of a `length`-element loop
    pub fn new(length: usize, parent: Option<&LoopContext>) -> Self {
        Self {
            index0: 0,
            length,
            parent: parent.map(|p| Arc::new(p.clone())),
        }
    }

    /// Zero-based position
    pub fn index0(&self) -> usize {
        self.index0
    }

    /// One-based position
    pub fn index(&self) -> usize {
        self.index0 + 1
    }

    /// One-based countdown: `length` on the first iteration
    pub fn revindex(&self) -> usize {
        self.length.saturating_sub(self.index0)
    }

    /// Zero-based countdown: `length - 1` on the first iteration
    pub fn revindex0(&self) -> usize {
        self.length.saturating_sub(self.index())
    }

    /// Whether this is the first iteration
    pub fn first(&self) -> bool {
        self.index0 == 0
    }

    /// Whether this is the last iteration
    pub fn last(&self) -> bool {
        self.index() == self.length
    }

    /// Number of elements in the loop
    pub fn length(&self) -> usize {
        self.length
    }

    /// The enclosing loop's context, if this loop is nested
    pub fn parent(&self) -> Option<&LoopContext> {
        self.parent.as_deref()
    }

    /// Pick `items[index0 % items.len()]`
    pub fn cycle(&self, items: &[Value]) -> Result<Value> {
        if items.is_empty() {
            return Err(TypeError {
                expected: "at least one item".to_string(),
                found: "no items".to_string(),
                context: "cycling through loop values".to_string(),
            }
            .into());
        }
        Ok(items[self.index0 % items.len()].clone())
    }

    /// Field access from templates (`loop.index`, `loop.parent.first`, ...)
    pub fn get_attr(&self, name: &str) -> Value {
        match name {
            "index" => self.index().into(),
            "index0" => self.index0().into(),
            "revindex" => self.revindex().into(),
            "revindex0" => self.revindex0().into(),
            "first" => self.first().into(),
            "last" => self.last().into(),
            "length" => self.length().into(),
            "parent" => match &self.parent {
                Some(parent) => Value::Loop(Arc::clone(parent)),
                None => Value::None,
            },
            _ => Value::undefined(name),
        }
    }

    fn advance(&mut self) {
        self.index0 += 1;
    }
}

/// The target names an element is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// `for x in seq`: the element is bound as-is
    Name(String),
    /// `for (a, (b, c)) in seq`: the element is destructured positionally
    Tuple(Vec<Binding>),
}

impl Binding {
    /// Bind the whole element to `name`
    pub fn name(name: impl Into<String>) -> Self {
        Binding::Name(name.into())
    }

    /// Destructure the element into `items`
    pub fn tuple<I, B>(items: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Binding>,
    {
        Binding::Tuple(items.into_iter().map(Into::into).collect())
    }

    /// Flattened target names, in binding order
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Binding::Name(name) => out.push(name),
            Binding::Tuple(items) => {
                for item in items {
                    item.collect_names(out);
                }
            }
        }
    }

    /// Destructure `value` into one value per flattened name, appended to `out`
    pub fn unpack(&self, value: Value, unpacking: Unpacking, out: &mut Vec<Value>) -> Result<()> {
        let targets = match self {
            Binding::Name(_) => {
                out.push(value);
                return Ok(());
            }
            Binding::Tuple(targets) => targets,
        };

        let Some(items) = value.as_sequence() else {
            if unpacking.allow_non_iterable {
                out.extend(self.names().into_iter().map(Value::undefined));
                return Ok(());
            }
            return Err(TypeError {
                expected: "an iterable".to_string(),
                found: value.type_name().to_string(),
                context: "unpacking loop targets".to_string(),
            }
            .into());
        };

        if unpacking.strict && items.len() != targets.len() {
            return Err(UnpackError {
                expected: targets.len(),
                found: items.len(),
            }
            .into());
        }

        let mut items = items.into_iter();
        for target in targets {
            match items.next() {
                Some(item) => target.unpack(item, unpacking, out)?,
                None => out.extend(target.names().into_iter().map(Value::undefined)),
            }
        }
        Ok(())
    }
}

impl From<&str> for Binding {
    fn from(name: &str) -> Self {
        Binding::Name(name.to_string())
    }
}

impl From<String> for Binding {
    fn from(name: String) -> Self {
        Binding::Name(name)
    }
}

/// How tuple bindings treat elements that don't fit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unpacking {
    /// A length mismatch is an error instead of padding or truncating
    pub strict: bool,
    /// A non-iterable element leaves every target undefined instead of failing
    pub allow_non_iterable: bool,
}

/// A loop over an already-normalized sequence
#[derive(Debug)]
pub struct ForLoop<'p> {
    items: Vec<Value>,
    parent: Option<&'p LoopContext>,
    unpacking: Unpacking,
}

impl<'p> ForLoop<'p> {
    /// Normalize `iterable` into its element sequence.
    ///
    /// An undefined iterable is treated as empty.
    pub fn new(iterable: &Value) -> Result<Self> {
        let items = match iterable {
            Value::Undefined(_) => Vec::new(),
            other => other.as_sequence().ok_or_else(|| TypeError {
                expected: "a list, map or string".to_string(),
                found: other.type_name().to_string(),
                context: "iterating in a loop".to_string(),
            })?,
        };
        Ok(Self {
            items,
            parent: None,
            unpacking: Unpacking::default(),
        })
    }

    /// The enclosing loop, exposed as `loop.parent`
    pub fn parent(mut self, parent: Option<&'p LoopContext>) -> Self {
        self.parent = parent;
        self
    }

    /// How tuple bindings treat elements that don't fit
    pub fn unpacking(mut self, unpacking: Unpacking) -> Self {
        self.unpacking = unpacking;
        self
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the loop has no elements
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Call `per_element` once per element, in order, until it breaks.
    ///
    /// Returns how many elements were visited.
    pub fn run<F>(self, binding: &Binding, mut per_element: F) -> Result<usize>
    where
        F: FnMut(&LoopContext, &[Value]) -> Result<ControlFlow<()>>,
    {
        let mut ctx = LoopContext::new(self.items.len(), self.parent);
        let mut bound = Vec::new();
        let mut visited = 0;

        for item in self.items {
            bound.clear();
            binding.unpack(item, self.unpacking, &mut bound)?;
            visited += 1;
            if per_element(&ctx, &bound)?.is_break() {
                break;
            }
            ctx.advance();
        }
        Ok(visited)
    }
}

/// Run a loop over `iterable`, calling `per_element` with the loop context
/// and the bound values for each element.
///
/// When the sequence is empty, `empty` is called instead.
pub fn iterate<F, E>(
    iterable: &Value,
    parent: Option<&LoopContext>,
    binding: &Binding,
    per_element: F,
    empty: Option<E>,
) -> Result<()>
where
    F: FnMut(&LoopContext, &[Value]) -> Result<ControlFlow<()>>,
    E: FnOnce() -> Result<()>,
{
    let for_loop = ForLoop::new(iterable)?.parent(parent);
    if for_loop.is_empty() {
        if let Some(empty) = empty {
            empty()?;
        }
        return Ok(());
    }
    for_loop.run(binding, per_element)?;
    Ok(())
}
