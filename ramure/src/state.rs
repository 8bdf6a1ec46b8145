//! Runtime state handed to compiled template code
//!
//! A [`RuntimeState`] bundles the current scope, the session and the output
//! sink. Compiled code never touches those directly: it calls the
//! operations here, which take care of frames, escaping, block lookup and
//! cross-template calls.

use crate::blocks::levels_up_from_level;
use crate::config::{Config, UndefinedPolicy};
use crate::error::{LookupError, RenderError, Result, UndefinedError};
use crate::loops::{Binding, ForLoop, LoopContext};
use crate::markup::{finalize, mark_safe, Markup};
use crate::scope::Scope;
use crate::session::{Behavior, Session};
use crate::template::Template;
use crate::value::Value;
use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;
use std::sync::Arc;

/// Name the loop context is bound to inside a loop body
pub const LOOP_VAR: &str = "loop";

/// Adapts a closure into an output sink
pub struct FnOutput<F>(pub F);

impl<F: FnMut(&str)> fmt::Write for FnOutput<F> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        (self.0)(s);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct ActiveBlock {
    name: String,
    levels_up: usize,
}

/// Everything a running template can see and do
pub struct RuntimeState<'out> {
    session: Rc<Session>,
    scope: Rc<Scope>,
    out: &'out mut dyn fmt::Write,
    frames: usize,
    block: Option<ActiveBlock>,
}

impl fmt::Debug for RuntimeState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeState")
            .field("template", &self.session.template_name())
            .field("frames", &self.frames)
            .field("block", &self.block)
            .field("vars", &self.scope.available_vars())
            .finish_non_exhaustive()
    }
}

impl<'out> RuntimeState<'out> {
    /// A state at the top level of a template
    pub fn new(session: Rc<Session>, scope: Rc<Scope>, out: &'out mut dyn fmt::Write) -> Self {
        Self {
            session,
            scope,
            out,
            frames: 0,
            block: None,
        }
    }

    fn child(&mut self, session: Rc<Session>, scope: Rc<Scope>) -> RuntimeState<'_> {
        RuntimeState {
            session,
            scope,
            out: &mut *self.out,
            frames: 0,
            block: None,
        }
    }

    /// The session of the running template
    pub fn session(&self) -> &Rc<Session> {
        &self.session
    }

    /// The shared configuration
    pub fn config(&self) -> &Arc<Config> {
        self.session.config()
    }

    /// The innermost node of the scope chain
    pub fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }

    /// Name of the running template
    pub fn template_name(&self) -> Option<&str> {
        self.session.template_name()
    }

    /// Whether assignments here are visible to importers
    pub fn is_toplevel(&self) -> bool {
        self.frames == 0
    }

    /// Resolve a variable; unbound names yield the undefined marker
    pub fn lookup(&self, name: &str) -> Value {
        self.scope.lookup(name)
    }

    /// Bind `name` in the current frame, exporting it at the top level
    pub fn assign(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if self.is_toplevel() {
            self.session.export_var(&name, value.clone());
        }
        self.scope = self.scope.overlay([(name, value)]);
    }

    /// Destructure `value` into the names of `binding`
    pub fn assign_binding(&mut self, binding: &Binding, value: Value) -> Result<()> {
        let mut values = Vec::new();
        binding.unpack(value, self.config().unpacking(), &mut values)?;
        let names: Vec<String> = binding.names().into_iter().map(str::to_string).collect();
        for (name, value) in names.into_iter().zip(values) {
            self.assign(name, value);
        }
        Ok(())
    }

    /// Run `f` in a nested frame; bindings made inside do not leak out
    pub fn with_frame<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = Rc::clone(&self.scope);
        self.frames += 1;
        let result = f(self);
        self.frames -= 1;
        self.scope = saved;
        result
    }

    /// Emit literal template text verbatim
    pub fn write(&mut self, text: &str) -> Result<()> {
        self.out.write_str(text)?;
        Ok(())
    }

    /// Emit an expression result, escaping it when autoescape is on
    pub fn emit(&mut self, value: &Value) -> Result<()> {
        if let Value::Undefined(undefined) = value {
            if self.config().undefined_policy() == UndefinedPolicy::Strict {
                return Err(UndefinedError {
                    name: undefined.name().to_string(),
                }
                .into());
            }
        }
        let text = finalize(value, self.session.autoescape());
        self.write(&text)
    }

    /// Wrap `value` as trusted markup when autoescape is on.
    ///
    /// The undefined marker is passed through so the undefined policy
    /// still applies when it is emitted.
    pub fn mark_safe_if_autoescape(&self, value: Value) -> Value {
        if self.session.autoescape() && !value.is_undefined() {
            Value::Markup(mark_safe(&value))
        } else {
            value
        }
    }

    /// Run `f` with autoescape forced on or off, restoring it afterwards
    pub fn with_autoescape<T>(
        &mut self,
        enabled: bool,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = self.session.autoescape();
        self.session.set_autoescape(enabled);
        let result = f(self);
        self.session.set_autoescape(saved);
        result
    }

    /// Apply filter `name` to `value`
    pub fn call_filter(&self, name: &str, value: &Value, args: &[Value]) -> Result<Value> {
        self.session.call_filter(name, value, args)
    }

    /// Evaluate test `name` against `value`
    pub fn call_test(&self, name: &str, value: &Value, args: &[Value]) -> Result<bool> {
        self.session.call_test(name, value, args)
    }

    /// Run `body` once per element of `iterable`.
    ///
    /// Each iteration gets a fresh frame with the target names and
    /// [`LOOP_VAR`] bound. Returns whether any element was visited.
    pub fn for_loop<B>(&mut self, iterable: &Value, binding: &Binding, mut body: B) -> Result<bool>
    where
        B: FnMut(&mut Self, &LoopContext) -> Result<ControlFlow<()>>,
    {
        if let Value::Undefined(undefined) = iterable {
            if self.config().undefined_policy() == UndefinedPolicy::Strict {
                return Err(UndefinedError {
                    name: undefined.name().to_string(),
                }
                .into());
            }
        }

        let parent = match self.lookup(LOOP_VAR) {
            Value::Loop(ctx) => Some(ctx),
            _ => None,
        };
        let for_loop = ForLoop::new(iterable)?
            .parent(parent.as_deref())
            .unpacking(self.config().unpacking());
        let names: Vec<String> = binding.names().into_iter().map(str::to_string).collect();

        let saved = Rc::clone(&self.scope);
        self.frames += 1;
        let visited = for_loop.run(binding, |ctx, values| {
            let mut bindings = Vec::with_capacity(names.len() + 1);
            bindings.push((LOOP_VAR.to_string(), Value::from(ctx.clone())));
            bindings.extend(names.iter().cloned().zip(values.iter().cloned()));
            self.scope = saved.overlay(bindings);
            body(self, ctx)
        });
        self.frames -= 1;
        self.scope = saved;
        Ok(visited? > 0)
    }

    /// [`RuntimeState::for_loop`] with an `else` body for empty sequences
    pub fn for_loop_else<B, E>(
        &mut self,
        iterable: &Value,
        binding: &Binding,
        body: B,
        otherwise: E,
    ) -> Result<()>
    where
        B: FnMut(&mut Self, &LoopContext) -> Result<ControlFlow<()>>,
        E: FnOnce(&mut Self) -> Result<()>,
    {
        if !self.for_loop(iterable, binding, body)? {
            self.with_frame(otherwise)?;
        }
        Ok(())
    }

    /// Render the definition of block `name`, `levels_up` steps from the
    /// most specific override
    pub fn evaluate_block(&mut self, name: &str, levels_up: usize) -> Result<()> {
        let executor = self.session.resolve_block(name, levels_up)?;
        let session = Rc::clone(&self.session);
        let scope = Rc::clone(&self.scope);
        let mut state = self.child(session, scope);
        state.frames = 1;
        state.block = Some(ActiveBlock {
            name: name.to_string(),
            levels_up,
        });
        executor(&mut state)
    }

    /// [`RuntimeState::evaluate_block`] with the negative-level convention
    pub fn evaluate_block_level(&mut self, name: &str, level: isize) -> Result<()> {
        let levels_up = levels_up_from_level(level).ok_or_else(|| LookupError::InvalidBlockLevel {
            name: name.to_string(),
            level,
        })?;
        self.evaluate_block(name, levels_up)
    }

    /// Render the definition the current block overrides
    pub fn super_block(&mut self) -> Result<()> {
        let active = self.block.clone().ok_or(LookupError::NotInBlock)?;
        self.evaluate_block(&active.name, active.levels_up + 1)
    }

    /// Hand rendering over to the template this one extends.
    ///
    /// The parent runs with the same scope and sink. Its blocks register
    /// into the shared registry behind the ones already collected.
    pub fn extend_template(&mut self, name: &str) -> Result<()> {
        let resolved = self.config().join_path(name, self.template_name());
        let template = self.session.get_template(&resolved)?;
        let session = Rc::new(self.session.derive(&resolved, Behavior::Extends));
        let scope = Rc::clone(&self.scope);
        template.run(&mut self.child(session, scope))
    }

    /// Render another template inline with the current scope
    pub fn include_template(&mut self, name: &str, ignore_missing: bool) -> Result<()> {
        let resolved = self.config().join_path(name, self.template_name());
        let template = match self.session.get_template(&resolved) {
            Ok(template) => template,
            Err(e) if ignore_missing && e.is_template_not_found() => {
                tracing::warn!(template = %resolved, "skipping missing include");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.run_included(&resolved, &template)
    }

    /// Render the first of `names` that exists
    pub fn include_first_of(&mut self, names: &[&str], ignore_missing: bool) -> Result<()> {
        let resolved: Vec<String> = names
            .iter()
            .map(|name| self.config().join_path(name, self.template_name()))
            .collect();
        let candidates: Vec<&str> = resolved.iter().map(String::as_str).collect();
        let (name, template) = match self.session.select_template(&candidates) {
            Ok(found) => found,
            Err(RenderError::Lookup(LookupError::NoTemplateSelected { .. })) if ignore_missing => {
                tracing::warn!(templates = ?candidates, "skipping missing include");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let name = name.to_string();
        self.run_included(&name, &template)
    }

    fn run_included(&mut self, name: &str, template: &Template) -> Result<()> {
        let session = Rc::new(self.session.derive(name, Behavior::Include));
        let scope = Rc::clone(&self.scope);
        template.run(&mut self.child(session, scope))
    }

    /// Render `name` into a module exposing its top-level assignments
    pub fn import_template(&mut self, name: &str) -> Result<Value> {
        let resolved = self.config().join_path(name, self.template_name());
        let template = self.session.get_template(&resolved)?;
        let session = Rc::new(self.session.derive(&resolved, Behavior::Import));

        let mut body = String::new();
        let mut state = RuntimeState::new(Rc::clone(&session), Rc::clone(&self.scope), &mut body);
        template.run(&mut state)?;
        drop(state);

        Ok(session.make_module(&resolved, body).into())
    }

    /// Import `name` and bind selected exports: `(exported, bound_as)`
    pub fn from_import(&mut self, name: &str, items: &[(&str, &str)]) -> Result<()> {
        let module = self.import_template(name)?;
        for (exported, bound_as) in items {
            let value = module.get_attr(exported);
            self.assign(*bound_as, value);
        }
        Ok(())
    }

    /// Capture the output of `body` and pipe it through filter `name`.
    ///
    /// The body output is trusted markup; the filter result is written
    /// without further escaping.
    pub fn filter_block<F>(&mut self, name: &str, args: &[Value], body: F) -> Result<()>
    where
        F: FnOnce(&mut RuntimeState<'_>) -> Result<()>,
    {
        let mut captured = String::new();
        let mut inner = RuntimeState {
            session: Rc::clone(&self.session),
            scope: Rc::clone(&self.scope),
            out: &mut captured,
            frames: self.frames + 1,
            block: self.block.clone(),
        };
        body(&mut inner)?;
        drop(inner);

        let filtered = self.call_filter(name, &Value::Markup(Markup::from_safe(captured)), args)?;
        self.write(&filtered.render_to_string())
    }

    /// Record a variable for importers regardless of frame depth
    pub fn export_var(&self, name: &str, value: Value) {
        self.session.export_var(name, value);
    }
}
