#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod blocks;
mod config;
mod error;
mod loader;
mod loops;
mod markup;
mod scope;
mod session;
mod state;
mod template;
mod value;

pub use blocks::{block_fn, levels_up_from_level, resolve_override, BlockFn, BlockRegistry};
pub use config::{
    Autoescape, Config, ConfigBuilder, FilterFn, FilterTable, PathJoiner, TestFn, TestTable,
    UndefinedPolicy,
};
pub use error::{
    FilterError, LookupError, RenderError, Result, TypeError, UndefinedError, UnpackError,
};
pub use loader::{InMemoryLoader, TemplateLoader};
pub use loops::{iterate, Binding, ForLoop, LoopContext, Unpacking};
pub use markup::{escape, escape_str, finalize, mark_safe, Markup};
pub use scope::{Context, Scope};
pub use session::{Behavior, Session};
pub use state::{FnOutput, RuntimeState, LOOP_VAR};
pub use template::{RenderFn, Template, TemplateBuilder};
pub use value::{Module, Object, RenderAsText, RenderedText, Undefined, Value};
