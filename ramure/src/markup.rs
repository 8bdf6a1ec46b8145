//! HTML escaping and the `Markup` wrapper
//!
//! [`finalize`] is the single point every emitted expression passes through,
//! so the escaping policy is the same wherever output is produced.

use crate::value::{RenderAsText, RenderedText, Value};
use std::borrow::Cow;
use std::fmt;
use std::ops::{Add, AddAssign};

/// A string that is known not to need escaping.
///
/// Concatenating two `Markup` values yields `Markup`; concatenating plain
/// text onto `Markup` escapes only the plain part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Markup(String);

impl Markup {
    /// Wrap text the caller asserts is already safe
    pub fn from_safe(text: impl Into<String>) -> Self {
        Markup(text.into())
    }

    /// Escape plain text into markup
    pub fn escape(text: &str) -> Self {
        Markup(escape_str(text).into_owned())
    }

    /// The markup text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the markup text
    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether the markup is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Append markup as-is
    pub fn push_markup(&mut self, other: &Markup) {
        self.0.push_str(&other.0);
    }

    /// Append plain text, escaping it
    pub fn push_text(&mut self, text: &str) {
        self.0.push_str(&escape_str(text));
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl RenderAsText for Markup {
    fn render_as_text(&self) -> RenderedText {
        RenderedText::safe(self.0.clone())
    }
}

impl From<Markup> for String {
    fn from(m: Markup) -> Self {
        m.0
    }
}

impl Add for Markup {
    type Output = Markup;

    fn add(mut self, rhs: Markup) -> Markup {
        self.push_markup(&rhs);
        self
    }
}

impl Add<&str> for Markup {
    type Output = Markup;

    fn add(mut self, rhs: &str) -> Markup {
        self.push_text(rhs);
        self
    }
}

impl AddAssign<&Markup> for Markup {
    fn add_assign(&mut self, rhs: &Markup) {
        self.push_markup(rhs);
    }
}

impl AddAssign<&str> for Markup {
    fn add_assign(&mut self, rhs: &str) {
        self.push_text(rhs);
    }
}

fn replacement(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '>' => Some("&gt;"),
        '<' => Some("&lt;"),
        '\'' => Some("&#39;"),
        '"' => Some("&#34;"),
        _ => None,
    }
}

/// HTML-escape `& > < ' "`. Borrows when there is nothing to replace.
pub fn escape_str(text: &str) -> Cow<'_, str> {
    let Some(first) = text.find(|c: char| replacement(c).is_some()) else {
        return Cow::Borrowed(text);
    };

    let mut out = String::with_capacity(text.len() + 16);
    out.push_str(&text[..first]);
    for c in text[first..].chars() {
        match replacement(c) {
            Some(rep) => out.push_str(rep),
            None => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Escape a value, unless it already renders as safe text
pub fn escape(value: &Value) -> Markup {
    let rendered = value.render_as_text();
    if rendered.safe {
        Markup(rendered.text)
    } else {
        Markup::escape(&rendered.text)
    }
}

/// Wrap the value's string form, asserting it needs no escaping
pub fn mark_safe(value: &Value) -> Markup {
    Markup(value.render_as_text().text)
}

/// Turn any value into emittable text under the given autoescape setting
pub fn finalize(value: &Value, autoescape: bool) -> String {
    let rendered = value.render_as_text();
    if autoescape && !rendered.safe {
        escape_str(&rendered.text).into_owned()
    } else {
        rendered.text
    }
}
