//! Partially dynamic expected-output templates.
//!
//! Template source is plain text with three kinds of actions:
//! - `{{name}}` - a placeholder bound to a function returning text
//! - `{{.Field}}` - a reference to a session attribute (`.Datadir`, `.Account`)
//! - `{{if name}}...{{end}}` - a block gated by a function returning a bool
//!
//! Every name is resolved against a [`Bindings`] value while parsing, so a
//! template that parses successfully can always be expanded.

use std::{collections::BTreeMap, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::endpoint::{Endpoint, Transport};

type TextFn = Arc<dyn Fn() -> String + Send + Sync>;
type FlagFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Template error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unbound placeholder: {0}")]
    Unbound(String),
    #[error("Placeholder {name} is bound to a {bound} but used as a {used}")]
    WrongKind {
        name: String,
        bound: &'static str,
        used: &'static str,
    },
    #[error("Unknown session field: .{0}")]
    UnknownField(String),
    #[error("Unterminated action starting at byte {0}")]
    Unterminated(usize),
    #[error("{{{{end}}}} without an open {{{{if}}}} at byte {0}")]
    UnmatchedEnd(usize),
    #[error("Missing {{{{end}}}} for {{{{if {0}}}}}")]
    UnclosedIf(String),
    #[error("Session field .{0} has no value")]
    UnresolvedField(&'static str),
}

/// Session attributes a template can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionField {
    /// Working/data directory of the session.
    Datadir,
    /// Default account the daemon was started with.
    Account,
}

impl SessionField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "Datadir" => Some(Self::Datadir),
            "Account" => Some(Self::Account),
            _ => None,
        }
    }

    /// Name as written after the dot.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Datadir => "Datadir",
            Self::Account => "Account",
        }
    }
}

/// Supplies session attribute values during expansion.
pub trait FieldSource {
    /// Value of a field, or `None` if the session does not carry it.
    fn field(&self, field: SessionField) -> Option<String>;
}

/// Named functions available to a template.
#[derive(Clone, Default)]
pub struct Bindings {
    text: BTreeMap<String, TextFn>,
    flags: BTreeMap<String, FlagFn>,
}

impl Bindings {
    /// Empty binding set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a placeholder to a function returning text.
    #[must_use]
    pub fn text<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.text.insert(name.into(), Arc::new(f));
        self
    }

    /// Bind a placeholder to a constant.
    #[must_use]
    pub fn value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        self.text(name, move || value.clone())
    }

    /// Bind a condition name to a function returning a bool.
    #[must_use]
    pub fn flag<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.flags.insert(name.into(), Arc::new(f));
        self
    }

    /// Bindings every banner template needs: `os`, `arch`, `version`,
    /// `toolchain` and `niltime`.
    #[must_use]
    pub fn standard(version: impl Into<String>, toolchain: impl Into<String>) -> Self {
        Self::new()
            .text("os", || std::env::consts::OS.to_string())
            .text("arch", || std::env::consts::ARCH.to_string())
            .value("version", version)
            .value("toolchain", toolchain)
            .text("niltime", genesis_time)
    }

    /// Add `apis`, the module advertisement of `endpoint`, and the `ipc`
    /// condition, true only for IPC endpoints.
    #[must_use]
    pub fn endpoint(self, endpoint: &Endpoint) -> Self {
        let ipc = endpoint.transport() == Transport::Ipc;
        self.value("apis", endpoint.apis()).flag("ipc", move || ipc)
    }

    fn resolve_text(&self, name: &str) -> Result<TextFn, TemplateError> {
        if let Some(f) = self.text.get(name) {
            return Ok(Arc::clone(f));
        }
        if self.flags.contains_key(name) {
            return Err(TemplateError::WrongKind {
                name: name.to_string(),
                bound: "condition",
                used: "value",
            });
        }
        Err(TemplateError::Unbound(name.to_string()))
    }

    fn resolve_flag(&self, name: &str) -> Result<FlagFn, TemplateError> {
        if let Some(f) = self.flags.get(name) {
            return Ok(Arc::clone(f));
        }
        if self.text.contains_key(name) {
            return Err(TemplateError::WrongKind {
                name: name.to_string(),
                bound: "value",
                used: "condition",
            });
        }
        Err(TemplateError::Unbound(name.to_string()))
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("text", &self.text.keys().collect::<Vec<_>>())
            .field("flags", &self.flags.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// RFC 1123 rendering of the genesis block time (the Unix epoch, UTC).
#[must_use]
pub fn genesis_time() -> String {
    rfc1123(DateTime::<Utc>::default())
}

/// Format a UTC timestamp as RFC 1123, e.g. `Thu, 01 Jan 1970 00:00:00 UTC`.
#[must_use]
pub fn rfc1123(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S UTC").to_string()
}

/// One parsed template segment.
#[derive(Clone)]
pub enum Segment {
    Literal(String),
    Placeholder { name: String, value: TextFn },
    Field(SessionField),
    Conditional {
        name: String,
        gate: FlagFn,
        body: Vec<Segment>,
    },
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Self::Placeholder { name, .. } => f.debug_tuple("Placeholder").field(name).finish(),
            Self::Field(field) => f.debug_tuple("Field").field(field).finish(),
            Self::Conditional { name, body, .. } => f
                .debug_struct("Conditional")
                .field("name", name)
                .field("body", body)
                .finish(),
        }
    }
}

/// A flattened expectation: what the output must contain, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Text that must appear verbatim.
    Literal(String),
    /// A computed value; `label` names the placeholder or field it came from.
    Dynamic { label: String, value: String },
}

/// An immutable expected-output template.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template source against a binding set.
    ///
    /// Exactly one leading newline is dropped so templates can be written
    /// starting at column 0.
    ///
    /// # Errors
    /// Returns error on malformed actions or names missing from `bindings`.
    pub fn parse(source: &str, bindings: &Bindings) -> Result<Self, TemplateError> {
        let source = source.strip_prefix('\n').unwrap_or(source);
        let mut root: Vec<Segment> = Vec::new();
        let mut open: Vec<(String, FlagFn, Vec<Segment>)> = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            let (text, tail) = rest.split_at(start);
            let Some(end) = tail.find("}}") else {
                return Err(TemplateError::Unterminated(offset + start));
            };
            let action = tail[2..end].trim();
            let current = open.last_mut().map_or(&mut root, |(_, _, body)| body);
            if !text.is_empty() {
                current.push(Segment::Literal(text.to_string()));
            }

            if let Some(name) = action.strip_prefix("if ") {
                let name = name.trim();
                let gate = bindings.resolve_flag(name)?;
                open.push((name.to_string(), gate, Vec::new()));
            } else if action == "end" {
                let Some((name, gate, body)) = open.pop() else {
                    return Err(TemplateError::UnmatchedEnd(offset + start));
                };
                let parent = open.last_mut().map_or(&mut root, |(_, _, body)| body);
                parent.push(Segment::Conditional { name, gate, body });
            } else if let Some(field) = action.strip_prefix('.') {
                let field = SessionField::parse(field)
                    .ok_or_else(|| TemplateError::UnknownField(field.to_string()))?;
                current.push(Segment::Field(field));
            } else {
                let value = bindings.resolve_text(action)?;
                current.push(Segment::Placeholder {
                    name: action.to_string(),
                    value,
                });
            }

            let consumed = start + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }

        if let Some((name, _, _)) = open.pop() {
            return Err(TemplateError::UnclosedIf(name));
        }
        if !rest.is_empty() {
            root.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments: root })
    }

    /// A template that is a single literal run.
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Literal(text.into())],
        }
    }

    /// Parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Evaluate every placeholder, field and condition once and flatten the
    /// result. Adjacent literals are merged.
    ///
    /// # Errors
    /// Returns error if a referenced session field has no value.
    pub fn expand(&self, fields: &dyn FieldSource) -> Result<Vec<Piece>, TemplateError> {
        let mut pieces = Vec::new();
        expand_into(&self.segments, fields, &mut pieces)?;
        Ok(pieces)
    }

    /// Expand and concatenate into the full expected text.
    ///
    /// # Errors
    /// Returns error if a referenced session field has no value.
    pub fn render(&self, fields: &dyn FieldSource) -> Result<String, TemplateError> {
        Ok(self
            .expand(fields)?
            .into_iter()
            .map(|piece| match piece {
                Piece::Literal(text) => text,
                Piece::Dynamic { value, .. } => value,
            })
            .collect())
    }
}

fn expand_into(
    segments: &[Segment],
    fields: &dyn FieldSource,
    out: &mut Vec<Piece>,
) -> Result<(), TemplateError> {
    for segment in segments {
        match segment {
            Segment::Literal(text) => push_literal(out, text),
            Segment::Placeholder { name, value } => out.push(Piece::Dynamic {
                label: name.clone(),
                value: value(),
            }),
            Segment::Field(field) => {
                let value = fields
                    .field(*field)
                    .ok_or(TemplateError::UnresolvedField(field.name()))?;
                out.push(Piece::Dynamic {
                    label: format!(".{}", field.name()),
                    value,
                });
            }
            Segment::Conditional { gate, body, .. } => {
                if gate() {
                    expand_into(body, fields, out)?;
                }
            }
        }
    }
    Ok(())
}

fn push_literal(out: &mut Vec<Piece>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Piece::Literal(prev)) = out.last_mut() {
        prev.push_str(text);
    } else {
        out.push(Piece::Literal(text.to_string()));
    }
}
