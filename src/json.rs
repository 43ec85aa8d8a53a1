//! Structured value serializer.
//!
//! Renders a [`Value`] tree depth-first into JSON-like text. Struct members
//! appear in declaration order, union fields are labelled `field.choice` when
//! the active choice can be identified, and scalar arrays are written as one
//! bracketed list.
//!
//! In [`OutputMode::Literal`] every scalar is followed by a comma, as is every
//! closed object or array except the document root. [`OutputMode::Strict`]
//! writes separators only between siblings and produces parseable JSON.

use std::fmt::Write as _;

use crate::config::{BridgeConfig, OutputMode};
use crate::data::{Array, FieldDesc, Store, StoreKind, TypeCode, Value};

const INDENT: &str = "    ";

/// Serializer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerializeOptions {
    /// Maximum scalar array elements rendered; 0 renders all.
    pub array_limit: usize,
    /// Output dialect.
    pub mode: OutputMode,
}

impl SerializeOptions {
    /// Strict JSON with no array cap.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            array_limit: 0,
            mode: OutputMode::Strict,
        }
    }
}

impl From<&BridgeConfig> for SerializeOptions {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            array_limit: cfg.array_limit,
            mode: cfg.output,
        }
    }
}

/// Render a whole value as a document.
#[must_use]
pub fn to_json(value: &Value, opts: &SerializeOptions) -> String {
    to_json_field("", Some(value), opts)
}

/// Render `value` labelled as `name`. `None` renders as `null`.
#[must_use]
pub fn to_json_field(name: &str, value: Option<&Value>, opts: &SerializeOptions) -> String {
    let mut writer = JsonWriter::new(opts);
    writer.write_node(name, value, 0, Position::Root);
    writer.out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Root,
    Inner { last: bool },
}

struct JsonWriter<'o> {
    out: String,
    depth: usize,
    /// The next line continues after a label already written.
    inline: bool,
    opts: &'o SerializeOptions,
}

impl<'o> JsonWriter<'o> {
    fn new(opts: &'o SerializeOptions) -> Self {
        Self {
            out: String::new(),
            depth: 0,
            inline: false,
            opts,
        }
    }

    fn indent(&mut self) {
        if std::mem::take(&mut self.inline) {
            return;
        }
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    /// Separator after a scalar or a closed container.
    fn separator(&self, pos: Position, container: bool) -> &'static str {
        match (self.opts.mode, pos) {
            (OutputMode::Literal, Position::Root) if container => "",
            (OutputMode::Literal, _) => ",",
            (OutputMode::Strict, Position::Inner { last: false }) => ",",
            (OutputMode::Strict, _) => "",
        }
    }

    fn label(&mut self, name: &str) {
        self.out.push_str(&quote(name));
        self.out.push_str(": ");
    }

    fn write_node(&mut self, name: &str, value: Option<&Value>, index: usize, pos: Position) {
        let Some((desc, store)) = value.and_then(|v| v.node(index)) else {
            self.indent();
            self.out.push_str("null");
            let sep = match self.opts.mode {
                OutputMode::Literal => ",",
                OutputMode::Strict => self.separator(pos, false),
            };
            self.out.push_str(sep);
            self.out.push('\n');
            return;
        };

        if !store.fits(desc.code()) {
            self.write_invalid(name, desc, store, pos);
            return;
        }

        if let Store::Compound(inner) = store {
            self.write_compound(name, desc, inner, pos);
            return;
        }

        self.indent();
        if !name.is_empty() {
            self.label(name);
        }

        match store {
            Store::Null if desc.code() == TypeCode::Struct => {
                // `fits` guarantees a value is present whenever a descriptor is.
                if let Some(value) = value {
                    self.write_struct(value, index, desc, pos);
                }
            }
            Store::Null => match self.opts.mode {
                OutputMode::Literal => self.out.push('\n'),
                OutputMode::Strict => {
                    let sep = self.separator(pos, false);
                    let _ = writeln!(self.out, "null{sep}");
                }
            },
            Store::Real(v) => self.scalar(&self.real(*v), pos),
            Store::Integer(v) => self.scalar(&v.to_string(), pos),
            Store::UInteger(v) => self.scalar(&v.to_string(), pos),
            Store::Bool(v) => self.scalar(if *v { "true" } else { "false" }, pos),
            Store::String(v) => self.scalar(&quote(v), pos),
            Store::Array(Array::Value(elements)) => self.write_value_array(elements, pos),
            Store::Array(arr) => {
                let list = self.scalar_list(arr);
                self.scalar(&list, pos);
            }
            Store::Compound(_) => {}
        }
    }

    fn scalar(&mut self, text: &str, pos: Position) {
        let sep = self.separator(pos, false);
        self.out.push_str(text);
        self.out.push_str(sep);
        self.out.push('\n');
    }

    fn real(&self, v: f64) -> String {
        if v.is_finite() {
            return v.to_string();
        }
        match self.opts.mode {
            OutputMode::Strict => "null".to_string(),
            OutputMode::Literal if v.is_nan() => "nan".to_string(),
            OutputMode::Literal if v > 0.0 => "inf".to_string(),
            OutputMode::Literal => "-inf".to_string(),
        }
    }

    fn write_struct(&mut self, value: &Value, index: usize, desc: &FieldDesc, pos: Position) {
        self.out.push_str("{\n");
        self.depth += 1;

        let members: Vec<(&str, usize)> = desc.members().collect();
        if !desc.id().is_empty() {
            self.indent();
            self.label("id");
            let id = quote(desc.id());
            self.scalar(&id, Position::Inner { last: members.is_empty() });
        }
        for (i, (name, offset)) in members.iter().enumerate() {
            let last = i + 1 == members.len();
            self.write_node(name, Some(value), index + offset, Position::Inner { last });
        }

        self.depth -= 1;
        self.indent();
        let sep = self.separator(pos, true);
        let _ = writeln!(self.out, "}}{sep}");
    }

    /// Union and variant slots. The label names the active union choice when
    /// the stored value's type is one of the declared choices.
    ///
    /// Strict mode writes no label for an unnamed slot such as a union array
    /// element.
    fn write_compound(&mut self, name: &str, desc: &FieldDesc, inner: &Value, pos: Position) {
        let inner = Some(inner).filter(|v| v.is_valid());
        if name.is_empty() && self.opts.mode == OutputMode::Strict {
            self.write_node("", inner, 0, pos);
            return;
        }

        let mut label = name.to_string();
        if desc.code() == TypeCode::Union {
            if let Some(choice) = inner.and_then(Value::ty).and_then(|ty| desc.choice_name(ty)) {
                label.push('.');
                label.push_str(choice);
            }
        }

        self.indent();
        self.label(&label);
        self.inline = true;
        self.write_node("", inner, 0, pos);
    }

    fn write_value_array(&mut self, elements: &[Value], pos: Position) {
        self.out.push_str("[\n");
        self.depth += 1;
        for (i, element) in elements.iter().enumerate() {
            let last = i + 1 == elements.len();
            self.write_node("", Some(element).filter(|v| v.is_valid()), 0, Position::Inner { last });
        }
        self.depth -= 1;
        self.indent();
        let sep = self.separator(pos, true);
        let _ = writeln!(self.out, "]{sep}");
    }

    fn scalar_list(&self, arr: &Array) -> String {
        let limit = self.opts.array_limit;
        let truncated = limit > 0 && arr.len() > limit;
        let shown = if truncated { limit } else { arr.len() };

        let items: Vec<String> = match arr {
            Array::Bool(v) => v.iter().take(shown).map(ToString::to_string).collect(),
            Array::Integer(v) => v.iter().take(shown).map(ToString::to_string).collect(),
            Array::UInteger(v) => v.iter().take(shown).map(ToString::to_string).collect(),
            Array::Real(v) => v.iter().take(shown).map(|x| self.real(*x)).collect(),
            Array::String(v) => v.iter().take(shown).map(|s| quote(s)).collect(),
            Array::Value(_) => Vec::new(),
        };

        let mut list = String::from("[");
        list.push_str(&items.join(", "));
        if truncated && self.opts.mode == OutputMode::Literal {
            list.push_str(", ...");
        }
        list.push(']');
        list
    }

    /// Store kind disagrees with the declared type.
    fn write_invalid(&mut self, name: &str, desc: &FieldDesc, store: &Store, pos: Position) {
        tracing::warn!(
            field = name,
            store_kind = %store.kind(),
            declared = %desc.code(),
            "store kind does not match descriptor"
        );
        self.indent();
        if !name.is_empty() {
            self.label(name);
        }
        let placeholder = quote(&invalid_placeholder(store.kind(), desc.code()));
        self.scalar(&placeholder, pos);
    }
}

fn invalid_placeholder(kind: StoreKind, declared: TypeCode) -> String {
    format!("!!Invalid StoreType!! {kind} (declared {declared})")
}

fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}
