//! Value trees.
//!
//! A [`Value`] pairs a shared [`Type`] with a store vector holding one
//! [`Store`] node per descriptor node. Union and variant fields hold a nested
//! `Value` with its own type, which is how the active choice is discovered.

use crate::error::{BridgeError, BridgeResult, ValidationError};

use super::desc::{FieldDesc, ScalarKind, StoreKind, Type, TypeCode};

/// Array payload.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Bool(Vec<bool>),
    Integer(Vec<i64>),
    UInteger(Vec<u64>),
    Real(Vec<f64>),
    String(Vec<String>),
    /// Elements are complete values (struct, union, or variant arrays).
    Value(Vec<Value>),
}

impl Array {
    /// Empty array suitable for `code`.
    fn empty_for(code: TypeCode) -> Self {
        match code {
            TypeCode::ScalarArray(kind) => match kind.store_kind() {
                StoreKind::Bool => Self::Bool(Vec::new()),
                StoreKind::Integer => Self::Integer(Vec::new()),
                StoreKind::UInteger => Self::UInteger(Vec::new()),
                StoreKind::Real => Self::Real(Vec::new()),
                _ => Self::String(Vec::new()),
            },
            _ => Self::Value(Vec::new()),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Integer(v) => v.len(),
            Self::UInteger(v) => v.len(),
            Self::Real(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Value(v) => v.len(),
        }
    }

    /// True when there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when elements are complete values rather than scalars.
    #[must_use]
    pub const fn holds_values(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    fn fits(&self, code: TypeCode) -> bool {
        match (self, code) {
            (Self::Value(_), TypeCode::StructArray | TypeCode::UnionArray | TypeCode::AnyArray) => true,
            (_, TypeCode::ScalarArray(kind)) => {
                std::mem::discriminant(self) == std::mem::discriminant(&Self::empty_for(TypeCode::ScalarArray(kind)))
            }
            _ => false,
        }
    }
}

/// One store node.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum Store {
    /// Structs and placeholders carry no payload of their own.
    Null,
    Real(f64),
    Integer(i64),
    UInteger(u64),
    Bool(bool),
    String(String),
    /// Union or variant slot.
    Compound(Box<Value>),
    Array(Array),
}

impl Store {
    /// Default store node for a descriptor.
    fn default_for(code: TypeCode) -> Self {
        match code.store_kind() {
            StoreKind::Null => Self::Null,
            StoreKind::Real => Self::Real(0.0),
            StoreKind::Integer => Self::Integer(0),
            StoreKind::UInteger => Self::UInteger(0),
            StoreKind::Bool => Self::Bool(false),
            StoreKind::String => Self::String(String::new()),
            StoreKind::Compound => Self::Compound(Box::new(Value::invalid())),
            StoreKind::Array => Self::Array(Array::empty_for(code)),
        }
    }

    /// Storage kind of this node.
    #[must_use]
    pub const fn kind(&self) -> StoreKind {
        match self {
            Self::Null => StoreKind::Null,
            Self::Real(_) => StoreKind::Real,
            Self::Integer(_) => StoreKind::Integer,
            Self::UInteger(_) => StoreKind::UInteger,
            Self::Bool(_) => StoreKind::Bool,
            Self::String(_) => StoreKind::String,
            Self::Compound(_) => StoreKind::Compound,
            Self::Array(_) => StoreKind::Array,
        }
    }

    /// True when this node may be stored under a descriptor with `code`.
    #[must_use]
    pub fn fits(&self, code: TypeCode) -> bool {
        match self {
            Self::Array(arr) => arr.fits(code),
            other => other.kind() == code.store_kind(),
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInteger(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Compound(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for Store {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<i64> for Store {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Store {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u64> for Store {
    fn from(v: u64) -> Self {
        Self::UInteger(v)
    }
}

impl From<bool> for Store {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Store {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Store {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Array> for Store {
    fn from(v: Array) -> Self {
        Self::Array(v)
    }
}

impl From<Value> for Store {
    fn from(v: Value) -> Self {
        Self::Compound(Box::new(v))
    }
}

/// A typed value tree.
#[derive(Debug, Clone, Default)]
pub struct Value {
    ty: Option<Type>,
    store: Vec<Store>,
}

impl PartialEq for Value {
    /// Same descriptor tree (by identity) and equal store contents.
    fn eq(&self, other: &Self) -> bool {
        let same_type = match (&self.ty, &other.ty) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        };
        same_type && self.store == other.store
    }
}

impl Value {
    /// A value with no type. Unset union and variant slots hold one.
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            ty: None,
            store: Vec::new(),
        }
    }

    /// A value of `ty` with every field at its default.
    #[must_use]
    pub fn create(ty: &Type) -> Self {
        Self {
            ty: Some(ty.clone()),
            store: ty.nodes().iter().map(|d| Store::default_for(d.code)).collect(),
        }
    }

    /// Assemble a value from a type and a prebuilt store vector.
    ///
    /// Store kinds are not checked against the descriptors; the serializer
    /// renders mismatches as inline diagnostics.
    pub fn from_parts(ty: &Type, store: Vec<Store>) -> BridgeResult<Self> {
        if store.len() != ty.len() {
            return Err(BridgeError::internal(format!(
                "store has {} nodes but type has {}",
                store.len(),
                ty.len()
            )));
        }
        Ok(Self {
            ty: Some(ty.clone()),
            store,
        })
    }

    /// True when this value has a type.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.ty.is_some()
    }

    /// The type of this value.
    #[must_use]
    pub const fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }

    /// Root descriptor, when valid.
    #[must_use]
    pub fn desc(&self) -> Option<&FieldDesc> {
        self.ty.as_ref().map(Type::root)
    }

    /// Descriptor and store node at `index` in pre-order.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<(&FieldDesc, &Store)> {
        let ty = self.ty.as_ref()?;
        if index >= ty.len() {
            return None;
        }
        Some((ty.node(index), self.store.get(index)?))
    }

    /// Store node at a dotted field path. The empty path is the root.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Store> {
        let (owner, index) = self.locate(&split_path(path))?;
        owner.store.get(index)
    }

    /// Descriptor at a dotted field path.
    #[must_use]
    pub fn desc_at(&self, path: &str) -> Option<&FieldDesc> {
        let (owner, index) = self.locate(&split_path(path))?;
        owner.ty.as_ref().map(|ty| ty.node(index))
    }

    /// Store `store` at `path`. The node kind must match the field's type.
    pub fn set(&mut self, path: &str, store: impl Into<Store>) -> BridgeResult<()> {
        let store = store.into();
        let (owner, index) = self.locate_mut(path, &split_path(path))?;
        let code = owner.code_at(index)?;
        if !store.fits(code) {
            return Err(ValidationError::InvalidFieldValue {
                path: path.to_string(),
                text: format!("{:?}", store.kind()),
                type_code: code.to_string(),
                reason: "storage kind does not match field type".to_string(),
            }
            .into());
        }
        owner.store[index] = store;
        Ok(())
    }

    /// Select the named choice of the union at `path` and return its value.
    ///
    /// Re-selecting the active choice keeps its current contents.
    pub fn select(&mut self, path: &str, choice: &str) -> BridgeResult<&mut Value> {
        let (owner, index) = self.locate_mut(path, &split_path(path))?;
        let desc = owner.desc_node(index)?;
        let Some(choice_ty) = desc.choice(choice).cloned() else {
            return Err(unknown_field(&join_path(path, choice)));
        };
        let Store::Compound(inner) = &mut owner.store[index] else {
            return Err(unknown_field(path));
        };
        if !inner.ty.as_ref().is_some_and(|t| t.same(&choice_ty)) {
            **inner = Value::create(&choice_ty);
        }
        Ok(inner.as_mut())
    }

    /// Assign a field from its textual form, converting to the field's type.
    ///
    /// Path segments naming a union choice select that choice.
    pub fn set_from_str(&mut self, path: &str, text: &str) -> BridgeResult<()> {
        let (owner, index) = self.locate_mut(path, &split_path(path))?;
        let code = owner.code_at(index)?;
        let parsed = parse_text(path, code, text)?;
        owner.store[index] = parsed;
        Ok(())
    }

    fn desc_node(&self, index: usize) -> BridgeResult<&FieldDesc> {
        self.ty
            .as_ref()
            .filter(|ty| index < ty.len())
            .map(|ty| ty.node(index))
            .ok_or_else(|| BridgeError::internal("descriptor index out of range"))
    }

    fn code_at(&self, index: usize) -> BridgeResult<TypeCode> {
        self.desc_node(index).map(FieldDesc::code)
    }

    fn locate(&self, segments: &[&str]) -> Option<(&Value, usize)> {
        let ty = self.ty.as_ref()?;
        let mut index = 0;
        let mut rest = segments;
        while let Some((segment, tail)) = rest.split_first() {
            let desc = ty.node(index);
            match desc.code {
                TypeCode::Struct => {
                    index += desc.member(segment)?;
                    rest = tail;
                }
                TypeCode::Union => {
                    let inner = self.store.get(index)?.as_value()?;
                    let active = desc.choice_name(inner.ty.as_ref()?)?;
                    if active != *segment {
                        return None;
                    }
                    return inner.locate(tail);
                }
                TypeCode::Any => {
                    return self.store.get(index)?.as_value()?.locate(rest);
                }
                _ => return None,
            }
        }
        Some((self, index))
    }

    fn locate_mut(&mut self, full: &str, segments: &[&str]) -> BridgeResult<(&mut Value, usize)> {
        let Some(ty) = self.ty.clone() else {
            return Err(unknown_field(full));
        };
        let mut index = 0;
        let mut rest = segments;
        while let Some((segment, tail)) = rest.split_first() {
            let desc = ty.node(index);
            match desc.code {
                TypeCode::Struct => {
                    index += desc.member(segment).ok_or_else(|| unknown_field(full))?;
                    rest = tail;
                }
                TypeCode::Union => {
                    let choice = desc.choice(segment).ok_or_else(|| unknown_field(full))?.clone();
                    let Store::Compound(inner) = &mut self.store[index] else {
                        return Err(unknown_field(full));
                    };
                    if !inner.ty.as_ref().is_some_and(|t| t.same(&choice)) {
                        **inner = Value::create(&choice);
                    }
                    return inner.locate_mut(full, tail);
                }
                TypeCode::Any => {
                    let Store::Compound(inner) = &mut self.store[index] else {
                        return Err(unknown_field(full));
                    };
                    if !inner.is_valid() {
                        return Err(unknown_field(full));
                    }
                    return inner.locate_mut(full, rest);
                }
                _ => return Err(unknown_field(full)),
            }
        }
        Ok((self, index))
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

fn join_path(path: &str, tail: &str) -> String {
    if path.is_empty() {
        tail.to_string()
    } else {
        format!("{path}.{tail}")
    }
}

fn unknown_field(path: &str) -> BridgeError {
    ValidationError::UnknownField {
        path: path.to_string(),
    }
    .into()
}

fn invalid_text(path: &str, code: TypeCode, text: &str, reason: impl Into<String>) -> BridgeError {
    ValidationError::InvalidFieldValue {
        path: path.to_string(),
        text: text.to_string(),
        type_code: code.to_string(),
        reason: reason.into(),
    }
    .into()
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_scalar(path: &str, code: TypeCode, kind: ScalarKind, text: &str) -> BridgeResult<Store> {
    let trimmed = text.trim();
    match kind.store_kind() {
        StoreKind::Bool => parse_bool(trimmed)
            .map(Store::Bool)
            .ok_or_else(|| invalid_text(path, code, text, "expected true or false")),
        StoreKind::Integer => {
            let v: i64 = trimmed.parse().map_err(|e| invalid_text(path, code, text, format!("{e}")))?;
            match kind.signed_range() {
                Some((lo, hi)) if v < lo || v > hi => Err(invalid_text(path, code, text, "out of range")),
                _ => Ok(Store::Integer(v)),
            }
        }
        StoreKind::UInteger => {
            let v: u64 = trimmed.parse().map_err(|e| invalid_text(path, code, text, format!("{e}")))?;
            match kind.unsigned_max() {
                Some(hi) if v > hi => Err(invalid_text(path, code, text, "out of range")),
                _ => Ok(Store::UInteger(v)),
            }
        }
        StoreKind::Real => {
            let v: f64 = trimmed.parse().map_err(|e| invalid_text(path, code, text, format!("{e}")))?;
            if kind == ScalarKind::Float32 && v.is_finite() && v.abs() > f64::from(f32::MAX) {
                return Err(invalid_text(path, code, text, "out of range"));
            }
            Ok(Store::Real(v))
        }
        _ => Ok(Store::String(text.to_string())),
    }
}

/// Scalar arrays are written as a JSON array literal.
fn parse_array(path: &str, code: TypeCode, kind: ScalarKind, text: &str) -> BridgeResult<Store> {
    let parsed: serde_json::Value =
        serde_json::from_str(text).map_err(|e| invalid_text(path, code, text, format!("{e}")))?;
    let serde_json::Value::Array(items) = parsed else {
        return Err(invalid_text(path, code, text, "expected an array literal"));
    };

    let element_text = |item: &serde_json::Value| match item {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut stores = Vec::with_capacity(items.len());
    for item in &items {
        stores.push(parse_scalar(path, code, kind, &element_text(item))?);
    }

    let array = match kind.store_kind() {
        StoreKind::Bool => Array::Bool(stores.iter().filter_map(Store::as_bool).collect()),
        StoreKind::Integer => Array::Integer(stores.iter().filter_map(Store::as_i64).collect()),
        StoreKind::UInteger => Array::UInteger(stores.iter().filter_map(Store::as_u64).collect()),
        StoreKind::Real => Array::Real(stores.iter().filter_map(Store::as_f64).collect()),
        _ => Array::String(
            stores
                .into_iter()
                .filter_map(|s| match s {
                    Store::String(v) => Some(v),
                    _ => None,
                })
                .collect(),
        ),
    };
    Ok(Store::Array(array))
}

fn parse_text(path: &str, code: TypeCode, text: &str) -> BridgeResult<Store> {
    match code {
        TypeCode::Scalar(kind) => parse_scalar(path, code, kind, text),
        TypeCode::ScalarArray(kind) => parse_array(path, code, kind, text),
        _ => Err(invalid_text(path, code, text, "field is not assignable from text")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::typedef::{Member, TypeDef};

    fn sample_type() -> Type {
        TypeDef::structure(
            "demo:sample",
            [
                Member::scalar(ScalarKind::Float64, "value"),
                Member::scalar(ScalarKind::Int8, "small"),
                Member::scalar(ScalarKind::UInt16, "count"),
                Member::scalar(ScalarKind::Bool, "enabled"),
                Member::scalar(ScalarKind::String, "label"),
                Member::scalar_array(ScalarKind::Int32, "samples"),
                Member::structure("alarm", "alarm_t", [Member::scalar(ScalarKind::Int32, "severity")]),
                Member::union(
                    "choice",
                    [
                        Member::scalar(ScalarKind::Int32, "number"),
                        Member::structure("pair", "", [Member::scalar(ScalarKind::String, "left")]),
                    ],
                ),
            ],
        )
        .build()
        .unwrap()
    }

    #[test]
    fn create_fills_defaults_per_kind() {
        let v = Value::create(&sample_type());
        assert_eq!(v.get("value"), Some(&Store::Real(0.0)));
        assert_eq!(v.get("enabled"), Some(&Store::Bool(false)));
        assert_eq!(v.get(""), Some(&Store::Null));
        assert_eq!(v.get("samples"), Some(&Store::Array(Array::Integer(Vec::new()))));
        assert!(!v.get("choice").unwrap().as_value().unwrap().is_valid());
    }

    #[test]
    fn set_from_str_converts_per_type() {
        let mut v = Value::create(&sample_type());
        v.set_from_str("value", "42").unwrap();
        v.set_from_str("small", "-12").unwrap();
        v.set_from_str("count", "65535").unwrap();
        v.set_from_str("enabled", "TRUE").unwrap();
        v.set_from_str("label", " spaced ").unwrap();
        v.set_from_str("samples", "[1, 2, 3]").unwrap();
        v.set_from_str("alarm.severity", "2").unwrap();

        assert_eq!(v.get("value").and_then(Store::as_f64), Some(42.0));
        assert_eq!(v.get("small").and_then(Store::as_i64), Some(-12));
        assert_eq!(v.get("count").and_then(Store::as_u64), Some(65535));
        assert_eq!(v.get("enabled").and_then(Store::as_bool), Some(true));
        assert_eq!(v.get("label").and_then(Store::as_str), Some(" spaced "));
        assert_eq!(v.get("samples"), Some(&Store::Array(Array::Integer(vec![1, 2, 3]))));
        assert_eq!(v.get("alarm.severity").and_then(Store::as_i64), Some(2));
    }

    #[test]
    fn set_from_str_rejects_bad_text() {
        let mut v = Value::create(&sample_type());
        assert!(v.set_from_str("small", "300").unwrap_err().is_validation());
        assert!(v.set_from_str("count", "-1").unwrap_err().is_validation());
        assert!(v.set_from_str("enabled", "maybe").unwrap_err().is_validation());
        assert!(v.set_from_str("samples", "1, 2").unwrap_err().is_validation());
        assert!(v.set_from_str("alarm", "1").unwrap_err().is_validation());
        assert!(v.set_from_str("missing", "1").unwrap_err().is_validation());
    }

    #[test]
    fn union_path_selects_choice() {
        let ty = sample_type();
        let mut v = Value::create(&ty);
        v.set_from_str("choice.pair.left", "L").unwrap();
        assert_eq!(v.get("choice.pair.left").and_then(Store::as_str), Some("L"));
        assert!(v.get("choice.number").is_none());

        let union_desc = v.desc_at("choice").unwrap();
        let active = v.get("choice").unwrap().as_value().unwrap();
        assert_eq!(union_desc.choice_name(active.ty().unwrap()), Some("pair"));

        v.select("choice", "number").unwrap();
        assert!(v.get("choice.pair.left").is_none());
        assert_eq!(v.get("choice.number").and_then(Store::as_i64), Some(0));
    }

    #[test]
    fn set_checks_storage_kind() {
        let mut v = Value::create(&sample_type());
        v.set("value", 3.5).unwrap();
        v.set("samples", Array::Integer(vec![4, 5])).unwrap();
        assert!(v.set("value", "text").is_err());
        assert!(v.set("samples", Array::Real(vec![1.0])).is_err());
    }

    #[test]
    fn from_parts_requires_matching_length() {
        let ty = sample_type();
        assert!(Value::from_parts(&ty, vec![Store::Null]).is_err());
    }

    #[test]
    fn float32_text_outside_range_is_rejected() {
        let ty = TypeDef::structure("", [Member::scalar(ScalarKind::Float32, "f")]).build().unwrap();
        let mut v = Value::create(&ty);
        assert!(v.set_from_str("f", "1e300").unwrap_err().is_validation());
        assert!(v.set_from_str("f", "-1e39").is_err());

        v.set_from_str("f", "0.25").unwrap();
        assert_eq!(v.get("f").and_then(Store::as_f64), Some(0.25));
        v.set_from_str("f", "inf").unwrap();
        assert_eq!(v.get("f").and_then(Store::as_f64), Some(f64::INFINITY));
    }
}
