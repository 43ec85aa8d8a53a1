//! Type descriptors.
//!
//! A [`Type`] is an immutable arena of [`FieldDesc`] nodes laid out in
//! pre-order, root first. Values of the same shape share one `Type` through an
//! `Arc`; descriptor identity (used to resolve the active member of a union) is
//! the identity of that allocation.

use std::fmt;
use std::sync::Arc;

/// Scalar element kinds.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
}

impl ScalarKind {
    /// Storage kind used for a single element of this kind.
    #[must_use]
    pub const fn store_kind(self) -> StoreKind {
        match self {
            Self::Bool => StoreKind::Bool,
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 => StoreKind::Integer,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64 => StoreKind::UInteger,
            Self::Float32 | Self::Float64 => StoreKind::Real,
            Self::String => StoreKind::String,
        }
    }

    /// Returns a short type name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
        }
    }

    /// Inclusive range accepted for signed integer kinds.
    #[must_use]
    pub const fn signed_range(self) -> Option<(i64, i64)> {
        match self {
            Self::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::Int64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Upper bound accepted for unsigned integer kinds.
    #[must_use]
    pub const fn unsigned_max(self) -> Option<u64> {
        match self {
            Self::UInt8 => Some(u8::MAX as u64),
            Self::UInt16 => Some(u16::MAX as u64),
            Self::UInt32 => Some(u32::MAX as u64),
            Self::UInt64 => Some(u64::MAX),
            _ => None,
        }
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    /// Single scalar.
    Scalar(ScalarKind),
    /// Homogeneous array of scalars.
    ScalarArray(ScalarKind),
    /// Ordered set of named members.
    Struct,
    /// Exactly one of a fixed set of named choices.
    Union,
    /// Variant holding a value of any type.
    Any,
    /// Array of struct values sharing one element type.
    StructArray,
    /// Array of union values sharing one element type.
    UnionArray,
    /// Array of variant values.
    AnyArray,
    /// Placeholder with no storage.
    Null,
}

impl TypeCode {
    /// Storage kind that a store node for this code must have.
    #[must_use]
    pub const fn store_kind(self) -> StoreKind {
        match self {
            Self::Scalar(kind) => kind.store_kind(),
            Self::ScalarArray(_) | Self::StructArray | Self::UnionArray | Self::AnyArray => StoreKind::Array,
            Self::Union | Self::Any => StoreKind::Compound,
            Self::Struct | Self::Null => StoreKind::Null,
        }
    }

    /// Returns true for the array codes.
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            Self::ScalarArray(_) | Self::StructArray | Self::UnionArray | Self::AnyArray
        )
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => f.write_str(kind.name()),
            Self::ScalarArray(kind) => write!(f, "{}[]", kind.name()),
            Self::Struct => f.write_str("struct"),
            Self::Union => f.write_str("union"),
            Self::Any => f.write_str("any"),
            Self::StructArray => f.write_str("struct[]"),
            Self::UnionArray => f.write_str("union[]"),
            Self::AnyArray => f.write_str("any[]"),
            Self::Null => f.write_str("null"),
        }
    }
}

/// Physical storage class of a store node.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Null,
    Real,
    Integer,
    UInteger,
    Bool,
    String,
    Compound,
    Array,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "Null",
            Self::Real => "Real",
            Self::Integer => "Integer",
            Self::UInteger => "UInteger",
            Self::Bool => "Bool",
            Self::String => "String",
            Self::Compound => "Compound",
            Self::Array => "Array",
        };
        f.write_str(s)
    }
}

/// One node of a type tree.
#[derive(Debug)]
pub struct FieldDesc {
    pub(crate) code: TypeCode,
    pub(crate) id: String,
    /// Direct children in declaration order, as offsets from this node.
    pub(crate) members: Vec<(String, usize)>,
    /// Offset back to the parent node; 0 at the root.
    pub(crate) parent_index: usize,
    /// Choices of a union, each its own shared tree.
    pub(crate) choices: Vec<(String, Type)>,
    /// Element type of a struct or union array.
    pub(crate) element: Option<Type>,
}

impl FieldDesc {
    /// Declared type code.
    #[must_use]
    pub const fn code(&self) -> TypeCode {
        self.code
    }

    /// Type id string; empty when unset.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Offset back to the parent node; 0 only for a tree root.
    #[must_use]
    pub const fn parent_index(&self) -> usize {
        self.parent_index
    }

    /// Direct children in declaration order.
    pub fn members(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.members.iter().map(|(name, off)| (name.as_str(), *off))
    }

    /// Offset of the named direct child.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<usize> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, off)| *off)
    }

    /// Union choices in declaration order.
    pub fn choices(&self) -> impl Iterator<Item = (&str, &Type)> + '_ {
        self.choices.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    /// The named union choice.
    #[must_use]
    pub fn choice(&self, name: &str) -> Option<&Type> {
        self.choices.iter().find(|(n, _)| n == name).map(|(_, ty)| ty)
    }

    /// Name of the union choice whose tree is `ty`, compared by identity.
    #[must_use]
    pub fn choice_name(&self, ty: &Type) -> Option<&str> {
        self.choices
            .iter()
            .find(|(_, candidate)| candidate.same(ty))
            .map(|(name, _)| name.as_str())
    }

    /// Element type of a struct or union array.
    #[must_use]
    pub const fn element(&self) -> Option<&Type> {
        self.element.as_ref()
    }
}

/// Shared, immutable type tree.
#[derive(Debug, Clone)]
pub struct Type {
    nodes: Arc<[FieldDesc]>,
}

impl Type {
    pub(crate) fn from_nodes(nodes: Vec<FieldDesc>) -> Self {
        Self { nodes: nodes.into() }
    }

    /// Root descriptor.
    #[must_use]
    pub fn root(&self) -> &FieldDesc {
        &self.nodes[0]
    }

    /// Descriptor at `index` in pre-order.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn node(&self, index: usize) -> &FieldDesc {
        &self.nodes[index]
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a tree has at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declared code of the root.
    #[must_use]
    pub fn code(&self) -> TypeCode {
        self.root().code
    }

    /// True when both handles refer to the same tree allocation.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes)
    }

    pub(crate) fn nodes(&self) -> &[FieldDesc] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_kind_follows_type_code() {
        assert_eq!(TypeCode::Scalar(ScalarKind::Float32).store_kind(), StoreKind::Real);
        assert_eq!(TypeCode::Scalar(ScalarKind::Int16).store_kind(), StoreKind::Integer);
        assert_eq!(TypeCode::Scalar(ScalarKind::UInt64).store_kind(), StoreKind::UInteger);
        assert_eq!(TypeCode::ScalarArray(ScalarKind::Bool).store_kind(), StoreKind::Array);
        assert_eq!(TypeCode::StructArray.store_kind(), StoreKind::Array);
        assert_eq!(TypeCode::Union.store_kind(), StoreKind::Compound);
        assert_eq!(TypeCode::Any.store_kind(), StoreKind::Compound);
        assert_eq!(TypeCode::Struct.store_kind(), StoreKind::Null);
    }

    #[test]
    fn type_code_display() {
        assert_eq!(TypeCode::Scalar(ScalarKind::Float64).to_string(), "float64");
        assert_eq!(TypeCode::ScalarArray(ScalarKind::Int32).to_string(), "int32[]");
        assert_eq!(TypeCode::StructArray.to_string(), "struct[]");
    }

    #[test]
    fn integer_ranges() {
        assert_eq!(ScalarKind::Int8.signed_range(), Some((-128, 127)));
        assert_eq!(ScalarKind::UInt16.unsigned_max(), Some(65535));
        assert_eq!(ScalarKind::Float64.signed_range(), None);
    }
}
