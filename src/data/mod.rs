//! Self-describing value trees.
//!
//! Types are immutable shared descriptor trees; values pair a type with a
//! parallel store of current data.

/// Descriptor nodes and shared type trees.
pub mod desc;
/// Type tree builders.
pub mod typedef;
/// Value trees and field assignment.
pub mod value;

pub use desc::{FieldDesc, ScalarKind, StoreKind, Type, TypeCode};
pub use typedef::{Member, TypeDef};
pub use value::{Array, Store, Value};
