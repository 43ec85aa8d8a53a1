//! Builders for type trees.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{BridgeError, BridgeResult, ValidationError};

use super::desc::{FieldDesc, ScalarKind, Type, TypeCode};

const MEMBER_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

static MEMBER_NAME: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn check_member_name(name: &str) -> BridgeResult<()> {
    let re = MEMBER_NAME
        .get_or_init(|| Regex::new(MEMBER_NAME_PATTERN))
        .as_ref()
        .map_err(|e| BridgeError::internal(format!("member name pattern: {e}")))?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidMemberName {
            name: name.to_string(),
        }
        .into())
    }
}

/// A named member of a struct or a choice of a union.
#[derive(Debug, Clone)]
pub struct Member {
    code: TypeCode,
    name: String,
    id: String,
    children: Vec<Member>,
}

impl Member {
    /// A member with no children (scalars, scalar arrays, `Any`).
    pub fn new(code: TypeCode, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            id: String::new(),
            children: Vec::new(),
        }
    }

    /// Shorthand for a scalar member.
    pub fn scalar(kind: ScalarKind, name: impl Into<String>) -> Self {
        Self::new(TypeCode::Scalar(kind), name)
    }

    /// Shorthand for a scalar array member.
    pub fn scalar_array(kind: ScalarKind, name: impl Into<String>) -> Self {
        Self::new(TypeCode::ScalarArray(kind), name)
    }

    /// A struct member.
    pub fn structure(name: impl Into<String>, id: impl Into<String>, children: impl IntoIterator<Item = Member>) -> Self {
        Self {
            code: TypeCode::Struct,
            name: name.into(),
            id: id.into(),
            children: children.into_iter().collect(),
        }
    }

    /// A union member; `choices` are the selectable alternatives.
    pub fn union(name: impl Into<String>, choices: impl IntoIterator<Item = Member>) -> Self {
        Self {
            code: TypeCode::Union,
            name: name.into(),
            id: String::new(),
            children: choices.into_iter().collect(),
        }
    }

    /// An array of structs whose element has `children`.
    pub fn struct_array(name: impl Into<String>, id: impl Into<String>, children: impl IntoIterator<Item = Member>) -> Self {
        Self {
            code: TypeCode::StructArray,
            name: name.into(),
            id: id.into(),
            children: children.into_iter().collect(),
        }
    }

    /// An array of unions whose element offers `choices`.
    pub fn union_array(name: impl Into<String>, choices: impl IntoIterator<Item = Member>) -> Self {
        Self {
            code: TypeCode::UnionArray,
            name: name.into(),
            id: String::new(),
            children: choices.into_iter().collect(),
        }
    }

    /// Set the type id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Definition of a complete type, built into a shared [`Type`].
///
/// ```
/// use pvabridge::data::{Member, ScalarKind, TypeDef};
///
/// let ty = TypeDef::structure("demo:point", [
///     Member::scalar(ScalarKind::Float64, "x"),
///     Member::scalar(ScalarKind::Float64, "y"),
/// ])
/// .build()
/// .unwrap();
/// assert_eq!(ty.root().id(), "demo:point");
/// ```
#[derive(Debug, Clone)]
pub struct TypeDef {
    root: Member,
}

impl TypeDef {
    /// A definition whose root has `code` and no members yet.
    #[must_use]
    pub fn new(code: TypeCode) -> Self {
        Self {
            root: Member::new(code, ""),
        }
    }

    /// A struct definition.
    pub fn structure(id: impl Into<String>, members: impl IntoIterator<Item = Member>) -> Self {
        Self {
            root: Member::structure("", id, members),
        }
    }

    /// Append members (struct) or choices (union).
    #[must_use]
    pub fn add(mut self, members: impl IntoIterator<Item = Member>) -> Self {
        self.root.children.extend(members);
        self
    }

    /// Validate member names and build the shared tree.
    pub fn build(&self) -> BridgeResult<Type> {
        build_tree(&self.root)
    }
}

fn build_tree(root: &Member) -> BridgeResult<Type> {
    let mut nodes = Vec::new();
    flatten(root, 0, &mut nodes)?;
    Ok(Type::from_nodes(nodes))
}

fn check_children(children: &[Member]) -> BridgeResult<()> {
    let mut seen = HashSet::with_capacity(children.len());
    for child in children {
        check_member_name(&child.name)?;
        if !seen.insert(child.name.as_str()) {
            return Err(ValidationError::InvalidMemberName {
                name: child.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Push `member` and its struct descendants in pre-order. Union choices and
/// array elements become separate trees.
fn flatten(member: &Member, parent_index: usize, nodes: &mut Vec<FieldDesc>) -> BridgeResult<()> {
    let index = nodes.len();
    let mut desc = FieldDesc {
        code: member.code,
        id: member.id.clone(),
        members: Vec::new(),
        parent_index,
        choices: Vec::new(),
        element: None,
    };

    match member.code {
        TypeCode::Struct => {
            check_children(&member.children)?;
            nodes.push(desc);
            for child in &member.children {
                let offset = nodes.len() - index;
                nodes[index].members.push((child.name.clone(), offset));
                flatten(child, offset, nodes)?;
            }
            return Ok(());
        }
        TypeCode::Union => {
            check_children(&member.children)?;
            for choice in &member.children {
                let mut root = choice.clone();
                root.name.clear();
                desc.choices.push((choice.name.clone(), build_tree(&root)?));
            }
        }
        TypeCode::StructArray => {
            let element = Member {
                code: TypeCode::Struct,
                name: String::new(),
                id: member.id.clone(),
                children: member.children.clone(),
            };
            desc.element = Some(build_tree(&element)?);
        }
        TypeCode::UnionArray => {
            let element = Member {
                code: TypeCode::Union,
                name: String::new(),
                id: member.id.clone(),
                children: member.children.clone(),
            };
            desc.element = Some(build_tree(&element)?);
        }
        TypeCode::Scalar(_) | TypeCode::ScalarArray(_) | TypeCode::Any | TypeCode::AnyArray | TypeCode::Null => {}
    }

    nodes.push(desc);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Type {
        TypeDef::structure(
            "demo:sample",
            [
                Member::scalar(ScalarKind::Float64, "value"),
                Member::structure(
                    "timeStamp",
                    "time_t",
                    [
                        Member::scalar(ScalarKind::Int64, "secondsPastEpoch"),
                        Member::scalar(ScalarKind::Int32, "nanoseconds"),
                    ],
                ),
                Member::scalar(ScalarKind::String, "units"),
            ],
        )
        .build()
        .unwrap()
    }

    #[test]
    fn flattens_in_preorder_with_relative_offsets() {
        let ty = sample();
        assert_eq!(ty.len(), 6);

        let root = ty.root();
        let names: Vec<_> = root.members().collect();
        assert_eq!(names, vec![("value", 1), ("timeStamp", 2), ("units", 5)]);
        assert_eq!(root.parent_index(), 0);

        let ts = ty.node(2);
        assert_eq!(ts.code(), TypeCode::Struct);
        assert_eq!(ts.id(), "time_t");
        assert_eq!(ts.parent_index(), 2);
        assert_eq!(ts.member("nanoseconds"), Some(2));
        assert_eq!(ty.node(4).parent_index(), 2);
    }

    #[test]
    fn union_choices_are_separate_trees() {
        let ty = TypeDef::structure(
            "",
            [Member::union(
                "u",
                [
                    Member::scalar(ScalarKind::Int32, "a"),
                    Member::scalar(ScalarKind::String, "b"),
                ],
            )],
        )
        .build()
        .unwrap();

        let u = ty.node(1);
        assert_eq!(u.code(), TypeCode::Union);
        let a = u.choice("a").unwrap().clone();
        assert_eq!(a.code(), TypeCode::Scalar(ScalarKind::Int32));
        assert_eq!(u.choice_name(&a), Some("a"));

        // An equal shape built elsewhere is not the same descriptor.
        let other = TypeDef::new(TypeCode::Scalar(ScalarKind::Int32)).build().unwrap();
        assert_eq!(u.choice_name(&other), None);
    }

    #[test]
    fn struct_array_has_element_type() {
        let ty = TypeDef::structure(
            "",
            [Member::struct_array("points", "point_t", [Member::scalar(ScalarKind::Float64, "x")])],
        )
        .build()
        .unwrap();
        let element = ty.node(1).element().unwrap();
        assert_eq!(element.code(), TypeCode::Struct);
        assert_eq!(element.root().id(), "point_t");
        assert_eq!(element.root().member("x"), Some(1));
    }

    #[test]
    fn rejects_bad_and_duplicate_names() {
        let bad = TypeDef::structure("", [Member::scalar(ScalarKind::Int32, "1st")]).build();
        assert!(bad.unwrap_err().is_validation());

        let dup = TypeDef::structure(
            "",
            [
                Member::scalar(ScalarKind::Int32, "x"),
                Member::scalar(ScalarKind::Int32, "x"),
            ],
        )
        .build();
        assert!(dup.unwrap_err().is_validation());
    }
}
