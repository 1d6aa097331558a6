//! The C type system: base types, pointers, arrays, and struct layouts.
//!
//! Sizes and struct-member offsets follow the simplified (no padding/
//! alignment) model specified for this compiler: `char`=1, `short`=2,
//! `int`=4, `long`=8, `float`=4, `double`=8, any pointer=8.

use std::fmt;

/// A scalar base type, or a marker for "unresolved" (used transiently while
/// parsing self-referential struct members — see [`Type::struct_ref`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BaseType {
    Void,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Struct(String),
    Unknown,
}

/// A named `(member_name, type)` pair inside a struct declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
}

/// A C type: a base type plus pointer depth and optional array-ness.
///
/// Invariant: an array of pointers carries both `pointer_depth > 0` and
/// `is_array = true` (e.g. `int *a[10]` is `{base: Int, pointer_depth: 1,
/// is_array: true, array_size: 10}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Type {
    pub base: BaseType,
    pub pointer_depth: u32,
    pub is_array: bool,
    pub array_size: usize,
}

impl Type {
    pub fn scalar(base: BaseType) -> Self {
        Type {
            base,
            pointer_depth: 0,
            is_array: false,
            array_size: 0,
        }
    }

    pub fn void() -> Self {
        Self::scalar(BaseType::Void)
    }

    pub fn int() -> Self {
        Self::scalar(BaseType::Int)
    }

    pub fn char() -> Self {
        Self::scalar(BaseType::Char)
    }

    pub fn pointer_to(base: BaseType, depth: u32) -> Self {
        Type {
            base,
            pointer_depth: depth,
            is_array: false,
            array_size: 0,
        }
    }

    pub fn array_of(base: BaseType, size: usize) -> Self {
        Type {
            base,
            pointer_depth: 0,
            is_array: true,
            array_size: size,
        }
    }

    pub fn struct_ref(name: impl Into<String>) -> Self {
        Self::scalar(BaseType::Struct(name.into()))
    }

    /// The type obtained by adding one level of pointer indirection.
    pub fn pointer(&self) -> Type {
        let mut t = self.clone();
        if t.is_array {
            // Array decays into a pointer to its element type, not a
            // pointer to the array.
            t.is_array = false;
            t.array_size = 0;
        }
        t.pointer_depth += 1;
        t
    }

    /// The type obtained by removing one level of pointer indirection
    /// (dereferencing). Returns `None` if this type is not a pointer.
    pub fn dereferenced(&self) -> Option<Type> {
        if self.pointer_depth == 0 {
            return None;
        }
        let mut t = self.clone();
        t.pointer_depth -= 1;
        Some(t)
    }

    /// Array-to-pointer decay used everywhere an array-typed expression
    /// appears except as the operand of `sizeof` or `&`.
    pub fn decayed(&self) -> Type {
        if self.is_array {
            Type {
                base: self.base.clone(),
                pointer_depth: self.pointer_depth + 1,
                is_array: false,
                array_size: 0,
            }
        } else {
            self.clone()
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer_depth > 0
    }

    pub fn is_void(&self) -> bool {
        self.pointer_depth == 0 && !self.is_array && self.base == BaseType::Void
    }

    pub fn is_void_pointer(&self) -> bool {
        self.pointer_depth > 0 && self.base == BaseType::Void
    }

    pub fn is_struct(&self) -> bool {
        self.pointer_depth == 0 && !self.is_array && matches!(self.base, BaseType::Struct(_))
    }

    pub fn struct_name(&self) -> Option<&str> {
        match &self.base {
            BaseType::Struct(name) if self.pointer_depth == 0 && !self.is_array => Some(name),
            _ => None,
        }
    }

    pub fn is_integral(&self) -> bool {
        self.pointer_depth == 0
            && !self.is_array
            && matches!(
                self.base,
                BaseType::Char | BaseType::Short | BaseType::Int | BaseType::Long
            )
    }

    pub fn is_floating(&self) -> bool {
        self.pointer_depth == 0
            && !self.is_array
            && matches!(self.base, BaseType::Float | BaseType::Double)
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integral() || self.is_floating()
    }

    /// Structural equality (identical base, pointer depth, array-ness).
    pub fn equals(&self, other: &Type) -> bool {
        self == other
    }

    /// Whether `self` (the source type) may be assigned to a variable of
    /// type `target` without an error (a narrowing warning may still apply).
    pub fn assignable_to(&self, target: &Type, structs: &StructTable) -> bool {
        if self.equals(target) {
            return true;
        }
        if self.is_arithmetic() && target.is_arithmetic() {
            return true;
        }
        if (self.is_void_pointer() && target.is_pointer())
            || (target.is_void_pointer() && self.is_pointer())
        {
            return true;
        }
        if self.is_struct() && target.is_struct() {
            if self.struct_name() == target.struct_name() {
                return true;
            }
            // Structurally identical anonymous-name mismatches still count
            // as compatible if the member lists agree.
            if let (Some(a), Some(b)) = (
                self.struct_name().and_then(|n| structs.get(n)),
                target.struct_name().and_then(|n| structs.get(n)),
            ) {
                return a.members == b.members;
            }
        }
        false
    }

    /// Whether converting `self` to `target` loses information and should
    /// warn (see SPEC_FULL.md §9: any float/double -> integer, or any
    /// wider-integer -> narrower-integer conversion).
    pub fn is_narrowing_conversion_to(&self, target: &Type) -> bool {
        if self.equals(target) {
            return false;
        }
        if self.is_floating() && target.is_integral() {
            return true;
        }
        if self.is_integral() && target.is_integral() {
            return integer_rank(&self.base) > integer_rank(&target.base);
        }
        false
    }

    pub fn size_in_bytes(&self, structs: &StructTable) -> usize {
        if self.is_pointer() {
            return 8;
        }
        let element = base_size(&self.base, structs);
        if self.is_array {
            element * self.array_size.max(1)
        } else {
            element
        }
    }
}

fn base_size(base: &BaseType, structs: &StructTable) -> usize {
    match base {
        BaseType::Void => 0,
        BaseType::Char => 1,
        BaseType::Short => 2,
        BaseType::Int => 4,
        BaseType::Long => 8,
        BaseType::Float => 4,
        BaseType::Double => 8,
        BaseType::Struct(name) => structs
            .get(name)
            .map(|info| info.size_in_bytes(structs))
            .unwrap_or(0),
        BaseType::Unknown => 0,
    }
}

/// Integer promotion rank used by the usual arithmetic conversions:
/// `char`/`short` < `int` < `long`.
pub(crate) fn integer_rank(base: &BaseType) -> u8 {
    match base {
        BaseType::Char | BaseType::Short => 0,
        BaseType::Int => 1,
        BaseType::Long => 2,
        _ => 0,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match &self.base {
            BaseType::Void => "void".to_string(),
            BaseType::Char => "char".to_string(),
            BaseType::Short => "short".to_string(),
            BaseType::Int => "int".to_string(),
            BaseType::Long => "long".to_string(),
            BaseType::Float => "float".to_string(),
            BaseType::Double => "double".to_string(),
            BaseType::Struct(name) => format!("struct {name}"),
            BaseType::Unknown => "<unknown>".to_string(),
        };
        write!(f, "{base}")?;
        for _ in 0..self.pointer_depth {
            write!(f, "*")?;
        }
        if self.is_array {
            if self.array_size > 0 {
                write!(f, "[{}]", self.array_size)?;
            } else {
                write!(f, "[]")?;
            }
        }
        Ok(())
    }
}

/// Info about a declared struct type, keyed by tag name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructInfo {
    pub name: String,
    pub members: Vec<StructMember>,
}

impl StructInfo {
    pub fn member_type(&self, member_name: &str) -> Option<&Type> {
        self.members
            .iter()
            .find(|m| m.name == member_name)
            .map(|m| &m.ty)
    }

    /// Byte offset of `member_name`: the sum of the sizes of all preceding
    /// members (no padding, per the simplified layout model).
    pub fn member_offset(&self, member_name: &str, structs: &StructTable) -> Option<usize> {
        let mut offset = 0;
        for m in &self.members {
            if m.name == member_name {
                return Some(offset);
            }
            offset += m.ty.size_in_bytes(structs);
        }
        None
    }

    pub fn size_in_bytes(&self, structs: &StructTable) -> usize {
        self.members.iter().map(|m| m.ty.size_in_bytes(structs)).sum()
    }
}

/// The set of struct declarations visible to the type system, keyed by tag
/// name. Lookups are deferred (done at use, not at struct-declaration time)
/// so a struct may contain a pointer to itself (`struct Node { struct Node*
/// next; }`) — see SPEC_FULL.md §9 / DESIGN.md.
#[derive(Debug, Clone, Default)]
pub struct StructTable {
    structs: std::collections::HashMap<String, StructInfo>,
}

impl StructTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: StructInfo) {
        self.structs.insert(info.name.clone(), info);
    }

    pub fn get(&self, name: &str) -> Option<&StructInfo> {
        self.structs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_and_array_compose() {
        let mut t = Type::int();
        t.is_array = true;
        t.array_size = 4;
        let decayed = t.decayed();
        assert_eq!(decayed.pointer_depth, 1);
        assert!(!decayed.is_array);
    }

    #[test]
    fn array_of_pointers_invariant() {
        let t = Type {
            base: BaseType::Int,
            pointer_depth: 1,
            is_array: true,
            array_size: 10,
        };
        assert!(t.pointer_depth > 0 && t.is_array);
    }

    #[test]
    fn void_pointer_compatible_with_any_pointer() {
        let structs = StructTable::new();
        let void_ptr = Type::pointer_to(BaseType::Void, 1);
        let int_ptr = Type::pointer_to(BaseType::Int, 1);
        assert!(void_ptr.assignable_to(&int_ptr, &structs));
        assert!(int_ptr.assignable_to(&void_ptr, &structs));
    }

    #[test]
    fn arithmetic_types_compatible() {
        let structs = StructTable::new();
        assert!(Type::int().assignable_to(&Type::scalar(BaseType::Float), &structs));
    }

    #[test]
    fn narrowing_conversion_detection() {
        assert!(Type::scalar(BaseType::Float).is_narrowing_conversion_to(&Type::int()));
        assert!(Type::scalar(BaseType::Long).is_narrowing_conversion_to(&Type::int()));
        assert!(!Type::int().is_narrowing_conversion_to(&Type::scalar(BaseType::Long)));
        assert!(!Type::int().is_narrowing_conversion_to(&Type::int()));
    }

    #[test]
    fn struct_member_offsets_have_no_padding() {
        let mut structs = StructTable::new();
        structs.insert(StructInfo {
            name: "Point".to_string(),
            members: vec![
                StructMember {
                    name: "x".to_string(),
                    ty: Type::char(),
                },
                StructMember {
                    name: "y".to_string(),
                    ty: Type::int(),
                },
            ],
        });
        let info = structs.get("Point").unwrap();
        assert_eq!(info.member_offset("x", &structs), Some(0));
        assert_eq!(info.member_offset("y", &structs), Some(1));
        assert_eq!(info.size_in_bytes(&structs), 5);
    }

    #[test]
    fn self_referential_struct_pointer_resolves_lazily() {
        let mut structs = StructTable::new();
        structs.insert(StructInfo {
            name: "Node".to_string(),
            members: vec![
                StructMember {
                    name: "data".to_string(),
                    ty: Type::int(),
                },
                StructMember {
                    name: "next".to_string(),
                    ty: Type::pointer_to(BaseType::Struct("Node".to_string()), 1),
                },
            ],
        });
        let info = structs.get("Node").unwrap();
        // pointer members are always 8 bytes regardless of pointee size,
        // so declaring this works even though Node isn't fully sized yet
        // at the point `next`'s type was constructed.
        assert_eq!(info.member_type("next").unwrap().size_in_bytes(&structs), 8);
    }

    #[test]
    fn display_renders_pointer_and_array() {
        let t = Type::pointer_to(BaseType::Char, 2);
        assert_eq!(t.to_string(), "char**");
        let arr = Type::array_of(BaseType::Int, 5);
        assert_eq!(arr.to_string(), "int[5]");
    }
}
