//! Accessibility levels for members and visibility levels for types.
//!
//! ECMA-335 stores both as a 3-bit field in the row flags: `MethodDef.Flags` and
//! `Field.Flags` use bits `0x0007` for member access (II.23.1.10, II.23.1.5), and
//! `TypeDef.Flags` uses bits `0x0007` for type visibility (II.23.1.15). The enums in this
//! module decode that field, render it under the canonical flag name that is recorded in
//! the provenance marker, and re-encode the widened value.
//!
//! # Canonical names
//!
//! | Member access         | Name          | Type visibility        | Name                |
//! |-----------------------|---------------|------------------------|---------------------|
//! | compiler-controlled   | `PrivateScope`| top-level non-public   | `NotPublic`         |
//! | private               | `Private`     | top-level public       | `Public`            |
//! | private protected     | `FamANDAssem` | nested public          | `NestedPublic`      |
//! | internal              | `Assembly`    | nested private         | `NestedPrivate`     |
//! | protected             | `Family`      | nested protected       | `NestedFamily`      |
//! | protected internal    | `FamORAssem`  | nested internal        | `NestedAssembly`    |
//! | public                | `Public`      | nested private prot.   | `NestedFamANDAssem` |
//! |                       |               | nested protected int.  | `NestedFamORAssem`  |

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Mask selecting the member access bits of `MethodDef` and `Field` flags.
pub const MEMBER_ACCESS_MASK: u32 = 0x0007;

/// Mask selecting the visibility bits of `TypeDef` flags.
pub const TYPE_VISIBILITY_MASK: u32 = 0x0007;

/// Member accessibility as encoded in `MethodDef.Flags` / `Field.Flags`.
///
/// Methods and fields share the same encoding, so one enum serves both tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr)]
pub enum MemberAccess {
    /// Member not referenceable (compiler-controlled)
    #[strum(serialize = "PrivateScope")]
    CompilerControlled,
    /// Accessible only by the parent type
    #[strum(serialize = "Private")]
    Private,
    /// Accessible by sub-types only in this assembly
    #[strum(serialize = "FamANDAssem")]
    FamilyAndAssembly,
    /// Accessible by anyone in the assembly
    #[strum(serialize = "Assembly")]
    Assembly,
    /// Accessible only by type and sub-types
    #[strum(serialize = "Family")]
    Family,
    /// Accessible by sub-types anywhere, plus anyone in the assembly
    #[strum(serialize = "FamORAssem")]
    FamilyOrAssembly,
    /// Accessible by anyone who has visibility to this scope
    #[strum(serialize = "Public")]
    Public,
}

impl MemberAccess {
    /// Decodes the access field of raw `MethodDef` / `Field` flags.
    ///
    /// The value `0x7` is not assigned by ECMA-335; it is treated as compiler-controlled
    /// so that it is still widened and recorded.
    #[must_use]
    pub fn from_flags(flags: u32) -> Self {
        match flags & MEMBER_ACCESS_MASK {
            0x1 => MemberAccess::Private,
            0x2 => MemberAccess::FamilyAndAssembly,
            0x3 => MemberAccess::Assembly,
            0x4 => MemberAccess::Family,
            0x5 => MemberAccess::FamilyOrAssembly,
            0x6 => MemberAccess::Public,
            _ => MemberAccess::CompilerControlled,
        }
    }

    /// The raw 3-bit encoding of this level.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            MemberAccess::CompilerControlled => 0x0,
            MemberAccess::Private => 0x1,
            MemberAccess::FamilyAndAssembly => 0x2,
            MemberAccess::Assembly => 0x3,
            MemberAccess::Family => 0x4,
            MemberAccess::FamilyOrAssembly => 0x5,
            MemberAccess::Public => 0x6,
        }
    }

    /// Returns `flags` with the access field replaced by `self`, all other bits kept.
    #[must_use]
    pub fn apply(self, flags: u32) -> u32 {
        (flags & !MEMBER_ACCESS_MASK) | self.bits()
    }
}

/// Type visibility as encoded in `TypeDef.Flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr)]
pub enum TypeVisibility {
    /// Top-level type not visible outside the assembly
    #[strum(serialize = "NotPublic")]
    NotPublic,
    /// Top-level type visible outside the assembly
    #[strum(serialize = "Public")]
    Public,
    /// Nested type with public visibility
    #[strum(serialize = "NestedPublic")]
    NestedPublic,
    /// Nested type with private visibility
    #[strum(serialize = "NestedPrivate")]
    NestedPrivate,
    /// Nested type with family visibility
    #[strum(serialize = "NestedFamily")]
    NestedFamily,
    /// Nested type with assembly visibility
    #[strum(serialize = "NestedAssembly")]
    NestedAssembly,
    /// Nested type with family and assembly visibility
    #[strum(serialize = "NestedFamANDAssem")]
    NestedFamilyAndAssembly,
    /// Nested type with family or assembly visibility
    #[strum(serialize = "NestedFamORAssem")]
    NestedFamilyOrAssembly,
}

impl TypeVisibility {
    /// Decodes the visibility field of raw `TypeDef` flags.
    #[must_use]
    pub fn from_flags(flags: u32) -> Self {
        match flags & TYPE_VISIBILITY_MASK {
            0x0 => TypeVisibility::NotPublic,
            0x1 => TypeVisibility::Public,
            0x2 => TypeVisibility::NestedPublic,
            0x3 => TypeVisibility::NestedPrivate,
            0x4 => TypeVisibility::NestedFamily,
            0x5 => TypeVisibility::NestedAssembly,
            0x6 => TypeVisibility::NestedFamilyAndAssembly,
            _ => TypeVisibility::NestedFamilyOrAssembly,
        }
    }

    /// The raw 3-bit encoding of this level.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            TypeVisibility::NotPublic => 0x0,
            TypeVisibility::Public => 0x1,
            TypeVisibility::NestedPublic => 0x2,
            TypeVisibility::NestedPrivate => 0x3,
            TypeVisibility::NestedFamily => 0x4,
            TypeVisibility::NestedAssembly => 0x5,
            TypeVisibility::NestedFamilyAndAssembly => 0x6,
            TypeVisibility::NestedFamilyOrAssembly => 0x7,
        }
    }

    /// The widest visibility a type can have given whether it is nested.
    #[must_use]
    pub fn widest(nested: bool) -> Self {
        if nested {
            TypeVisibility::NestedPublic
        } else {
            TypeVisibility::Public
        }
    }

    /// Returns `flags` with the visibility field replaced by `self`, all other bits kept.
    #[must_use]
    pub fn apply(self, flags: u32) -> u32 {
        (flags & !TYPE_VISIBILITY_MASK) | self.bits()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn member_access_roundtrips_through_bits() {
        for access in MemberAccess::iter() {
            assert_eq!(MemberAccess::from_flags(access.bits()), access);
        }
    }

    #[test]
    fn member_access_ignores_unrelated_bits() {
        // Static | HideBySig | Private
        assert_eq!(MemberAccess::from_flags(0x0091), MemberAccess::Private);
        assert_eq!(MemberAccess::from_flags(0x0086), MemberAccess::Public);
    }

    #[test]
    fn member_access_apply_keeps_other_flags() {
        let flags = 0x0091; // Static | HideBySig | Private
        assert_eq!(MemberAccess::Public.apply(flags), 0x0096);
    }

    #[test]
    fn member_access_canonical_names() {
        assert_eq!(MemberAccess::CompilerControlled.to_string(), "PrivateScope");
        assert_eq!(MemberAccess::FamilyAndAssembly.to_string(), "FamANDAssem");
        assert_eq!(MemberAccess::Assembly.to_string(), "Assembly");
        assert_eq!(MemberAccess::FamilyOrAssembly.to_string(), "FamORAssem");
        assert_eq!(
            MemberAccess::from_str("Family").unwrap(),
            MemberAccess::Family
        );
        assert!(MemberAccess::from_str("protected").is_err());
    }

    #[test]
    fn type_visibility_roundtrips_through_bits() {
        for visibility in TypeVisibility::iter() {
            assert_eq!(TypeVisibility::from_flags(visibility.bits()), visibility);
        }
    }

    #[test]
    fn type_visibility_widest() {
        assert_eq!(TypeVisibility::widest(false), TypeVisibility::Public);
        assert_eq!(TypeVisibility::widest(true), TypeVisibility::NestedPublic);
    }

    #[test]
    fn type_visibility_apply_keeps_other_flags() {
        // Sealed | BeforeFieldInit | NestedPrivate
        let flags = 0x0010_0103;
        assert_eq!(TypeVisibility::NestedPublic.apply(flags), 0x0010_0102);
        // Abstract | Sealed | NotPublic (static class)
        assert_eq!(TypeVisibility::Public.apply(0x0000_0180), 0x0000_0181);
    }

    #[test]
    fn type_visibility_canonical_names() {
        assert_eq!(TypeVisibility::NotPublic.to_string(), "NotPublic");
        assert_eq!(
            TypeVisibility::NestedFamilyOrAssembly.to_string(),
            "NestedFamORAssem"
        );
        assert_eq!(
            TypeVisibility::from_str("NestedAssembly").unwrap(),
            TypeVisibility::NestedAssembly
        );
    }
}
