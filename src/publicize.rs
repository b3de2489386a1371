//! Visibility widening traversal.
//!
//! [`publicize`] walks a [`ModuleLayout`] in `TypeDef` order and, for each type, first widens
//! its methods, then its fields, then the type itself. Every widened element receives one
//! provenance marker recording its previous visibility before its flags are rewritten.
//!
//! The traversal only talks to the module through [`MetadataEditor`], which [`CilAssembly`]
//! implements by appending `CustomAttribute` rows and updating the flag column of the raw
//! `TypeDef` / `MethodDef` / `Field` rows.

use dotscope::{
    metadata::tables::{
        CodedIndex, CodedIndexType, CustomAttributeBuilder, FieldRaw, MethodDefRaw, TableDataOwned,
        TableId, TypeDefRaw,
    },
    CilAssembly,
};
use serde::Serialize;

use crate::{
    access::{MemberAccess, TypeVisibility},
    layout::{MemberEntry, ModuleLayout},
    marker::{encode_value, MarkerCtor},
    Error, Result,
};

/// A metadata row that can carry a marker and have its visibility rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "rid", rename_all = "lowercase")]
pub enum Target {
    /// `TypeDef` row
    Type(u32),
    /// `MethodDef` row
    Method(u32),
    /// `Field` row
    Field(u32),
}

impl Target {
    /// Table holding the target row.
    #[must_use]
    pub fn table_id(self) -> TableId {
        match self {
            Target::Type(_) => TableId::TypeDef,
            Target::Method(_) => TableId::MethodDef,
            Target::Field(_) => TableId::Field,
        }
    }

    /// 1-based row id.
    #[must_use]
    pub fn rid(self) -> u32 {
        match self {
            Target::Type(rid) | Target::Method(rid) | Target::Field(rid) => rid,
        }
    }

    /// `HasCustomAttribute` coded index used as the attribute parent.
    #[must_use]
    pub fn has_custom_attribute(self) -> CodedIndex {
        CodedIndex::new(self.table_id(), self.rid(), CodedIndexType::HasCustomAttribute)
    }

    /// Maps a `HasCustomAttribute` parent back to a target, `None` for other parent tables.
    #[must_use]
    pub fn from_parent(parent: &CodedIndex) -> Option<Self> {
        match parent.tag {
            TableId::TypeDef => Some(Target::Type(parent.row)),
            TableId::MethodDef => Some(Target::Method(parent.row)),
            TableId::Field => Some(Target::Field(parent.row)),
            _ => None,
        }
    }
}

/// The two edits the traversal needs from a module.
pub trait MetadataEditor {
    /// Attaches one marker instance recording `original` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metadata`] if the attribute row cannot be added.
    fn attach_marker(&mut self, ctor: &MarkerCtor, target: Target, original: &str) -> Result<()>;

    /// Replaces the flags column of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metadata`] if the row does not exist or cannot be updated.
    fn update_flags(&mut self, target: Target, flags: u32) -> Result<()>;
}

impl MetadataEditor for CilAssembly {
    fn attach_marker(&mut self, ctor: &MarkerCtor, target: Target, original: &str) -> Result<()> {
        CustomAttributeBuilder::new()
            .parent(target.has_custom_attribute())
            .constructor(ctor.coded_index().clone())
            .value(&encode_value(original))
            .build(self)?;
        Ok(())
    }

    fn update_flags(&mut self, target: Target, flags: u32) -> Result<()> {
        let rid = target.rid();
        let missing = || {
            Error::Metadata(dotscope::Error::Other(format!(
                "{:?} row {rid} not found",
                target.table_id()
            )))
        };
        let tables = self.view().tables().ok_or_else(missing)?;

        let row = match target {
            Target::Type(_) => {
                let raw = tables
                    .table::<TypeDefRaw>()
                    .and_then(|t| t.get(rid))
                    .ok_or_else(missing)?;
                TableDataOwned::TypeDef(TypeDefRaw { flags, ..raw })
            }
            Target::Method(_) => {
                let raw = tables
                    .table::<MethodDefRaw>()
                    .and_then(|t| t.get(rid))
                    .ok_or_else(missing)?;
                TableDataOwned::MethodDef(MethodDefRaw { flags, ..raw })
            }
            Target::Field(_) => {
                let raw = tables
                    .table::<FieldRaw>()
                    .and_then(|t| t.get(rid))
                    .ok_or_else(missing)?;
                TableDataOwned::Field(FieldRaw { flags, ..raw })
            }
        };

        self.table_row_update(target.table_id(), rid, row)?;
        Ok(())
    }
}

/// Number of elements widened by one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublicizeReport {
    /// Types widened to `Public` / `NestedPublic`
    pub types: usize,
    /// Methods widened to `Public`, accessors included
    pub methods: usize,
    /// Fields widened to `Public`
    pub fields: usize,
}

impl PublicizeReport {
    /// Total number of markers attached.
    #[must_use]
    pub fn total(&self) -> usize {
        self.types + self.methods + self.fields
    }
}

/// Widens every non-public type, method and field of `layout` through `editor`.
///
/// For each type in order: methods, then fields, then the type. Elements that are already
/// public are left untouched and get no marker.
///
/// # Errors
///
/// Editor errors are returned unchanged; the module may then be partially edited.
pub fn publicize<E: MetadataEditor + ?Sized>(
    layout: &ModuleLayout,
    ctor: &MarkerCtor,
    editor: &mut E,
) -> Result<PublicizeReport> {
    let mut report = PublicizeReport::default();

    for ty in layout.types() {
        let methods = widen_members(&ty.methods, Target::Method, ctor, editor)?;
        let fields = widen_members(&ty.fields, Target::Field, ctor, editor)?;
        report.methods += methods;
        report.fields += fields;

        let visibility = ty.visibility();
        let widest = TypeVisibility::widest(ty.nested);
        if visibility != widest {
            let target = Target::Type(ty.rid);
            editor.attach_marker(ctor, target, visibility.into())?;
            editor.update_flags(target, widest.apply(ty.flags))?;
            report.types += 1;
            log::trace!("{}: {visibility} -> {widest}", ty.full_name());
        }

        if methods + fields > 0 {
            log::debug!(
                "{}: widened {methods} methods, {fields} fields",
                ty.full_name()
            );
        }
    }

    Ok(report)
}

fn widen_members<E: MetadataEditor + ?Sized>(
    members: &[MemberEntry],
    target: fn(u32) -> Target,
    ctor: &MarkerCtor,
    editor: &mut E,
) -> Result<usize> {
    let mut changed = 0;
    for member in members {
        let access = member.access();
        if access == MemberAccess::Public {
            continue;
        }
        let target = target(member.rid);
        editor.attach_marker(ctor, target, access.into())?;
        editor.update_flags(target, MemberAccess::Public.apply(member.flags))?;
        log::trace!("{}: {access} -> Public", member.name);
        changed += 1;
    }
    Ok(changed)
}
