//! Read-only snapshot of the type table of a loaded module.
//!
//! The snapshot is taken once, before the provenance marker type is injected, so that later
//! edits never change what gets visited. Each [`TypeEntry`] owns the methods and fields that
//! belong to it according to the `MethodList` / `FieldList` run encoding of ECMA-335 II.22.37:
//! a type owns the rows from its own list value up to (but excluding) the list value of the
//! next type, and the last type owns everything up to the end of the table. When the optional
//! `MethodPtr` / `FieldPtr` indirection tables are present, the list positions are resolved
//! through them to the actual `MethodDef` / `Field` row ids.

use std::{collections::HashSet, ops::Range};

use dotscope::{
    metadata::tables::{
        FieldPtrRaw, FieldRaw, MethodDefRaw, MethodPtrRaw, NestedClassRaw, TypeDefRaw,
    },
    CilAssemblyView,
};

use crate::{
    access::{MemberAccess, TypeVisibility},
    Error, Result,
};

/// A method or field row as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    /// 1-based row id in the `MethodDef` or `Field` table
    pub rid: u32,
    /// Simple name from the `#Strings` heap
    pub name: String,
    /// Raw flags of the row
    pub flags: u32,
    /// Signature blob from the `#Blob` heap, empty when the row has none
    pub signature: Vec<u8>,
}

impl MemberEntry {
    /// Accessibility decoded from [`MemberEntry::flags`].
    #[must_use]
    pub fn access(&self) -> MemberAccess {
        MemberAccess::from_flags(self.flags)
    }
}

/// A `TypeDef` row together with the members it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeEntry {
    /// 1-based row id in the `TypeDef` table
    pub rid: u32,
    /// Simple name of the type
    pub name: String,
    /// Namespace of the type, empty for the global namespace and for nested types
    pub namespace: String,
    /// Raw `TypeDef` flags
    pub flags: u32,
    /// Whether the type appears as `NestedClass` in the `NestedClass` table
    pub nested: bool,
    /// Methods in `MethodList` order
    pub methods: Vec<MemberEntry>,
    /// Fields in `FieldList` order
    pub fields: Vec<MemberEntry>,
}

impl TypeEntry {
    /// Visibility decoded from [`TypeEntry::flags`].
    #[must_use]
    pub fn visibility(&self) -> TypeVisibility {
        TypeVisibility::from_flags(self.flags)
    }

    /// `Namespace.Name`, or just `Name` in the global namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// Snapshot of every type of a module in `TypeDef` table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleLayout {
    types: Vec<TypeEntry>,
}

impl ModuleLayout {
    /// Builds a layout from already collected entries.
    ///
    /// Entries are kept in the given order.
    #[must_use]
    pub fn from_types(types: Vec<TypeEntry>) -> Self {
        ModuleLayout { types }
    }

    /// Reads the `TypeDef`, `MethodDef`, `Field`, `NestedClass` and pointer tables of `view`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metadata`] if the module has no tables stream or no strings heap, or if
    /// a name index cannot be resolved.
    pub fn from_view(view: &CilAssemblyView) -> Result<Self> {
        let Some(tables) = view.tables() else {
            return Err(Error::Metadata(dotscope::Error::Other(
                "assembly has no metadata tables stream".to_string(),
            )));
        };
        let Some(strings) = view.strings() else {
            return Err(Error::Metadata(dotscope::Error::Other(
                "assembly has no #Strings heap".to_string(),
            )));
        };
        let signature = |index: u32| -> Result<Vec<u8>> {
            match view.blobs() {
                Some(blobs) if index != 0 => Ok(blobs.get(index as usize)?.to_vec()),
                _ => Ok(Vec::new()),
            }
        };

        let Some(typedef_table) = tables.table::<TypeDefRaw>() else {
            return Ok(ModuleLayout::default());
        };

        let method_table = tables.table::<MethodDefRaw>();
        let field_table = tables.table::<FieldRaw>();
        let method_count = method_table.map_or(0, |t| t.row_count);
        let field_count = field_table.map_or(0, |t| t.row_count);

        // Indirection tables only appear in unoptimized (#-) metadata
        let method_ptrs: Option<Vec<u32>> = tables
            .table::<MethodPtrRaw>()
            .filter(|t| t.row_count > 0)
            .map(|t| t.iter().map(|row| row.method).collect());
        let field_ptrs: Option<Vec<u32>> = tables
            .table::<FieldPtrRaw>()
            .filter(|t| t.row_count > 0)
            .map(|t| t.iter().map(|row| row.field).collect());
        let method_slots = method_ptrs.as_ref().map_or(method_count, |p| p.len() as u32);
        let field_slots = field_ptrs.as_ref().map_or(field_count, |p| p.len() as u32);

        let nested: HashSet<u32> = tables
            .table::<NestedClassRaw>()
            .map(|t| t.iter().map(|row| row.nested_class).collect())
            .unwrap_or_default();

        let rows: Vec<TypeDefRaw> = typedef_table.iter().collect();
        let mut types = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let next = rows.get(index + 1);

            let mut methods = Vec::new();
            for slot in member_range(row.method_list, next.map(|n| n.method_list), method_slots) {
                let rid = resolve_slot(slot, method_ptrs.as_deref());
                let Some(method) = method_table.and_then(|t| t.get(rid)) else {
                    log::warn!("type {} lists missing method row {rid}", row.rid);
                    continue;
                };
                methods.push(MemberEntry {
                    rid,
                    name: strings.get(method.name as usize)?.to_string(),
                    flags: method.flags,
                    signature: signature(method.signature)?,
                });
            }

            let mut fields = Vec::new();
            for slot in member_range(row.field_list, next.map(|n| n.field_list), field_slots) {
                let rid = resolve_slot(slot, field_ptrs.as_deref());
                let Some(field) = field_table.and_then(|t| t.get(rid)) else {
                    log::warn!("type {} lists missing field row {rid}", row.rid);
                    continue;
                };
                fields.push(MemberEntry {
                    rid,
                    name: strings.get(field.name as usize)?.to_string(),
                    flags: field.flags,
                    signature: signature(field.signature)?,
                });
            }

            types.push(TypeEntry {
                rid: row.rid,
                name: strings.get(row.type_name as usize)?.to_string(),
                namespace: strings.get(row.type_namespace as usize)?.to_string(),
                flags: row.flags,
                nested: nested.contains(&row.rid),
                methods,
                fields,
            });
        }

        log::debug!(
            "snapshot: {} types, {} methods, {} fields",
            types.len(),
            method_count,
            field_count
        );

        Ok(ModuleLayout { types })
    }

    /// All types in `TypeDef` order.
    #[must_use]
    pub fn types(&self) -> &[TypeEntry] {
        &self.types
    }

    /// Finds a type by namespace and name. Nested types are matched with an empty namespace.
    #[must_use]
    pub fn find_type(&self, namespace: &str, name: &str) -> Option<&TypeEntry> {
        self.types
            .iter()
            .find(|t| t.namespace == namespace && t.name == name)
    }

    /// Like [`ModuleLayout::find_type`], but never matches a nested type.
    #[must_use]
    pub fn find_top_level_type(&self, namespace: &str, name: &str) -> Option<&TypeEntry> {
        self.types
            .iter()
            .find(|t| !t.nested && t.namespace == namespace && t.name == name)
    }

    /// Number of method rows covered by the snapshot.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.types.iter().map(|t| t.methods.len()).sum()
    }

    /// Number of field rows covered by the snapshot.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.types.iter().map(|t| t.fields.len()).sum()
    }
}

/// List positions owned by a type, clamped to `1..=slots`.
///
/// `start` is the type's own list value, `next` the list value of the following type (if any)
/// and `slots` the number of rows in the member (or pointer) table.
pub(crate) fn member_range(start: u32, next: Option<u32>, slots: u32) -> Range<u32> {
    let end_of_table = slots.saturating_add(1);
    let start = start.clamp(1, end_of_table);
    let end = next.unwrap_or(end_of_table).clamp(start, end_of_table);
    start..end
}

fn resolve_slot(slot: u32, ptrs: Option<&[u32]>) -> u32 {
    match ptrs {
        Some(ptrs) => ptrs.get(slot as usize - 1).copied().unwrap_or(slot),
        None => slot,
    }
}
