//! Provenance marker: the `RuntimeVisibilityAttribute` type, its value blob, and an audit reader.
//!
//! Every element whose visibility gets widened receives one custom attribute instance of the
//! marker type. The single constructor argument is the canonical name of the visibility the
//! element had before (`Private`, `NestedAssembly`, ...), so the change can be inspected and
//! reverted later.
//!
//! # Marker type shape
//!
//! ```text
//! public class RuntimeVisibilityAttribute : System.Attribute
//! {
//!     public RuntimeVisibilityAttribute(string visibility);
//! }
//! ```
//!
//! The constructor has no body (RVA 0). The attribute is never instantiated at runtime; it only
//! has to be well-formed metadata that decompilers and reflection-only loaders can read.
//!
//! # Value blob
//!
//! Per ECMA-335 II.23.3 a custom attribute value with a single `string` fixed argument and no
//! named arguments is laid out as:
//!
//! | Bytes        | Meaning                                   |
//! |--------------|-------------------------------------------|
//! | `01 00`      | prolog                                    |
//! | `len`        | compressed unsigned length of the UTF-8   |
//! | `bytes...`   | UTF-8 text                                |
//! | `00 00`      | number of named arguments                 |

use std::collections::HashSet;

use dotscope::{
    metadata::tables::{
        CodedIndex, CodedIndexType, CustomAttributeRaw, MethodDefBuilder, ParamBuilder, TableId,
        TypeDefBuilder, TypeDefRaw, TypeRefBuilder, TypeRefRaw,
    },
    CilAssembly, CilAssemblyView,
};
use serde::Serialize;

use crate::{
    access::{MemberAccess, TypeVisibility},
    layout::ModuleLayout,
    publicize::Target,
    Error, Result,
};

/// Simple name of the injected attribute type. It lives in the global namespace.
pub const MARKER_TYPE_NAME: &str = "RuntimeVisibilityAttribute";

/// Name of the single constructor parameter.
pub const MARKER_PARAM_NAME: &str = "visibility";

/// Name of instance constructors.
pub const CTOR_NAME: &str = ".ctor";

/// `instance void (string)`: HASTHIS, one parameter, VOID return, STRING parameter.
pub const CTOR_SIGNATURE: [u8; 4] = [0x20, 0x01, 0x01, 0x0E];

/// Public | Class | AutoLayout | AnsiClass
const MARKER_TYPE_FLAGS: u32 = 0x0000_0001;

/// Public | HideBySig | SpecialName | RTSpecialName
const CTOR_FLAGS: u32 = 0x0006 | 0x0080 | 0x0800 | 0x1000;

const PARAM_FLAGS_NONE: u32 = 0;

const PROLOG: [u8; 2] = [0x01, 0x00];

/// Handle to the marker constructor, used as the `Type` column of every marker instance.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerCtor {
    constructor: CodedIndex,
    created: bool,
}

impl MarkerCtor {
    /// Wraps an existing `MethodDef` row.
    #[must_use]
    pub fn from_method_rid(rid: u32, created: bool) -> Self {
        MarkerCtor {
            constructor: CodedIndex::new(
                TableId::MethodDef,
                rid,
                CodedIndexType::CustomAttributeType,
            ),
            created,
        }
    }

    /// `CustomAttributeType` coded index of the constructor.
    #[must_use]
    pub fn coded_index(&self) -> &CodedIndex {
        &self.constructor
    }

    /// `true` if the marker type was injected by this run, `false` if it was already present.
    #[must_use]
    pub fn created(&self) -> bool {
        self.created
    }
}

/// Fetches the marker constructor of `assembly`, injecting the marker type first if needed.
///
/// `layout` must be the snapshot of the same assembly. The lookup is done per call and per
/// module: there is no cache shared between assemblies.
///
/// # Errors
///
/// Returns [`Error::Metadata`] if one of the builders rejects a row.
pub fn ensure_marker(assembly: &mut CilAssembly, layout: &ModuleLayout) -> Result<MarkerCtor> {
    if let Some(ctor) = find_marker(layout) {
        log::debug!(
            "reusing existing {MARKER_TYPE_NAME} (.ctor MethodDef {})",
            ctor.constructor.row
        );
        return Ok(ctor);
    }
    if layout.find_top_level_type("", MARKER_TYPE_NAME).is_some() {
        log::warn!(
            "{MARKER_TYPE_NAME} exists without a .ctor(string), injecting a separate marker type"
        );
    }

    let extends = attribute_base(assembly)?;
    if extends.is_none() {
        log::warn!(
            "no System.Attribute reference and no core library reference found, \
             {MARKER_TYPE_NAME} is emitted without a base type"
        );
    }

    let field_list = assembly.next_rid(TableId::Field)?;
    let method_list = assembly.next_rid(TableId::MethodDef)?;

    let mut typedef = TypeDefBuilder::new()
        .name(MARKER_TYPE_NAME)
        .flags(MARKER_TYPE_FLAGS)
        .field_list(field_list)
        .method_list(method_list);
    if let Some(extends) = extends {
        typedef = typedef.extends(extends);
    }
    typedef.build(assembly)?;

    let param_list = assembly.next_rid(TableId::Param)?;
    let ctor = MethodDefBuilder::new()
        .name(CTOR_NAME)
        .flags(CTOR_FLAGS)
        .impl_flags(0)
        .signature(&CTOR_SIGNATURE)
        .rva(0)
        .param_list(param_list)
        .build(assembly)?;

    ParamBuilder::new()
        .name(MARKER_PARAM_NAME)
        .flags(PARAM_FLAGS_NONE)
        .sequence(1)
        .build(assembly)?;

    let token = ctor.placeholder_token().ok_or_else(|| {
        Error::Metadata(dotscope::Error::ModificationInvalid(
            "marker constructor is not a table row".to_string(),
        ))
    })?;

    log::debug!("injected {MARKER_TYPE_NAME} (.ctor at MethodDef row {method_list})");
    Ok(MarkerCtor::from_method_rid(token.row(), true))
}

/// Finds a previously injected marker in the snapshot.
///
/// Only a top-level type in the global namespace qualifies, and only through a `.ctor` whose
/// signature is exactly `instance void (string)`. Lookalikes are ignored so that marker values
/// are never attached to a constructor that cannot take them.
#[must_use]
pub fn find_marker(layout: &ModuleLayout) -> Option<MarkerCtor> {
    marker_ctor_rids(layout)
        .next()
        .map(|rid| MarkerCtor::from_method_rid(rid, false))
}

fn marker_ctor_rids(layout: &ModuleLayout) -> impl Iterator<Item = u32> + '_ {
    layout
        .find_top_level_type("", MARKER_TYPE_NAME)
        .into_iter()
        .flat_map(|t| &t.methods)
        .filter(|m| m.name == CTOR_NAME && m.signature == CTOR_SIGNATURE)
        .map(|m| m.rid)
}

/// `TypeDefOrRef` index of `System.Attribute`.
///
/// Order of preference: an existing `TypeRef`, a `TypeDef` (when the module is the core
/// library itself), a new `TypeRef` scoped to the core library reference. `None` when none
/// of them is available.
fn attribute_base(assembly: &mut CilAssembly) -> Result<Option<CodedIndex>> {
    if let Some(existing) = find_existing_attribute(assembly.view()) {
        return Ok(Some(existing));
    }

    let Some(core_lib_ref) = assembly.find_core_library_ref() else {
        return Ok(None);
    };

    let typeref = TypeRefBuilder::new()
        .name("Attribute")
        .namespace("System")
        .resolution_scope(core_lib_ref)
        .build(assembly)?;
    let token = typeref.placeholder_token().ok_or_else(|| {
        Error::Metadata(dotscope::Error::ModificationInvalid(
            "System.Attribute reference is not a table row".to_string(),
        ))
    })?;

    Ok(Some(CodedIndex::new(
        TableId::TypeRef,
        token.row(),
        CodedIndexType::TypeDefOrRef,
    )))
}

fn find_existing_attribute(view: &CilAssemblyView) -> Option<CodedIndex> {
    let tables = view.tables()?;
    let strings = view.strings()?;
    let is_attribute = |namespace: u32, name: u32| {
        matches!(
            (strings.get(namespace as usize), strings.get(name as usize)),
            (Ok("System"), Ok("Attribute"))
        )
    };

    if let Some(typeref) = tables
        .table::<TypeRefRaw>()
        .and_then(|t| t.iter().find(|r| is_attribute(r.type_namespace, r.type_name)))
    {
        return Some(CodedIndex::new(
            TableId::TypeRef,
            typeref.rid,
            CodedIndexType::TypeDefOrRef,
        ));
    }

    tables
        .table::<TypeDefRaw>()
        .and_then(|t| t.iter().find(|r| is_attribute(r.type_namespace, r.type_name)))
        .map(|typedef| CodedIndex::new(TableId::TypeDef, typedef.rid, CodedIndexType::TypeDefOrRef))
}

/// Encodes the custom attribute value blob carrying `visibility`.
#[must_use]
pub fn encode_value(visibility: &str) -> Vec<u8> {
    let text = visibility.as_bytes();
    let mut blob = Vec::with_capacity(text.len() + 8);
    blob.extend_from_slice(&PROLOG);
    write_compressed_u32(&mut blob, text.len() as u32);
    blob.extend_from_slice(text);
    blob.extend_from_slice(&[0x00, 0x00]);
    blob
}

/// Decodes a value blob produced by [`encode_value`].
///
/// # Errors
///
/// Returns [`Error::Metadata`] if the prolog is wrong, the string is null or truncated, or the
/// text is not UTF-8.
pub fn decode_value(blob: &[u8]) -> Result<String> {
    let malformed =
        |what: &str| Error::Metadata(dotscope::Error::Other(format!("marker value blob: {what}")));

    let Some(rest) = blob.strip_prefix(&PROLOG) else {
        return Err(malformed("missing prolog"));
    };
    if rest.first() == Some(&0xFF) {
        return Err(malformed("null string"));
    }
    let (len, consumed) = read_compressed_u32(rest).ok_or_else(|| malformed("bad length"))?;
    let rest = &rest[consumed..];
    let text = rest
        .get(..len as usize)
        .ok_or_else(|| malformed("truncated string"))?;

    String::from_utf8(text.to_vec()).map_err(|_| malformed("invalid UTF-8"))
}

fn write_compressed_u32(out: &mut Vec<u8>, value: u32) {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 0x4000 {
        out.extend_from_slice(&[0x80 | (value >> 8) as u8, value as u8]);
    } else {
        out.extend_from_slice(&(0xC000_0000 | value).to_be_bytes());
    }
}

fn read_compressed_u32(data: &[u8]) -> Option<(u32, usize)> {
    let first = *data.first()?;
    if first & 0x80 == 0 {
        Some((u32::from(first), 1))
    } else if first & 0xC0 == 0x80 {
        let second = *data.get(1)?;
        Some(((u32::from(first & 0x3F) << 8) | u32::from(second), 2))
    } else {
        let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
        Some((u32::from_be_bytes(bytes) & 0x1FFF_FFFF, 4))
    }
}

/// One marker instance found in an assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerRecord {
    /// Element the marker is attached to
    pub target: Target,
    /// Recorded visibility before widening
    pub original: String,
}

impl MarkerRecord {
    /// Original accessibility of a method or field marker.
    #[must_use]
    pub fn original_access(&self) -> Option<MemberAccess> {
        match self.target {
            Target::Method(_) | Target::Field(_) => self.original.parse().ok(),
            Target::Type(_) => None,
        }
    }

    /// Original visibility of a type marker.
    #[must_use]
    pub fn original_visibility(&self) -> Option<TypeVisibility> {
        match self.target {
            Target::Type(_) => self.original.parse().ok(),
            Target::Method(_) | Target::Field(_) => None,
        }
    }
}

/// Lists every marker instance attached in `view`, in `CustomAttribute` table order.
///
/// Attributes whose value blob cannot be decoded are skipped with a warning.
///
/// # Errors
///
/// Returns [`Error::Metadata`] if the type snapshot cannot be read.
pub fn read_markers(view: &CilAssemblyView) -> Result<Vec<MarkerRecord>> {
    let layout = ModuleLayout::from_view(view)?;
    let ctors: HashSet<u32> = marker_ctor_rids(&layout).collect();
    if ctors.is_empty() {
        return Ok(Vec::new());
    }

    let (Some(tables), Some(blobs)) = (view.tables(), view.blobs()) else {
        return Ok(Vec::new());
    };
    let Some(attributes) = tables.table::<CustomAttributeRaw>() else {
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    for attribute in attributes.iter() {
        if attribute.constructor.tag != TableId::MethodDef
            || !ctors.contains(&attribute.constructor.row)
        {
            continue;
        }
        let Some(target) = Target::from_parent(&attribute.parent) else {
            continue;
        };
        let decoded = blobs
            .get(attribute.value as usize)
            .map_err(Error::from)
            .and_then(decode_value);
        match decoded {
            Ok(original) => records.push(MarkerRecord { target, original }),
            Err(e) => log::warn!("skipping CustomAttribute row {}: {e}", attribute.rid),
        }
    }

    Ok(records)
}
