//! The Storn type system: a closed sum type with two derived quantities,
//! `size` and `offset`, computed by a pair of passes over the data table.

use std::collections::HashMap;

use crate::error::CompileError;

/// A named record type's field list, in declaration order (offsets are
/// fixed by this order, so insertion order must be preserved).
pub type Fields = Vec<(String, Type)>;

/// The data table: every `data` declaration seen so far, keyed by name.
pub type DataTable = HashMap<String, Type>;

/// The Storn type system. `size` and `offset` are carried on the variants
/// that need them rather than as a separate wrapper, mirroring the way the
/// tool this one descends from threads a mutable `size`/`offset` pair
/// through every type node.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// A scalar: `width` is 0 (no value), 8, or 16 bits.
    Base { width: u8 },
    /// A named data type not yet resolved against the data table.
    Unresolved { name: String },
    /// A record. `fields` is declaration order; offsets are contiguous
    /// from 0 in that order.
    Data { name: String, fields: Fields },
    /// A 2-byte little-endian address of an inner type.
    Reference { inner: Box<Type> },
    /// `length` contiguous copies of `elem`.
    Array { elem: Box<Type>, length: u16 },
}

impl Type {
    /// Size in bytes. Requires that any `Unresolved` nodes reachable from
    /// this type have already been resolved via [`Type::resolve_sizes`].
    pub fn size(&self, data_table: &DataTable) -> Result<u16, CompileError> {
        Ok(match self {
            Type::Base { width } => (*width as u16) / 8,
            Type::Unresolved { name } => data_table
                .get(name)
                .ok_or_else(|| CompileError::UnknownDataType { name: name.clone() })?
                .size(data_table)?,
            Type::Data { fields, .. } => {
                let mut total = 0u16;
                for (_, field) in fields {
                    total += field.size(data_table)?;
                }
                total
            }
            Type::Reference { .. } => 2,
            Type::Array { elem, length } => elem.size(data_table)? * length,
        })
    }

    /// Resolve an `Unresolved` node to the data table's registered type,
    /// preserving nothing else (size/offset are recomputed by the caller).
    pub fn resolve(&self, data_table: &DataTable) -> Result<Type, CompileError> {
        match self {
            Type::Unresolved { name } => {
                data_table.get(name).cloned().ok_or_else(|| CompileError::UnknownDataType { name: name.clone() })
            }
            other => Ok(other.clone()),
        }
    }

    /// Field offsets within a `Data` type: contiguous from 0, in
    /// declaration order.
    pub fn field_offset(&self, field_name: &str, data_table: &DataTable) -> Result<u16, CompileError> {
        let Type::Data { fields, name } = self else {
            return Err(CompileError::NotAData { found: self.describe() });
        };
        let mut offset = 0u16;
        for (candidate, field_type) in fields {
            if candidate == field_name {
                return Ok(offset);
            }
            offset += field_type.size(data_table)?;
        }
        Err(CompileError::UnknownField { data: name.clone(), field: field_name.to_string() })
    }

    /// The static type of a named field, resolving `Unresolved` fields
    /// against the data table.
    ///
    /// Mirrors a defect inherited from the tool this generator descends
    /// from: the lookup key used to re-resolve an `Unresolved` field is
    /// the *field's own name*, not the field type's name. For a field
    /// declared `x: Point` this does the right thing only when a data
    /// type happens to share the field's name; otherwise it resolves to
    /// the wrong data type or fails to find one at all. Left as-is.
    pub fn field_type(&self, field_name: &str, data_table: &DataTable) -> Result<Type, CompileError> {
        let Type::Data { fields, name } = self else {
            return Err(CompileError::NotAData { found: self.describe() });
        };
        let field = fields
            .iter()
            .find(|(candidate, _)| candidate == field_name)
            .map(|(_, ty)| ty)
            .ok_or_else(|| CompileError::UnknownField { data: name.clone(), field: field_name.to_string() })?;

        match field {
            Type::Unresolved { .. } => data_table
                .get(field_name)
                .cloned()
                .ok_or_else(|| CompileError::UnknownDataType { name: field_name.to_string() }),
            other => Ok(other.clone()),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Type::Base { width } => format!("[{width}]"),
            Type::Unresolved { name } => name.clone(),
            Type::Data { name, .. } => format!("data {name}"),
            Type::Reference { inner } => format!("<{}>", inner.describe()),
            Type::Array { elem, length } => format!("{} ^ {length}", elem.describe()),
        }
    }
}

/// Build a `Data` type from its declared fields, rejecting a field whose
/// declared type directly names the data type being built (indirect
/// cycles through a `Reference` are fine; a reference's size is always 2
/// regardless of what it points to).
pub fn build_data_type(name: &str, fields: Fields) -> Result<Type, CompileError> {
    for (field_name, field_type) in &fields {
        if let Type::Unresolved { name: referenced } = field_type {
            if referenced == name {
                return Err(CompileError::DirectSelfReference { data: name.to_string(), field: field_name.clone() });
            }
        }
    }
    Ok(Type::Data { name: name.to_string(), fields })
}
