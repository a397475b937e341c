//! A compiled routine's signature and call-frame layout.

use std::collections::HashMap;

use crate::ast::TypeExpr;
use crate::error::CompileError;
use crate::types::{DataTable, Type};

/// One routine's parameters, locals, and return type, plus whether it is
/// the distinguished entry routine (`return` inside it compiles to `hlt`).
#[derive(Debug, Clone)]
pub struct Routine {
    pub parameters: Vec<(String, Type, u16)>,
    pub locals: Vec<(String, Type, u16)>,
    pub locals_size: u16,
    pub return_type: Type,
    pub is_entry: bool,
}

impl Routine {
    pub fn parameter(&self, name: &str) -> Option<&(String, Type, u16)> {
        self.parameters.iter().find(|(n, ..)| n == name)
    }

    pub fn local(&self, name: &str) -> Option<&(String, Type, u16)> {
        self.locals.iter().find(|(n, ..)| n == name)
    }

    pub fn total_parameter_size(&self, data_table: &DataTable) -> Result<u16, CompileError> {
        self.parameters.iter().map(|(_, ty, _)| ty.size(data_table)).sum()
    }
}

/// Parameter offsets from BP, in declaration order, starting at 4 (just
/// above the saved BP and return address) and increasing by each
/// parameter's size.
pub fn layout_parameters(
    params: &[(String, TypeExpr)],
    data_table: &DataTable,
) -> Result<Vec<(String, Type, u16)>, CompileError> {
    let mut cumulative = 4u16;
    let mut laid_out = Vec::with_capacity(params.len());
    for (name, type_expr) in params {
        let ty = resolve_type_expr(type_expr, data_table)?;
        let size = ty.size(data_table)?;
        laid_out.push((name.clone(), ty, cumulative));
        cumulative += size;
    }
    Ok(laid_out)
}

/// Local offsets from BP, addressed by subtraction. Declarations are
/// walked in reverse source order; the last-declared local sits closest
/// to BP (offset 1), and offsets grow as declarations are earlier in
/// source. Returns the laid-out locals (in source order) and the third
/// tuple element set to the offset *after* accounting for this local's
/// size (so `locals_size` is the final cumulative value minus one).
pub fn layout_locals(
    locals: &[(String, TypeExpr)],
    data_table: &DataTable,
) -> Result<(Vec<(String, Type, u16)>, u16), CompileError> {
    let mut cumulative = 1u16;
    let mut reversed = Vec::with_capacity(locals.len());
    for (name, type_expr) in locals.iter().rev() {
        let ty = resolve_type_expr(type_expr, data_table)?;
        let size = ty.size(data_table)?;
        let offset = cumulative;
        cumulative += size;
        reversed.push((name.clone(), ty, offset));
    }
    reversed.reverse();
    let total_size = cumulative - 1;
    Ok((reversed, total_size))
}

/// Map a parsed type expression to a `Type`, resolving named references
/// against the data table and propagating unresolved names for later
/// cascade-time resolution.
pub fn resolve_type_expr(expr: &TypeExpr, data_table: &DataTable) -> Result<Type, CompileError> {
    Ok(match expr {
        TypeExpr::Base(width) => {
            if *width != 0 && *width != 8 && *width != 16 {
                return Err(CompileError::InvalidLiteralWidth { width: *width });
            }
            Type::Base { width: *width as u8 }
        }
        TypeExpr::Named(name) => {
            if data_table.contains_key(name) {
                Type::Unresolved { name: name.clone() }
            } else {
                return Err(CompileError::UnknownDataType { name: name.clone() });
            }
        }
        TypeExpr::Reference(inner) => Type::Reference { inner: Box::new(resolve_type_expr(inner, data_table)?) },
        TypeExpr::Array(elem, length) => Type::Array { elem: Box::new(resolve_type_expr(elem, data_table)?), length: *length },
    })
}

/// The routine table: every routine declared so far, keyed by name.
pub type RoutineTable = HashMap<String, Routine>;

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> (String, TypeExpr) {
        (name.to_string(), TypeExpr::Base(8))
    }

    fn named16(name: &str) -> (String, TypeExpr) {
        (name.to_string(), TypeExpr::Base(16))
    }

    #[test]
    fn parameter_offsets_start_at_four_and_grow_with_declaration_order() {
        let table = DataTable::new();
        let params = vec![named("a"), named16("b"), named("c")];
        let laid_out = layout_parameters(&params, &table).unwrap();
        assert_eq!(laid_out[0], ("a".to_string(), Type::Base { width: 8 }, 4));
        assert_eq!(laid_out[1], ("b".to_string(), Type::Base { width: 16 }, 5));
        assert_eq!(laid_out[2], ("c".to_string(), Type::Base { width: 8 }, 7));
    }

    #[test]
    fn local_offsets_start_at_one_and_grow_in_reverse_declaration_order() {
        let table = DataTable::new();
        let locals = vec![named("first"), named16("second"), named("third")];
        let (laid_out, total_size) = layout_locals(&locals, &table).unwrap();
        // Walked in reverse: "third" (offset 1), "second" (offset 2), "first" (offset 4).
        assert_eq!(laid_out[0], ("first".to_string(), Type::Base { width: 8 }, 4));
        assert_eq!(laid_out[1], ("second".to_string(), Type::Base { width: 16 }, 2));
        assert_eq!(laid_out[2], ("third".to_string(), Type::Base { width: 8 }, 1));
        assert_eq!(total_size, 4);
    }

    #[test]
    fn empty_locals_have_zero_size() {
        let table = DataTable::new();
        let (laid_out, total_size) = layout_locals(&[], &table).unwrap();
        assert!(laid_out.is_empty());
        assert_eq!(total_size, 0);
    }

    #[test]
    fn named_type_must_already_be_registered() {
        let table = DataTable::new();
        let err = resolve_type_expr(&TypeExpr::Named("Point".to_string()), &table).unwrap_err();
        assert!(matches!(err, CompileError::UnknownDataType { .. }));
    }

    #[test]
    fn total_parameter_size_sums_every_parameter() {
        let table = DataTable::new();
        let params = vec![named("a"), named16("b")];
        let laid_out = layout_parameters(&params, &table).unwrap();
        let routine = Routine {
            parameters: laid_out,
            locals: Vec::new(),
            locals_size: 0,
            return_type: Type::Base { width: 0 },
            is_entry: false,
        };
        assert_eq!(routine.total_parameter_size(&table).unwrap(), 3);
    }
}
