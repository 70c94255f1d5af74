//! Retargeting source types to port types.
//!
//! Predefined scalars map to the scalar port kinds, `List<T>` to a list
//! port, tuples element-wise, and named types to object kinds. Names that
//! already denote port types (`IntPort`, `ListPort<T>`, ...) are accepted
//! as-is so pre-retargeted trees round-trip.

use chipflow_core::{Catalog, ValueKind};

use crate::error::LoweringError;
use crate::source::{PredefinedType, Span, TypeRef};

/// Retargets a type that may be `void`.
pub(crate) fn retarget(
    ty: &TypeRef,
    catalog: &Catalog,
    span: Span,
) -> Result<Option<ValueKind>, LoweringError> {
    match ty {
        TypeRef::Predefined(PredefinedType::Void) => Ok(None),
        other => retarget_value(other, catalog, span).map(Some),
    }
}

/// Retargets a type in value position.
pub(crate) fn retarget_value(
    ty: &TypeRef,
    catalog: &Catalog,
    span: Span,
) -> Result<ValueKind, LoweringError> {
    match ty {
        TypeRef::Predefined(p) => match p {
            PredefinedType::Void => Err(LoweringError::Unsupported {
                construct: "void in value position".into(),
                span,
            }),
            PredefinedType::Bool => Ok(ValueKind::Bool),
            PredefinedType::Int => Ok(ValueKind::Int),
            PredefinedType::Float => Ok(ValueKind::Float),
            PredefinedType::String => Ok(ValueKind::String),
        },
        TypeRef::Named(name) => Ok(named(name, catalog)),
        TypeRef::Generic { name, args } => match (name.as_str(), args.as_slice()) {
            ("List" | "ListPort", [element]) => Ok(ValueKind::List(Box::new(retarget_value(
                element, catalog, span,
            )?))),
            _ => Err(LoweringError::Unsupported {
                construct: format!("generic type '{}'", name),
                span,
            }),
        },
        TypeRef::Tuple(elements) => elements
            .iter()
            .map(|e| retarget_value(&e.ty, catalog, span))
            .collect::<Result<Vec<_>, _>>()
            .map(ValueKind::Tuple),
    }
}

fn named(name: &str, catalog: &Catalog) -> ValueKind {
    match name {
        "BoolPort" | "Boolean" => ValueKind::Bool,
        "IntPort" | "Int32" => ValueKind::Int,
        "FloatPort" | "Single" => ValueKind::Float,
        "StringPort" | "String" => ValueKind::String,
        "object" | "AnyPort" => ValueKind::Any,
        _ => {
            let kind = name.strip_suffix("Port").unwrap_or(name);
            if !catalog.is_object_kind(kind) {
                tracing::debug!(name, "type is not a catalog object kind");
            }
            ValueKind::Object(kind.to_string())
        }
    }
}

/// Element names of a tuple type, `ItemN` for unnamed elements.
pub(crate) fn tuple_names(ty: &TypeRef) -> Option<Vec<String>> {
    match ty {
        TypeRef::Tuple(elements) if elements.iter().any(|e| e.name.is_some()) => Some(
            elements
                .iter()
                .enumerate()
                .map(|(i, e)| e.name.clone().unwrap_or_else(|| format!("Item{}", i + 1)))
                .collect(),
        ),
        _ => None,
    }
}
