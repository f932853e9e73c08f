//! Selects at most one [`MethodDescriptor`] for an inbound request and
//! builds its positional argument vector (§4.4).
//!
//! Parameters are assumed declared required-first, optional-trailing
//! (the common convention this crate's [`crate::catalog::Parameter`]
//! ordering follows) so that a positional match of length `n` always
//! covers every required parameter before touching an optional one.

use serde_json::Value;

use crate::catalog::MethodCatalog;
use crate::catalog::MethodDescriptor;
use crate::error::DispatchError;

/// The descriptor the binder selected, together with the positional
/// argument vector (length equal to the descriptor's declared parameter
/// count; defaults already filled in for absent optional parameters).
pub struct BoundCall<'a> {
    pub descriptor: &'a MethodDescriptor,
    pub args: Vec<Value>,
}

/// Runs the binder algorithm of §4.4 against one overload set.
pub fn bind<'a>(
    catalog: &'a MethodCatalog,
    method: &str,
    params: Option<&Value>,
) -> Result<BoundCall<'a>, DispatchError> {
    let overload_set = catalog
        .overload_set(method)
        .filter(|set| !set.is_empty())
        .ok_or_else(|| DispatchError::MethodNotFound(method.to_string()))?;

    let mut admitted: Vec<(&MethodDescriptor, Vec<Value>, usize, usize)> = Vec::new();
    for descriptor in overload_set {
        if let Some((args, matched, unmatched_optional)) = try_admit(descriptor, params) {
            admitted.push((descriptor, args, matched, unmatched_optional));
        }
    }

    if admitted.is_empty() {
        return Err(DispatchError::InvalidParams(format!(
            "no overload of `{method}` accepts the supplied params"
        )));
    }

    admitted.sort_by(|a, b| b.2.cmp(&a.2).then(a.3.cmp(&b.3)));
    if admitted.len() > 1 && admitted[0].2 == admitted[1].2 && admitted[0].3 == admitted[1].3 {
        return Err(DispatchError::InvalidParams(format!(
            "ambiguous overload for `{method}`"
        )));
    }

    let (descriptor, args, ..) = admitted.remove(0);
    for (index, value) in args.iter().enumerate() {
        descriptor.decode_slot(index, value)?;
    }

    Ok(BoundCall { descriptor, args })
}

/// Attempts to admit `descriptor` for `params`, returning the filled
/// positional argument vector plus the (matched, unmatched-optional)
/// counts used for tie-breaking, or `None` if the shapes don't line up.
fn try_admit(descriptor: &MethodDescriptor, params: Option<&Value>) -> Option<(Vec<Value>, usize, usize)> {
    let required = descriptor.required_count();
    let total = descriptor.total_count();

    match params {
        None | Some(Value::Null) => {
            if required != 0 {
                return None;
            }
            let args = descriptor
                .parameters
                .iter()
                .map(|p| p.default.clone().unwrap_or(Value::Null))
                .collect();
            Some((args, 0, total))
        }
        Some(Value::Array(values)) => {
            let supplied = values.len();
            let within_bounds = if descriptor.allow_extra_params {
                supplied >= required
            } else {
                supplied >= required && supplied <= total
            };
            if !within_bounds {
                return None;
            }

            let matched = supplied.min(total);
            let args = (0..total)
                .map(|i| {
                    if i < matched {
                        values[i].clone()
                    } else {
                        descriptor.parameters[i].default.clone().unwrap_or(Value::Null)
                    }
                })
                .collect();
            Some((args, matched, total - matched))
        }
        Some(Value::Object(map)) => {
            let required_present = descriptor
                .parameters
                .iter()
                .filter(|p| !p.optional)
                .all(|p| map.contains_key(&p.name));
            if !required_present {
                return None;
            }

            if !descriptor.allow_extra_params {
                let declared: std::collections::HashSet<&str> =
                    descriptor.parameters.iter().map(|p| p.name.as_str()).collect();
                if map.keys().any(|k| !declared.contains(k.as_str())) {
                    return None;
                }
            }

            let mut matched = 0usize;
            let args = descriptor
                .parameters
                .iter()
                .map(|p| match map.get(&p.name) {
                    Some(value) => {
                        matched += 1;
                        value.clone()
                    }
                    None => p.default.clone().unwrap_or(Value::Null),
                })
                .collect();
            Some((args, matched, total - matched))
        }
        Some(_) => None,
    }
}
