//! The static description of callable methods (§3, §4.3): [`MethodDescriptor`]
//! and the immutable [`MethodCatalog`] built from a set of [`MethodEntry`]
//! registrations.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{CatalogError, DispatchError};
use crate::service::{ServiceFactory, ServiceInstance};
use crate::session::Session;

/// A future boxed for storage in a trait object, mirroring the shape this
/// workspace already uses at its MCP/async-trait seams.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// The opaque handle a [`MethodDescriptor`] carries to invoke its target:
/// given the resolved service instance, the ambient session, and the
/// positional argument vector the binder produced, run the method body.
pub type HandlerFn =
    Arc<dyn Fn(ServiceInstance, Arc<Session>, Vec<Value>) -> BoxFuture<'static, Result<Value, DispatchError>> + Send + Sync>;

/// A coarse classification of the JSON value a parameter expects. The
/// binder rejects an inbound argument whose JSON variant doesn't match
/// (`Any` accepts every variant). Fine-grained typed decoding into the
/// handler's concrete Rust argument types is left to the handler closure
/// itself via `serde_json::from_value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
    Any,
}

impl ParamKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamKind::Any => true,
            ParamKind::Null => value.is_null(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Number => value.is_number(),
            ParamKind::String => value.is_string(),
            ParamKind::Array => value.is_array(),
            ParamKind::Object => value.is_object(),
        }
    }
}

/// The shape of a method's return value, used by both the binder (to
/// decide whether the terminal handler must be awaited) and the proxy
/// table (to decide request vs notification, see §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnShape {
    Void,
    Sync,
    Async,
}

/// One declared parameter of a [`MethodDescriptor`].
#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    pub optional: bool,
    pub default: Option<Value>,
}

impl Parameter {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Parameter {
            name: name.into(),
            kind,
            optional: false,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind, default: Value) -> Self {
        Parameter {
            name: name.into(),
            kind,
            optional: true,
            default: Some(default),
        }
    }
}

/// The static record describing one callable method, after catalog
/// construction.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_shape: ReturnShape,
    pub allow_extra_params: bool,
    pub handler: HandlerFn,
    pub factory: Arc<dyn ServiceFactory>,
}

impl MethodDescriptor {
    pub fn required_count(&self) -> usize {
        self.parameters.iter().filter(|p| !p.optional).count()
    }

    pub fn total_count(&self) -> usize {
        self.parameters.len()
    }

    pub(crate) fn decode_slot(&self, index: usize, value: &Value) -> Result<(), DispatchError> {
        let parameter = &self.parameters[index];
        if parameter.kind.accepts(value) {
            Ok(())
        } else {
            Err(DispatchError::invalid_params_for(
                &parameter.name,
                format!("expected {:?}, got an incompatible JSON value", parameter.kind),
            ))
        }
    }
}

/// One registration fed into [`CatalogBuilder::register`]: the method's
/// RPC name, its parameter metadata, return shape, and the opaque handle
/// to invoke it.
pub struct MethodEntry {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_shape: ReturnShape,
    pub allow_extra_params: bool,
    pub handler: HandlerFn,
    pub factory: Arc<dyn ServiceFactory>,
}

/// Builds an immutable [`MethodCatalog`] from a sequence of [`MethodEntry`]
/// registrations (§4.3).
#[derive(Default)]
pub struct CatalogBuilder {
    overload_sets: HashMap<String, Vec<MethodDescriptor>>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one method. Fails immediately if the entry declares a
    /// duplicate parameter name.
    pub fn register(&mut self, entry: MethodEntry) -> Result<&mut Self, CatalogError> {
        let mut seen = std::collections::HashSet::new();
        for parameter in &entry.parameters {
            if !seen.insert(parameter.name.as_str()) {
                return Err(CatalogError::DuplicateParameterName(
                    entry.name.clone(),
                    parameter.name.clone(),
                ));
            }
        }

        let descriptor = MethodDescriptor {
            name: entry.name.clone(),
            parameters: entry.parameters,
            return_shape: entry.return_shape,
            allow_extra_params: entry.allow_extra_params,
            handler: entry.handler,
            factory: entry.factory,
        };

        self.overload_sets.entry(entry.name).or_default().push(descriptor);
        Ok(self)
    }

    /// Finalizes the catalog, rejecting any overload set that cannot be
    /// deterministically disambiguated.
    ///
    /// Concretely: two descriptors in the same overload set are rejected
    /// as ambiguous when they share the same `(required_count, total_count,
    /// allow_extra_params)` signature *and* the same set of declared
    /// parameter names — in that case neither positional arity nor
    /// object-form parameter-name presence can ever tell them apart, so no
    /// inbound request could bind deterministically. Overload sets that
    /// differ in arity or in parameter names remain resolvable at dispatch
    /// time by the binder (§4.4) even when our static check can't prove it
    /// up front; the binder's own tie-break surfaces `AmbiguousOverload` as
    /// `InvalidParams` for any such in-the-wild ambiguity it actually
    /// encounters.
    pub fn build(self) -> Result<MethodCatalog, CatalogError> {
        for (name, descriptors) in &self.overload_sets {
            for i in 0..descriptors.len() {
                for j in (i + 1)..descriptors.len() {
                    if is_statically_ambiguous(&descriptors[i], &descriptors[j]) {
                        return Err(CatalogError::AmbiguousOverload(name.clone()));
                    }
                }
            }
        }

        Ok(MethodCatalog {
            overload_sets: self.overload_sets,
        })
    }
}

fn is_statically_ambiguous(a: &MethodDescriptor, b: &MethodDescriptor) -> bool {
    if a.required_count() != b.required_count()
        || a.total_count() != b.total_count()
        || a.allow_extra_params != b.allow_extra_params
    {
        return false;
    }

    let names_a: std::collections::HashSet<&str> = a.parameters.iter().map(|p| p.name.as_str()).collect();
    let names_b: std::collections::HashSet<&str> = b.parameters.iter().map(|p| p.name.as_str()).collect();
    names_a == names_b
}

/// The immutable mapping from method name to its overload set, built once
/// at host-build time.
pub struct MethodCatalog {
    overload_sets: HashMap<String, Vec<MethodDescriptor>>,
}

impl MethodCatalog {
    pub fn overload_set(&self, name: &str) -> Option<&[MethodDescriptor]> {
        self.overload_sets.get(name).map(Vec::as_slice)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.overload_sets.keys().map(String::as_str)
    }
}
