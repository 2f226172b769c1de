//! Parameter binding: which runtime value lands in which wire location.
//!
//! The binder reads the argument array through the operation's declared
//! bindings and produces ordered path values plus insertion-ordered
//! multi-maps for query, matrix, header (cookies included) and form values.
//! Parameter bags are walked through their declared [`BeanDescriptor`] tree.

use crate::constants;
use crate::error::{BoxError, Error};
use crate::model::operation::{BeanDescriptor, OperationDescriptor, ParamKind, ParameterBinding};
use crate::multimap::MultiMap;
use crate::pipeline::message::Attachment;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Converts a runtime value into its wire text.
pub trait ParamConverter: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when `value` has no wire form.
    fn to_wire(&self, value: &Value) -> Result<String, BoxError>;
}

impl<F> ParamConverter for F
where
    F: Fn(&Value) -> Result<String, BoxError> + Send + Sync,
{
    fn to_wire(&self, value: &Value) -> Result<String, BoxError> {
        self(value)
    }
}

/// Named converters referenced by [`ParameterBinding::converter`].
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn ParamConverter>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.converters.keys()).finish()
    }
}

impl ConverterRegistry {
    #[must_use]
    pub fn with_converter(mut self, name: &str, converter: Arc<dyn ParamConverter>) -> Self {
        self.converters.insert(name.to_string(), converter);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ParamConverter>> {
        self.converters.get(name)
    }
}

/// A value discovered in a parameter bag together with its binding metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BeanPair {
    pub value: Value,
    pub converter: Option<String>,
    pub encoded: bool,
}

/// Everything the binder extracted for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundParameters {
    /// Root values first (root handles only), then operation variables in
    /// template order.
    pub path_values: Vec<String>,
    /// Query values, already percent-encoded.
    pub queries: MultiMap,
    /// Matrix values, already percent-encoded.
    pub matrices: MultiMap,
    /// Header values, with cookies as `Cookie: name=value` entries.
    pub headers: MultiMap,
    pub form: MultiMap,
}

/// Binds the arguments of one call.
pub struct Binder<'a> {
    operation: &'a OperationDescriptor,
    arguments: &'a [Value],
    converters: &'a ConverterRegistry,
}

impl<'a> Binder<'a> {
    #[must_use]
    pub const fn new(
        operation: &'a OperationDescriptor,
        arguments: &'a [Value],
        converters: &'a ConverterRegistry,
    ) -> Self {
        Self {
            operation,
            arguments,
            converters,
        }
    }

    fn argument(&self, binding: &ParameterBinding) -> &'a Value {
        self.arguments.get(binding.index).unwrap_or(&Value::Null)
    }

    /// Runs every binder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingPathValue`] for an unresolved operation
    /// variable, or [`Error::InvalidOperation`] for a malformed bag or a
    /// failing converter.
    pub fn bind(
        &self,
        is_root: bool,
        class_variables: &[String],
        root_values: &mut IndexMap<String, String>,
    ) -> Result<BoundParameters, Error> {
        let mut headers = self.collect(ParamKind::Header)?;
        for (name, value) in self.collect(ParamKind::Cookie)?.pairs() {
            headers.add(constants::HEADER_COOKIE, format!("{name}={value}"));
        }
        Ok(BoundParameters {
            path_values: self.path_values(is_root, class_variables, root_values)?,
            queries: self.collect_encoded(ParamKind::Query)?,
            matrices: self.collect_encoded(ParamKind::Matrix)?,
            headers,
            form: self.collect(ParamKind::Form)?,
        })
    }

    /// The explicit body argument, when it is bound and non-null.
    #[must_use]
    pub fn explicit_body(&self) -> Option<(&'a ParameterBinding, &'a Value)> {
        let index = self.operation.body_index()?;
        let binding = self
            .operation
            .parameters
            .iter()
            .find(|p| p.index == index)?;
        let value = self.argument(binding);
        (!value.is_null()).then_some((binding, value))
    }

    /// Multipart parts with non-null values, in declaration order.
    #[must_use]
    pub fn multipart_parts(&self) -> Vec<Attachment> {
        self.operation
            .parameters_of(ParamKind::Body)
            .filter_map(|binding| {
                let part = binding.part.as_ref()?;
                let value = self.argument(binding);
                (!value.is_null()).then(|| Attachment {
                    id: part.id.clone(),
                    media_type: part.media_type.clone(),
                    value: value.clone(),
                })
            })
            .collect()
    }

    /// Whether any parameter bag yields a non-null form value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when a bag argument is malformed.
    pub fn has_bean_form_values(&self) -> Result<bool, Error> {
        Ok(!self.bean_pairs(ParamKind::Form)?.is_empty())
    }

    /// Resolves the ordered path values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingPathValue`] for the first operation variable
    /// no source can supply.
    pub fn path_values(
        &self,
        is_root: bool,
        class_variables: &[String],
        root_values: &mut IndexMap<String, String>,
    ) -> Result<Vec<String>, Error> {
        let template = crate::uri::UriTemplate::parse(&self.operation.uri_template)
            .map_err(|reason| Error::invalid_operation(&self.operation.name, reason))?;
        let method_vars = template.variables();
        let bean_values = self.bean_pairs(ParamKind::Path)?;

        let mut values = Vec::new();
        let names_class_vars = bean_values.keys().any(|k| !method_vars.contains(k));
        if is_root && names_class_vars {
            for var in class_variables {
                if let Some(pair) = bean_values.get(var) {
                    let converted = self.convert_single(&pair.value, pair.converter.as_deref())?;
                    debug!(target: constants::LOG_TARGET, "Root variable '{var}' set from bag");
                    root_values.insert(var.clone(), converted);
                }
            }
        }
        if is_root {
            values.extend(root_values.values().cloned());
        }

        let mut named: IndexMap<&str, &ParameterBinding> = IndexMap::new();
        let mut unnamed: Vec<&ParameterBinding> = Vec::new();
        for binding in self.operation.parameters_of(ParamKind::Path) {
            if binding.name.is_empty() {
                unnamed.push(binding);
            } else {
                named.insert(binding.name.as_str(), binding);
            }
        }
        let body = self.explicit_body().map(|(_, value)| value);

        for var in method_vars {
            let resolved = self.resolve_variable(var, &mut named, &unnamed, &bean_values, body)?;
            match resolved {
                Some(value) => values.push(value),
                None => return Err(Error::missing_path_value(&self.operation.name, var)),
            }
        }

        // Named bindings left over may target a root variable.
        if is_root {
            for (name, binding) in named {
                if let Some(position) = root_values.get_index_of(name) {
                    let value = self.argument(binding);
                    if position < values.len() && !value.is_null() {
                        values[position] = self.convert_single(value, binding.converter.as_deref())?;
                    }
                }
            }
        }
        Ok(values)
    }

    fn resolve_variable(
        &self,
        var: &str,
        named: &mut IndexMap<&str, &ParameterBinding>,
        unnamed: &[&ParameterBinding],
        bean_values: &IndexMap<String, BeanPair>,
        body: Option<&Value>,
    ) -> Result<Option<String>, Error> {
        if let Some(binding) = named.shift_remove(var) {
            let value = self.argument(binding);
            if !value.is_null() {
                return self
                    .convert_single(value, binding.converter.as_deref())
                    .map(Some);
            }
        }
        for binding in unnamed {
            if let Some(value) = self.argument(binding).get(var).filter(|v| !v.is_null()) {
                return self
                    .convert_single(value, binding.converter.as_deref())
                    .map(Some);
            }
        }
        if let Some(pair) = bean_values.get(var) {
            return self
                .convert_single(&pair.value, pair.converter.as_deref())
                .map(Some);
        }
        if let Some(value) = body.and_then(|b| b.get(var)).filter(|v| !v.is_null()) {
            return self.convert_single(value, None).map(Some);
        }
        Ok(None)
    }

    /// Values of every binding of `kind`, direct or through bags, in
    /// declaration order. Arrays fan out into repeated entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] for a malformed bag or a failing converter.
    pub fn collect(&self, kind: ParamKind) -> Result<MultiMap, Error> {
        let mut map = MultiMap::new();
        self.collect_into(kind, &mut map, |value, _| value)?;
        Ok(map)
    }

    fn collect_encoded(&self, kind: ParamKind) -> Result<MultiMap, Error> {
        let mut map = MultiMap::new();
        self.collect_into(kind, &mut map, |value, encoded| {
            if encoded {
                value
            } else {
                urlencoding::encode(&value).into_owned()
            }
        })?;
        Ok(map)
    }

    fn collect_into(
        &self,
        kind: ParamKind,
        map: &mut MultiMap,
        finish: impl Fn(String, bool) -> String,
    ) -> Result<(), Error> {
        for binding in self.operation.active_parameters() {
            let value = self.argument(binding);
            if binding.kind == kind {
                if kind == ParamKind::Form && binding.name.is_empty() {
                    self.add_object_entries(value, binding, map)?;
                    continue;
                }
                for text in self.convert_all(value, binding.converter.as_deref())? {
                    map.add(binding.name.as_str(), finish(text, binding.encoded));
                }
            } else if binding.kind == ParamKind::Bean {
                let mut pairs = IndexMap::new();
                self.walk_bean(binding, value, kind, &mut pairs)?;
                for (name, pair) in pairs {
                    for text in self.convert_all(&pair.value, pair.converter.as_deref())? {
                        map.add(name.as_str(), finish(text, pair.encoded));
                    }
                }
            }
        }
        Ok(())
    }

    fn add_object_entries(
        &self,
        value: &Value,
        binding: &ParameterBinding,
        map: &mut MultiMap,
    ) -> Result<(), Error> {
        match value {
            Value::Null => Ok(()),
            Value::Object(object) => {
                for (name, entry) in object {
                    for text in self.convert_all(entry, binding.converter.as_deref())? {
                        map.add(name.as_str(), text);
                    }
                }
                Ok(())
            }
            _ => Err(Error::invalid_operation(
                &self.operation.name,
                format!("unnamed form argument {} must be an object", binding.index),
            )),
        }
    }

    /// Name → value pairs of `kind` found in every bag argument.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when a bag argument is not an object.
    pub fn bean_pairs(&self, kind: ParamKind) -> Result<IndexMap<String, BeanPair>, Error> {
        let mut pairs = IndexMap::new();
        for binding in self.operation.parameters_of(ParamKind::Bean) {
            self.walk_bean(binding, self.argument(binding), kind, &mut pairs)?;
        }
        Ok(pairs)
    }

    fn walk_bean(
        &self,
        binding: &ParameterBinding,
        value: &Value,
        kind: ParamKind,
        out: &mut IndexMap<String, BeanPair>,
    ) -> Result<(), Error> {
        let Some(bean) = &binding.bean else {
            return Err(Error::invalid_operation(
                &self.operation.name,
                format!("bag argument {} has no bag descriptor", binding.index),
            ));
        };
        self.walk(bean, value, kind, out)
    }

    fn walk(
        &self,
        bean: &BeanDescriptor,
        value: &Value,
        kind: ParamKind,
        out: &mut IndexMap<String, BeanPair>,
    ) -> Result<(), Error> {
        let object = match value {
            Value::Null => return Ok(()),
            Value::Object(object) => object,
            _ => {
                return Err(Error::invalid_operation(
                    &self.operation.name,
                    format!("parameter bag '{}' must be an object", bean.type_name),
                ))
            }
        };
        for property in &bean.properties {
            let Some(property_value) = object.get(&property.property).filter(|v| !v.is_null())
            else {
                continue;
            };
            match (&property.bean, property.kind) {
                (Some(nested), ParamKind::Bean) => self.walk(nested, property_value, kind, out)?,
                (_, property_kind) if property_kind == kind => {
                    out.insert(
                        property.name.clone(),
                        BeanPair {
                            value: property_value.clone(),
                            converter: property.converter.clone(),
                            encoded: property.encoded,
                        },
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn convert_all(&self, value: &Value, converter: Option<&str>) -> Result<Vec<String>, Error> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| self.convert_single(item, converter))
                .collect(),
            other => Ok(vec![self.convert_single(other, converter)?]),
        }
    }

    fn convert_single(&self, value: &Value, converter: Option<&str>) -> Result<String, Error> {
        match converter {
            Some(name) => {
                let converter = self.converters.get(name).ok_or_else(|| {
                    Error::invalid_operation(
                        &self.operation.name,
                        format!("unknown parameter converter '{name}'"),
                    )
                })?;
                converter.to_wire(value).map_err(|e| {
                    Error::invalid_operation(
                        &self.operation.name,
                        format!("parameter converter '{name}' failed: {e}"),
                    )
                })
            }
            None => Ok(value_to_text(value)),
        }
    }
}

/// Default textual form of a runtime value.
#[must_use]
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
