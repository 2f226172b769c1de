use crate::error::Error;
use crate::model::resource::ClientHeaderParam;
use crate::uri::template::UriTemplate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Wire location a formal parameter binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Path,
    Query,
    Matrix,
    Header,
    Cookie,
    Form,
    /// A nested parameter bag whose properties carry their own bindings.
    Bean,
    Body,
    Ignored,
}

impl ParamKind {
    /// Kinds a bean property may carry as its own binding.
    #[must_use]
    pub const fn is_bean_property_kind(self) -> bool {
        matches!(
            self,
            Self::Path | Self::Query | Self::Matrix | Self::Header | Self::Cookie | Self::Form
        )
    }
}

/// Multipart metadata of a body binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartPart {
    pub id: String,
    pub media_type: String,
}

/// Describes one formal parameter of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBinding {
    pub kind: ParamKind,
    /// Wire-level name. Empty for path bindings resolved through a bag and
    /// for form bindings whose object value contributes all its entries.
    #[serde(default)]
    pub name: String,
    /// Position in the runtime argument array.
    pub index: usize,
    /// Name of a registered [`ParamConverter`](crate::binder::ParamConverter).
    #[serde(default)]
    pub converter: Option<String>,
    /// The value is already percent-encoded.
    #[serde(default)]
    pub encoded: bool,
    #[serde(default)]
    pub bean: Option<BeanDescriptor>,
    #[serde(default)]
    pub part: Option<MultipartPart>,
    /// The body argument is an already-encoded form multi-map.
    #[serde(default)]
    pub form_map: bool,
}

impl ParameterBinding {
    #[must_use]
    pub fn new(kind: ParamKind, name: &str, index: usize) -> Self {
        Self {
            kind,
            name: name.to_string(),
            index,
            converter: None,
            encoded: false,
            bean: None,
            part: None,
            form_map: false,
        }
    }

    #[must_use]
    pub fn path(name: &str, index: usize) -> Self {
        Self::new(ParamKind::Path, name, index)
    }

    #[must_use]
    pub fn query(name: &str, index: usize) -> Self {
        Self::new(ParamKind::Query, name, index)
    }

    #[must_use]
    pub fn matrix(name: &str, index: usize) -> Self {
        Self::new(ParamKind::Matrix, name, index)
    }

    #[must_use]
    pub fn header(name: &str, index: usize) -> Self {
        Self::new(ParamKind::Header, name, index)
    }

    #[must_use]
    pub fn cookie(name: &str, index: usize) -> Self {
        Self::new(ParamKind::Cookie, name, index)
    }

    #[must_use]
    pub fn form(name: &str, index: usize) -> Self {
        Self::new(ParamKind::Form, name, index)
    }

    #[must_use]
    pub fn body(index: usize) -> Self {
        Self::new(ParamKind::Body, "", index)
    }

    /// A body argument that is already a form multi-map.
    #[must_use]
    pub fn form_map_body(index: usize) -> Self {
        Self {
            form_map: true,
            ..Self::body(index)
        }
    }

    #[must_use]
    pub fn part(index: usize, id: &str, media_type: &str) -> Self {
        Self {
            part: Some(MultipartPart {
                id: id.to_string(),
                media_type: media_type.to_string(),
            }),
            ..Self::body(index)
        }
    }

    #[must_use]
    pub fn bean(index: usize, bean: BeanDescriptor) -> Self {
        Self {
            bean: Some(bean),
            ..Self::new(ParamKind::Bean, "", index)
        }
    }

    #[must_use]
    pub fn ignored(index: usize) -> Self {
        Self::new(ParamKind::Ignored, "", index)
    }

    #[must_use]
    pub fn with_converter(mut self, converter: &str) -> Self {
        self.converter = Some(converter.to_string());
        self
    }

    #[must_use]
    pub const fn encoded(mut self) -> Self {
        self.encoded = true;
        self
    }

    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        self.part.is_some()
    }
}

/// Declared binding tree of a parameter bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeanDescriptor {
    /// Identity used to reject cyclic bag graphs.
    pub type_name: String,
    pub properties: Vec<BeanProperty>,
}

/// One property of a parameter bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeanProperty {
    /// Key read from the bag object.
    pub property: String,
    pub kind: ParamKind,
    /// Wire name for binding properties; unused for nested bags.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub converter: Option<String>,
    #[serde(default)]
    pub encoded: bool,
    #[serde(default)]
    pub bean: Option<Box<BeanDescriptor>>,
}

impl BeanDescriptor {
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            properties: Vec::new(),
        }
    }

    /// Adds a property bound to `kind` under the wire name `name`.
    #[must_use]
    pub fn bind(mut self, property: &str, kind: ParamKind, name: &str) -> Self {
        self.properties.push(BeanProperty {
            property: property.to_string(),
            kind,
            name: name.to_string(),
            converter: None,
            encoded: false,
            bean: None,
        });
        self
    }

    /// Adds a property that is itself a parameter bag.
    #[must_use]
    pub fn nested(mut self, property: &str, bean: Self) -> Self {
        self.properties.push(BeanProperty {
            property: property.to_string(),
            kind: ParamKind::Bean,
            name: String::new(),
            converter: None,
            encoded: false,
            bean: Some(Box::new(bean)),
        });
        self
    }

    fn validate(&self, operation: &str, ancestors: &mut Vec<String>) -> Result<(), Error> {
        if ancestors.contains(&self.type_name) {
            return Err(Error::invalid_operation(
                operation,
                format!("parameter bag '{}' contains itself", self.type_name),
            ));
        }
        ancestors.push(self.type_name.clone());
        for property in &self.properties {
            match (property.kind, &property.bean) {
                (ParamKind::Bean, Some(nested)) => nested.validate(operation, ancestors)?,
                (ParamKind::Bean, None) => {
                    return Err(Error::invalid_operation(
                        operation,
                        format!("bag property '{}' has no bag descriptor", property.property),
                    ))
                }
                (kind, _) if !kind.is_bean_property_kind() => {
                    return Err(Error::invalid_operation(
                        operation,
                        format!("bag property '{}' cannot bind to {kind:?}", property.property),
                    ))
                }
                _ => {}
            }
        }
        ancestors.pop();
        Ok(())
    }
}

/// Primitive return shapes decoded from plain-text bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Bool,
    I32,
    I64,
    F32,
    F64,
    Text,
}

impl PrimitiveType {
    /// Whether a value of `from` can be held losslessly by `self`.
    #[must_use]
    pub const fn widens_from(self, from: Self) -> bool {
        matches!(
            (self, from),
            (Self::I64, Self::I32) | (Self::F64, Self::F32 | Self::I32)
        )
    }
}

/// Declared return shape of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    Void,
    /// The raw response itself.
    Response,
    Primitive(PrimitiveType),
    /// A structured entity, named by its type.
    Entity(String),
    /// An asynchronous wrapper around the inner type.
    Async(Box<ReturnType>),
}

impl ReturnType {
    #[must_use]
    pub fn entity(name: &str) -> Self {
        Self::Entity(name.to_string())
    }

    #[must_use]
    pub fn future(inner: Self) -> Self {
        Self::Async(Box::new(inner))
    }

    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// The type decoded from the body: the first type argument of an async
    /// wrapper, otherwise the type itself.
    #[must_use]
    pub fn unwrapped(&self) -> &Self {
        match self {
            Self::Async(inner) => inner.unwrapped(),
            other => other,
        }
    }
}

/// Immutable description of one remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// Dispatch key in the owning resource's operation table.
    pub name: String,
    pub http_method: String,
    pub uri_template: String,
    #[serde(default)]
    pub parameters: Vec<ParameterBinding>,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub produces: Vec<String>,
    pub return_type: ReturnType,
    /// Failure types whose exception mappers are consulted, in order.
    #[serde(default)]
    pub declared_failures: Vec<String>,
    #[serde(default)]
    pub client_headers: Vec<ClientHeaderParam>,
    /// Target resource name when this operation is a sub-resource locator.
    #[serde(default)]
    pub sub_resource: Option<String>,
    #[serde(default)]
    pub oneway: bool,
}

impl OperationDescriptor {
    #[must_use]
    pub fn builder(name: &str, http_method: &str, uri_template: &str) -> OperationBuilder {
        OperationBuilder {
            descriptor: Self {
                name: name.to_string(),
                http_method: http_method.to_uppercase(),
                uri_template: uri_template.to_string(),
                parameters: Vec::new(),
                consumes: Vec::new(),
                produces: Vec::new(),
                return_type: ReturnType::Void,
                declared_failures: Vec::new(),
                client_headers: Vec::new(),
                sub_resource: None,
                oneway: false,
            },
        }
    }

    #[must_use]
    pub const fn is_sub_resource_locator(&self) -> bool {
        self.sub_resource.is_some()
    }

    /// Bindings that take part in marshalling, in declaration order.
    pub fn active_parameters(&self) -> impl Iterator<Item = &ParameterBinding> {
        self.parameters
            .iter()
            .filter(|p| p.kind != ParamKind::Ignored)
    }

    pub fn parameters_of(&self, kind: ParamKind) -> impl Iterator<Item = &ParameterBinding> {
        self.parameters.iter().filter(move |p| p.kind == kind)
    }

    #[must_use]
    pub fn has_parameters_of(&self, kind: ParamKind) -> bool {
        self.parameters_of(kind).next().is_some()
    }

    /// Formal index of the single explicit body parameter, if there is one.
    ///
    /// Returns `None` when there are several body bindings (multipart parts)
    /// or when the only body binding is a multipart part.
    #[must_use]
    pub fn body_index(&self) -> Option<usize> {
        let mut bodies = self.parameters_of(ParamKind::Body);
        match (bodies.next(), bodies.next()) {
            (Some(body), None) if !body.is_multipart() => Some(body.index),
            _ => None,
        }
    }

    /// Length the runtime argument array must have.
    #[must_use]
    pub fn required_arguments(&self) -> usize {
        self.parameters
            .iter()
            .map(|p| p.index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Checks the declaration rules every operation must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when the operation declares more
    /// than one non-multipart body, mixes form and body parameters, carries a
    /// body on a sub-resource locator, or declares an invalid parameter bag.
    pub fn validate(&self) -> Result<(), Error> {
        if self.http_method.is_empty() && !self.is_sub_resource_locator() {
            return Err(Error::invalid_operation(&self.name, "no HTTP method declared"));
        }
        UriTemplate::parse(&self.uri_template)
            .map_err(|reason| Error::invalid_operation(&self.name, reason))?;

        let bodies: Vec<&ParameterBinding> = self.parameters_of(ParamKind::Body).collect();
        if bodies.len() > 1 && bodies.iter().any(|b| !b.is_multipart()) {
            return Err(Error::invalid_operation(
                &self.name,
                "only one body parameter is allowed unless every body is a multipart part",
            ));
        }
        if !bodies.is_empty() && self.has_parameters_of(ParamKind::Form) {
            return Err(Error::invalid_operation(
                &self.name,
                "form parameters cannot be combined with a body parameter",
            ));
        }
        if !bodies.is_empty() && self.is_sub_resource_locator() {
            return Err(Error::invalid_operation(
                &self.name,
                "a sub-resource locator cannot carry a body",
            ));
        }

        let mut indexes = HashSet::new();
        for param in &self.parameters {
            if !indexes.insert(param.index) {
                return Err(Error::invalid_operation(
                    &self.name,
                    format!("argument {} is bound twice", param.index),
                ));
            }
            if param.kind == ParamKind::Bean {
                let bean = param.bean.as_ref().ok_or_else(|| {
                    Error::invalid_operation(
                        &self.name,
                        format!("bag argument {} has no bag descriptor", param.index),
                    )
                })?;
                bean.validate(&self.name, &mut Vec::new())?;
            }
        }
        Ok(())
    }
}

/// Builder producing validated [`OperationDescriptor`]s.
#[derive(Debug, Clone)]
pub struct OperationBuilder {
    descriptor: OperationDescriptor,
}

impl OperationBuilder {
    #[must_use]
    pub fn param(mut self, binding: ParameterBinding) -> Self {
        self.descriptor.parameters.push(binding);
        self
    }

    #[must_use]
    pub fn consumes(mut self, media_type: &str) -> Self {
        self.descriptor.consumes.push(media_type.to_string());
        self
    }

    #[must_use]
    pub fn produces(mut self, media_type: &str) -> Self {
        self.descriptor.produces.push(media_type.to_string());
        self
    }

    #[must_use]
    pub fn returns(mut self, return_type: ReturnType) -> Self {
        self.descriptor.return_type = return_type;
        self
    }

    #[must_use]
    pub fn throws(mut self, failure_type: &str) -> Self {
        self.descriptor
            .declared_failures
            .push(failure_type.to_string());
        self
    }

    #[must_use]
    pub fn client_header(mut self, header: ClientHeaderParam) -> Self {
        self.descriptor.client_headers.push(header);
        self
    }

    #[must_use]
    pub fn sub_resource(mut self, resource: &str) -> Self {
        self.descriptor.sub_resource = Some(resource.to_string());
        self
    }

    #[must_use]
    pub const fn oneway(mut self) -> Self {
        self.descriptor.oneway = true;
        self
    }

    /// Validates and returns the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when the declaration rules are violated.
    pub fn build(self) -> Result<OperationDescriptor, Error> {
        self.descriptor.validate()?;
        Ok(self.descriptor)
    }
}
