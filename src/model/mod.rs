//! Pre-resolved operation metadata consumed by the invoker.
//!
//! Descriptors are built once (by hand, through the builders, or deserialized
//! from a metadata resolver's output) and shared read-only across handles.

pub mod operation;
pub mod resource;

pub use operation::{
    BeanDescriptor, BeanProperty, MultipartPart, OperationBuilder, OperationDescriptor, ParamKind,
    ParameterBinding, PrimitiveType, ReturnType,
};
pub use resource::{ClientHeaderParam, DefaultOperation, HeaderValueSource, ResourceDescriptor};
