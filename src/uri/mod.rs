pub mod builder;
pub mod template;

pub use builder::UriBuilder;
pub use template::UriTemplate;
