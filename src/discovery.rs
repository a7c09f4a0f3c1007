//! Where subscriptions come from: an explicit list, or a deployment descriptor
//! whose handlers are resolved through an injected catalog.

pub mod catalog;
pub mod descriptor;
pub mod source;

pub use catalog::ConsumerCatalog;
pub use descriptor::{FunctionSpec, OfflineKinesisSettings, ServiceDescriptor};
pub use source::{DescriptorSource, SubscriptionSource};
