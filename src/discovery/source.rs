use crate::discovery::catalog::ConsumerCatalog;
use crate::discovery::descriptor::ServiceDescriptor;
use crate::watcher::consumer::{ConsumerHandle, InvocationContext};
use crate::watcher::registry::Subscription;
use anyhow::{Context, Result};

/// Supplies the ordered `(stream, consumer)` pairs a watcher should serve.
pub trait SubscriptionSource: Send + Sync {
    fn list_subscriptions(&self) -> Result<Vec<Subscription>>;
}

impl SubscriptionSource for Vec<Subscription> {
    fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.clone())
    }
}

/// Subscriptions declared by a [`ServiceDescriptor`], with handlers resolved
/// through a [`ConsumerCatalog`].
#[derive(Debug, Clone)]
pub struct DescriptorSource {
    descriptor: ServiceDescriptor,
    catalog: ConsumerCatalog,
}

impl DescriptorSource {
    pub fn new(descriptor: ServiceDescriptor, catalog: ConsumerCatalog) -> Self {
        Self {
            descriptor,
            catalog,
        }
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }
}

impl SubscriptionSource for DescriptorSource {
    fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        for function in self.descriptor.functions()? {
            if function.stream_resources.is_empty() {
                continue;
            }

            let consumer = self.catalog.resolve(&function.handler).with_context(|| {
                format!(
                    "no consumer registered for handler {} of function {}",
                    function.handler, function.name
                )
            })?;
            let handle = ConsumerHandle::with_context(
                InvocationContext::new(function.name.as_str())
                    .with_handler(function.handler.as_str())
                    .with_environment(function.environment.clone()),
                consumer,
            );

            for resource in &function.stream_resources {
                let subscription = Subscription::from_resource_id(resource, handle.clone())
                    .with_context(|| format!("invalid stream event on function {}", function.name))?;
                subscriptions.push(subscription);
            }
        }

        tracing::debug!(
            subscriptions = subscriptions.len(),
            "discovered stream subscriptions from descriptor"
        );
        Ok(subscriptions)
    }
}
