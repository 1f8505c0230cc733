//! Service registry with async handlers

use dashmap::DashMap;
use ha_core::{Context, ServiceCall, SupportsResponse};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when working with services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("service does not support responses")]
    ResponseNotSupported,
}

/// Information about a registered service
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    /// Domain the service belongs to
    pub domain: String,
    /// Service name
    pub service: String,
    /// Human-readable name
    pub name: Option<String>,
    /// Description of what the service does
    pub description: Option<String>,
    /// JSON schema for service data (optional)
    pub schema: Option<serde_json::Value>,
    /// Whether this service supports returning a response
    pub supports_response: SupportsResponse,
}

impl ServiceDescription {
    /// Describe a service with no schema or response
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            name: None,
            description: None,
            schema: None,
            supports_response: SupportsResponse::None,
        }
    }

    /// Set the human-readable description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the JSON schema for service data
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

struct RegisteredService {
    handler: ServiceHandler,
    description: ServiceDescription,
}

/// All services registered by the loaded integrations
pub struct ServiceRegistry {
    /// Services indexed by "domain.service" key
    services: DashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    /// Create a new empty service registry
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a service with its description
    #[instrument(skip(self, handler), fields(domain = %description.domain, service = %description.service))]
    pub fn register_with_description<F, Fut>(&self, description: ServiceDescription, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let key = format!("{}.{}", description.domain, description.service);
        debug!("Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        self.services.insert(
            key,
            RegisteredService {
                handler,
                description,
            },
        );
    }

    /// Call a service
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
        return_response: bool,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let registered = self.services.get(&key).ok_or_else(|| {
            warn!("Service not found");
            ServiceError::NotFound {
                domain: domain.to_string(),
                service: service.to_string(),
            }
        })?;

        if return_response && registered.description.supports_response == SupportsResponse::None {
            return Err(ServiceError::ResponseNotSupported);
        }

        let handler = registered.handler.clone();
        drop(registered); // Release the map guard before awaiting the handler

        let call = ServiceCall::new(domain, service, service_data, context);
        debug!("Calling service");
        let result = handler(call).await?;

        if return_response {
            Ok(result)
        } else {
            Ok(None)
        }
    }

    /// Check if a service exists
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    /// Get all services for a domain, sorted by name
    pub fn domain_services(&self, domain: &str) -> Vec<ServiceDescription> {
        let mut services: Vec<_> = self
            .services
            .iter()
            .filter(|s| s.description.domain == domain)
            .map(|s| s.description.clone())
            .collect();
        services.sort_by(|a, b| a.service.cmp(&b.service));
        services
    }

    /// Unregister all services for a domain
    #[instrument(skip(self))]
    pub fn unregister_domain(&self, domain: &str) -> usize {
        let before = self.services.len();
        self.services.retain(|_, s| s.description.domain != domain);
        let count = before - self.services.len();
        debug!(count, "Unregistered domain services");
        count
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = ServiceRegistry::new();
        let mut description = ServiceDescription::new("test", "echo");
        description.supports_response = SupportsResponse::Optional;

        registry.register_with_description(description, |call: ServiceCall| async move {
            Ok(Some(call.service_data))
        });

        let result = registry
            .call("test", "echo", json!({"msg": "hello"}), Context::new(), true)
            .await
            .unwrap();

        assert_eq!(result, Some(json!({"msg": "hello"})));
    }

    #[tokio::test]
    async fn test_service_not_found() {
        let registry = ServiceRegistry::new();

        let result = registry
            .call("eero", "restart_eero", json!({}), Context::new(), false)
            .await;

        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_response_not_supported() {
        let registry = ServiceRegistry::new();
        registry.register_with_description(
            ServiceDescription::new("nest", "set_eco_mode"),
            |_call: ServiceCall| async move { Ok(None) },
        );

        let result = registry
            .call("nest", "set_eco_mode", json!({}), Context::new(), true)
            .await;
        assert!(matches!(result, Err(ServiceError::ResponseNotSupported)));
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let registry = ServiceRegistry::new();
        registry.register_with_description(
            ServiceDescription::new("test", "fail"),
            |_: ServiceCall| async move { Err(ServiceError::CallFailed("boom".to_string())) },
        );

        let result = registry
            .call("test", "fail", json!({}), Context::new(), false)
            .await;
        assert!(matches!(result, Err(ServiceError::CallFailed(_))));
    }

    #[test]
    fn test_unregister_domain() {
        let registry = ServiceRegistry::new();
        for (domain, service) in [("eero", "restart_eero"), ("eero", "enable_ipv6"), ("nest", "set_eta")] {
            registry.register_with_description(
                ServiceDescription::new(domain, service),
                |_: ServiceCall| async { Ok(None) },
            );
        }

        assert_eq!(registry.domain_services("eero").len(), 2);
        assert_eq!(registry.unregister_domain("eero"), 2);
        assert!(!registry.has_service("eero", "restart_eero"));
        assert!(registry.has_service("nest", "set_eta"));

        let result = tokio_test::block_on(registry.call(
            "nest",
            "set_eta",
            json!({}),
            Context::new(),
            false,
        ));
        tokio_test::assert_ok!(result);
    }
}
