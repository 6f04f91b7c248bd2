//! Static descriptors of the services behind the gateway.

use crate::stores::Store;

/// A backend service reachable through the gateway by its routable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    /// Discovery-registered id, also the gateway path prefix.
    pub service_id: &'static str,
    pub store: Store,
}

impl ServiceDescriptor {
    /// Health endpoint path relative to the gateway.
    pub fn health_path(&self) -> String {
        format!("/{}/actuator/health", self.service_id)
    }

    /// Base URL of the service's API behind the gateway.
    pub fn api_base(&self, gateway_url: &str) -> String {
        format!("{}/{}/api", gateway_url.trim_end_matches('/'), self.service_id)
    }
}

pub const USER_SERVICE: ServiceDescriptor = ServiceDescriptor {
    name: "user",
    service_id: "user-service",
    store: Store::User,
};

pub const PRODUCT_SERVICE: ServiceDescriptor = ServiceDescriptor {
    name: "product",
    service_id: "product-service",
    store: Store::Product,
};

pub const ORDER_SERVICE: ServiceDescriptor = ServiceDescriptor {
    name: "order",
    service_id: "order-service",
    store: Store::Order,
};

pub const MODERATION_SERVICE: ServiceDescriptor = ServiceDescriptor {
    name: "moderation",
    service_id: "moderation-service",
    store: Store::Moderation,
};

/// Services in the order readiness is probed.
pub const SERVICES: [ServiceDescriptor; 4] = [
    USER_SERVICE,
    PRODUCT_SERVICE,
    ORDER_SERVICE,
    MODERATION_SERVICE,
];
