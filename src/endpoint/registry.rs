//! Process-wide table of endpoint records.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::schema::EndpointConfig;
use crate::endpoint::service::{EndpointSnapshot, ServiceEndpoint};

/// Table of all configured endpoints, keyed by id.
pub struct EndpointRegistry {
    endpoints: DashMap<String, Arc<ServiceEndpoint>>,
}

impl EndpointRegistry {
    pub fn from_config(configs: &[EndpointConfig]) -> Self {
        let endpoints = DashMap::new();
        for config in configs {
            endpoints.insert(
                config.id.clone(),
                Arc::new(ServiceEndpoint::from_config(config)),
            );
        }
        Self { endpoints }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ServiceEndpoint>> {
        self.endpoints.get(id).map(|e| e.value().clone())
    }

    pub fn all(&self) -> Vec<Arc<ServiceEndpoint>> {
        self.endpoints.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Restores every endpoint to Healthy (operator action).
    pub fn reset_all(&self) {
        for endpoint in self.endpoints.iter() {
            endpoint.value().reset();
        }
    }

    /// Sorted status map for the admin view.
    pub fn snapshot(&self) -> BTreeMap<String, EndpointSnapshot> {
        self.endpoints
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect()
    }
}
