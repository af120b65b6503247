//! Health plugin: answers liveness probes on the control plane.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::plugins::capability::{ControlError, ControlHandler, Dispatch, Plugin, PluginError};
use crate::plugins::registry::Descriptor;
use crate::plugins::spec::{PluginSpec, Spec};

pub const KIND: &str = "Health";
pub const NAME: &str = "Health";

/// The health plugin takes no settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSpec {}

impl PluginSpec for HealthSpec {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

pub fn default_spec() -> Spec {
    Spec::new(KIND, NAME)
}

/// System descriptor: health is always active.
pub fn descriptor() -> Descriptor {
    Descriptor::new(KIND, default_spec, |spec: Spec| {
        Ok(Arc::new(Health::new(spec)?) as Arc<dyn Plugin>)
    })
    .system()
}

pub struct Health {
    name: String,
}

impl Health {
    pub fn new(spec: Spec) -> Result<Self, PluginError> {
        let _: HealthSpec = spec.decode_validated()?;
        Ok(Self { name: spec.name })
    }
}

impl Plugin for Health {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        KIND
    }

    fn control_handler(&self) -> Option<&dyn ControlHandler> {
        Some(self)
    }
}

impl ControlHandler for Health {
    fn handle_control(&self, request: Request<Body>) -> BoxFuture<'_, Result<Dispatch, ControlError>> {
        Box::pin(async move {
            if matches!(request.uri().path(), "/health" | "/healthz") {
                Ok(Dispatch::Handled(StatusCode::OK.into_response()))
            } else {
                Ok(Dispatch::Declined(request))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_paths() {
        let health = Health::new(default_spec()).unwrap();

        for path in ["/health", "/healthz"] {
            match health.handle_control(request(path)).await.unwrap() {
                Dispatch::Handled(response) => assert_eq!(response.status(), StatusCode::OK),
                other => panic!("{path} not handled: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_other_paths_declined() {
        let health = Health::new(default_spec()).unwrap();
        match health.handle_control(request("/config")).await.unwrap() {
            Dispatch::Declined(request) => assert_eq!(request.uri().path(), "/config"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
