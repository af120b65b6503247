//! EaseMesh plugin.
//!
//! Control endpoints:
//! - `/config`: the mesh pushes the list of request headers to forward
//! - `/agent-info`: static agent type and version
//!
//! Inbound wrapper: copies allow-listed request headers onto the response,
//! unless the application already set that header.
//! The allow-list is an immutable snapshot behind an `ArcSwap`; a push
//! replaces it wholesale, so each request observes exactly one list.

use std::convert::Infallible;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    response::IntoResponse,
};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tower::{service_fn, util::BoxCloneSyncService, ServiceExt};

use crate::plugins::capability::{
    BoxHandler, ControlError, ControlHandler, Dispatch, InboundWrapper, Plugin, PluginError, Wrapped,
};
use crate::plugins::registry::Descriptor;
use crate::plugins::spec::{PluginSpec, Spec};

pub const KIND: &str = "EaseMesh";
pub const DEFAULT_NAME: &str = "easemesh";

/// Key of the header allow-list in a pushed config document.
pub const FORWARDED_HEADERS_KEY: &str = "easeagent.progress.forwarded.headers";

const DEFAULT_AGENT_TYPE: &str = "RustSDK";
const MAX_CONFIG_BODY: usize = 64 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSpec {
    #[serde(rename = "agentType", skip_serializing_if = "String::is_empty")]
    pub agent_type: String,
}

impl PluginSpec for MeshSpec {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Body of `GET /agent-info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    #[serde(rename = "type")]
    pub agent_type: String,
    pub version: String,
}

/// Body of `POST /config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfigPush {
    #[serde(rename = "easeagent.progress.forwarded.headers", default)]
    pub headers: String,
}

pub fn default_spec() -> Spec {
    Spec::new(KIND, DEFAULT_NAME)
}

pub fn descriptor() -> Descriptor {
    Descriptor::new(KIND, default_spec, |spec: Spec| {
        Ok(Arc::new(EaseMesh::new(spec)?) as Arc<dyn Plugin>)
    })
}

pub struct EaseMesh {
    name: String,
    agent_info: Bytes,
    headers: Arc<ArcSwap<Vec<HeaderName>>>,
}

impl EaseMesh {
    pub fn new(spec: Spec) -> Result<Self, PluginError> {
        let mesh_spec: MeshSpec = spec.decode_validated()?;

        let agent_type = if mesh_spec.agent_type.is_empty() {
            DEFAULT_AGENT_TYPE.to_string()
        } else {
            mesh_spec.agent_type
        };
        let info = AgentInfo {
            agent_type,
            version: format!("v{}", env!("CARGO_PKG_VERSION")),
        };
        let agent_info = serde_json::to_vec(&info).map_err(PluginError::other)?;

        Ok(Self {
            name: spec.name,
            agent_info: Bytes::from(agent_info),
            headers: Arc::new(ArcSwap::from_pointee(Vec::new())),
        })
    }

    /// Current allow-list snapshot.
    pub fn forwarded_headers(&self) -> Arc<Vec<HeaderName>> {
        self.headers.load_full()
    }

    async fn handle_config(&self, request: Request<Body>) -> Result<Dispatch, ControlError> {
        let body = axum::body::to_bytes(request.into_body(), MAX_CONFIG_BODY)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Read config body failed");
                ControlError::BadRequest(format!("read config body failed: {e}"))
            })?;

        let push: AgentConfigPush = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(error = %e, "Unmarshal config body failed");
            ControlError::BadRequest(format!("unmarshal config body failed: {e}"))
        })?;

        let headers = parse_header_list(&push.headers);
        tracing::info!(headers = ?headers, "Forwarded headers updated");
        self.headers.store(Arc::new(headers));

        Ok(Dispatch::Handled(StatusCode::OK.into_response()))
    }

    fn handle_agent_info(&self) -> Dispatch {
        Dispatch::Handled(
            (
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                self.agent_info.clone(),
            )
                .into_response(),
        )
    }
}

/// Parse a comma-separated header list. Blank entries and invalid names are
/// skipped.
fn parse_header_list(raw: &str) -> Vec<HeaderName> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match HeaderName::from_bytes(s.as_bytes()) {
            Ok(name) => Some(name),
            Err(_) => {
                tracing::warn!(header = %s, "Ignoring invalid header name");
                None
            }
        })
        .collect()
}

impl Plugin for EaseMesh {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        KIND
    }

    fn control_handler(&self) -> Option<&dyn ControlHandler> {
        Some(self)
    }

    fn inbound_wrapper(&self) -> Option<&dyn InboundWrapper> {
        Some(self)
    }
}

impl ControlHandler for EaseMesh {
    fn handle_control(&self, request: Request<Body>) -> BoxFuture<'_, Result<Dispatch, ControlError>> {
        Box::pin(async move {
            let path = request.uri().path().to_owned();
            match path.as_str() {
                "/config" => self.handle_config(request).await,
                "/agent-info" => Ok(self.handle_agent_info()),
                _ => Ok(Dispatch::Declined(request)),
            }
        })
    }
}

impl InboundWrapper for EaseMesh {
    fn wrap_handler(&self, next: BoxHandler) -> Wrapped<BoxHandler> {
        let allow_list = self.headers.clone();

        let handler = service_fn(move |request: Request<Body>| {
            let next = next.clone();
            // One snapshot per request.
            let keys = allow_list.load_full();

            async move {
                let forwarded: Vec<(HeaderName, Vec<HeaderValue>)> = keys
                    .iter()
                    .filter_map(|key| {
                        let values: Vec<HeaderValue> = request.headers().get_all(key).iter().cloned().collect();
                        (!values.is_empty()).then(|| (key.clone(), values))
                    })
                    .collect();

                let mut response = next.oneshot(request).await?;

                let headers = response.headers_mut();
                for (name, values) in forwarded {
                    if headers.contains_key(&name) {
                        continue;
                    }
                    for value in values {
                        headers.append(name.clone(), value);
                    }
                }
                Ok::<_, Infallible>(response)
            }
        });

        Wrapped::Decorated(BoxCloneSyncService::new(handler))
    }
}
