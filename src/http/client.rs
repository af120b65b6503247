//! Outbound client adapters.

use axum::{
    body::Body,
    http::{Request, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tower::{util::BoxCloneSyncService, BoxError, ServiceExt};

use crate::plugins::BoxClient;

/// Plain HTTP/1 and HTTP/2 client on the tokio runtime.
pub fn default_client() -> Client<HttpConnector, Body> {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Erase a hyper client so the agent's client wrappers can decorate it.
pub fn from_hyper(client: Client<HttpConnector, Body>) -> BoxClient {
    let service = client
        .map_response(|response| response.map(Body::new))
        .map_err(BoxError::from);
    BoxCloneSyncService::new(service)
}

/// Send one request through a (possibly wrapped) client.
pub async fn send(client: &BoxClient, request: Request<Body>) -> Result<Response<Body>, BoxError> {
    client.clone().oneshot(request).await
}
