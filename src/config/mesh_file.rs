//! Mesh-provisioned agent file.
//!
//! The mesh mounts one flat YAML document per workload. It holds the control
//! address next to the EaseMesh and Zipkin settings, all as top-level keys.
//! Each part falls back to its built-in default on its own, so a missing or
//! broken file still yields a working agent.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::schema::AgentConfig;
use crate::plugins::mesh::{self, MeshSpec};
use crate::plugins::zipkin::{self, ZipkinSpec};
use crate::plugins::{health, Spec, SpecError};

/// Names the mesh file explicitly.
pub const CONFIG_FILE_ENV: &str = "MEGAEASE_SDK_CONFIG_FILE";

/// File looked up next to the running binary.
pub const CONFIG_FILE_NAME: &str = "agent.yml";

/// Where the mesh mounts the file when nothing else is found.
pub const DEFAULT_CONFIG_FILE: &str = "/megaease/sdk/agent.yml";

#[derive(Debug, thiserror::Error)]
pub enum MeshFileError {
    #[error("no mesh file given")]
    Missing,

    #[error("read {} failed: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {} failed: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{} is not a YAML mapping", .path.display())]
    NotMapping { path: PathBuf },
}

/// Read the mesh file as a flat key/value document.
pub fn read_mesh_file(path: Option<&Path>) -> Result<Map<String, Value>, MeshFileError> {
    let path = path.ok_or(MeshFileError::Missing)?;
    let content = fs::read_to_string(path).map_err(|source| MeshFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match serde_yaml::from_str::<Value>(&content) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(MeshFileError::NotMapping {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(MeshFileError::Yaml {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Find the mesh file: the path in `MEGAEASE_SDK_CONFIG_FILE` when set,
/// otherwise `agent.yml` beside the binary, otherwise the mesh mount point.
pub fn discover_mesh_file() -> Option<PathBuf> {
    let from_env = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    locate(from_env, exe_dir.as_deref(), Path::new(DEFAULT_CONFIG_FILE))
}

fn locate(from_env: Option<PathBuf>, exe_dir: Option<&Path>, default: &Path) -> Option<PathBuf> {
    if let Some(path) = from_env.filter(|p| !p.as_os_str().is_empty()) {
        if path.is_file() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), env = CONFIG_FILE_ENV, "Mesh file named by the environment is missing");
        return None;
    }

    exe_dir
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .into_iter()
        .chain(std::iter::once(default.to_path_buf()))
        .find(|candidate| candidate.is_file())
}

/// Decode the document over `defaults` and re-encode the typed result, so the
/// spec only carries keys `T` knows.
fn typed_spec<T>(
    kind: &str,
    name: &str,
    document: &Map<String, Value>,
    defaults: T,
    adjust: impl FnOnce(&mut T),
) -> Result<Spec, SpecError>
where
    T: Serialize + DeserializeOwned,
{
    let mut payload = Spec::new(kind, name);
    payload.settings = document.clone();
    let mut typed = payload.decode(defaults)?;
    adjust(&mut typed);
    Spec::from_settings(kind, name, &typed)
}

fn mesh_spec(document: Option<&Map<String, Value>>) -> Spec {
    let Some(document) = document else {
        return mesh::default_spec();
    };
    typed_spec(mesh::KIND, mesh::DEFAULT_NAME, document, MeshSpec::default(), |_| {}).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Using default EaseMesh spec");
        mesh::default_spec()
    })
}

fn zipkin_spec(document: Option<&Map<String, Value>>, local_hostport: &str) -> Spec {
    let Some(document) = document else {
        return zipkin::console_report_spec(local_hostport);
    };
    typed_spec(zipkin::KIND, zipkin::NAME, document, ZipkinSpec::default(), |spec| {
        spec.local_hostport = local_hostport.to_string();
    })
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Using console-reporting Zipkin spec");
        zipkin::console_report_spec(local_hostport)
    })
}

impl AgentConfig {
    /// Build a config from the mesh file at `path`: its address, then the
    /// Health, EaseMesh and Zipkin specs in that order.
    ///
    /// A missing or unreadable file keeps the default address and uses the
    /// default EaseMesh spec and a console-reporting Zipkin spec. A part that
    /// does not decode falls back alone. `local_hostport` always becomes the
    /// Zipkin local endpoint.
    pub fn from_mesh_file(path: Option<&Path>, local_hostport: &str) -> Self {
        let document = match read_mesh_file(path) {
            Ok(document) => Some(document),
            Err(MeshFileError::Missing) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Mesh file unusable, using default plugin specs");
                None
            }
        };

        let mut config = AgentConfig::default();
        match document.as_ref().and_then(|d| d.get("address")) {
            Some(Value::String(address)) => config.address = address.clone(),
            Some(other) => tracing::warn!(address = %other, "Ignoring non-string address in mesh file"),
            None => {}
        }

        config
            .with_spec(health::default_spec())
            .with_spec(mesh_spec(document.as_ref()))
            .with_spec(zipkin_spec(document.as_ref(), local_hostport))
    }
}
