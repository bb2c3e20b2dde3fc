// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::sync::Arc;

use log::info;

use super::http::{self, DeploymentSlot};
use super::webapp::WebAppSpec;
use super::{Backend, BackendSettings, SessionHandle};
use crate::errors::Error;
use crate::unit::DeploymentUnit;

/// Lightweight servlet container: binds, deploys in the same step, serves.
#[derive(Debug, Clone, Default)]
pub struct ServletContainer {
    settings: BackendSettings,
}

impl ServletContainer {
    pub fn new(settings: BackendSettings) -> Self {
        Self { settings }
    }
}

impl Backend for ServletContainer {
    fn name(&self) -> &'static str {
        "servlet"
    }

    async fn start(&self, unit: &DeploymentUnit) -> Result<SessionHandle, Error> {
        let listener = http::bind(self.settings.socket_addr(unit.port)).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::backend_start("listener has no local address", e))?;
        info!("servlet container listening on {local_addr}");

        let app = self.settings.deploy(WebAppSpec::from_unit("ROOT", unit)).await?;
        let slot = Arc::new(DeploymentSlot::with(app));
        info!("context {} ready", unit.context_path);
        SessionHandle::serve(listener, slot, self.settings.stop_timeout)
    }

    async fn stop(&self, handle: SessionHandle) -> Result<(), Error> {
        info!("stopping servlet container on {}", handle.local_addr());
        handle.shutdown().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::unit::ROOT_CONTEXT_PATH;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn loopback() -> BackendSettings {
        BackendSettings {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..BackendSettings::default()
        }
    }

    async fn get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_start_serves_content_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "hello from webapp").unwrap();
        let unit = DeploymentUnit {
            content_root: Some(dir.path().to_path_buf()),
            class_roots: vec![],
            dependency_paths: vec![],
            context_path: ROOT_CONTEXT_PATH,
            port: 0,
        };

        let backend = ServletContainer::new(loopback());
        let handle = backend.start(&unit).await.unwrap();
        assert!(handle.deployment().is_some());

        let response = get(handle.local_addr(), "/").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("hello from webapp"), "{response}");

        backend.stop(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_unit_still_starts() {
        let unit = DeploymentUnit {
            content_root: None,
            class_roots: vec![],
            dependency_paths: vec![],
            context_path: ROOT_CONTEXT_PATH,
            port: 0,
        };
        let backend = ServletContainer::new(loopback());
        let handle = backend.start(&unit).await.unwrap();
        let response = get(handle.local_addr(), "/").await;
        assert!(response.starts_with("HTTP/1.1 404"), "{response}");
        backend.stop(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_port_in_use_fails_start() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let unit = DeploymentUnit {
            content_root: None,
            class_roots: vec![],
            dependency_paths: vec![],
            context_path: ROOT_CONTEXT_PATH,
            port: taken.local_addr().unwrap().port(),
        };
        let err = ServletContainer::new(loopback()).start(&unit).await.unwrap_err();
        assert!(matches!(err, Error::BackendStart { .. }));
    }
}
