//! Docker implementation of the container runtime using the `bollard` crate.
//!
//! Every stage container is created with:
//! - No network (`network_mode = none`, `network_disabled`)
//! - All capabilities dropped and `no-new-privileges`
//! - Memory and PID limits
//! - A `managed-by=vibebolt` label so stray resources can be found and pruned

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    DownloadFromContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    UploadToContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::models::HostConfig;
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::io::AsyncWriteExt;

use vibebolt_core::{Error, Result};

use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec};

const MANAGED_BY: (&str, &str) = ("managed-by", "vibebolt");

/// Container runtime backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: bollard::Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    pub fn connect() -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            Error::container_launch(format!(
                "Failed to connect to Docker daemon: {}. Is Docker running?",
                e
            ))
        })?;
        Ok(Self { docker })
    }

    /// Create from an existing bollard Docker client.
    pub fn from_client(docker: bollard::Docker) -> Self {
        Self { docker }
    }

    fn labels() -> HashMap<String, String> {
        HashMap::from([(MANAGED_BY.0.to_string(), MANAGED_BY.1.to_string())])
    }

    fn host_config(spec: &ContainerSpec) -> HostConfig {
        let binds = spec
            .binds
            .iter()
            .map(|b| {
                format!(
                    "{}:{}:{}",
                    b.volume,
                    b.target,
                    if b.read_only { "ro" } else { "rw" }
                )
            })
            .collect();

        HostConfig {
            binds: Some(binds),
            network_mode: spec.network_disabled.then(|| "none".to_string()),
            memory: spec.memory_limit_bytes,
            pids_limit: spec.pids_limit,
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            ..Default::default()
        }
    }

    /// Attach to the container's stdin and stream `payload` into it once started.
    async fn feed_stdin(&self, name: &str, payload: Vec<u8>) -> Result<()> {
        let AttachContainerResults { mut output, mut input } = self
            .docker
            .attach_container(
                name,
                Some(AttachContainerOptions::<String> {
                    stdin: Some(true),
                    stream: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::container_launch(format!("Failed to attach stdin: {}", e)))?;

        let name = name.to_string();
        tokio::spawn(async move {
            if let Err(e) = input.write_all(&payload).await {
                tracing::warn!(container = %name, error = %e, "Failed to write stdin payload");
            }
            if let Err(e) = input.shutdown().await {
                tracing::debug!(container = %name, error = %e, "Failed to close stdin");
            }
            // Drain the attach stream; logs are collected separately
            while output.next().await.is_some() {}
        });
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_volume(&self, name: &str) -> Result<()> {
        self.docker
            .create_volume(CreateVolumeOptions {
                name: name.to_string(),
                driver: "local".to_string(),
                labels: Self::labels(),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::runtime(format!("Failed to create volume {}: {}", name, e)))?;
        tracing::debug!(volume = %name, "Volume created");
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.docker
            .remove_volume(name, Some(RemoveVolumeOptions { force: true }))
            .await
            .map_err(|e| Error::runtime(format!("Failed to remove volume {}: {}", name, e)))?;
        tracing::debug!(volume = %name, "Volume removed");
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let with_stdin = spec.stdin.is_some();
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            working_dir: Some(spec.working_dir.clone()),
            env: Some(spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()),
            network_disabled: Some(spec.network_disabled),
            open_stdin: Some(with_stdin),
            stdin_once: Some(with_stdin),
            attach_stdin: Some(with_stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            labels: Some(Self::labels()),
            host_config: Some(Self::host_config(spec)),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| {
                Error::container_launch(format!("Failed to create container {}: {}", spec.name, e))
            })?;

        let handle = ContainerHandle {
            id: created.id,
            name: spec.name.clone(),
        };

        let started = async {
            if let Some(payload) = &spec.stdin {
                self.feed_stdin(&spec.name, payload.clone()).await?;
            }
            self.docker
                .start_container(&spec.name, None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| {
                    Error::container_launch(format!(
                        "Failed to start container {}: {}",
                        spec.name, e
                    ))
                })
        }
        .await;

        if let Err(e) = started {
            // Do not leak a created-but-never-started container
            if let Err(remove_err) = self.remove_container(&handle, true).await {
                tracing::warn!(container = %handle, error = %remove_err, "Failed to remove unstarted container");
            }
            return Err(e);
        }

        tracing::info!(container = %handle, image = %spec.image, "Container started");
        Ok(handle)
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i64> {
        let mut stream = self.docker.wait_container(
            &handle.name,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit status as an error
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Error::runtime(format!(
                "Failed to wait for container {}: {}",
                handle, e
            ))),
            None => Err(Error::runtime(format!(
                "Wait stream for container {} ended without a status",
                handle
            ))),
        }
    }

    async fn logs(&self, handle: &ContainerHandle) -> Result<Vec<u8>> {
        let mut stream = self.docker.logs(
            &handle.name,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: false,
                ..Default::default()
            }),
        );

        let mut combined = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                Error::runtime(format!("Failed to read logs of {}: {}", handle, e))
            })?;
            combined.extend_from_slice(&chunk.into_bytes());
        }
        Ok(combined)
    }

    async fn put_archive(
        &self,
        handle: &ContainerHandle,
        target_dir: &str,
        archive: Vec<u8>,
    ) -> Result<()> {
        let size = archive.len();
        self.docker
            .upload_to_container(
                &handle.name,
                Some(UploadToContainerOptions {
                    path: target_dir.to_string(),
                    ..Default::default()
                }),
                archive.into(),
            )
            .await
            .map_err(|e| {
                Error::runtime(format!("Failed to upload archive to {}: {}", handle, e))
            })?;
        tracing::debug!(container = %handle, target = %target_dir, bytes = size, "Archive uploaded");
        Ok(())
    }

    async fn get_archive(&self, handle: &ContainerHandle, path: &str) -> Result<Option<Vec<u8>>> {
        let mut stream = self.docker.download_from_container(
            &handle.name,
            Some(DownloadFromContainerOptions {
                path: path.to_string(),
            }),
        );

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => archive.extend_from_slice(&bytes),
                Err(DockerError::DockerResponseServerError {
                    status_code: 404, ..
                }) => return Ok(None),
                Err(e) => {
                    return Err(Error::runtime(format!(
                        "Failed to download {} from {}: {}",
                        path, handle, e
                    )))
                }
            }
        }
        Ok(Some(archive))
    }

    async fn remove_container(&self, handle: &ContainerHandle, force: bool) -> Result<()> {
        self.docker
            .remove_container(
                &handle.name,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::runtime(format!("Failed to remove container {}: {}", handle, e)))?;
        tracing::debug!(container = %handle, "Container removed");
        Ok(())
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::VolumeBinding;

    #[test]
    fn test_host_config_binds_and_isolation() {
        let spec = ContainerSpec::new("build_container_x", "rust:latest", vec!["rustc".into()])
            .bind(VolumeBinding {
                volume: "vibebolt_volume_x".into(),
                target: "/workspace".into(),
                read_only: false,
            })
            .bind(VolumeBinding {
                volume: "other".into(),
                target: "/inspect".into(),
                read_only: true,
            });

        let host = DockerRuntime::host_config(&spec);
        assert_eq!(
            host.binds.unwrap(),
            vec![
                "vibebolt_volume_x:/workspace:rw".to_string(),
                "other:/inspect:ro".to_string()
            ]
        );
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.cap_drop.unwrap(), vec!["ALL".to_string()]);
    }
}
