//! Docker runtime implementation using bollard

use crate::{
    ContainerId, ContainerRuntime, ContainerSummary, CreateContainerConfig, CreateResponse,
    ImageId, ImageSummary, OutputStream, Result, RuntimeError,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::{CommitContainerOptions, CreateImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::service::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Docker-compatible runtime using the bollard crate.
///
/// Podman's Docker-compatible API socket works unchanged.
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect to a Docker-compatible API socket and verify it responds
    pub async fn new(socket_path: &str) -> Result<Self> {
        let client = if socket_path.starts_with("http://") || socket_path.starts_with("https://") {
            Docker::connect_with_http(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| RuntimeError::Connection(e.to_string()))?
        } else {
            let path = socket_path.trim_start_matches("unix://");
            Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| RuntimeError::Connection(e.to_string()))?
        };

        client
            .ping()
            .await
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;

        Ok(Self { client })
    }
}

/// Strip the digest algorithm prefix Docker puts on image ids
fn strip_digest_prefix(id: &str) -> &str {
    id.strip_prefix("sha256:").unwrap_or(id)
}

/// Split a `repository:tag` entry from an image listing
fn split_repo_tag(repo_tag: &str) -> Option<(String, String)> {
    // Registry names can contain ':' in a port component, so split on the
    // last colon, which always precedes the tag.
    let (repository, tag) = repo_tag.rsplit_once(':')?;
    if repository.is_empty() || tag.is_empty() || repo_tag == "<none>:<none>" {
        return None;
    }
    Some((repository.to_string(), tag.to_string()))
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                Some(ContainerSummary {
                    id: ContainerId::new(id),
                    image: c.image.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };

        let images = self.client.list_images(Some(options)).await?;

        let mut out = Vec::new();
        for image in images {
            let id = ImageId::new(strip_digest_prefix(&image.id));
            for repo_tag in &image.repo_tags {
                if let Some((repository, tag)) = split_repo_tag(repo_tag) {
                    out.push(ImageSummary {
                        repository,
                        tag,
                        id: id.clone(),
                        created: image.created,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn pull(&self, repository: &str, tag: &str) -> Result<()> {
        let options = CreateImageOptions {
            from_image: repository,
            tag,
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(error) = info.error {
                        return Err(RuntimeError::ImageNotFound(error));
                    }
                    if let Some(status) = info.status {
                        tracing::debug!("{}", status);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    async fn create_container(&self, config: &CreateContainerConfig) -> Result<CreateResponse> {
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for port in &config.exposed_ports {
            exposed_ports.insert(format!("{}/tcp", port), HashMap::new());
        }

        // Let the runtime assign host ports; they are rediscovered on every
        // start, never persisted.
        let host_config = HostConfig {
            publish_all_ports: Some(true),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: if config.command.is_empty() {
                None
            } else {
                Some(config.command.clone())
            },
            hostname: config.hostname.clone(),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(None::<CreateContainerOptions<String>>, container_config)
            .await?;

        Ok(CreateResponse {
            id: ContainerId::new(response.id),
            warnings: response.warnings,
        })
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        self.client
            .start_container(id.as_ref(), None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn kill(&self, id: &ContainerId) -> Result<()> {
        self.client
            .kill_container(id.as_ref(), None::<KillContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.client
            .remove_container(id.as_ref(), Some(options))
            .await?;
        Ok(())
    }

    async fn remove_image(&self, name: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        self.client.remove_image(name, Some(options), None).await?;
        Ok(())
    }

    async fn commit(
        &self,
        id: &ContainerId,
        repository: &str,
        tag: &str,
        message: Option<&str>,
        author: Option<&str>,
    ) -> Result<ImageId> {
        let options = CommitContainerOptions {
            container: id.as_ref().to_string(),
            repo: repository.to_string(),
            tag: tag.to_string(),
            comment: message.unwrap_or_default().to_string(),
            author: author.unwrap_or_default().to_string(),
            pause: true,
            ..Default::default()
        };

        let commit = self
            .client
            .commit_container(options, Config::<String>::default())
            .await?;

        let raw = commit
            .id
            .ok_or_else(|| RuntimeError::ImageNotFound("commit returned no image id".to_string()))?;
        Ok(ImageId::new(strip_digest_prefix(&raw)))
    }

    async fn resolve_published_port(&self, id: &ContainerId, internal_port: u16) -> Result<u16> {
        let info = self.client.inspect_container(id.as_ref(), None).await?;

        let ports = info
            .network_settings
            .and_then(|ns| ns.ports)
            .unwrap_or_default();

        let key = format!("{}/tcp", internal_port);
        let host_port = ports
            .get(&key)
            .and_then(|bindings| bindings.as_ref())
            .and_then(|bindings| {
                bindings
                    .iter()
                    .find_map(|b| b.host_port.as_ref().and_then(|p| p.parse::<u16>().ok()))
            });

        host_port.ok_or_else(|| RuntimeError::PortNotPublished {
            id: id.short().to_string(),
            internal_port,
        })
    }

    async fn wait(&self, id: &ContainerId) -> Result<i64> {
        let mut stream = self
            .client
            .wait_container(id.as_ref(), None::<WaitContainerOptions<String>>);

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports nonzero container exits through this variant
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(RuntimeError::ContainerNotFound(id.short().to_string())),
        }
    }

    async fn attach_output(&self, id: &ContainerId) -> Result<OutputStream> {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            tail: "all".to_string(),
            ..Default::default()
        };

        let stream = self.client.logs(id.as_ref(), Some(options));
        let reader = LogOutputReader::new(stream);

        Ok(OutputStream {
            stream: Box::pin(reader),
        })
    }
}

/// Reader that converts a log output stream to AsyncRead
struct LogOutputReader<S> {
    stream: S,
    buffer: Vec<u8>,
    pos: usize,
}

impl<S> LogOutputReader<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            pos: 0,
        }
    }
}

impl<S> AsyncRead for LogOutputReader<S>
where
    S: futures::Stream<
            Item = std::result::Result<bollard::container::LogOutput, bollard::errors::Error>,
        > + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        // If we have buffered data, return it first
        if self.pos < self.buffer.len() {
            let remaining = &self.buffer[self.pos..];
            let to_copy = std::cmp::min(remaining.len(), buf.remaining());
            buf.put_slice(&remaining[..to_copy]);
            self.pos += to_copy;
            return std::task::Poll::Ready(Ok(()));
        }

        self.buffer.clear();
        self.pos = 0;

        loop {
            match Pin::new(&mut self.stream).poll_next(cx) {
                std::task::Poll::Ready(Some(Ok(output))) => {
                    let data = match output {
                        bollard::container::LogOutput::StdOut { message } => message,
                        bollard::container::LogOutput::StdErr { message } => message,
                        bollard::container::LogOutput::StdIn { message } => message,
                        bollard::container::LogOutput::Console { message } => message,
                    };
                    // A zero-byte read means EOF to consumers, so empty
                    // chunks must not surface.
                    if data.is_empty() {
                        continue;
                    }
                    self.buffer = data.to_vec();

                    let to_copy = std::cmp::min(self.buffer.len(), buf.remaining());
                    buf.put_slice(&self.buffer[..to_copy]);
                    self.pos = to_copy;
                    return std::task::Poll::Ready(Ok(()));
                }
                std::task::Poll::Ready(Some(Err(e))) => {
                    return std::task::Poll::Ready(Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        e.to_string(),
                    )))
                }
                std::task::Poll::Ready(None) => return std::task::Poll::Ready(Ok(())),
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
    }
}
