//! Image client configuration

/// Configuration for the docker-backed image service
#[derive(Debug, Clone)]
pub struct ImageClientConfig {
    /// Path to the docker executable
    ///
    /// If not provided, defaults to "docker" (assumes it's on PATH).
    pub docker_path: Option<String>,

    /// Capacity of each pull's progress channel, at least 1
    progress_buffer: usize,
}

impl Default for ImageClientConfig {
    fn default() -> Self {
        Self {
            docker_path: None,
            progress_buffer: 64,
        }
    }
}

impl ImageClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_docker_path(mut self, docker_path: impl Into<String>) -> Self {
        self.docker_path = Some(docker_path.into());
        self
    }

    pub fn with_progress_buffer(mut self, progress_buffer: usize) -> Self {
        self.progress_buffer = progress_buffer.max(1);
        self
    }

    pub fn progress_buffer(&self) -> usize {
        self.progress_buffer.max(1)
    }

    /// Effective docker executable
    pub fn docker_path(&self) -> &str {
        self.docker_path.as_deref().unwrap_or("docker")
    }
}
