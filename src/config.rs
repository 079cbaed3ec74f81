use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    thread,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Path to the GGUF model artifact. `None` leaves the service in
    /// degraded mode; it still answers health checks and returns 503 on
    /// inference endpoints.
    pub model_path: Option<PathBuf>,
    /// Model id reported by `/v1/models` and echoed in responses.
    pub model_name: String,
    pub n_ctx: u32,
    pub n_batch: u32,
    pub n_threads: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host: IpAddr = env::var("HOST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);

        let model_path = env::var("MODEL_PATH").ok().map(PathBuf::from);
        let model_name = env::var("MODEL_NAME").unwrap_or_else(|_| "qwen2.5-coder".to_string());

        let n_ctx = env::var("N_CTX")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(512);
        let n_batch = env::var("N_BATCH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(512);
        let n_threads = env::var("N_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_threads);

        Ok(Self {
            listen_addr: SocketAddr::new(host, port),
            model_path,
            model_name,
            n_ctx,
            n_batch,
            n_threads,
        })
    }

    /// Basename of the configured model artifact, `"unknown"` when unset.
    pub fn model_file(&self) -> String {
        self.model_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000),
            model_path: None,
            model_name: "qwen2.5-coder".to_string(),
            n_ctx: 512,
            n_batch: 512,
            n_threads: default_threads(),
        }
    }
}

/// Leave a couple of cores for the OS and the HTTP runtime.
fn default_threads() -> u32 {
    let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    cores.saturating_sub(2).max(1) as u32
}
