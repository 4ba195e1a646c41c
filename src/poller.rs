use chrono::{DateTime, Local};
use tracing::{info, warn, Level};

use crate::client::InferenceClient;
use crate::config::{PollerConfig, ServerAddr};
use crate::error::PollError;
use crate::memory;
use crate::types::{MemorySnapshot, ModelEntry};

const SEPARATOR: &str = "==================================================";

/// What the two leading entries of a running-models list call for.
///
/// Response order is taken as recency order (index 0 newest). The server does
/// not document that ordering; it is an assumption the heuristic depends on.
#[derive(Debug, PartialEq, Eq)]
pub enum EvictionDecision<'a> {
    TooFewModels,
    SameModel(&'a str),
    Evict { newest: &'a str, previous: &'a str },
}

pub fn decide_eviction(entries: &[ModelEntry]) -> EvictionDecision<'_> {
    match entries {
        [newest, previous, ..] if newest.model == previous.model => {
            EvictionDecision::SameModel(&newest.model)
        }
        [newest, previous, ..] => EvictionDecision::Evict {
            newest: &newest.model,
            previous: &previous.model,
        },
        _ => EvictionDecision::TooFewModels,
    }
}

#[derive(Debug)]
pub enum EvictionOutcome {
    TooFewModels,
    SameModel(String),
    Unloaded { newest: String, previous: String },
    WouldUnload { newest: String, previous: String },
    UnloadFailed {
        newest: String,
        previous: String,
        error: PollError,
    },
}

#[derive(Debug)]
pub struct ServerReport {
    pub server: ServerAddr,
    pub models: Result<Vec<ModelEntry>, PollError>,
    pub outcome: EvictionOutcome,
}

impl ServerReport {
    /// Models seen this iteration; a failed fetch counts as none.
    pub fn entries(&self) -> &[ModelEntry] {
        self.models.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug)]
pub struct IterationReport {
    pub iteration: u64,
    pub started_at: DateTime<Local>,
    pub servers: Vec<ServerReport>,
    pub memory: Result<MemorySnapshot, PollError>,
}

impl IterationReport {
    pub fn lines(&self) -> Vec<(Level, String)> {
        let mut lines = vec![
            (Level::INFO, SEPARATOR.to_string()),
            (
                Level::INFO,
                format!(
                    "[{}] iteration {}",
                    self.started_at.format("%Y-%m-%d %H:%M:%S"),
                    self.iteration
                ),
            ),
        ];

        for report in &self.servers {
            let server = &report.server;
            if let Err(e) = &report.models {
                lines.push((
                    Level::WARN,
                    format!("[{}] failed to fetch running models: {}", server, e),
                ));
            }
            let entries = report.entries();
            if entries.is_empty() {
                lines.push((Level::INFO, format!("[{}] No models found.", server)));
            }
            for (i, entry) in entries.iter().enumerate() {
                lines.push((
                    Level::INFO,
                    format!("[{}] {}) {}", server, i + 1, entry.model),
                ));
            }

            let outcome = match &report.outcome {
                EvictionOutcome::TooFewModels if report.models.is_err() => continue,
                EvictionOutcome::TooFewModels => (
                    Level::INFO,
                    format!(
                        "[{}] fewer than two models loaded, nothing to compare",
                        server
                    ),
                ),
                EvictionOutcome::SameModel(model) => (
                    Level::INFO,
                    format!(
                        "[{}] newest and previous are both {}, nothing to unload",
                        server, model
                    ),
                ),
                EvictionOutcome::Unloaded { newest, previous } => (
                    Level::INFO,
                    format!(
                        "[{}] newest {} differs from previous {}, unloaded {}",
                        server, newest, previous, previous
                    ),
                ),
                EvictionOutcome::WouldUnload { newest, previous } => (
                    Level::INFO,
                    format!(
                        "[{}] newest {} differs from previous {}, would unload {} (dry run)",
                        server, newest, previous, previous
                    ),
                ),
                EvictionOutcome::UnloadFailed {
                    newest,
                    previous,
                    error,
                } => (
                    Level::WARN,
                    format!(
                        "[{}] newest {} differs from previous {}, failed to unload {}: {}",
                        server, newest, previous, previous, error
                    ),
                ),
            };
            lines.push(outcome);
        }

        lines.push(match &self.memory {
            Ok(snapshot) => (Level::INFO, format!("Memory: {}", snapshot)),
            Err(e) => (Level::WARN, format!("Failed to read memory statistics: {}", e)),
        });
        lines
    }

    /// The one place iteration results, failures included, reach the log.
    pub fn log(&self) {
        for (level, line) in self.lines() {
            if level == Level::WARN {
                warn!("{}", line);
            } else {
                info!("{}", line);
            }
        }
    }
}

pub type MemoryReader = fn() -> Result<MemorySnapshot, PollError>;

/// Fetch, compare and unload against every configured server, then read host memory.
pub struct Poller {
    config: PollerConfig,
    client: InferenceClient,
    read_memory: MemoryReader,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        Self::with_memory_reader(config, memory::read_memory)
    }

    pub fn with_memory_reader(config: PollerConfig, read_memory: MemoryReader) -> Self {
        let client = InferenceClient::new(config.request_timeout);
        Self {
            config,
            client,
            read_memory,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run one full iteration. Servers are visited in order, one at a time.
    pub async fn poll_once(&self, iteration: u64) -> IterationReport {
        let started_at = Local::now();
        let mut servers = Vec::with_capacity(self.config.servers.len());
        for server in &self.config.servers {
            servers.push(self.poll_server(server).await);
        }

        IterationReport {
            iteration,
            started_at,
            servers,
            memory: (self.read_memory)(),
        }
    }

    async fn poll_server(&self, server: &ServerAddr) -> ServerReport {
        let models = self.client.fetch_running_models(server).await;
        let outcome = match &models {
            Ok(entries) => self.compare_and_unload(server, entries).await,
            Err(_) => EvictionOutcome::TooFewModels,
        };

        ServerReport {
            server: server.clone(),
            models,
            outcome,
        }
    }

    async fn compare_and_unload(
        &self,
        server: &ServerAddr,
        entries: &[ModelEntry],
    ) -> EvictionOutcome {
        match decide_eviction(entries) {
            EvictionDecision::TooFewModels => EvictionOutcome::TooFewModels,
            EvictionDecision::SameModel(model) => EvictionOutcome::SameModel(model.to_string()),
            EvictionDecision::Evict { newest, previous } => {
                let (newest, previous) = (newest.to_string(), previous.to_string());
                if self.config.dry_run {
                    return EvictionOutcome::WouldUnload { newest, previous };
                }
                match self.client.unload_model(server, &previous).await {
                    Ok(()) => EvictionOutcome::Unloaded { newest, previous },
                    Err(error) => EvictionOutcome::UnloadFailed {
                        newest,
                        previous,
                        error,
                    },
                }
            }
        }
    }
}
