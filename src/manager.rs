//! Generation manager: keeps one pipeline resident and queues requests.
//!
//! Requests are processed one at a time on a dedicated blocking thread, so
//! the engines never see concurrent calls and each request grows its own
//! token sequence.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "onnx")]
//! # async fn run() -> musicgen_rs::Result<()> {
//! use musicgen_rs::config::MusicGenConfig;
//! use musicgen_rs::manager::{GenerationManager, ManagerConfig};
//! use musicgen_rs::pipeline::{GenerationParams, ModelPaths, OnnxPipeline};
//!
//! let paths = ModelPaths::in_dir("models");
//! let manager = GenerationManager::start(ManagerConfig::default(), move || {
//!     OnnxPipeline::load(&paths, MusicGenConfig::default())
//! })
//! .await?;
//! let audio = manager.generate(GenerationParams::new("calm piano")).await?;
//! # Ok(())
//! # }
//! ```

use tokio::sync::{mpsc, oneshot};

use crate::model::{Decoder, TextEncoder, Vocoder};
use crate::pipeline::{GeneratedAudio, GenerationParams, MusicGenPipeline};
use crate::{Error, Result};

/// Configuration for the generation manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Requests that may wait in the queue before `generate` starts to block.
    pub queue_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

/// Anything the manager can drive: one request in, one waveform out.
pub trait Generator: Send + 'static {
    fn generate(&mut self, params: &GenerationParams) -> Result<GeneratedAudio>;
}

impl<E, D, V> Generator for MusicGenPipeline<E, D, V>
where
    E: TextEncoder + Send + 'static,
    D: Decoder + Send + 'static,
    V: Vocoder + Send + 'static,
{
    fn generate(&mut self, params: &GenerationParams) -> Result<GeneratedAudio> {
        MusicGenPipeline::generate(self, params)
    }
}

/// A submitted generation request.
struct PendingRequest {
    params: GenerationParams,
    reply: oneshot::Sender<Result<GeneratedAudio>>,
}

/// Handle for submitting generation requests to a running manager.
#[derive(Clone)]
pub struct GenerationManager {
    tx: mpsc::Sender<PendingRequest>,
}

impl GenerationManager {
    /// Load the generator with `load` on a blocking thread, then start the worker.
    ///
    /// Returns an error if the initial load fails.
    pub async fn start<G, F>(config: ManagerConfig, load: F) -> Result<Self>
    where
        G: Generator,
        F: FnOnce() -> Result<G> + Send + 'static,
    {
        if config.queue_capacity == 0 {
            return Err(Error::Config("manager queue_capacity must be > 0".into()));
        }

        let generator = tokio::task::spawn_blocking(move || {
            tracing::info!("loading MusicGen pipeline");
            load()
        })
        .await
        .map_err(|join_error| Error::Manager(format!("pipeline load task panicked: {join_error}")))?
        .map_err(|e| Error::Manager(format!("pipeline load failed: {e}")))?;

        let (tx, rx) = mpsc::channel::<PendingRequest>(config.queue_capacity);

        tokio::task::spawn_blocking(move || run_manager(generator, rx));

        Ok(Self { tx })
    }

    /// Submit a generation request and wait for the result.
    pub async fn generate(&self, params: GenerationParams) -> Result<GeneratedAudio> {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<GeneratedAudio>>();
        self.tx
            .send(PendingRequest {
                params,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::Manager("manager has shut down".into()))?;

        reply_rx
            .await
            .map_err(|_| Error::Manager("manager dropped reply channel".into()))?
    }
}

/// Worker loop. Ends when every handle has been dropped.
fn run_manager<G: Generator>(mut generator: G, mut rx: mpsc::Receiver<PendingRequest>) {
    while let Some(request) = rx.blocking_recv() {
        let result = generator.generate(&request.params);
        if let Err(error) = &result {
            tracing::warn!(%error, "generation request failed");
        }
        // Ignore send errors: the caller may have given up.
        let _ = request.reply.send(result);
    }
    tracing::info!("generation manager shut down");
}
