//! llama.cpp-backed engine.
//!
//! llama-cpp-2 types (`LlamaBackend`, `LlamaModel`, `LlamaContext`) hold raw
//! pointers that are not `Send`, so every llama.cpp call runs on a dedicated
//! worker thread owning the backend and model. The handle talks to it over a
//! channel guarded by a mutex; holding the lock for the full send/receive
//! round trip guarantees at most one in-flight call on the shared model.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use parking_lot::Mutex;

use super::{
    EngineError, GenerationParams, InferenceEngine, InferenceResult, clamp_to_context,
    truncate_at_stop,
};

enum WorkerCommand {
    Tokenize {
        text: String,
        reply: Sender<Result<Vec<i32>, EngineError>>,
    },
    Detokenize {
        tokens: Vec<i32>,
        reply: Sender<Result<String, EngineError>>,
    },
    Generate {
        prompt: String,
        params: GenerationParams,
        reply: Sender<Result<InferenceResult, EngineError>>,
    },
    Shutdown,
}

pub struct LlamaEngine {
    command_tx: Mutex<Sender<WorkerCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl LlamaEngine {
    /// Loads the GGUF model and starts the worker thread. Blocks until the
    /// model is resident or loading has failed.
    pub fn load(
        path: &Path,
        n_ctx: u32,
        n_batch: u32,
        n_threads: u32,
    ) -> Result<Self, EngineError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let model_path = path.to_path_buf();

        let worker = thread::spawn(move || {
            worker_main(model_path, n_ctx, n_batch, n_threads, command_rx, ready_tx);
        });

        ready_rx
            .recv()
            .map_err(|_| EngineError::Worker("engine worker exited during load".into()))??;

        Ok(Self {
            command_tx: Mutex::new(command_tx),
            worker: Some(worker),
        })
    }

    fn round_trip<T>(
        &self,
        make: impl FnOnce(Sender<Result<T, EngineError>>) -> WorkerCommand,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        // Lock held across the reply; this is the width-1 serialization of
        // access to the shared model.
        let tx = self.command_tx.lock();
        tx.send(make(reply_tx))
            .map_err(|_| EngineError::Worker("engine worker is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| EngineError::Worker("engine worker dropped the reply".into()))?
    }
}

impl InferenceEngine for LlamaEngine {
    fn tokenize(&self, text: &str) -> Result<Vec<i32>, EngineError> {
        let text = text.to_string();
        self.round_trip(|reply| WorkerCommand::Tokenize { text, reply })
    }

    fn detokenize(&self, tokens: &[i32]) -> Result<String, EngineError> {
        let tokens = tokens.to_vec();
        self.round_trip(|reply| WorkerCommand::Detokenize { tokens, reply })
    }

    fn generate(
        &self,
        prompt: &str,
        suffix: Option<&str>,
        params: &GenerationParams,
    ) -> Result<InferenceResult, EngineError> {
        // Fill-in-the-middle assembly when a suffix is supplied.
        let prompt = match suffix {
            Some(suffix) => {
                format!("<|fim_prefix|>{prompt}<|fim_suffix|>{suffix}<|fim_middle|>")
            }
            None => prompt.to_string(),
        };
        let params = params.clone();
        self.round_trip(|reply| WorkerCommand::Generate {
            prompt,
            params,
            reply,
        })
    }
}

impl Drop for LlamaEngine {
    fn drop(&mut self) {
        let _ = self.command_tx.lock().send(WorkerCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_main(
    model_path: PathBuf,
    n_ctx: u32,
    n_batch: u32,
    n_threads: u32,
    command_rx: Receiver<WorkerCommand>,
    ready_tx: Sender<Result<(), EngineError>>,
) {
    let backend = match LlamaBackend::init() {
        Ok(backend) => backend,
        Err(e) => {
            let _ = ready_tx.send(Err(EngineError::Load(e.to_string())));
            return;
        }
    };

    // CPU only, matching the deployment target of the quantized artifact.
    let model_params = LlamaModelParams::default().with_n_gpu_layers(0);
    let model = match LlamaModel::load_from_file(&backend, &model_path, &model_params) {
        Ok(model) => model,
        Err(e) => {
            let _ = ready_tx.send(Err(EngineError::Load(e.to_string())));
            return;
        }
    };

    tracing::info!(threads = n_threads, n_ctx, "model loaded");
    let _ = ready_tx.send(Ok(()));

    while let Ok(command) = command_rx.recv() {
        match command {
            WorkerCommand::Tokenize { text, reply } => {
                let result = model
                    .str_to_token(&text, AddBos::Never)
                    .map(|tokens| tokens.iter().map(|t| t.0).collect())
                    .map_err(|e| EngineError::Tokenization(e.to_string()));
                let _ = reply.send(result);
            }
            WorkerCommand::Detokenize { tokens, reply } => {
                let _ = reply.send(detokenize(&model, &tokens));
            }
            WorkerCommand::Generate {
                prompt,
                params,
                reply,
            } => {
                let result =
                    run_generation(&backend, &model, n_ctx, n_batch, n_threads, &prompt, &params);
                let _ = reply.send(result);
            }
            WorkerCommand::Shutdown => break,
        }
    }
}

fn detokenize(model: &LlamaModel, tokens: &[i32]) -> Result<String, EngineError> {
    let mut bytes = Vec::new();
    for &id in tokens {
        let piece = model
            .token_to_bytes(LlamaToken(id), Special::Tokenize)
            .map_err(|e| EngineError::Tokenization(e.to_string()))?;
        bytes.extend_from_slice(&piece);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn run_generation(
    backend: &LlamaBackend,
    model: &LlamaModel,
    n_ctx: u32,
    n_batch: u32,
    n_threads: u32,
    prompt: &str,
    params: &GenerationParams,
) -> Result<InferenceResult, EngineError> {
    let tokens = model
        .str_to_token(prompt, AddBos::Never)
        .map_err(|e| EngineError::Tokenization(e.to_string()))?;
    let prompt_tokens = tokens.len();

    if prompt_tokens == 0 {
        return Ok(InferenceResult {
            text: String::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
        });
    }
    let max_tokens = clamp_to_context(prompt_tokens, params.max_tokens, n_ctx as usize)?;

    let ctx_params = LlamaContextParams::default()
        .with_n_ctx(NonZeroU32::new(n_ctx))
        .with_n_batch(n_batch)
        .with_n_threads(n_threads as i32)
        .with_n_threads_batch(n_threads as i32);
    let mut ctx = model
        .new_context(backend, ctx_params)
        .map_err(|e| EngineError::Inference(e.to_string()))?;

    let mut batch = LlamaBatch::new(n_batch as usize, 1);
    for (i, token) in tokens.iter().enumerate() {
        let is_last = i == tokens.len() - 1;
        batch
            .add(*token, i as i32, &[0], is_last)
            .map_err(|e| EngineError::Inference(e.to_string()))?;
    }
    ctx.decode(&mut batch)
        .map_err(|e| EngineError::Inference(e.to_string()))?;

    let mut sampler = build_sampler(params);
    let mut text = String::new();
    // Token pieces are not always whole UTF-8 sequences; buffer until valid.
    let mut utf8_buffer: Vec<u8> = Vec::new();
    let mut n_cur = tokens.len() as i32;
    let mut completion_tokens = 0usize;

    for _ in 0..max_tokens {
        let token = sampler.sample(&ctx, batch.n_tokens() - 1);
        sampler.accept(token);

        if model.is_eog_token(token) {
            break;
        }
        completion_tokens += 1;

        let piece = model
            .token_to_bytes(token, Special::Tokenize)
            .map_err(|e| EngineError::Inference(e.to_string()))?;
        utf8_buffer.extend_from_slice(&piece);
        if let Ok(valid) = std::str::from_utf8(&utf8_buffer) {
            text.push_str(valid);
            utf8_buffer.clear();
        }

        let (truncated, hit) = truncate_at_stop(&text, &params.stop);
        if hit {
            text = truncated;
            break;
        }

        batch.clear();
        batch
            .add(token, n_cur, &[0], true)
            .map_err(|e| EngineError::Inference(e.to_string()))?;
        ctx.decode(&mut batch)
            .map_err(|e| EngineError::Inference(e.to_string()))?;
        n_cur += 1;
    }

    Ok(InferenceResult {
        text,
        prompt_tokens,
        completion_tokens,
    })
}

fn build_sampler(params: &GenerationParams) -> LlamaSampler {
    if params.temperature < 0.01 {
        LlamaSampler::greedy()
    } else {
        LlamaSampler::chain_simple([
            LlamaSampler::top_p(params.top_p, 1),
            LlamaSampler::temp(params.temperature),
            LlamaSampler::dist(rand_seed()),
        ])
    }
}

fn rand_seed() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0)
}
