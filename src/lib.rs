pub mod config;
pub mod engine;
pub mod error;
pub mod heal;
pub mod openai;
pub mod policy;
pub mod sanitize;
pub mod server;
pub mod state;

pub use config::AppConfig;
pub use engine::{GenerationParams, InferenceEngine, InferenceResult};
pub use server::build_router;
pub use state::ModelState;
