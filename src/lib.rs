// Deterministic replay checks for UCI engines
pub mod engine;
pub mod options;
pub mod pgn;
pub mod pool;
pub mod replay;
pub mod score;
pub mod script;

pub use engine::{EngineCommand, EngineError, EngineLauncher, EngineSession};
pub use pool::{BatchedExecutionPool, PoolError, Processor};
pub use replay::{ReplayContext, ReplayError, ReplayVerifier, SessionPolicy, Verdict};
