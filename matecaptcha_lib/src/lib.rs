pub mod board;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod messages;
pub mod protocol;
pub mod reducer;
pub mod session;
pub mod synth;
pub mod uci;
pub mod verify;

pub use board::{BoardPosition, MoveSpec, PieceKind, PiecePlacement, Side};
pub use config::{EngineConfig, GeneratorConfig, SolverLimits};
pub use error::{EngineError, ParseMoveError, PuzzleError};
pub use generator::{Challenge, Puzzle, PuzzleGenerator};
pub use session::EngineSession;
pub use verify::{verify, verify_str, Verdict};
