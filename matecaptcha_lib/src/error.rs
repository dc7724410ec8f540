use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Failures that surface from puzzle generation.
#[derive(Debug, Error)]
pub enum PuzzleError {
   #[error("no legal position found after {attempts} placement attempts")]
   GenerationExhausted { attempts: usize },

   #[error("{count} pieces plus both kings do not fit on the board")]
   TooManyPieces { count: usize },

   #[error("invalid position: {0}")]
   InvalidPosition(String),

   #[error("engine failure: {0}")]
   Engine(#[from] EngineError),

   #[error("no checkmate reached after {plies} fallback plies")]
   ReductionExhausted { plies: usize },
}

impl PuzzleError {
   /// Whether asking for a fresh puzzle can succeed where this one failed.
   pub fn is_retryable(&self) -> bool {
      !matches!(self, PuzzleError::InvalidPosition(_) | PuzzleError::TooManyPieces { .. })
   }
}

#[derive(Debug, Error)]
pub enum EngineError {
   #[error("engine i/o error: {0}")]
   Io(#[from] io::Error),

   #[error("engine output framing error: {0}")]
   Codec(#[from] LinesCodecError),

   #[error("engine closed its output")]
   Closed,

   #[error("engine did not answer within {0:?}")]
   Timeout(Duration),

   #[error("unexpected engine output: {0}")]
   Protocol(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseMoveError {
   #[error("a move has to be 4-5 ascii bytes long, got {0:?}")]
   Length(String),

   #[error("{0:?} is not a valid algebraic square")]
   Square(String),

   #[error("{0:?} is not a valid promotion target, expected one of nbrq")]
   Promotion(char),
}
