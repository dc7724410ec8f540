use crate::board::MoveSpec;
use crate::protocol::InfoLine;
use shakmaty::Chess;

// Intraprocess Communication Messages for the built-in solver

// Interface to Engine
pub enum InterfaceMessage {
   SetState(Chess), // Full state update
   GoMate(u32),     // Prove a forced mate in at most this many moves
   GoDepth(u32),    // Calculate until depth and respond with the best move
}

// Engine to Interface
pub enum EngineMessage {
   Info(InfoLine),
   BestMove(Option<MoveSpec>),
}
