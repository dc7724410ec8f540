use crate::board::{BoardPosition, MoveSpec, Side};
use crate::config::GeneratorConfig;
use crate::error::{EngineError, PuzzleError};
use crate::session::EngineSession;
use log::{debug, warn};

/// A position that is mate-in-1 for the side to move, and one mating move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reduction {
   pub position: BoardPosition,
   pub answer: MoveSpec,
}

/// Side holding the larger share of non-king material. Ties go to `hint`.
pub fn mating_side(position: &BoardPosition, hint: Side) -> Side {
   position.majority_side().unwrap_or(hint)
}

/// Turns `start` into a mate-in-1 position.
///
/// Positions that already have a mating move come back unchanged without
/// touching the engine.
pub async fn reduce(
   session: &mut EngineSession,
   start: &BoardPosition,
   winner: Side,
   config: &GeneratorConfig,
) -> Result<Reduction, PuzzleError> {
   if let Some(answer) = start.find_mate_in_one() {
      return Ok(Reduction {
         position: start.clone(),
         answer,
      });
   }
   reduce_with_engine(session, start, winner, config).await
}

/// The engine-driven part of [`reduce`], for positions already known to have
/// no immediate mate.
///
/// Plays the engine's mate line out, steps back one ply from the mate, and
/// if the wrong side ended up on move lets the engine play one more move.
/// When that still leaves no mate-in-1, the engine plays both sides until
/// someone is mated and the position before the last move is returned.
pub async fn reduce_with_engine(
   session: &mut EngineSession,
   start: &BoardPosition,
   winner: Side,
   config: &GeneratorConfig,
) -> Result<Reduction, PuzzleError> {
   session.reset().await?;
   session.set_position(start).await?;
   let bound = config.mate_bound;
   let search = session
      .search_for_mate(bound, |info| info.mate.map_or(false, |m| m.unsigned_abs() <= bound))
      .await?;
   debug!("mate search reported {:?} with a {} ply line", search.mate, search.line.len());

   let mut positions = replay(start, &search.line);
   if positions.len() > 1 && positions.last().map_or(false, BoardPosition::is_checkmate) {
      positions.pop();
   }
   let mut current = positions.pop().unwrap_or_else(|| start.clone());

   if mating_side(&current, winner) != current.side_to_move() && !current.is_checkmate() && !current.is_stalemate() {
      debug!("{} has the move but not the material, stepping one ply", current.side_to_move().fen_char());
      if let Some(step) = best_move(session, &current, config.fallback_depth).await? {
         if let Some(next) = current.play(&step) {
            current = next;
         } else {
            warn!("engine suggested illegal move {} in {}", step, current);
         }
      }
   }

   if let Some(answer) = current.find_mate_in_one() {
      return Ok(Reduction {
         position: current,
         answer,
      });
   }
   play_out(session, current, config).await
}

fn replay(start: &BoardPosition, line: &[MoveSpec]) -> Vec<BoardPosition> {
   let mut positions = vec![start.clone()];
   for a_move in line {
      let next = match positions.last().and_then(|p| p.play(a_move)) {
         Some(next) => next,
         None => {
            warn!("engine line move {} is illegal, truncating the line", a_move);
            break;
         }
      };
      positions.push(next);
   }
   positions
}

async fn best_move(
   session: &mut EngineSession,
   position: &BoardPosition,
   depth: u32,
) -> Result<Option<MoveSpec>, EngineError> {
   session.reset().await?;
   session.set_position(position).await?;
   session.search_best_move(depth).await
}

async fn play_out(
   session: &mut EngineSession,
   start: BoardPosition,
   config: &GeneratorConfig,
) -> Result<Reduction, PuzzleError> {
   let mut positions = vec![start];
   let mut move_stack: Vec<MoveSpec> = Vec::new();
   while move_stack.len() < config.max_fallback_plies {
      let current = match positions.last() {
         Some(current) if !current.is_checkmate() => current,
         _ => break,
      };
      let step = match best_move(session, current, config.fallback_depth).await? {
         Some(step) => step,
         None => break,
      };
      let next = current
         .play(&step)
         .ok_or_else(|| EngineError::Protocol(format!("bestmove {} is illegal in {}", step, current)))?;
      move_stack.push(step);
      positions.push(next);
   }

   let mated = positions.last().map_or(false, BoardPosition::is_checkmate);
   if mated {
      positions.pop();
      if let (Some(position), Some(answer)) = (positions.pop(), move_stack.pop()) {
         debug!("play-out reached mate after {} plies", move_stack.len() + 1);
         return Ok(Reduction { position, answer });
      }
   }
   Err(PuzzleError::ReductionExhausted {
      plies: move_stack.len(),
   })
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::config::{EngineConfig, SolverLimits};
   use crate::session::tests::{handshake_reply, scripted};
   use std::time::Duration;

   fn quick_config() -> EngineConfig {
      EngineConfig {
         handshake_timeout: Duration::from_secs(2),
         search_timeout: Duration::from_secs(30),
         ..EngineConfig::default()
      }
   }

   fn assert_mate_in_one(reduction: &Reduction) {
      let after = reduction.position.play(&reduction.answer).expect("answer must be legal");
      assert!(after.is_checkmate());
   }

   /// Scripted engine: `go mate` finds nothing, `go depth` plays `moves` in order.
   async fn stepping_engine(moves: &'static [&'static str]) -> EngineSession {
      let mut next = 0;
      let (reader, writer) = scripted(move |line| {
         if line.starts_with("go mate") {
            Some(vec!["bestmove (none)".into()])
         } else if line.starts_with("go depth") {
            let reply = moves.get(next).map_or("bestmove (none)".to_string(), |m| format!("bestmove {}", m));
            next += 1;
            Some(vec![reply])
         } else {
            handshake_reply(line)
         }
      });
      EngineSession::from_io(reader, writer, quick_config()).await.unwrap()
   }

   #[test]
   fn mating_side_follows_material() {
      let white_up = BoardPosition::from_fen("7k/8/5K2/8/8/8/8/Q7 b - - 0 1").unwrap();
      assert_eq!(mating_side(&white_up, Side::Black), Side::White);
      let bare = BoardPosition::from_fen("7k/8/5K2/8/8/8/8/8 w - - 0 1").unwrap();
      assert_eq!(mating_side(&bare, Side::Black), Side::Black);
   }

   #[tokio::test]
   async fn immediate_mate_skips_engine() {
      // a dead engine would fail any search
      let (reader, writer) = scripted(|line| if line.starts_with("go") { None } else { handshake_reply(line) });
      let mut session = EngineSession::from_io(reader, writer, quick_config()).await.unwrap();
      let start = BoardPosition::from_fen("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1").unwrap();
      let reduction = reduce(&mut session, &start, Side::White, &GeneratorConfig::default()).await.unwrap();
      assert_eq!(reduction.position, start);
      assert_eq!(reduction.answer.to_string(), "a1a8");
   }

   #[tokio::test]
   async fn mate_line_is_cut_one_ply_before_mate() {
      let limits = SolverLimits {
         node_limit: 1_000_000,
         max_depth: 3,
      };
      let mut session = EngineSession::builtin(limits, quick_config()).await.unwrap();
      let start = BoardPosition::from_fen("7k/8/5K2/8/8/8/8/Q7 w - - 0 1").unwrap();
      let config = GeneratorConfig {
         mate_bound: 3,
         ..GeneratorConfig::default()
      };
      let reduction = reduce(&mut session, &start, Side::White, &config).await.unwrap();
      assert_ne!(reduction.position, start);
      assert_eq!(reduction.position.side_to_move(), Side::White);
      assert_mate_in_one(&reduction);
   }

   #[tokio::test]
   async fn wrong_side_to_move_steps_one_ply() {
      let mut session = stepping_engine(&["h8g8"]).await;
      let start = BoardPosition::from_fen("7k/8/6K1/8/8/8/8/1Q6 b - - 1 1").unwrap();
      let reduction = reduce(&mut session, &start, Side::White, &GeneratorConfig::default()).await.unwrap();
      assert_eq!(reduction.position.side_to_move(), Side::White);
      assert!(reduction.position.fen().starts_with("6k1/8/6K1/8/8/8/8/1Q6 w"));
      assert_mate_in_one(&reduction);
   }

   #[tokio::test]
   async fn play_out_until_mate() {
      let mut session = stepping_engine(&["f6g6", "h8g8", "a1a8"]).await;
      let start = BoardPosition::from_fen("7k/8/5K2/8/8/8/8/Q7 w - - 0 1").unwrap();
      let reduction = reduce(&mut session, &start, Side::White, &GeneratorConfig::default()).await.unwrap();
      assert_eq!(reduction.answer.to_string(), "a1a8");
      assert!(reduction.position.fen().starts_with("6k1/8/6K1/8/8/8/8/Q7 w"));
      assert_mate_in_one(&reduction);
   }

   #[tokio::test]
   async fn play_out_without_mate_is_exhausted() {
      let mut session = stepping_engine(&["f6g6"]).await;
      let start = BoardPosition::from_fen("7k/8/5K2/8/8/8/8/Q7 w - - 0 1").unwrap();
      let result = reduce(&mut session, &start, Side::White, &GeneratorConfig::default()).await;
      assert!(matches!(result, Err(PuzzleError::ReductionExhausted { plies: 1 })));
   }

   #[tokio::test]
   async fn play_out_is_bounded() {
      let mut session = stepping_engine(&["f6e6", "h8g8", "e6f6", "g8h8", "f6e6", "h8g8"]).await;
      let start = BoardPosition::from_fen("7k/8/5K2/8/8/8/8/Q7 w - - 0 1").unwrap();
      let config = GeneratorConfig {
         max_fallback_plies: 4,
         ..GeneratorConfig::default()
      };
      let result = reduce(&mut session, &start, Side::White, &config).await;
      assert!(matches!(result, Err(PuzzleError::ReductionExhausted { plies: 4 })));
   }

   #[tokio::test]
   async fn illegal_engine_move_is_an_engine_failure() {
      let mut session = stepping_engine(&["a1h8"]).await;
      let start = BoardPosition::from_fen("7k/8/5K2/8/8/8/8/Q7 w - - 0 1").unwrap();
      let result = reduce(&mut session, &start, Side::White, &GeneratorConfig::default()).await;
      assert!(matches!(result, Err(PuzzleError::Engine(EngineError::Protocol(_)))));
   }
}
