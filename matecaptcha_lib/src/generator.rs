use crate::board::{self, BoardPosition, MoveSpec, PiecePlacement, Side};
use crate::config::GeneratorConfig;
use crate::error::{EngineError, PuzzleError};
use crate::reducer::{self, Reduction};
use crate::session::EngineSession;
use crate::synth;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// A mate-in-1 position and one move that mates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Puzzle {
   #[serde(rename = "fen")]
   pub position: BoardPosition,
   #[serde(rename = "answer")]
   pub answer_move: MoveSpec,
}

/// What the person solving gets to see.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
   pub fen: BoardPosition,
}

impl Puzzle {
   pub fn challenge(&self) -> Challenge {
      Challenge {
         fen: self.position.clone(),
      }
   }
}

pub struct PuzzleGenerator {
   session: tokio::sync::Mutex<EngineSession>,
   rng: Mutex<StdRng>,
   config: GeneratorConfig,
}

impl PuzzleGenerator {
   pub fn new(session: EngineSession, config: GeneratorConfig) -> PuzzleGenerator {
      PuzzleGenerator::with_rng(session, config, StdRng::from_entropy())
   }

   pub fn with_rng(session: EngineSession, config: GeneratorConfig, rng: StdRng) -> PuzzleGenerator {
      PuzzleGenerator {
         session: tokio::sync::Mutex::new(session),
         rng: Mutex::new(rng),
         config,
      }
   }

   pub fn config(&self) -> &GeneratorConfig {
      &self.config
   }

   /// Builds one puzzle.
   ///
   /// `material` defaults to 2 to 4 random pieces for `side`; `side` defaults
   /// to whoever owns more of `material`, or a coin flip. On any failure the
   /// engine is told to stop and nothing partial is returned, the caller is
   /// expected to ask again.
   pub async fn generate(
      &self,
      material: Option<Vec<PiecePlacement>>,
      side: Option<Side>,
   ) -> Result<Puzzle, PuzzleError> {
      let result = self.build(material, side).await;
      if let Err(e) = &result {
         warn!("puzzle generation failed: {}", e);
         let mut session = self.session.lock().await;
         if let Err(e) = session.stop().await {
            debug!("stopping the engine after a failure also failed: {}", e);
         }
      }
      result
   }

   async fn build(&self, material: Option<Vec<PiecePlacement>>, side: Option<Side>) -> Result<Puzzle, PuzzleError> {
      let (side, start) = {
         let mut rng = self.rng.lock();
         let side = side
            .or_else(|| material.as_deref().and_then(board::majority_side))
            .unwrap_or_else(|| if rng.gen() { Side::White } else { Side::Black });
         let material = material.unwrap_or_else(|| synth::random_material(&mut *rng, side));
         let start = synth::synthesize(&mut *rng, &material, side, self.config.synth_attempts)?;
         (side, start)
      };
      debug!("synthesized {}", start);

      let Reduction { position, answer } = match start.find_mate_in_one() {
         Some(answer) => Reduction {
            position: start,
            answer,
         },
         None => {
            let mut session = self.session.lock().await;
            reducer::reduce_with_engine(&mut session, &start, side, &self.config).await?
         }
      };

      // the engine's word is not taken for it
      let mates = position.play(&answer).map_or(false, |after| after.is_checkmate());
      if !mates {
         return Err(EngineError::Protocol(format!("{} does not mate in {}", answer, position)).into());
      }
      info!("generated puzzle {} answer {}", position, answer);
      Ok(Puzzle {
         position,
         answer_move: answer,
      })
   }

   /// Hands the session back to its owner, e.g. to shut it down.
   pub fn into_session(self) -> EngineSession {
      self.session.into_inner()
   }

   pub async fn shutdown(self) -> Result<(), EngineError> {
      self.into_session().shutdown().await
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::board::PieceKind;
   use crate::config::{EngineConfig, SolverLimits};
   use crate::session::tests::{handshake_reply, scripted};
   use crate::verify::verify;
   use std::sync::Arc;
   use std::time::Duration;

   fn engine_config() -> EngineConfig {
      EngineConfig {
         handshake_timeout: Duration::from_secs(5),
         search_timeout: Duration::from_secs(60),
         ..EngineConfig::default()
      }
   }

   fn light_config() -> GeneratorConfig {
      GeneratorConfig {
         mate_bound: 3,
         fallback_depth: 3,
         max_fallback_plies: 60,
         ..GeneratorConfig::default()
      }
   }

   async fn builtin_generator(seed: u64) -> PuzzleGenerator {
      let limits = SolverLimits {
         node_limit: 200_000,
         max_depth: 3,
      };
      let session = EngineSession::builtin(limits, engine_config()).await.unwrap();
      PuzzleGenerator::with_rng(session, light_config(), StdRng::seed_from_u64(seed))
   }

   fn two_queens() -> Vec<PiecePlacement> {
      vec![PiecePlacement::new(PieceKind::Queen, Side::White); 2]
   }

   /// Generation is allowed to fail now and then, callers retry.
   async fn generate_with_retries(
      generator: &PuzzleGenerator,
      material: Option<Vec<PiecePlacement>>,
      side: Option<Side>,
   ) -> Puzzle {
      let mut last = None;
      for _ in 0..5 {
         match generator.generate(material.clone(), side).await {
            Ok(puzzle) => return puzzle,
            Err(e) => {
               assert!(e.is_retryable(), "{}", e);
               last = Some(e);
            }
         }
      }
      panic!("no puzzle after 5 attempts: {:?}", last);
   }

   fn assert_valid(puzzle: &Puzzle) {
      let reparsed = BoardPosition::from_fen(puzzle.position.fen()).unwrap();
      assert_eq!(reparsed, puzzle.position);
      assert!(!puzzle.position.is_checkmate());
      assert!(!puzzle.position.is_stalemate());
      let after = puzzle.position.play(&puzzle.answer_move).expect("answer is legal");
      assert!(after.is_checkmate());
   }

   #[tokio::test(flavor = "multi_thread")]
   async fn two_white_queens() {
      let generator = builtin_generator(11).await;
      let puzzle = generate_with_retries(&generator, Some(two_queens()), Some(Side::White)).await;
      assert_valid(&puzzle);
      assert_eq!(puzzle.position.side_to_move(), Side::White);

      for _ in 0..3 {
         assert!(verify(&puzzle.clone(), &puzzle.answer_move));
      }
      let mates = puzzle.position.mating_moves();
      assert!(mates.contains(&puzzle.answer_move));
      for a_move in mates {
         assert!(verify(&puzzle, &a_move));
      }
      generator.shutdown().await.unwrap();
   }

   #[tokio::test(flavor = "multi_thread")]
   async fn random_material_for_either_side() {
      let generator = builtin_generator(5).await;
      for _ in 0..3 {
         let puzzle = generate_with_retries(&generator, None, None).await;
         assert_valid(&puzzle);
      }
   }

   #[tokio::test]
   async fn cheap_path_never_touches_the_engine() {
      // the fake engine dies on the first search, so only an immediate mate can pass
      let (reader, writer) = scripted(|line| if line.starts_with("go") { None } else { handshake_reply(line) });
      let session = EngineSession::from_io(reader, writer, engine_config()).await.unwrap();
      let generator = PuzzleGenerator::with_rng(session, light_config(), StdRng::seed_from_u64(1));
      let rooks = vec![PiecePlacement::new(PieceKind::Rook, Side::Black); 4];
      let mut generated = 0;
      for _ in 0..20 {
         match generator.generate(Some(rooks.clone()), Some(Side::Black)).await {
            Ok(puzzle) => {
               assert_valid(&puzzle);
               assert_eq!(puzzle.position.side_to_move(), Side::Black);
               generated += 1;
            }
            Err(PuzzleError::Engine(_)) => {}
            Err(e) => panic!("unexpected failure {}", e),
         }
      }
      assert!(generated > 0);
   }

   #[tokio::test(flavor = "multi_thread")]
   async fn dead_engine_surfaces_and_fresh_session_recovers() {
      let (reader, writer) = scripted(|line| if line.starts_with("go") { None } else { handshake_reply(line) });
      let session = EngineSession::from_io(reader, writer, engine_config()).await.unwrap();
      let generator = PuzzleGenerator::with_rng(session, light_config(), StdRng::seed_from_u64(2));
      // a lone knight can never mate, so the engine is always consulted
      let knight = vec![PiecePlacement::new(PieceKind::Knight, Side::White)];
      let result = generator.generate(Some(knight), Some(Side::White)).await;
      assert!(matches!(result, Err(PuzzleError::Engine(_))), "{:?}", result);

      let fresh = builtin_generator(3).await;
      let puzzle = generate_with_retries(&fresh, Some(two_queens()), Some(Side::White)).await;
      assert_valid(&puzzle);
   }

   #[cfg(unix)]
   #[tokio::test(flavor = "multi_thread")]
   async fn killed_engine_process_surfaces() {
      let script = r#"while read l; do case "$l" in uci) echo uciok;; isready) echo readyok;; go*) kill -9 $$;; esac; done"#;
      let config = EngineConfig {
         program: "sh".into(),
         args: vec!["-c".into(), script.into()],
         ..engine_config()
      };
      let session = EngineSession::spawn(config).await.unwrap();
      let generator = PuzzleGenerator::with_rng(session, light_config(), StdRng::seed_from_u64(8));
      let knight = vec![PiecePlacement::new(PieceKind::Knight, Side::White)];
      let result = generator.generate(Some(knight), Some(Side::White)).await;
      assert!(matches!(result, Err(PuzzleError::Engine(EngineError::Closed))), "{:?}", result);
      generator.shutdown().await.unwrap();

      let fresh = builtin_generator(9).await;
      let puzzle = generate_with_retries(&fresh, Some(two_queens()), Some(Side::White)).await;
      assert_valid(&puzzle);
   }

   #[tokio::test]
   async fn exhausted_synthesis_stops_the_engine() {
      let received = Arc::new(Mutex::new(Vec::new()));
      let (reader, writer) = {
         let received = received.clone();
         scripted(move |line| {
            received.lock().push(line.to_owned());
            handshake_reply(line)
         })
      };
      let session = EngineSession::from_io(reader, writer, engine_config()).await.unwrap();
      let config = GeneratorConfig {
         synth_attempts: 0,
         ..light_config()
      };
      let generator = PuzzleGenerator::with_rng(session, config, StdRng::seed_from_u64(4));
      let result = generator.generate(Some(two_queens()), Some(Side::White)).await;
      assert!(matches!(result, Err(PuzzleError::GenerationExhausted { attempts: 0 })));

      let too_many = vec![PiecePlacement::new(PieceKind::Knight, Side::White); 63];
      let result = generator.generate(Some(too_many), Some(Side::White)).await;
      assert!(matches!(result, Err(PuzzleError::TooManyPieces { count: 63 })));

      // the readyok barrier orders everything sent before it
      let mut session = generator.into_session();
      session.reset().await.unwrap();
      let stops = received.lock().iter().filter(|line| line.as_str() == "stop").count();
      assert_eq!(stops, 2);
   }

   #[test]
   fn majority_decides_side() {
      assert_eq!(board::majority_side(&two_queens()), Some(Side::White));
   }

   #[test]
   fn challenge_hides_the_answer() {
      let puzzle = Puzzle {
         position: BoardPosition::from_fen("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1").unwrap(),
         answer_move: "a1a8".parse().unwrap(),
      };
      let json = serde_json::to_value(&puzzle.challenge()).unwrap();
      assert_eq!(json, serde_json::json!({ "fen": "6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1" }));

      let stored = serde_json::to_string(&puzzle).unwrap();
      let back: Puzzle = serde_json::from_str(&stored).unwrap();
      assert_eq!(back, puzzle);
   }
}
