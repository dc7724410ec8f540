use std::path::PathBuf;
use std::time::Duration;

/// How to launch and talk to the analysis engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
   pub program: PathBuf,
   pub args: Vec<String>,
   /// Bound on the `uci`/`isready` barriers and on draining a stopped search
   pub handshake_timeout: Duration,
   /// Bound on a single `go` command
   pub search_timeout: Duration,
}

impl Default for EngineConfig {
   fn default() -> EngineConfig {
      EngineConfig {
         program: PathBuf::from("stockfish"),
         args: Vec::new(),
         handshake_timeout: Duration::from_secs(10),
         search_timeout: Duration::from_secs(60),
      }
   }
}

#[derive(Clone, Debug)]
pub struct GeneratorConfig {
   /// Random placements tried before giving up on a material set
   pub synth_attempts: usize,
   /// Longest forced mate (in moves) the engine is asked to find
   pub mate_bound: u32,
   /// Depth of the `go depth` searches used to step a position forward
   pub fallback_depth: u32,
   /// Cap on the plies played by the fallback loop
   pub max_fallback_plies: usize,
}

impl Default for GeneratorConfig {
   fn default() -> GeneratorConfig {
      GeneratorConfig {
         synth_attempts: 1000,
         mate_bound: 25,
         fallback_depth: 15,
         max_fallback_plies: 200,
      }
   }
}

/// Effort limits of the built-in solver.
#[derive(Clone, Copy, Debug)]
pub struct SolverLimits {
   pub node_limit: u64,
   /// `go depth` requests are clamped to this
   pub max_depth: u32,
}

impl Default for SolverLimits {
   fn default() -> SolverLimits {
      SolverLimits {
         node_limit: 2_000_000,
         max_depth: 4,
      }
   }
}
