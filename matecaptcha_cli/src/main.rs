mod challenge;

use log::{error, info};
use matecaptcha_lib::{
   verify_str, BoardPosition, EngineConfig, EngineSession, GeneratorConfig, PiecePlacement, Puzzle, PuzzleGenerator,
   Side, SolverLimits, Verdict,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use structopt::StructOpt;

/// Mate-in-1 chess captcha
#[derive(StructOpt, Debug)]
#[structopt(name = "matecaptcha")]
struct Opt {
   /// UCI engine to drive
   #[structopt(long = "engine", env = "MATECAPTCHA_ENGINE", default_value = "stockfish", parse(from_os_str))]
   engine: PathBuf,
   /// Use the built-in solver instead of an external engine
   #[structopt(long = "builtin")]
   builtin: bool,
   /// Seconds a single engine search may take
   #[structopt(long = "search-timeout", default_value = "60")]
   search_timeout: u64,
   /// Longest forced mate, in moves, the engine is asked for
   #[structopt(long = "mate-bound", default_value = "25")]
   mate_bound: u32,
   /// Depth of the searches that step a position forward
   #[structopt(long = "fallback-depth", default_value = "15")]
   fallback_depth: u32,
   /// Node budget of the built-in solver per search
   #[structopt(long = "node-limit", default_value = "2000000")]
   node_limit: u64,
   #[structopt(subcommand)]
   cmd: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
   /// Generate a puzzle and print it as JSON
   Generate {
      /// Side to move, w or b
      #[structopt(long = "side")]
      side: Option<Side>,
      /// Attacking material as FEN letters, e.g. QQ or rrn
      #[structopt(long = "material")]
      material: Option<String>,
      /// Include the answer in the output
      #[structopt(long = "reveal")]
      reveal: bool,
   },
   /// Check a move against a position
   Verify {
      #[structopt(long = "fen")]
      fen: String,
      #[structopt(long = "move")]
      submitted: String,
   },
   /// Solve generated puzzles interactively
   Play,
   /// Run the built-in solver as a UCI engine on stdin/stdout
   Uci,
}

#[derive(Serialize)]
struct VerifyOutput<'a> {
   fen: &'a str,
   #[serde(rename = "move")]
   submitted: &'a str,
   #[serde(flatten)]
   verdict: Verdict,
}

#[tokio::main]
async fn main() {
   pretty_env_logger::init();
   let opt = Opt::from_args();

   let result = match &opt.cmd {
      Command::Uci => {
         let limits = solver_limits(&opt);
         matecaptcha_lib::uci::serve(tokio::io::stdin(), tokio::io::stdout(), limits)
            .await
            .map_err(|e| e.to_string())
      }
      Command::Verify { fen, submitted } => verify_move(fen, submitted),
      Command::Generate {
         side,
         material,
         reveal,
      } => match material.as_deref().map(PiecePlacement::parse_list).transpose() {
         Ok(material) => generate(&opt, material, *side, *reveal).await,
         Err(e) => Err(e),
      },
      Command::Play => match connect(&opt).await {
         Ok(generator) => challenge::main_loop(generator).await,
         Err(e) => Err(e),
      },
   };

   if let Err(e) = result {
      error!("{}", e);
      process::exit(1);
   }
}

fn solver_limits(opt: &Opt) -> SolverLimits {
   SolverLimits {
      node_limit: opt.node_limit,
      ..SolverLimits::default()
   }
}

async fn connect(opt: &Opt) -> Result<PuzzleGenerator, String> {
   let engine_config = EngineConfig {
      program: opt.engine.clone(),
      search_timeout: Duration::from_secs(opt.search_timeout),
      ..EngineConfig::default()
   };
   let session = if opt.builtin {
      info!("Using the built-in solver");
      EngineSession::builtin(solver_limits(opt), engine_config).await
   } else {
      info!("Starting engine {}", opt.engine.display());
      EngineSession::spawn(engine_config).await
   }
   .map_err(|e| format!("could not start engine: {}", e))?;
   let config = GeneratorConfig {
      mate_bound: opt.mate_bound,
      fallback_depth: opt.fallback_depth,
      ..GeneratorConfig::default()
   };
   Ok(PuzzleGenerator::new(session, config))
}

async fn generate(
   opt: &Opt,
   material: Option<Vec<PiecePlacement>>,
   side: Option<Side>,
   reveal: bool,
) -> Result<(), String> {
   let generator = connect(opt).await?;
   let result = generator.generate(material, side).await;
   if let Err(e) = generator.shutdown().await {
      error!("engine shutdown failed: {}", e);
   }
   let puzzle: Puzzle = result.map_err(|e| e.to_string())?;
   let json = if reveal {
      serde_json::to_string_pretty(&puzzle)
   } else {
      serde_json::to_string_pretty(&puzzle.challenge())
   }
   .map_err(|e| e.to_string())?;
   println!("{}", json);
   Ok(())
}

fn verify_move(fen: &str, submitted: &str) -> Result<(), String> {
   let position = BoardPosition::from_fen(fen).map_err(|e| e.to_string())?;
   // a position without any mate can't have a correct answer
   let correct = match position.find_mate_in_one() {
      Some(answer_move) => verify_str(&Puzzle { position, answer_move }, submitted),
      None => false,
   };
   let output = VerifyOutput {
      fen,
      submitted,
      verdict: Verdict::new(correct),
   };
   println!("{}", serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?);
   Ok(())
}
