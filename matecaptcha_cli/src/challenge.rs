use log::{info, warn};
use matecaptcha_lib::{verify_str, Puzzle, PuzzleGenerator, Side, Verdict};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

const HELP: &str = "commands: new | <move, e.g. a1a8> | show | quit\n";

/// Hands out puzzles on stdout and checks the answers read from stdin.
///
/// A puzzle is checked once; right or wrong, the next one has to be asked
/// for with `new`.
pub(crate) async fn main_loop(generator: PuzzleGenerator) -> Result<(), String> {
   let result = run(&generator).await;
   if let Err(e) = generator.shutdown().await {
      warn!("engine shutdown failed: {}", e);
   }
   result.map_err(|e| format!("Encountered I/O error in challenge loop: {}", e))
}

async fn run(generator: &PuzzleGenerator) -> io::Result<()> {
   let mut lines = BufReader::new(io::stdin()).lines();
   let mut out_handle = io::stdout();
   out_handle.write_all(HELP.as_bytes()).await?;
   let mut pending = next_puzzle(generator, &mut out_handle).await?;

   while let Some(line) = lines.next_line().await? {
      let args: Vec<&str> = line.split_whitespace().collect();
      if args.is_empty() {
         continue;
      }
      match args[0] {
         "quit" => break,
         "new" => {
            pending = next_puzzle(generator, &mut out_handle).await?;
         }
         "show" => match &pending {
            Some(puzzle) => show(puzzle, &mut out_handle).await?,
            None => out_handle.write_all(b"no puzzle pending, type new\n").await?,
         },
         "help" => out_handle.write_all(HELP.as_bytes()).await?,
         submitted => match pending.take() {
            Some(puzzle) => {
               let verdict = Verdict::new(verify_str(&puzzle, submitted));
               info!("{} answered {} for {}", if verdict.correct { "correctly" } else { "wrongly" }, submitted, puzzle.position);
               out_handle.write_all(format!("{}\n", verdict.message).as_bytes()).await?;
            }
            None => out_handle.write_all(b"no puzzle pending, type new\n").await?,
         },
      }
      out_handle.flush().await?;
   }
   Ok(())
}

async fn next_puzzle(generator: &PuzzleGenerator, out_handle: &mut io::Stdout) -> io::Result<Option<Puzzle>> {
   match generator.generate(None, None).await {
      Ok(puzzle) => {
         show(&puzzle, out_handle).await?;
         Ok(Some(puzzle))
      }
      Err(e) => {
         warn!("puzzle generation failed: {}", e);
         out_handle.write_all(b"could not build a puzzle, type new to try again\n").await?;
         out_handle.flush().await?;
         Ok(None)
      }
   }
}

async fn show(puzzle: &Puzzle, out_handle: &mut io::Stdout) -> io::Result<()> {
   let side = match puzzle.position.side_to_move() {
      Side::White => "White",
      Side::Black => "Black",
   };
   out_handle
      .write_all(format!("{} to move and mate: {}\n", side, puzzle.position).as_bytes())
      .await?;
   out_handle.flush().await
}
