use crate::board::{BoardPosition, MoveSpec};
use crate::config::SolverLimits;
use crate::engine;
use crate::messages::{EngineMessage, InterfaceMessage};
use crate::protocol::Reply;
use log::{trace, warn};
use shakmaty::Chess;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::unbounded_channel;

/// Serves the built-in solver over a UCI line stream until `quit` or EOF.
///
/// Searches run on their own thread so `stop` and `isready` are still read
/// while the solver is busy.
pub async fn serve<R, W>(reader: R, mut writer: W, limits: SolverLimits) -> io::Result<()>
where
   R: AsyncRead + Unpin,
   W: AsyncWrite + Unpin,
{
   let (ite_tx, ite_rx) = mpsc::channel(); // Interface to Engine
   let (eti_tx, mut eti_rx) = unbounded_channel(); // Engine to Interface
   let stop = Arc::new(AtomicBool::new(false));
   {
      let stop = stop.clone();
      thread::spawn(move || {
         engine::start(ite_rx, eti_tx, stop, limits);
      });
   }

   let mut lines = BufReader::new(reader).lines();
   loop {
      tokio::select! {
         line = lines.next_line() => {
            let line = match line? {
               Some(line) => line,
               None => break,
            };
            let args: Vec<&str> = line.split_whitespace().collect();
            if args.is_empty() {
               continue;
            }
            let message = match args[0] {
               "uci" => {
                  writer.write_all(b"id name matecaptcha\n").await?;
                  writer.write_all(b"uciok\n").await?;
                  writer.flush().await?;
                  None
               }
               "isready" => {
                  writer.write_all(b"readyok\n").await?;
                  writer.flush().await?;
                  None
               }
               "ucinewgame" => Some(InterfaceMessage::SetState(Chess::default())),
               "position" => match parse_position(&args[1..]) {
                  Ok(state) => Some(InterfaceMessage::SetState(state)),
                  Err(e) => {
                     warn!("ignoring position command: {}", e);
                     None
                  }
               },
               "go" => {
                  stop.store(false, Ordering::Relaxed);
                  Some(parse_go(&args[1..], &limits))
               }
               "stop" => {
                  stop.store(true, Ordering::Relaxed);
                  None
               }
               "quit" => break,
               _ => {
                  warn!("Unexpected input {}", line);
                  None
               }
            };
            if let Some(message) = message {
               if ite_tx.send(message).is_err() {
                  break;
               }
            }
         }
         Some(message) = eti_rx.recv() => {
            let reply = match message {
               EngineMessage::Info(info) => Reply::Info(info),
               EngineMessage::BestMove(best_move) => Reply::BestMove(best_move),
            };
            trace!("solver: {}", reply);
            writer.write_all(format!("{}\n", reply).as_bytes()).await?;
            writer.flush().await?;
         }
      }
   }
   stop.store(true, Ordering::Relaxed);
   Ok(())
}

fn parse_position(args: &[&str]) -> Result<Chess, String> {
   let moves_at = args.iter().position(|x| *x == "moves").unwrap_or(args.len());
   let mut position = match args.first() {
      Some(&"startpos") => BoardPosition::from_chess(Chess::default()),
      Some(&"fen") => BoardPosition::from_fen(&args[1..moves_at].join(" ")).map_err(|e| e.to_string())?,
      _ => return Err("Expected 'fen' or 'startpos' following 'position'".into()),
   };
   for a_str_move in args.iter().skip(moves_at + 1) {
      let a_move: MoveSpec = a_str_move.parse().map_err(|e| format!("{}", e))?;
      position = position
         .play(&a_move)
         .ok_or_else(|| format!("{} is not legal in {}", a_move, position))?;
   }
   Ok(position.chess().clone())
}

fn parse_go(args: &[&str], limits: &SolverLimits) -> InterfaceMessage {
   let value = |key: &str| {
      args.iter()
         .position(|x| *x == key)
         .and_then(|i| args.get(i + 1))
         .and_then(|x| x.parse::<u32>().ok())
   };
   if let Some(moves) = value("mate") {
      InterfaceMessage::GoMate(moves)
   } else {
      InterfaceMessage::GoDepth(value("depth").unwrap_or(limits.max_depth))
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use tokio::io::{AsyncBufReadExt, BufReader};

   async fn run_script(script: &str) -> Vec<String> {
      let (client, server) = tokio::io::duplex(4096);
      let (server_read, server_write) = tokio::io::split(server);
      let solver = tokio::spawn(serve(server_read, server_write, SolverLimits::default()));

      let (client_read, mut client_write) = tokio::io::split(client);
      client_write.write_all(script.as_bytes()).await.unwrap();
      let mut lines = BufReader::new(client_read).lines();
      let mut seen = Vec::new();
      while let Some(line) = lines.next_line().await.unwrap() {
         let done = line.starts_with("bestmove");
         seen.push(line);
         if done {
            break;
         }
      }
      client_write.write_all(b"quit\n").await.unwrap();
      solver.await.unwrap().unwrap();
      seen
   }

   #[tokio::test]
   async fn answers_mate_search() {
      let seen = run_script("uci\nisready\nucinewgame\nposition fen 6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1\ngo mate 3\n").await;
      assert!(seen.contains(&"uciok".to_string()));
      assert!(seen.contains(&"readyok".to_string()));
      assert!(seen.iter().any(|l| l.starts_with("info") && l.contains("score mate 1")));
      assert_eq!(seen.last().unwrap(), "bestmove a1a8");
   }

   #[tokio::test]
   async fn applies_moves_after_position() {
      // 1. f3 e5 2. g4, black mates with Qh4
      let seen = run_script("position startpos moves f2f3 e7e5 g2g4\ngo depth 2\n").await;
      assert_eq!(seen.last().unwrap(), "bestmove d8h4");
   }

   #[test]
   fn parses_go_variants() {
      let limits = SolverLimits::default();
      assert!(matches!(parse_go(&["mate", "25"], &limits), InterfaceMessage::GoMate(25)));
      assert!(matches!(parse_go(&["depth", "15"], &limits), InterfaceMessage::GoDepth(15)));
      assert!(matches!(parse_go(&["infinite"], &limits), InterfaceMessage::GoDepth(4)));
   }

   #[test]
   fn rejects_bad_positions() {
      assert!(parse_position(&["fen", "8/8/8/8/8/8/8/8", "w", "-", "-", "0", "1"]).is_err());
      assert!(parse_position(&["startpos", "moves", "e2e5"]).is_err());
      assert!(parse_position(&["somewhere"]).is_err());
      assert!(parse_position(&["startpos", "moves", "e2e4", "e7e5"]).is_ok());
   }
}
