use crate::board::{BoardPosition, MoveSpec};
use crate::config::{EngineConfig, SolverLimits};
use crate::error::EngineError;
use crate::protocol::{Command, InfoLine, Reply, SearchLine};
use crate::uci;
use futures::StreamExt;
use log::{debug, trace, warn};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command as Process};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, LinesCodec};

const MAX_LINE_LENGTH: usize = 64 * 1024;

type EngineReader = Box<dyn AsyncRead + Send + Unpin>;
type EngineWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Outcome of a `go mate` search.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MateSearch {
   pub line: SearchLine,
   pub mate: Option<i32>,
}

/// One long-lived engine and the only path to it.
///
/// The protocol correlates replies with commands purely by order, so every
/// method takes `&mut self` and a caller that shares a session has to put it
/// behind a lock. A search that is abandoned half-way (timeout, early
/// adoption) is drained up to its `bestmove` before the next command is
/// answered, otherwise the stale `bestmove` would be read as the reply to the
/// next search.
pub struct EngineSession {
   child: Option<Child>,
   writer: EngineWriter,
   lines: FramedRead<EngineReader, LinesCodec>,
   config: EngineConfig,
   searching: bool,
   line: SearchLine,
}

impl EngineSession {
   /// Launches `config.program` and waits for it to become ready.
   pub async fn spawn(config: EngineConfig) -> Result<EngineSession, EngineError> {
      debug!("starting engine {}", config.program.display());
      let mut child = Process::new(&config.program)
         .args(&config.args)
         .stdin(Stdio::piped())
         .stdout(Stdio::piped())
         .stderr(Stdio::null())
         .kill_on_drop(true)
         .spawn()?;
      let stdin = child
         .stdin
         .take()
         .ok_or_else(|| EngineError::Protocol("engine stdin is not piped".into()))?;
      let stdout = child
         .stdout
         .take()
         .ok_or_else(|| EngineError::Protocol("engine stdout is not piped".into()))?;
      let mut session = EngineSession::new(Box::new(stdout), Box::new(stdin), config);
      session.child = Some(child);
      session.handshake().await?;
      Ok(session)
   }

   /// Speaks the protocol over an already connected reader/writer pair.
   pub async fn from_io<R, W>(reader: R, writer: W, config: EngineConfig) -> Result<EngineSession, EngineError>
   where
      R: AsyncRead + Send + Unpin + 'static,
      W: AsyncWrite + Send + Unpin + 'static,
   {
      let mut session = EngineSession::new(Box::new(reader), Box::new(writer), config);
      session.handshake().await?;
      Ok(session)
   }

   /// Connects to the in-process solver over an in-memory pipe.
   pub async fn builtin(limits: SolverLimits, config: EngineConfig) -> Result<EngineSession, EngineError> {
      let (ours, theirs) = tokio::io::duplex(MAX_LINE_LENGTH);
      let (their_read, their_write) = tokio::io::split(theirs);
      tokio::spawn(async move {
         if let Err(e) = uci::serve(their_read, their_write, limits).await {
            warn!("built-in solver stopped: {}", e);
         }
      });
      let (our_read, our_write) = tokio::io::split(ours);
      EngineSession::from_io(our_read, our_write, config).await
   }

   fn new(reader: EngineReader, writer: EngineWriter, config: EngineConfig) -> EngineSession {
      EngineSession {
         child: None,
         writer,
         lines: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
         config,
         searching: false,
         line: SearchLine::new(),
      }
   }

   async fn handshake(&mut self) -> Result<(), EngineError> {
      self.send(Command::Uci).await?;
      let limit = self.config.handshake_timeout;
      timeout(limit, self.wait_for(Reply::UciOk))
         .await
         .map_err(|_| EngineError::Timeout(limit))??;
      self.send(Command::IsReady).await?;
      timeout(limit, self.wait_for(Reply::ReadyOk))
         .await
         .map_err(|_| EngineError::Timeout(limit))?
   }

   async fn send(&mut self, command: Command) -> Result<(), EngineError> {
      let line = command.to_string();
      trace!("> {}", line);
      self.writer.write_all(line.as_bytes()).await?;
      self.writer.write_all(b"\n").await?;
      self.writer.flush().await?;
      Ok(())
   }

   async fn read_reply(&mut self) -> Result<Reply, EngineError> {
      match self.lines.next().await {
         Some(line) => {
            let line = line?;
            trace!("< {}", line);
            line.parse()
         }
         None => Err(EngineError::Closed),
      }
   }

   async fn wait_for(&mut self, expected: Reply) -> Result<(), EngineError> {
      loop {
         if self.read_reply().await? == expected {
            return Ok(());
         }
      }
   }

   async fn wait_for_best_move(&mut self) -> Result<Option<MoveSpec>, EngineError> {
      loop {
         if let Reply::BestMove(best_move) = self.read_reply().await? {
            return Ok(best_move);
         }
      }
   }

   /// Starts a new game and waits for the engine to acknowledge it.
   pub async fn reset(&mut self) -> Result<(), EngineError> {
      if self.searching {
         self.stop().await?;
      }
      self.line.clear();
      self.send(Command::NewGame).await?;
      self.send(Command::IsReady).await?;
      let limit = self.config.handshake_timeout;
      timeout(limit, self.wait_for(Reply::ReadyOk))
         .await
         .map_err(|_| EngineError::Timeout(limit))?
   }

   /// Loads a position. The engine never acknowledges this, a bad position
   /// only shows up as an odd search result later.
   pub async fn set_position(&mut self, position: &BoardPosition) -> Result<(), EngineError> {
      self.send(Command::Position(position.fen().to_owned())).await
   }

   /// Runs `go mate <max_mate>` on the loaded position.
   ///
   /// Every `info` line carrying a pv replaces the cached line. When `adopt`
   /// accepts a line that also carries a mate score, the search is stopped
   /// and that line is returned without waiting for the engine to finish.
   pub async fn search_for_mate<F>(&mut self, max_mate: u32, adopt: F) -> Result<MateSearch, EngineError>
   where
      F: FnMut(&InfoLine) -> bool,
   {
      self.send(Command::GoMate(max_mate)).await?;
      self.searching = true;
      let limit = self.config.search_timeout;
      match timeout(limit, self.collect_mate_line(adopt)).await {
         Ok(result) => result,
         Err(_) => {
            warn!("mate search exceeded {:?}, stopping engine", limit);
            if let Err(e) = self.stop().await {
               warn!("engine did not stop after the timeout: {}", e);
            }
            Err(EngineError::Timeout(limit))
         }
      }
   }

   async fn collect_mate_line<F>(&mut self, mut adopt: F) -> Result<MateSearch, EngineError>
   where
      F: FnMut(&InfoLine) -> bool,
   {
      let mut mate = None;
      loop {
         match self.read_reply().await? {
            Reply::Info(info) => {
               if info.pv.is_empty() {
                  continue;
               }
               let adopted = info.mate.is_some() && adopt(&info);
               mate = info.mate;
               self.line = info.pv;
               if adopted {
                  debug!("adopting mate {:?} line before the search ends", mate);
                  self.stop().await?;
                  return Ok(MateSearch {
                     line: self.line.clone(),
                     mate,
                  });
               }
            }
            Reply::BestMove(_) => {
               self.searching = false;
               return Ok(MateSearch {
                  line: self.line.clone(),
                  mate,
               });
            }
            _ => {}
         }
      }
   }

   /// Runs `go depth <depth>` on the loaded position. `None` when the engine
   /// has no move to offer.
   pub async fn search_best_move(&mut self, depth: u32) -> Result<Option<MoveSpec>, EngineError> {
      self.send(Command::GoDepth(depth)).await?;
      self.searching = true;
      let limit = self.config.search_timeout;
      match timeout(limit, self.wait_for_best_move()).await {
         Ok(result) => {
            let best_move = result?;
            self.searching = false;
            Ok(best_move)
         }
         Err(_) => {
            warn!("depth {} search exceeded {:?}, stopping engine", depth, limit);
            if let Err(e) = self.stop().await {
               warn!("engine did not stop after the timeout: {}", e);
            }
            Err(EngineError::Timeout(limit))
         }
      }
   }

   /// Asks the engine to end the current search. If one is outstanding its
   /// trailing output is read and thrown away.
   pub async fn stop(&mut self) -> Result<(), EngineError> {
      self.send(Command::Stop).await?;
      if !self.searching {
         return Ok(());
      }
      let limit = self.config.handshake_timeout;
      let discarded = timeout(limit, self.wait_for_best_move())
         .await
         .map_err(|_| EngineError::Timeout(limit))??;
      trace!("discarded bestmove {:?} of a stopped search", discarded);
      self.searching = false;
      Ok(())
   }

   /// OS process id of a spawned engine. `None` for in-memory engines.
   pub fn process_id(&self) -> Option<u32> {
      self.child.as_ref().and_then(Child::id)
   }

   pub fn is_searching(&self) -> bool {
      self.searching
   }

   /// Line most recently reported by a mate search. Cleared by `reset`.
   pub fn last_line(&self) -> &SearchLine {
      &self.line
   }

   /// Sends `quit` and reaps the process, killing it if it lingers.
   pub async fn shutdown(mut self) -> Result<(), EngineError> {
      if self.searching {
         if let Err(e) = self.stop().await {
            debug!("stopping before quit failed: {}", e);
         }
      }
      if let Err(e) = self.send(Command::Quit).await {
         debug!("could not send quit: {}", e);
      }
      if let Some(mut child) = self.child.take() {
         match timeout(self.config.handshake_timeout, child.wait()).await {
            Ok(status) => {
               let status = status?;
               debug!("engine exited with {}", status);
            }
            Err(_) => {
               warn!("engine ignored quit, killing it");
               child.kill().await?;
            }
         }
      }
      Ok(())
   }
}
