use crate::board::MoveSpec;
use crate::config::SolverLimits;
use crate::messages::{EngineMessage, InterfaceMessage};
use crate::protocol::{InfoLine, SearchLine};
use log::trace;
use rayon::prelude::*;
use shakmaty::{Chess, Color, Move, Position, Role, Square};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

const MATE_SCORE: i32 = 100_000;
const MATE_THRESHOLD: i32 = MATE_SCORE - 1_000;
// far past anything the node budget could prove
const MAX_MATE_MOVES: u32 = 400;
const MOBILITY_WEIGHT: i32 = 5;

pub fn start(
   receiver: mpsc::Receiver<InterfaceMessage>,
   sender: UnboundedSender<EngineMessage>,
   stop: Arc<AtomicBool>,
   limits: SolverLimits,
) {
   let mut state = Chess::default();
   while let Ok(message) = receiver.recv() {
      let (info, best_move) = match message {
         InterfaceMessage::SetState(new_state) => {
            state = new_state;
            continue;
         }
         InterfaceMessage::GoMate(moves) => {
            let budget = Budget::new(limits.node_limit, &stop);
            mate_search(&state, moves, &budget)
         }
         InterfaceMessage::GoDepth(depth) => {
            let depth = depth.clamp(1, limits.max_depth.max(1));
            let budget = Budget::new(limits.node_limit, &stop);
            let (eval, best_move) = search(depth, &state, &budget);
            (depth_info(depth, eval, best_move.as_ref()), best_move)
         }
      };
      let best_move = best_move.as_ref().and_then(MoveSpec::from_move);
      if sender.send(EngineMessage::Info(info)).is_err() || sender.send(EngineMessage::BestMove(best_move)).is_err() {
         break;
      }
   }
}

/// Node allowance shared by every branch of one search.
struct Budget<'a> {
   nodes: AtomicU64,
   limit: u64,
   stop: &'a AtomicBool,
}

impl<'a> Budget<'a> {
   fn new(limit: u64, stop: &'a AtomicBool) -> Budget<'a> {
      Budget {
         nodes: AtomicU64::new(0),
         limit,
         stop,
      }
   }

   /// Counts a node. False once the allowance is spent or a stop came in.
   fn tick(&self) -> bool {
      self.nodes.fetch_add(1, Ordering::Relaxed) < self.limit && !self.stop.load(Ordering::Relaxed)
   }

   fn spent(&self) -> u64 {
      self.nodes.load(Ordering::Relaxed)
   }
}

enum Proof {
   Mate(Vec<Move>),
   NoMate,
   Aborted,
}

fn to_search_line(moves: &[Move]) -> SearchLine {
   moves.iter().filter_map(MoveSpec::from_move).collect()
}

fn depth_info(depth: u32, eval: i32, best_move: Option<&Move>) -> InfoLine {
   let mut info = InfoLine {
      depth: Some(depth),
      pv: best_move.map(|m| to_search_line(std::slice::from_ref(m))).unwrap_or_default(),
      ..InfoLine::default()
   };
   if eval.abs() >= MATE_THRESHOLD {
      let plies = MATE_SCORE - eval.abs();
      let moves = (plies + 1) / 2;
      info.mate = Some(if eval > 0 { moves } else { -moves });
   } else {
      info.centipawns = Some(eval);
   }
   info
}

/// Iterative deepening over mate distances 1..=max_moves. Stops at the first
/// distance that proves a mate, so the reported line is a shortest mate.
fn mate_search(state: &Chess, max_moves: u32, budget: &Budget) -> (InfoLine, Option<Move>) {
   let search_time_start = Instant::now();
   for moves in 1..=max_moves.min(MAX_MATE_MOVES) {
      let plies = 2 * moves - 1;
      match prove_mate(state, plies, budget) {
         Proof::Mate(line) => {
            trace!(
               "mate in {} proven after {} nodes in {}s",
               moves,
               budget.spent(),
               search_time_start.elapsed().as_secs_f64()
            );
            let info = InfoLine {
               depth: Some(plies),
               mate: Some((line.len() as i32 + 1) / 2),
               centipawns: None,
               pv: to_search_line(&line),
            };
            return (info, line.into_iter().next());
         }
         Proof::NoMate => {}
         Proof::Aborted => {
            trace!("mate search aborted at mate distance {} after {} nodes", moves, budget.spent());
            break;
         }
      }
   }
   // no mate within reach, still answer with a move
   let idle = AtomicBool::new(false);
   let (eval, best_move) = search(1, state, &Budget::new(u64::MAX, &idle));
   (depth_info(1, eval, best_move.as_ref()), best_move)
}

/// Side to move tries to force mate within `plies`.
fn prove_mate(state: &Chess, plies: u32, budget: &Budget) -> Proof {
   if !budget.tick() {
      return Proof::Aborted;
   }
   let mut candidates: Vec<(Move, Chess)> = state
      .legal_moves()
      .into_iter()
      .map(|a_move| {
         let mut after = state.clone();
         after.play_unchecked(&a_move);
         (a_move, after)
      })
      .collect();
   // checks first, they are where mates are
   candidates.sort_by_key(|(_, after)| !after.is_check());

   for (a_move, after) in candidates.iter() {
      if after.is_check() && after.is_checkmate() {
         return Proof::Mate(vec![a_move.clone()]);
      }
   }
   if plies < 3 {
      return Proof::NoMate;
   }
   for (a_move, after) in candidates {
      match defend(&after, plies - 1, budget) {
         Proof::Mate(mut line) => {
            line.insert(0, a_move);
            return Proof::Mate(line);
         }
         Proof::NoMate => {}
         Proof::Aborted => return Proof::Aborted,
      }
   }
   Proof::NoMate
}

/// Side to move tries every reply; mate holds only if all of them lose.
/// The longest losing line is kept as the principal variation.
fn defend(state: &Chess, plies: u32, budget: &Budget) -> Proof {
   let replies = state.legal_moves();
   if replies.is_empty() {
      // stalemate, mates were caught by the caller
      return Proof::NoMate;
   }
   let mut longest: Option<Vec<Move>> = None;
   for reply in replies {
      let mut after = state.clone();
      after.play_unchecked(&reply);
      match prove_mate(&after, plies - 1, budget) {
         Proof::Mate(mut line) => {
            line.insert(0, reply);
            if longest.as_ref().map_or(true, |l| line.len() > l.len()) {
               longest = Some(line);
            }
         }
         refuted => return refuted,
      }
   }
   longest.map_or(Proof::NoMate, Proof::Mate)
}

fn search(depth: u32, state: &Chess, budget: &Budget) -> (i32, Option<Move>) {
   let search_time_start = Instant::now();
   let moves: Vec<Move> = state.legal_moves().into_iter().collect();
   if moves.is_empty() {
      return (if state.is_check() { -MATE_SCORE } else { 0 }, None);
   }
   let scores: Vec<_> = moves
      .into_par_iter()
      .map(|a_move| {
         let mut new_state = state.clone();
         new_state.play_unchecked(&a_move);
         let score = -nega_max(depth - 1, 1, &new_state, -MATE_SCORE - 1, MATE_SCORE + 1, budget);
         (a_move, score)
      })
      .collect();
   let mut max = i32::MIN;
   let mut best_move = None;
   for (a_move, score) in scores {
      if score > max {
         max = score;
         best_move = Some(a_move);
      }
   }
   trace!(
      "search @ depth {} took {}s over {} nodes, score {}",
      depth,
      search_time_start.elapsed().as_secs_f64(),
      budget.spent(),
      max
   );
   (max, best_move)
}

fn nega_max(depth: u32, dist_from_root: i32, state: &Chess, mut alpha: i32, beta: i32, budget: &Budget) -> i32 {
   let moves = state.legal_moves();
   if moves.is_empty() {
      return if state.is_check() { -MATE_SCORE + dist_from_root } else { 0 };
   }
   if state.halfmoves() >= 100 {
      return 0;
   }
   if depth == 0 || !budget.tick() {
      return evaluate(state);
   }
   let mut max = -MATE_SCORE;
   for a_move in moves.iter() {
      let mut new_state = state.clone();
      new_state.play_unchecked(a_move);
      let score = -nega_max(depth - 1, dist_from_root + 1, &new_state, -beta, -alpha, budget);
      if score > max {
         max = score;
      }
      if max > alpha {
         alpha = max;
      }
      if alpha >= beta {
         break;
      }
   }
   max
}

fn mat_val(role: Role) -> i32 {
   match role {
      Role::Pawn => 100,
      Role::Knight => 300,
      Role::Bishop => 300,
      Role::Rook => 500,
      Role::Queen => 900,
      Role::King => 0,
   }
}

fn file_rank(square: Square) -> (i32, i32) {
   let index = u32::from(square) as i32;
   (index % 8, index / 8)
}

fn evaluate(state: &Chess) -> i32 {
   let board = state.board();
   let mut mat_score = 0;
   for square in Square::ALL {
      if let Some(piece) = board.piece_at(square) {
         let value = mat_val(piece.role);
         mat_score += if piece.color == Color::White { value } else { -value };
      }
   }

   let mut mobility_score = 0;
   for color in [Color::White, Color::Black] {
      let own = board.by_color(color);
      let mut reach = 0;
      for square in own & !board.kings() {
         reach += (board.attacks_from(square) & !own).count() as i32;
      }
      mobility_score += if color == Color::White { reach } else { -reach };
   }

   // mop-up: the side ahead wants the other king on the rim and its own king close
   let mut mop_up_score = 0;
   if mat_score != 0 {
      let strong = if mat_score > 0 { Color::White } else { Color::Black };
      if let (Some(strong_king), Some(weak_king)) = (board.king_of(strong), board.king_of(!strong)) {
         let (wf, wr) = file_rank(weak_king);
         let (sf, sr) = file_rank(strong_king);
         let center_dist = (3 - wf).max(wf - 4) + (3 - wr).max(wr - 4);
         let king_dist = (wf - sf).abs() + (wr - sr).abs();
         let bonus = 10 * center_dist + 4 * (14 - king_dist);
         mop_up_score = if strong == Color::White { bonus } else { -bonus };
      }
   }

   let final_score = mat_score + MOBILITY_WEIGHT * mobility_score + mop_up_score;
   if state.turn() == Color::White {
      final_score
   } else {
      -final_score
   }
}
