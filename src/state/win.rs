//! Win-condition evaluation over a flat board.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::board::{BoardCell, BoardError, ensure_board_shape};

/// Winner index reported when the rules end in a tie.
pub const TIE_WINNER: i32 = -1;

/// Rules enabled for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WinConditions {
    /// A full row, column or diagonal of one color wins.
    pub line: bool,
    /// Holding more than half of the board wins.
    pub majority: bool,
}

impl Default for WinConditions {
    fn default() -> Self {
        Self {
            line: true,
            majority: false,
        }
    }
}

/// Rule that decided a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WinRule {
    /// A completed line.
    Line,
    /// Board majority.
    Majority,
}

/// Result of evaluating a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinOutcome {
    /// Nobody has won yet.
    Pending,
    /// A single player won.
    Winner {
        /// Index of the winner in the session's player list.
        player: usize,
        /// Color that won.
        color: String,
        /// Rule that decided the game.
        rule: WinRule,
        /// Cell indices of the completed line, for line wins.
        line: Option<Vec<usize>>,
    },
    /// The enabled rules point at different players, or the board ended even.
    Tie,
}

impl WinOutcome {
    /// Whether a single player has won.
    pub fn has_winner(&self) -> bool {
        matches!(self, WinOutcome::Winner { .. })
    }

    /// Whether the game is over, with or without a winner.
    pub fn is_decided(&self) -> bool {
        !matches!(self, WinOutcome::Pending)
    }

    /// Winning player index, [`TIE_WINNER`] for a tie, `None` while pending.
    pub fn winner_index(&self) -> Option<i32> {
        match self {
            WinOutcome::Pending => None,
            WinOutcome::Winner { player, .. } => Some(*player as i32),
            WinOutcome::Tie => Some(TIE_WINNER),
        }
    }
}

/// Per-rule verdict before the rules are combined.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RuleVerdict {
    Undecided,
    Won {
        color: String,
        line: Option<Vec<usize>>,
    },
    Contested,
}

/// Every row, column and both diagonals of a `size × size` board.
pub fn winning_lines(size: usize) -> Vec<Vec<usize>> {
    let mut lines = Vec::with_capacity(size * 2 + 2);
    for row in 0..size {
        lines.push((0..size).map(|col| row * size + col).collect());
    }
    for col in 0..size {
        lines.push((0..size).map(|row| row * size + col).collect());
    }
    lines.push((0..size).map(|i| i * size + i).collect());
    lines.push((0..size).map(|i| i * size + (size - 1 - i)).collect());
    lines
}

/// Evaluate the enabled rules against `cells`.
///
/// `player_colors` lists the session players in join order; a color that no
/// player holds never wins.
pub fn check_winning_condition(
    cells: &[BoardCell],
    size: usize,
    conditions: WinConditions,
    player_colors: &[String],
) -> Result<WinOutcome, BoardError> {
    ensure_board_shape(cells, size)?;

    let line = if conditions.line {
        line_verdict(cells, size, player_colors)
    } else {
        RuleVerdict::Undecided
    };
    let majority = if conditions.majority {
        majority_verdict(cells, player_colors)
    } else {
        RuleVerdict::Undecided
    };

    let outcome = match (line, majority) {
        (RuleVerdict::Contested, _) | (_, RuleVerdict::Contested) => WinOutcome::Tie,
        (RuleVerdict::Won { color: a, line }, RuleVerdict::Won { color: b, .. }) => {
            if a == b {
                winner(player_colors, a, WinRule::Line, line)
            } else {
                WinOutcome::Tie
            }
        }
        (RuleVerdict::Won { color, line }, RuleVerdict::Undecided) => {
            winner(player_colors, color, WinRule::Line, line)
        }
        (RuleVerdict::Undecided, RuleVerdict::Won { color, .. }) => {
            winner(player_colors, color, WinRule::Majority, None)
        }
        (RuleVerdict::Undecided, RuleVerdict::Undecided) => WinOutcome::Pending,
    };

    Ok(outcome)
}

fn winner(
    player_colors: &[String],
    color: String,
    rule: WinRule,
    line: Option<Vec<usize>>,
) -> WinOutcome {
    match player_colors.iter().position(|c| *c == color) {
        Some(player) => WinOutcome::Winner {
            player,
            color,
            rule,
            line,
        },
        None => WinOutcome::Pending,
    }
}

fn line_verdict(cells: &[BoardCell], size: usize, player_colors: &[String]) -> RuleVerdict {
    let mut found: Option<(String, Vec<usize>)> = None;

    for line in winning_lines(size) {
        let mut candidates = player_colors
            .iter()
            .filter(|color| {
                line.iter().all(|&index| {
                    let cell = &cells[index];
                    cell.is_marked && !cell.blocked && cell.colors.iter().any(|c| c == *color)
                })
            })
            .collect::<Vec<_>>();

        match candidates.len() {
            0 => continue,
            1 => {
                let color = candidates.remove(0);
                if let Some((existing, _)) = &found {
                    if existing != color {
                        return RuleVerdict::Contested;
                    }
                } else {
                    found = Some((color.clone(), line));
                }
            }
            _ => return RuleVerdict::Contested,
        }
    }

    match found {
        Some((color, line)) => RuleVerdict::Won {
            color,
            line: Some(line),
        },
        None => RuleVerdict::Undecided,
    }
}

fn majority_verdict(cells: &[BoardCell], player_colors: &[String]) -> RuleVerdict {
    let total = cells.len();
    let mut tally: HashMap<&str, usize> = HashMap::new();
    for cell in cells.iter().filter(|cell| cell.is_marked && !cell.blocked) {
        for color in &cell.colors {
            if player_colors.iter().any(|c| c == color) {
                *tally.entry(color.as_str()).or_default() += 1;
            }
        }
    }

    let over_half = tally
        .iter()
        .filter(|(_, count)| **count * 2 > total)
        .map(|(color, _)| *color)
        .collect::<Vec<_>>();
    match over_half.as_slice() {
        [color] => {
            return RuleVerdict::Won {
                color: (*color).to_owned(),
                line: None,
            };
        }
        [] => {}
        _ => return RuleVerdict::Contested,
    }

    let board_full = cells
        .iter()
        .filter(|cell| !cell.blocked)
        .all(|cell| cell.is_marked);
    if !board_full {
        return RuleVerdict::Undecided;
    }

    let best = tally.values().copied().max().unwrap_or(0);
    let leaders = tally
        .iter()
        .filter(|(_, count)| **count == best)
        .map(|(color, _)| *color)
        .collect::<Vec<_>>();
    match leaders.as_slice() {
        [color] if best > 0 => RuleVerdict::Won {
            color: (*color).to_owned(),
            line: None,
        },
        _ => RuleVerdict::Contested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::board::generate_board;

    fn colors() -> Vec<String> {
        vec!["blue".to_string(), "red".to_string()]
    }

    fn paint(cells: &mut [BoardCell], indices: &[usize], color: &str, user: &str) {
        for &index in indices {
            let cell = &mut cells[index];
            cell.is_marked = true;
            cell.colors.push(color.to_string());
            cell.completed_by.push(user.to_string());
        }
    }

    const LINE_ONLY: WinConditions = WinConditions {
        line: true,
        majority: false,
    };
    const BOTH: WinConditions = WinConditions {
        line: true,
        majority: true,
    };

    #[test]
    fn top_row_of_blue_wins_for_blue_player() {
        let mut cells = generate_board(3, &[]).unwrap();
        paint(&mut cells, &[0, 1, 2], "blue", "alice");

        let outcome = check_winning_condition(&cells, 3, BOTH, &colors()).unwrap();
        assert!(outcome.has_winner());
        assert_eq!(outcome.winner_index(), Some(0));
        assert_eq!(
            outcome,
            WinOutcome::Winner {
                player: 0,
                color: "blue".into(),
                rule: WinRule::Line,
                line: Some(vec![0, 1, 2]),
            }
        );
    }

    #[test]
    fn column_and_diagonals_win() {
        for size in 3..=6 {
            for line in [
                (0..size).map(|r| r * size + 1).collect::<Vec<_>>(),
                (0..size).map(|i| i * size + i).collect(),
                (0..size).map(|i| i * size + (size - 1 - i)).collect(),
            ] {
                let mut cells = generate_board(size, &[]).unwrap();
                paint(&mut cells, &line, "red", "bob");
                let outcome = check_winning_condition(&cells, size, LINE_ONLY, &colors()).unwrap();
                assert_eq!(outcome.winner_index(), Some(1), "size {size} line {line:?}");
            }
        }
    }

    #[test]
    fn incomplete_line_is_pending() {
        let mut cells = generate_board(4, &[]).unwrap();
        paint(&mut cells, &[0, 1, 2], "blue", "alice");
        let outcome = check_winning_condition(&cells, 4, LINE_ONLY, &colors()).unwrap();
        assert_eq!(outcome, WinOutcome::Pending);
        assert_eq!(outcome.winner_index(), None);
    }

    #[test]
    fn blocked_cell_breaks_a_line() {
        let mut cells = generate_board(3, &[]).unwrap();
        paint(&mut cells, &[0, 1, 2], "blue", "alice");
        cells[1].blocked = true;
        let outcome = check_winning_condition(&cells, 3, LINE_ONLY, &colors()).unwrap();
        assert_eq!(outcome, WinOutcome::Pending);
    }

    #[test]
    fn two_colors_completing_lines_is_a_tie() {
        let mut cells = generate_board(3, &[]).unwrap();
        paint(&mut cells, &[0, 1, 2], "blue", "alice");
        paint(&mut cells, &[6, 7, 8], "red", "bob");
        let outcome = check_winning_condition(&cells, 3, LINE_ONLY, &colors()).unwrap();
        assert_eq!(outcome, WinOutcome::Tie);
        assert_eq!(outcome.winner_index(), Some(TIE_WINNER));
    }

    #[test]
    fn majority_over_half_wins() {
        let mut cells = generate_board(3, &[]).unwrap();
        paint(&mut cells, &[0, 1, 3, 5, 7], "red", "bob");
        let conditions = WinConditions {
            line: false,
            majority: true,
        };
        let outcome = check_winning_condition(&cells, 3, conditions, &colors()).unwrap();
        assert_eq!(
            outcome,
            WinOutcome::Winner {
                player: 1,
                color: "red".into(),
                rule: WinRule::Majority,
                line: None,
            }
        );
    }

    #[test]
    fn perfectly_split_board_under_both_rules_is_a_tie() {
        // Checkerboard: no row or column is uniform, both colors hold 8 cells.
        let mut cells = generate_board(4, &[]).unwrap();
        let (even, odd): (Vec<usize>, Vec<usize>) =
            (0..16).partition(|i| (i / 4 + i % 4) % 2 == 0);
        paint(&mut cells, &even, "blue", "alice");
        paint(&mut cells, &odd, "red", "bob");

        let outcome = check_winning_condition(&cells, 4, BOTH, &colors()).unwrap();
        assert!(!outcome.has_winner());
        assert_eq!(outcome.winner_index(), Some(TIE_WINNER));
    }

    #[test]
    fn line_and_majority_for_different_players_is_a_tie() {
        let mut cells = generate_board(4, &[]).unwrap();
        paint(&mut cells, &[0, 1, 2, 3], "blue", "alice");
        // Nine red cells without a full red row, column or diagonal.
        paint(&mut cells, &[5, 6, 7, 8, 10, 11, 12, 13, 15], "red", "bob");
        let outcome = check_winning_condition(&cells, 4, BOTH, &colors()).unwrap();
        assert_eq!(outcome, WinOutcome::Tie);
    }

    #[test]
    fn unknown_color_never_wins() {
        let mut cells = generate_board(3, &[]).unwrap();
        paint(&mut cells, &[0, 1, 2], "green", "ghost");
        let outcome = check_winning_condition(&cells, 3, LINE_ONLY, &colors()).unwrap();
        assert_eq!(outcome, WinOutcome::Pending);
    }

    #[test]
    fn wrong_cell_count_is_rejected() {
        let cells = generate_board(3, &[]).unwrap();
        assert!(matches!(
            check_winning_condition(&cells, 4, LINE_ONLY, &colors()),
            Err(BoardError::SizeMismatch { .. })
        ));
    }
}
