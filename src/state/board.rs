//! Bingo board generation and cell mutation helpers.

use std::time::SystemTime;

use indexmap::IndexSet;
use rand::{Rng, seq::SliceRandom};
use thiserror::Error;
use uuid::Uuid;

/// Smallest supported board edge length.
pub const MIN_BOARD_SIZE: usize = 3;
/// Largest supported board edge length.
pub const MAX_BOARD_SIZE: usize = 6;

/// A single square of a bingo board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardCell {
    /// Stable identifier of the cell, unique within a board.
    pub cell_id: String,
    /// Prompt displayed on the cell.
    pub text: String,
    /// Colors of the players who marked this cell.
    pub colors: Vec<String>,
    /// Identifiers of the players who marked this cell.
    pub completed_by: Vec<String>,
    /// Blocked cells can neither be marked nor count towards a line.
    pub blocked: bool,
    /// Whether at least one player marked the cell.
    pub is_marked: bool,
}

impl BoardCell {
    fn fresh(text: String) -> Self {
        Self {
            cell_id: Uuid::new_v4().simple().to_string(),
            text,
            colors: Vec::new(),
            completed_by: Vec::new(),
            blocked: false,
            is_marked: false,
        }
    }
}

/// Board contents together with the optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    /// Row-major cells, `board_size²` long.
    pub cells: Vec<BoardCell>,
    /// Incremented by exactly one on every accepted write.
    pub version: u64,
    /// Time of the last accepted write (or of generation).
    pub last_update: SystemTime,
}

impl GameState {
    /// Wrap freshly generated cells at version 0.
    pub fn initial(cells: Vec<BoardCell>) -> Self {
        Self {
            cells,
            version: 0,
            last_update: SystemTime::now(),
        }
    }
}

/// Partial update targeting one cell; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellUpdate {
    /// Row-major index of the cell.
    pub index: usize,
    /// Replacement prompt.
    pub text: Option<String>,
    /// Replacement list of marking colors.
    pub colors: Option<Vec<String>>,
    /// Replacement list of marking players.
    pub completed_by: Option<Vec<String>>,
    /// Replacement blocked flag.
    pub blocked: Option<bool>,
    /// Replacement marked flag.
    pub is_marked: Option<bool>,
}

/// Failures raised by board generation and cell mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Requested edge length is outside `MIN_BOARD_SIZE..=MAX_BOARD_SIZE`.
    #[error("board size {0} is not supported (expected 3 to 6)")]
    UnsupportedSize(usize),
    /// The card pool cannot fill every cell.
    #[error("card pool has {available} usable entries but the board needs {required}")]
    NotEnoughCards {
        /// Distinct non-blank entries in the pool.
        available: usize,
        /// Number of cells on the board.
        required: usize,
    },
    /// A cell index points past the end of the board.
    #[error("cell index {index} is out of bounds for a board of {len} cells")]
    IndexOutOfBounds {
        /// Offending index.
        index: usize,
        /// Number of cells on the board.
        len: usize,
    },
    /// The cell array does not match the declared board size.
    #[error("board holds {actual} cells but a size {size} board needs {expected}")]
    SizeMismatch {
        /// Declared edge length.
        size: usize,
        /// `size²`.
        expected: usize,
        /// Actual number of cells.
        actual: usize,
    },
    /// Marking was attempted on a blocked cell.
    #[error("cell {0} is blocked")]
    Blocked(usize),
}

/// Validate a board edge length.
pub fn ensure_supported_size(size: usize) -> Result<(), BoardError> {
    if (MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(BoardError::UnsupportedSize(size))
    }
}

/// Check that `cells` is a complete `size × size` board.
pub fn ensure_board_shape(cells: &[BoardCell], size: usize) -> Result<(), BoardError> {
    let expected = size * size;
    if cells.len() != expected {
        return Err(BoardError::SizeMismatch {
            size,
            expected,
            actual: cells.len(),
        });
    }
    Ok(())
}

/// Generate a fresh board using the thread-local RNG.
pub fn generate_board(size: usize, card_pool: &[String]) -> Result<Vec<BoardCell>, BoardError> {
    generate_board_with_rng(size, card_pool, &mut rand::rng())
}

/// Generate a fresh board of `size²` unmarked cells.
///
/// With a non-empty card pool the prompts are drawn without replacement from
/// its distinct, non-blank entries. Without one, cells are labelled
/// `Cell 1..=size²` in shuffled order.
pub fn generate_board_with_rng<R: Rng + ?Sized>(
    size: usize,
    card_pool: &[String],
    rng: &mut R,
) -> Result<Vec<BoardCell>, BoardError> {
    ensure_supported_size(size)?;
    let required = size * size;

    let usable = card_pool
        .iter()
        .map(|card| card.trim())
        .filter(|card| !card.is_empty())
        .collect::<IndexSet<_>>();

    let mut texts = if usable.is_empty() {
        (1..=required)
            .map(|n| format!("Cell {n}"))
            .collect::<Vec<_>>()
    } else if usable.len() < required {
        return Err(BoardError::NotEnoughCards {
            available: usable.len(),
            required,
        });
    } else {
        usable.into_iter().map(str::to_owned).collect::<Vec<_>>()
    };

    texts.shuffle(rng);
    texts.truncate(required);

    Ok(texts.into_iter().map(BoardCell::fresh).collect())
}

/// Apply a batch of partial updates. Every index is checked before any cell
/// is touched so a bad batch leaves the board unchanged.
pub fn apply_updates(cells: &mut [BoardCell], updates: &[CellUpdate]) -> Result<(), BoardError> {
    let len = cells.len();
    if let Some(update) = updates.iter().find(|update| update.index >= len) {
        return Err(BoardError::IndexOutOfBounds {
            index: update.index,
            len,
        });
    }

    for update in updates {
        let cell = &mut cells[update.index];
        if let Some(text) = &update.text {
            cell.text = text.clone();
        }
        if let Some(colors) = &update.colors {
            cell.colors = colors.clone();
        }
        if let Some(completed_by) = &update.completed_by {
            cell.completed_by = completed_by.clone();
        }
        if let Some(blocked) = update.blocked {
            cell.blocked = blocked;
        }
        if let Some(is_marked) = update.is_marked {
            cell.is_marked = is_marked;
        }
    }

    Ok(())
}

/// Build the update that toggles `user_id`'s mark on the cell at `index`.
///
/// Returns the update and whether the player ends up marking the cell.
pub fn toggle_mark(
    cells: &[BoardCell],
    index: usize,
    user_id: &str,
    color: &str,
) -> Result<(CellUpdate, bool), BoardError> {
    let cell = cells.get(index).ok_or(BoardError::IndexOutOfBounds {
        index,
        len: cells.len(),
    })?;
    if cell.blocked {
        return Err(BoardError::Blocked(index));
    }

    let mut completed_by = cell.completed_by.clone();
    let mut colors = cell.colors.clone();
    let marked = if let Some(pos) = completed_by.iter().position(|id| id == user_id) {
        completed_by.remove(pos);
        colors.retain(|c| c != color);
        false
    } else {
        completed_by.push(user_id.to_owned());
        if !colors.iter().any(|c| c == color) {
            colors.push(color.to_owned());
        }
        true
    };

    let update = CellUpdate {
        index,
        is_marked: Some(!completed_by.is_empty()),
        colors: Some(colors),
        completed_by: Some(completed_by),
        ..CellUpdate::default()
    };
    Ok((update, marked))
}
