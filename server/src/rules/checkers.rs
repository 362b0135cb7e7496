use super::{parse_pair, MoveError, Outcome, RuleEngine, Seat};

const SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Piece {
    seat: Seat,
    king: bool,
}

/// Draughts on an 8x8 board; moves are `row,col-row,col`.
///
/// `First` starts on rows 0-2 and moves towards higher rows, `Second` starts
/// on rows 5-7 and moves towards lower rows. A move is a single diagonal step
/// or a single jump over an opposing piece; reaching the far row crowns the
/// piece. A player with no pieces or no legal move loses.
#[derive(Debug, Clone)]
pub struct Checkers {
    grid: [[Option<Piece>; SIZE]; SIZE],
    outcome: Outcome,
}

impl Default for Checkers {
    fn default() -> Self {
        let mut engine = Self {
            grid: [[None; SIZE]; SIZE],
            outcome: Outcome::InProgress,
        };
        engine.start_new_game();
        engine
    }
}

impl Checkers {
    pub fn new() -> Self {
        Self::default()
    }

    fn forward(seat: Seat) -> isize {
        match seat {
            Seat::First => 1,
            Seat::Second => -1,
        }
    }

    fn at(&self, row: isize, col: isize) -> Option<Option<Piece>> {
        if row < 0 || col < 0 || row >= SIZE as isize || col >= SIZE as isize {
            return None;
        }
        Some(self.grid[row as usize][col as usize])
    }

    /// Checks a step or jump without applying it
    fn validate(&self, seat: Seat, from: (usize, usize), to: (usize, usize)) -> Result<Option<(usize, usize)>, MoveError> {
        if from.0 >= SIZE || from.1 >= SIZE || to.0 >= SIZE || to.1 >= SIZE {
            return Err(MoveError::OutOfBounds);
        }

        let piece = self.grid[from.0][from.1].ok_or(MoveError::Illegal("no piece on that square"))?;
        if piece.seat != seat {
            return Err(MoveError::Illegal("that piece belongs to your opponent"));
        }
        if self.grid[to.0][to.1].is_some() {
            return Err(MoveError::Occupied);
        }

        let dr = to.0 as isize - from.0 as isize;
        let dc = to.1 as isize - from.1 as isize;
        if dr.abs() != dc.abs() || !(1..=2).contains(&dr.abs()) {
            return Err(MoveError::Illegal("pieces move diagonally by one or two squares"));
        }
        if !piece.king && dr.signum() != Self::forward(seat) {
            return Err(MoveError::Illegal("only kings move backwards"));
        }

        if dr.abs() == 1 {
            return Ok(None);
        }

        let mid = (
            (from.0 as isize + dr / 2) as usize,
            (from.1 as isize + dc / 2) as usize,
        );
        match self.grid[mid.0][mid.1] {
            Some(captured) if captured.seat != seat => Ok(Some(mid)),
            _ => Err(MoveError::Illegal("a jump must capture an opposing piece")),
        }
    }

    fn has_pieces(&self, seat: Seat) -> bool {
        self.grid.iter().flatten().flatten().any(|piece| piece.seat == seat)
    }

    fn has_any_move(&self, seat: Seat) -> bool {
        for row in 0..SIZE {
            for col in 0..SIZE {
                let Some(piece) = self.grid[row][col] else {
                    continue;
                };
                if piece.seat != seat {
                    continue;
                }
                for (dr, dc) in [(1, 1), (1, -1), (-1, 1), (-1, -1)] {
                    for dist in [1, 2] {
                        let r = row as isize + dr * dist;
                        let c = col as isize + dc * dist;
                        if let Some(None) = self.at(r, c) {
                            if self.validate(seat, (row, col), (r as usize, c as usize)).is_ok() {
                                return true;
                            }
                        }
                    }
                }
            }
        }
        false
    }

    fn parse(move_data: &str) -> Result<((usize, usize), (usize, usize)), MoveError> {
        let (from, to) = move_data
            .split_once('-')
            .ok_or_else(|| MoveError::Malformed(move_data.to_string()))?;
        Ok((parse_pair(from)?, parse_pair(to)?))
    }
}

impl RuleEngine for Checkers {
    fn start_new_game(&mut self) -> Seat {
        self.grid = [[None; SIZE]; SIZE];
        for row in 0..SIZE {
            for col in 0..SIZE {
                if (row + col) % 2 == 0 {
                    continue;
                }
                let seat = match row {
                    0..=2 => Seat::First,
                    5..=7 => Seat::Second,
                    _ => continue,
                };
                self.grid[row][col] = Some(Piece { seat, king: false });
            }
        }
        self.outcome = Outcome::InProgress;
        Seat::First
    }

    fn apply_move(&mut self, seat: Seat, move_data: &str) -> Result<(), MoveError> {
        if self.outcome != Outcome::InProgress {
            return Err(MoveError::GameOver);
        }

        let (from, to) = Self::parse(move_data)?;
        let captured = self.validate(seat, from, to)?;

        let mut piece = self.grid[from.0][from.1].take().ok_or(MoveError::Illegal("no piece on that square"))?;
        if let Some((r, c)) = captured {
            self.grid[r][c] = None;
        }
        let far_row = match seat {
            Seat::First => SIZE - 1,
            Seat::Second => 0,
        };
        if to.0 == far_row {
            piece.king = true;
        }
        self.grid[to.0][to.1] = Some(piece);

        let opponent = seat.other();
        if !self.has_pieces(opponent) || !self.has_any_move(opponent) {
            self.outcome = Outcome::Won(seat);
        }
        Ok(())
    }

    fn check_winner(&self) -> Outcome {
        self.outcome
    }

    fn board(&self) -> String {
        self.grid
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        None => '.',
                        Some(Piece { seat: Seat::First, king: false }) => 'x',
                        Some(Piece { seat: Seat::First, king: true }) => 'X',
                        Some(Piece { seat: Seat::Second, king: false }) => 'o',
                        Some(Piece { seat: Seat::Second, king: true }) => 'O',
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}
