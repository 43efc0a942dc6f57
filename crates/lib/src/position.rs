//! Fractional order keys for list children.
//!
//! A [`Position`] is a string over the 95 printable ASCII symbols (`' '` to
//! `'~'`). Read as base-95 digits after a radix point it denotes a rational
//! number in the open interval (0, 1), and byte-wise string comparison matches
//! numeric comparison. Positions never end with the zero symbol `' '`, so every
//! number has exactly one spelling.
//!
//! New positions are always derived from existing ones:
//!
//! ```
//! use livetree::position::Position;
//!
//! let first = Position::first();
//! let second = first.after();
//! let middle = first.between(&second);
//! assert!(first < middle && middle < second);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    POSITION_BASE, POSITION_MAX_CHAR, POSITION_MIN_CHAR, VIEWPORT_START, VIEWPORT_STEP,
};

const MAX_DIGIT: u8 = POSITION_BASE - 1;

/// An order key placing one child inside a list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Position(String);

impl Position {
    /// The canonical first position, `"!"` (the digit one).
    pub fn first() -> Self {
        Position(char::from(POSITION_MIN_CHAR + 1).to_string())
    }

    /// Turns an arbitrary string into a valid position.
    ///
    /// Characters outside the alphabet are clamped to its bounds and trailing
    /// zero symbols are stripped. An empty (or all-zero) input becomes
    /// [`Position::first`]. Normalizing a valid position returns it unchanged.
    pub fn normalize(raw: &str) -> Self {
        let mut digits: Vec<u8> = raw
            .chars()
            .map(|c| {
                let code = u32::from(c);
                if code < u32::from(POSITION_MIN_CHAR) {
                    0
                } else if code > u32::from(POSITION_MAX_CHAR) {
                    MAX_DIGIT
                } else {
                    (code as u8) - POSITION_MIN_CHAR
                }
            })
            .collect();
        trim_zeros(&mut digits);
        if digits.is_empty() {
            return Self::first();
        }
        Self::from_digits(&digits)
    }

    /// Whether `raw` is already a valid position.
    pub fn is_valid(raw: &str) -> bool {
        !raw.is_empty()
            && raw
                .bytes()
                .all(|b| (POSITION_MIN_CHAR..=POSITION_MAX_CHAR).contains(&b))
            && !raw.ends_with(char::from(POSITION_MIN_CHAR))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The smallest position of the current viewport width that is greater
    /// than `self`.
    ///
    /// The digits are read as a fixed-width number (width 2, then 5, 8, ...),
    /// incremented with carry, and the viewport is widened on carry-out. This
    /// keeps positions short under repeated appends.
    pub fn after(&self) -> Self {
        let digits = self.digits();
        let mut width = viewport_for(digits.len());
        loop {
            if let Some(next) = increment(&digits, width) {
                return Self::from_digits(&next);
            }
            width += VIEWPORT_STEP;
        }
    }

    /// The largest position of the current viewport width that is less than
    /// `self`. Mirror image of [`Position::after`].
    pub fn before(&self) -> Self {
        let digits = self.digits();
        let mut width = viewport_for(digits.len());
        loop {
            if let Some(prev) = decrement(&digits, width) {
                return Self::from_digits(&prev);
            }
            width += VIEWPORT_STEP;
        }
    }

    /// A short position strictly between `self` and `other`, in either order.
    ///
    /// Both arguments must differ. Equal arguments are an invariant violation:
    /// debug builds panic, release builds fall back to `self.after()`.
    pub fn between(&self, other: &Position) -> Self {
        let (lo, hi) = match self.cmp(other) {
            std::cmp::Ordering::Less => (self, other),
            std::cmp::Ordering::Greater => (other, self),
            std::cmp::Ordering::Equal => {
                debug_assert!(false, "cannot compute a position between two equal positions");
                tracing::error!(position = %self, "between called with equal positions");
                return self.after();
            }
        };
        Self::from_digits(&between_digits(&lo.digits(), Some(&hi.digits())))
    }

    /// Picks a position for a new child given its neighbours.
    ///
    /// With both neighbours the result lies between them, with one it lies
    /// just past it, and with none it is [`Position::first`].
    pub fn make(before: Option<&Position>, after: Option<&Position>) -> Self {
        match (before, after) {
            (Some(lo), Some(hi)) => lo.between(hi),
            (Some(lo), None) => lo.after(),
            (None, Some(hi)) => hi.before(),
            (None, None) => Self::first(),
        }
    }

    fn digits(&self) -> Vec<u8> {
        self.0.bytes().map(|b| b - POSITION_MIN_CHAR).collect()
    }

    fn from_digits(digits: &[u8]) -> Self {
        Position(
            digits
                .iter()
                .map(|d| char::from(d + POSITION_MIN_CHAR))
                .collect(),
        )
    }
}

fn trim_zeros(digits: &mut Vec<u8>) {
    while digits.last() == Some(&0) {
        digits.pop();
    }
}

fn viewport_for(len: usize) -> usize {
    if len <= VIEWPORT_START {
        VIEWPORT_START
    } else {
        VIEWPORT_START + (len - VIEWPORT_START).div_ceil(VIEWPORT_STEP) * VIEWPORT_STEP
    }
}

fn padded(digits: &[u8], width: usize) -> Vec<u8> {
    (0..width)
        .map(|i| digits.get(i).copied().unwrap_or(0))
        .collect()
}

/// Adds one unit in the last place of a `width`-digit number. `None` on carry-out.
fn increment(digits: &[u8], width: usize) -> Option<Vec<u8>> {
    let mut out = padded(digits, width);
    for digit in out.iter_mut().rev() {
        if *digit < MAX_DIGIT {
            *digit += 1;
            trim_zeros(&mut out);
            return Some(out);
        }
        *digit = 0;
    }
    None
}

/// Subtracts one unit in the last place. `None` when the result would be zero.
fn decrement(digits: &[u8], width: usize) -> Option<Vec<u8>> {
    let mut out = padded(digits, width);
    let mut borrowed = true;
    for digit in out.iter_mut().rev() {
        if *digit > 0 {
            *digit -= 1;
            borrowed = false;
            break;
        }
        *digit = MAX_DIGIT;
    }
    trim_zeros(&mut out);
    if borrowed || out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Digits strictly between `lo` and `hi`, where `hi == None` stands for an
/// upper bound made of max digits only.
fn between_digits(lo: &[u8], hi: Option<&[u8]>) -> Vec<u8> {
    let mut index = 0;
    loop {
        let lo_digit = lo.get(index).copied().unwrap_or(0);
        let hi_digit = match hi {
            Some(hi) => hi.get(index).copied().unwrap_or(0),
            None => MAX_DIGIT,
        };
        if lo_digit == hi_digit {
            index += 1;
            continue;
        }
        if hi_digit - lo_digit > 1 {
            let mut out = padded(lo, index);
            out.push(lo_digit + (hi_digit - lo_digit) / 2);
            return out;
        }
        let mut out = padded(lo, index + 1);
        let tail = lo.get(index + 1..).unwrap_or(&[]);
        out.extend(between_digits(tail, None));
        return out;
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Position {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Position {
    fn from(raw: String) -> Self {
        if Self::is_valid(&raw) {
            Position(raw)
        } else {
            Self::normalize(&raw)
        }
    }
}

impl From<&str> for Position {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl From<Position> for String {
    fn from(position: Position) -> Self {
        position.0
    }
}
