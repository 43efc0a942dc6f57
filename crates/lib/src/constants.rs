//! Constants used throughout the livetree library.
//!
//! This module provides central definitions for reserved identifiers and the
//! tuning parameters of the position codec and the undo history.

/// Identifier of the root record of a freshly created document.
pub const ROOT_ID: &str = "root";

/// Maximum number of frames kept on the undo stack. The oldest frame is
/// dropped first.
pub const MAX_UNDO_FRAMES: usize = 50;

/// Lowest symbol of the position alphabet (the "zero" digit).
pub const POSITION_MIN_CHAR: u8 = b' ';

/// Highest symbol of the position alphabet.
pub const POSITION_MAX_CHAR: u8 = b'~';

/// Number of digits in the position alphabet.
pub const POSITION_BASE: u8 = POSITION_MAX_CHAR - POSITION_MIN_CHAR + 1;

/// Width of the first viewport used by `Position::after` and `Position::before`.
pub const VIEWPORT_START: usize = 2;

/// Amount the viewport grows by on carry-out.
pub const VIEWPORT_STEP: usize = 3;
