//! Shared UI icons.
//!
//! Each icon has a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("\u{2705} ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("\u{274C} ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("\u{2728} ", "*");

// File indicators
pub static FOLDER: Emoji<'_, '_> = Emoji("\u{1F4C1} ", "");
pub static PROBE: Emoji<'_, '_> = Emoji("\u{1F50E} ", "+");
pub static COPY: Emoji<'_, '_> = Emoji("\u{1F4C4} ", "=");
pub static FILE_DEL: Emoji<'_, '_> = Emoji("\u{1F5D1}\u{FE0F}  ", "-");

// Coverage indicators
pub static PROGRESS: Emoji<'_, '_> = Emoji("\u{1F4CA} ", "[COV]");
pub static WARNING: Emoji<'_, '_> = Emoji("\u{26A0}\u{FE0F}  ", "[WARN]");
