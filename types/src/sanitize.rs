//! Display sanitization for server-provided text.
//!
//! Error details, board names and column names all come from the remote
//! service and end up printed in a terminal. Escape sequences in them could
//! rewrite the screen or set the clipboard, so they are stripped before display.

use std::borrow::Cow;
use std::iter::Peekable;

const ESC: char = '\x1b';
const BEL: char = '\x07';

/// Strip ANSI escape sequences and control characters from `input`.
///
/// Newlines and tabs survive. Returns `Cow::Borrowed` when nothing had to be
/// removed.
///
/// ```
/// use branches_types::sanitize_display_text;
///
/// assert_eq!(sanitize_display_text("Sprint"), "Sprint");
/// assert_eq!(sanitize_display_text("Invalid\x1b[2J credentials"), "Invalid credentials");
/// ```
#[must_use]
pub fn sanitize_display_text(input: &str) -> Cow<'_, str> {
    if !input.chars().any(is_stripped) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ESC => skip_sequence(&mut chars),
            '\u{009b}' => skip_csi(&mut chars),
            c if is_stripped(c) => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    let control = c <= '\x1f' || c == '\x7f' || ('\u{0080}'..='\u{009f}').contains(&c);
    control && c != '\n' && c != '\t'
}

fn skip_sequence<I: Iterator<Item = char>>(chars: &mut Peekable<I>) {
    match chars.peek() {
        Some('[') => {
            chars.next();
            skip_csi(chars);
        }
        Some(']' | 'P' | '^' | '_') => {
            chars.next();
            skip_string(chars);
        }
        Some(_) => {
            chars.next();
        }
        None => {}
    }
}

// Parameter and intermediate bytes, then one final byte.
fn skip_csi<I: Iterator<Item = char>>(chars: &mut Peekable<I>) {
    while let Some(&c) = chars.peek() {
        chars.next();
        if ('\x40'..='\x7e').contains(&c) || !('\x20'..='\x3f').contains(&c) {
            return;
        }
    }
}

// OSC/DCS/PM/APC payloads run until BEL or ESC \.
fn skip_string<I: Iterator<Item = char>>(chars: &mut Peekable<I>) {
    while let Some(c) = chars.next() {
        if c == BEL {
            return;
        }
        if c == ESC && chars.peek() == Some(&'\\') {
            chars.next();
            return;
        }
    }
}
