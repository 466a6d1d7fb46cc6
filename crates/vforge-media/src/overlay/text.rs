//! Text preparation for overlays: wrapping, truncation, escaping and emoji.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Lines kept before truncating with an ellipsis.
pub const MAX_LINES: usize = 5;

/// Appended to the last kept line when text is truncated.
pub const ELLIPSIS: char = '…';

static SHORTCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([a-z0-9_+\-]+):").expect("static regex"));

/// Characters that fit on one line, estimated at 0.6 × font size per glyph.
pub fn char_budget(text_width: u32, font_size: u32) -> usize {
    if font_size == 0 {
        return 1;
    }
    ((text_width as f64 / (font_size as f64 * 0.6)).floor() as usize).max(1)
}

/// Greedy word wrap on `char` counts.
///
/// Words are separated by any whitespace and rejoined with single spaces. A
/// word longer than `budget` on its own is split into `budget`-sized pieces.
pub fn wrap_text(text: &str, budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let joined_len = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };

        if joined_len <= budget {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = joined_len;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }

        if word_len <= budget {
            current.push_str(word);
            current_len = word_len;
            continue;
        }

        let chars: Vec<char> = word.chars().collect();
        let mut pieces = chars.chunks(budget).peekable();
        while let Some(piece) = pieces.next() {
            let piece_text: String = piece.iter().collect();
            if pieces.peek().is_some() {
                lines.push(piece_text);
            } else {
                current_len = piece.len();
                current = piece_text;
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Keep at most `max_lines`, marking the last kept line when anything was cut.
pub fn enforce_line_limit(mut lines: Vec<String>, max_lines: usize) -> Vec<String> {
    if max_lines == 0 || lines.len() <= max_lines {
        return lines;
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        last.push(ELLIPSIS);
    }
    lines
}

/// Escape text for embedding in XML character data or attribute values.
pub fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Replace known `:shortcode:` markers with their emoji; unknown ones stay as typed.
pub fn expand_emoji(text: &str) -> Cow<'_, str> {
    SHORTCODE.replace_all(text, |caps: &Captures| {
        match emojis::get_by_shortcode(&caps[1]) {
            Some(emoji) => emoji.as_str().to_string(),
            None => caps[0].to_string(),
        }
    })
}

/// Emoji expansion followed by escaping, ready for the vector description.
pub fn render_line(raw: &str) -> String {
    escape_markup(&expand_emoji(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_budget() {
        // 1080 wide panel: margin 86, text width 908, font 48
        assert_eq!(char_budget(908, 48), 31);
        assert_eq!(char_budget(10, 0), 1);
        assert_eq!(char_budget(1, 100), 1);
    }

    #[test]
    fn test_wrap_reconstructs_normalized_text() {
        let text = "  The quick   brown fox jumps over\tthe lazy dog and keeps on running  ";
        let lines = wrap_text(text, 12);

        let normalized: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(lines.join(" "), normalized.join(" "));
        for line in &lines {
            assert!(line.chars().count() <= 12, "line too long: {line:?}");
        }
    }

    #[test]
    fn test_wrap_splits_long_word_repeatedly() {
        let lines = wrap_text("go abcdefghijklmnopqrstuvwxyz ok", 10);
        assert_eq!(lines, ["go", "abcdefghij", "klmnopqrst", "uvwxyz ok"]);
    }

    #[test]
    fn test_wrap_counts_chars_not_bytes() {
        let lines = wrap_text("héllo wörld", 11);
        assert_eq!(lines, ["héllo wörld"]);
    }

    #[test]
    fn test_wrap_empty() {
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn test_line_limit_appends_ellipsis() {
        let lines: Vec<String> = (1..=7).map(|i| format!("line {i}")).collect();
        let limited = enforce_line_limit(lines, MAX_LINES);
        assert_eq!(limited.len(), 5);
        assert_eq!(limited[4], "line 5…");

        let short = enforce_line_limit(vec!["a".to_string()], MAX_LINES);
        assert_eq!(short, ["a"]);
    }

    #[test]
    fn test_escape_markup() {
        assert_eq!(
            escape_markup(r#"Tom & "Jerry" <it's>"#),
            "Tom &amp; &quot;Jerry&quot; &lt;it&apos;s&gt;"
        );
    }

    #[test]
    fn test_expand_emoji() {
        assert_eq!(expand_emoji("on :fire: today"), "on 🔥 today");
        assert_eq!(expand_emoji("ratio 16:9 is fine"), "ratio 16:9 is fine");
        assert_eq!(expand_emoji(":not_a_real_code_xyz:"), ":not_a_real_code_xyz:");
    }
}
