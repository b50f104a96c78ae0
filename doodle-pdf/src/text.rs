//! Text measurement, fitting and WinAnsi encoding for the standard fonts
//!
//! Pages only use the two built-in Helvetica faces, so:
//! - widths come from an average glyph width per face
//! - strings are encoded as WinAnsi (Windows-1252); unmappable characters become `?`
//! - text that does not fit is shrunk first, then truncated with an ellipsis

/// Line height as a multiple of font size
pub const LEADING: f32 = 1.3;

const ELLIPSIS: char = '…';

/// Built-in Type1 faces available on every page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    pub const ALL: [Font; 2] = [Font::Regular, Font::Bold];

    /// Name under the page's /Font resources
    pub fn resource_name(&self) -> &'static str {
        match self {
            Self::Regular => "F1",
            Self::Bold => "F2",
        }
    }

    pub fn base_font(&self) -> &'static str {
        match self {
            Self::Regular => "Helvetica",
            Self::Bold => "Helvetica-Bold",
        }
    }

    /// Average advance width in em
    fn em_width(&self) -> f32 {
        match self {
            Self::Regular => 0.55,
            Self::Bold => 0.62,
        }
    }
}

/// Replace anything WinAnsi cannot represent with `?`
pub fn sanitize(s: &str) -> String {
    let mut buf = [0u8; 4];
    s.chars()
        .map(|c| {
            if c.is_control() {
                return ' ';
            }
            let (_, _, had_errors) = encoding_rs::WINDOWS_1252.encode(c.encode_utf8(&mut buf));
            if had_errors { '?' } else { c }
        })
        .collect()
}

/// Encode for a PDF string operand under /WinAnsiEncoding
pub fn encode_win_ansi(s: &str) -> Vec<u8> {
    let clean = sanitize(s);
    let (cow, _, _) = encoding_rs::WINDOWS_1252.encode(&clean);
    cow.into_owned()
}

/// Estimated rendered width in points
pub fn text_width(s: &str, font: Font, size: f32) -> f32 {
    s.chars().count() as f32 * font.em_width() * size
}

/// Largest size in `min_size..=max_size` (1pt steps) at which `text` fits on one line.
/// Returns `min_size` when nothing fits.
pub fn fit_font_size(text: &str, font: Font, max_width: f32, max_size: f32, min_size: f32) -> f32 {
    let mut size = max_size;
    while size > min_size {
        if text_width(text, font, size) <= max_width {
            return size;
        }
        size -= 1.0;
    }
    min_size
}

/// Cut `text` so it fits `max_width`, ending in an ellipsis when shortened.
pub fn truncate_to_width(text: &str, font: Font, size: f32, max_width: f32) -> String {
    if text_width(text, font, size) <= max_width {
        return text.to_string();
    }
    let budget = (max_width / (font.em_width() * size)).floor() as usize;
    if budget == 0 {
        return String::new();
    }
    let kept: String = text.chars().take(budget - 1).collect();
    format!("{}{ELLIPSIS}", kept.trim_end())
}

/// Single line shrunk to fit, truncated if even `min_size` is too wide
#[derive(Debug, Clone, PartialEq)]
pub struct FittedLine {
    pub text: String,
    pub size: f32,
}

pub fn fit_line(text: &str, font: Font, max_width: f32, max_size: f32, min_size: f32) -> FittedLine {
    let text = sanitize(text.trim());
    let size = fit_font_size(&text, font, max_width, max_size, min_size);
    FittedLine {
        text: truncate_to_width(&text, font, size, max_width),
        size,
    }
}

/// Greedy word wrap. Words wider than the line are hard-broken.
pub fn wrap_lines(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let per_line = ((max_width / (font.em_width() * size)).floor() as usize).max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > per_line {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                lines.push(word.drain(..per_line).collect());
            }
            let word: String = word.into_iter().collect();
            if word.is_empty() {
                continue;
            }
            let candidate_len = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if candidate_len > per_line && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// Wrapped paragraph that fits a box
#[derive(Debug, Clone, PartialEq)]
pub struct FittedBlock {
    pub lines: Vec<String>,
    pub size: f32,
}

impl FittedBlock {
    pub fn line_height(&self) -> f32 {
        self.size * LEADING
    }

    pub fn height(&self) -> f32 {
        self.lines.len() as f32 * self.line_height()
    }
}

/// Shrink until the wrapped text fits `width`×`height`; at `min_size`
/// drop overflowing lines and ellipsize the last one kept.
pub fn fit_block(
    text: &str,
    font: Font,
    width: f32,
    height: f32,
    max_size: f32,
    min_size: f32,
) -> FittedBlock {
    let text = sanitize(text.trim());
    let mut size = max_size;
    loop {
        let lines = wrap_lines(&text, font, size, width);
        if lines.len() as f32 * size * LEADING <= height {
            return FittedBlock { lines, size };
        }
        if size - 1.0 < min_size {
            break;
        }
        size -= 1.0;
    }

    let size = min_size;
    let mut lines = wrap_lines(&text, font, size, width);
    let capacity = ((height / (size * LEADING)).floor() as usize).max(1);
    if lines.len() > capacity {
        lines.truncate(capacity);
        if let Some(last) = lines.last_mut() {
            let marked = format!("{last}{ELLIPSIS}");
            *last = if text_width(&marked, font, size) <= width {
                marked
            } else {
                let shorter: String = last.chars().take(last.chars().count().saturating_sub(1)).collect();
                format!("{}{ELLIPSIS}", shorter.trim_end())
            };
        }
    }
    FittedBlock { lines, size }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_unmappable() {
        assert_eq!(sanitize("Café €5"), "Café €5");
        assert_eq!(sanitize("龙 dragon"), "? dragon");
        assert_eq!(sanitize("a\tb"), "a b");
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("é"), vec![0xE9]);
        assert_eq!(encode_win_ansi("…"), vec![0x85]);
        assert_eq!(encode_win_ansi("😀"), vec![b'?']);
    }

    #[test]
    fn test_fit_font_size_shrinks() {
        let short = fit_font_size("Hi", Font::Bold, 300.0, 40.0, 12.0);
        assert_eq!(short, 40.0);

        let long = "A very long title about a purple dragon who loves pancakes";
        let size = fit_font_size(long, Font::Bold, 300.0, 40.0, 12.0);
        assert!(size < 40.0);
        assert!(size >= 12.0);
    }

    #[test]
    fn test_fit_line_truncates_at_minimum() {
        let long = "x".repeat(500);
        let fitted = fit_line(&long, Font::Regular, 100.0, 20.0, 10.0);
        assert_eq!(fitted.size, 10.0);
        assert!(fitted.text.ends_with('…'));
        assert!(text_width(&fitted.text, Font::Regular, fitted.size) <= 100.0);
    }

    #[test]
    fn test_wrap_lines_respects_width() {
        let text = "Once upon a time there was a dragon who painted the sky purple every single morning";
        let lines = wrap_lines(text, Font::Regular, 12.0, 120.0);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, Font::Regular, 12.0) <= 120.0, "{line}");
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn test_wrap_breaks_long_words() {
        let lines = wrap_lines(&"w".repeat(50), Font::Regular, 10.0, 55.0);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
    }

    #[test]
    fn test_fit_block_overflow_is_ellipsized() {
        let text = "word ".repeat(400);
        let block = fit_block(&text, Font::Regular, 200.0, 60.0, 18.0, 10.0);
        assert_eq!(block.size, 10.0);
        assert!(block.height() <= 60.0);
        assert!(block.lines.last().is_some_and(|l| l.ends_with('…')));
    }

    #[test]
    fn test_fit_block_keeps_large_size_when_possible() {
        let block = fit_block("The end.", Font::Regular, 400.0, 200.0, 18.0, 10.0);
        assert_eq!(block.size, 18.0);
        assert_eq!(block.lines, vec!["The end.".to_string()]);
    }
}
