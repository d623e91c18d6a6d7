//! Generic concrete syntax tree.
//!
//! A [`ParseTree`] node has a type tag, a byte span and either children or a
//! text payload. The [`crate::builder`] consumes only this shape; it does not
//! care how the tree was produced.

use serde::Serialize;

use crate::ast::Span;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseTree {
    #[serde(rename = "type")]
    pub node_type: String,
    pub from: usize,
    pub to: usize,
    pub children: Vec<ParseTree>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ParseTree {
    /// Interior node spanning its children. `children` must be non-empty;
    /// use [`ParseTree::empty`] otherwise.
    pub fn node(node_type: &str, children: Vec<ParseTree>) -> Self {
        let from = children.first().map_or(0, |c| c.from);
        let to = children.last().map_or(from, |c| c.to);

        ParseTree {
            node_type: node_type.to_string(),
            from,
            to,
            children,
            text: None,
        }
    }

    /// Childless interior node at a position (empty block, empty list).
    pub fn empty(node_type: &str, at: usize) -> Self {
        ParseTree {
            node_type: node_type.to_string(),
            from: at,
            to: at,
            children: Vec::new(),
            text: None,
        }
    }

    pub fn leaf(node_type: &str, text: &str, span: Span) -> Self {
        ParseTree {
            node_type: node_type.to_string(),
            from: span.from,
            to: span.to,
            children: Vec::new(),
            text: Some(text.to_string()),
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.from, self.to)
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn is(&self, node_type: &str) -> bool {
        self.node_type == node_type
    }
}

/// Blank out comment text with spaces, keeping newlines, string literals and
/// every byte offset intact.
pub fn strip_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out: Vec<u8> = bytes.to_vec();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;

                while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }

                i += 1;
            }

            b'[' => match long_bracket(bytes, i) {
                Some((level, body)) => i = long_bracket_end(bytes, body, level),

                None => i += 1,
            },

            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let start = i;

                let end = match long_bracket(bytes, i + 2) {
                    Some((level, body)) => long_bracket_end(bytes, body, level),

                    None => memchr::memchr(b'\n', &bytes[i..]).map_or(bytes.len(), |p| i + p),
                };

                for b in &mut out[start..end] {
                    if *b != b'\n' {
                        *b = b' ';
                    }
                }

                i = end;
            }

            _ => i += 1,
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// If `bytes[at..]` opens a long bracket `[=*[`, return its level and the
/// offset of the first body byte.
fn long_bracket(bytes: &[u8], at: usize) -> Option<(usize, usize)> {
    if bytes.get(at) != Some(&b'[') {
        return None;
    }

    let mut i = at + 1;

    while bytes.get(i) == Some(&b'=') {
        i += 1;
    }

    (bytes.get(i) == Some(&b'[')).then_some((i - at - 1, i + 1))
}

/// Offset one past the closing `]=*]`, or the end of input.
fn long_bracket_end(bytes: &[u8], mut i: usize, level: usize) -> usize {
    while let Some(pos) = memchr::memchr(b']', &bytes[i..]) {
        let close = i + pos;
        let mut j = close + 1;

        while j < bytes.len() && bytes[j] == b'=' && j - close - 1 < level {
            j += 1;
        }

        if j - close - 1 == level && bytes.get(j) == Some(&b']') {
            return j + 1;
        }

        i = close + 1;
    }

    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blanks_line_and_block_comments() {
        let src = "a = 1 -- one\nb = --[[ two\nlines ]] 2";
        let stripped = strip_comments(src);

        assert_eq!(stripped.len(), src.len());
        assert_eq!(stripped, format!("a = 1 {}\nb = {}\n{} 2", " ".repeat(6), " ".repeat(8), " ".repeat(8)));
    }

    #[test]
    fn keeps_comment_markers_inside_strings() {
        let src = "s = \"--not\" .. [[--neither]]";

        assert_eq!(strip_comments(src), src);
    }

    #[test]
    fn leveled_block_comment() {
        let src = "--[==[ ]] ]==]x";

        assert_eq!(strip_comments(src), format!("{}x", " ".repeat(14)));
    }
}
