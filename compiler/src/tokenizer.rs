use regex::Regex;
use lazy_static::lazy_static;
use crate::utils::{quote, error};
use crate::error::GenError;

lazy_static! {
    pub static ref TOKEN_REGEX: Regex = Regex::new(
        r#"(///[^\n]*|//[^\n]*|"(?:[^"\\\n]|\\.)*"|(?:-|\b)\d+\b|[=;{}?,]|\[\]|\[deprecated\]|\b[A-Za-z_][A-Za-z0-9_]*\b|\s+)"#
    ).expect("token regex is valid");
    pub static ref WHITESPACE_RX: Regex = Regex::new(r"^\s+$").expect("whitespace regex is valid");
}

#[derive(Debug, PartialEq)]
pub struct Token {
    pub text:   String,
    pub line:   usize,
    pub column: usize,
}

impl Token {
    /// `///` documentation comment.
    pub fn is_doc(&self) -> bool {
        self.text.starts_with("///")
    }

    /// Text of a doc comment with the marker and one leading space removed.
    pub fn doc_text(&self) -> &str {
        let rest = self.text.trim_start_matches("///");
        rest.strip_prefix(' ').unwrap_or(rest)
    }
}

/// Splits schema text into tokens. Plain `//` comments and whitespace are
/// dropped, `///` doc comments are kept. The last token is always an empty
/// EOF marker.
pub fn tokenize_schema(text: &str) -> Result<Vec<Token>, GenError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut last_end = 0;

    for mat in TOKEN_REGEX.find_iter(text) {
        let start = mat.start();
        let end   = mat.end();
        let part  = mat.as_str();

        if start > last_end {
            // Unexpected text between last_end and start
            let unexpected = &text[last_end..start];
            return Err(error(
                &format!("Syntax error: {}", quote(unexpected)),
                line,
                column,
            ));
        }

        let is_comment = part.starts_with("//") && !part.starts_with("///");
        if !WHITESPACE_RX.is_match(part) && !is_comment {
            tokens.push(Token {
                text: part.trim_end().to_string(),
                line,
                column,
            });
        }

        // Update line/column
        let newline_count = part.matches('\n').count();
        if newline_count > 0 {
            line += newline_count;
            if let Some(last_line_part) = part.split('\n').last() {
                column = last_line_part.chars().count() + 1;
            }
        } else {
            column += part.chars().count();
        }

        last_end = end;
    }

    if last_end != text.len() {
        let unexpected = &text[last_end..];
        return Err(error(
            &format!("Syntax error: {}", quote(unexpected)),
            line,
            column,
        ));
    }

    // Append EOF token
    tokens.push(Token {
        text: "".to_string(),
        line,
        column,
    });
    Ok(tokens)
}
