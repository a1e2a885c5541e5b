use crate::error::GenError;

/// Quotes text as a JSON string literal (also valid in TS/JS sources).
pub fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

pub fn error(msg: &str, line: usize, column: usize) -> GenError {
    GenError::ParseError {
        msg: msg.to_string(),
        line,
        column,
    }
}

/// Identifier casing applied by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    /// Keep the identifier exactly as declared (wire names).
    Preserve,
    Pascal,
    Camel,
    Snake,
}

impl Case {
    pub fn apply(self, s: &str) -> String {
        match self {
            Case::Preserve => s.to_string(),
            Case::Pascal   => to_pascal_case(s),
            Case::Camel    => to_camel_case(s),
            Case::Snake    => to_snake_case(s),
        }
    }
}

/// Converts a string to PascalCase.
/// - With underscores, each word gets an uppercase first letter and the rest lowercase.
/// - A fully uppercase word keeps only its first letter uppercase.
/// - Otherwise only the first letter is changed, so `channelKey` becomes `ChannelKey`.
pub fn to_pascal_case(s: &str) -> String {
    fn capitalize(word: &str, lower_rest: bool) -> String {
        let mut chars = word.chars();
        match chars.next() {
            None => String::new(),
            Some(first) if lower_rest => {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            }
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        }
    }

    if s.contains('_') {
        s.split('_')
            .filter(|word| !word.is_empty())
            .map(|word| capitalize(word, true))
            .collect()
    } else if s == s.to_uppercase() {
        capitalize(s, true)
    } else {
        capitalize(s, false)
    }
}

pub fn to_camel_case(s: &str) -> String {
    let pascal = to_pascal_case(s);
    let mut chars = pascal.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
    }
}

/// Converts a string to snake_case without splitting acronyms
/// (`sessionID` becomes `session_id`).
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut snake = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                if prev != '_'
                    && (!prev.is_uppercase() || chars.get(i + 1).map_or(false, |n| n.is_lowercase()))
                {
                    snake.push('_');
                }
            }
            snake.extend(c.to_lowercase());
        } else {
            snake.push(c);
        }
    }
    snake
}
