use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structured prose attached to an operation, parameter, named type or enum
/// variant. Sections keep their language tag, title and body text exactly as
/// written so emitters can reproduce them verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct DocBlock {
    pub sections: Vec<DocSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocSection {
    /// Language tag such as `ko` or `en`; `None` for untagged prose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang:  Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Body lines joined with `\n`. Empty lines separate paragraphs.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body:  String,
}

impl DocBlock {
    pub fn is_empty(&self) -> bool {
        self.sections
            .iter()
            .all(|s| s.title.is_none() && s.body.trim().is_empty())
    }

    /// Builds a block from doc-comment lines (comment markers already stripped).
    ///
    /// A line of the form `[xx] title` opens a section tagged with language
    /// `xx`. In an untagged block a leading `### title` line becomes the title;
    /// every other line is body text.
    pub fn from_doc_lines<I, S>(lines: I) -> DocBlock
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sections: Vec<DocSection> = Vec::new();
        let mut body: Vec<String> = Vec::new();

        fn flush(sections: &mut Vec<DocSection>, body: &mut Vec<String>) {
            while body.last().map_or(false, |l| l.trim().is_empty()) {
                body.pop();
            }
            if let Some(section) = sections.last_mut() {
                section.body = body.join("\n");
            }
            body.clear();
        }

        for line in lines {
            let line = line.as_ref().trim_end();

            if let Some((lang, title)) = split_lang_tag(line) {
                flush(&mut sections, &mut body);
                sections.push(DocSection {
                    lang:  Some(lang.to_string()),
                    title: (!title.is_empty()).then(|| title.to_string()),
                    body:  String::new(),
                });
                continue;
            }

            if sections.is_empty() {
                if line.trim().is_empty() {
                    continue;
                }
                let title = line.strip_prefix("### ").map(|t| t.trim().to_string());
                let opened_with_title = title.is_some();
                sections.push(DocSection { lang: None, title, body: String::new() });
                if opened_with_title {
                    continue;
                }
            }

            if body.is_empty() && line.trim().is_empty() {
                continue;
            }
            body.push(line.to_string());
        }
        flush(&mut sections, &mut body);

        DocBlock { sections }
    }

    /// Plain-text lines of the block: one heading per titled section, body
    /// lines unchanged, and an empty line between sections.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for section in self.sections.iter().filter(|s| !s.is_empty()) {
            if !out.is_empty() {
                out.push(String::new());
            }
            match (&section.lang, &section.title) {
                (Some(lang), Some(title)) => out.push(format!("### [{}] {}", lang, title)),
                (None, Some(title))       => out.push(format!("### {}", title)),
                (Some(lang), None)        => out.push(format!("[{}]", lang)),
                (None, None)              => {}
            }
            if !section.body.is_empty() {
                out.extend(section.body.split('\n').map(str::to_string));
            }
        }
        out
    }

    /// Language tags in the order they first appear.
    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = Vec::new();
        for lang in self.sections.iter().filter_map(|s| s.lang.as_deref()) {
            if !langs.contains(&lang) {
                langs.push(lang);
            }
        }
        langs
    }
}

impl DocSection {
    pub fn is_empty(&self) -> bool {
        self.lang.is_none() && self.title.is_none() && self.body.trim().is_empty()
    }

    /// Body paragraphs, split on empty lines.
    pub fn paragraphs(&self) -> Vec<String> {
        let mut paragraphs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in self.body.split('\n') {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    paragraphs.push(current.join("\n"));
                    current.clear();
                }
            } else {
                current.push(line);
            }
        }
        if !current.is_empty() {
            paragraphs.push(current.join("\n"));
        }
        paragraphs
    }
}

/// Splits `[ko] title` into `("ko", "title")`. Tags are 2-8 characters of
/// letters, digits and `-`, starting with a letter.
fn split_lang_tag(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    let tag = &rest[..end];
    let valid = (2..=8).contains(&tag.len())
        && tag.starts_with(|c: char| c.is_ascii_alphabetic())
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return None;
    }
    Some((tag, rest[end + 1..].trim()))
}
