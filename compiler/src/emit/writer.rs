/// Line-oriented source builder with indentation tracking.
#[derive(Debug)]
pub struct CodeWriter {
    out:    String,
    depth:  usize,
    indent: &'static str,
}

impl CodeWriter {
    pub fn new(indent: &'static str) -> Self {
        CodeWriter { out: String::new(), depth: 0, indent }
    }

    /// Writes one line at the current indentation. Empty text writes an
    /// empty line without trailing whitespace.
    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.out.push_str(self.indent);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
        self
    }

    pub fn lines<I, S>(&mut self, lines: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.line(line);
        }
        self
    }

    /// Separates blocks with a single empty line; never doubles up and
    /// never starts the output with one.
    pub fn blank(&mut self) -> &mut Self {
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
        self
    }

    pub fn indent(&mut self) -> &mut Self {
        self.depth += 1;
        self
    }

    pub fn dedent(&mut self) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self
    }

    /// `open`, the indented body, then `close`.
    pub fn block<E>(
        &mut self,
        open: impl AsRef<str>,
        close: impl AsRef<str>,
        body: impl FnOnce(&mut Self) -> Result<(), E>,
    ) -> Result<&mut Self, E> {
        self.line(open);
        self.indent();
        body(self)?;
        self.dedent();
        self.line(close);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// The text written so far, ending in exactly one newline.
    pub fn finish(self) -> String {
        let mut out = self.out;
        while out.ends_with("\n\n") {
            out.pop();
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}
