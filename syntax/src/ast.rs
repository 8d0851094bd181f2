/// A text file split into `[Section]` blocks.
/// Lines before the first header end up in `preamble`.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct Document<'a> {
    pub preamble: Vec<&'a str>,
    pub sections: Vec<Section<'a>>,
}

/// One `[name]` header and the raw lines that follow it, up to the next header.
#[derive(Debug, PartialEq, Eq)]
pub struct Section<'a> {
    pub name: &'a str,
    pub lines: Vec<&'a str>,
}

impl<'a> Document<'a> {
    /// First section whose name matches `name`, ignoring ascii case.
    pub fn section(&self, name: &str) -> Option<&Section<'a>> {
        self.sections
            .iter()
            .find(|s| s.name.trim().eq_ignore_ascii_case(name))
    }
}

impl<'a> Section<'a> {
    /// Lines with surrounding whitespace removed, skipping blank ones.
    pub fn content_lines(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty())
    }
}
