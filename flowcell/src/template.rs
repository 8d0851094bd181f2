use std::fmt::Display;

use syntax::{parse_template, Piece};
use util::HashMap;

use crate::Error;

/// A validated tool command from the `[Commands]` section.
///
/// The text is parsed once when the config is loaded so that
/// a typo in a placeholder fails at startup, not mid-flowcell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    text: String,
}

/// Placeholder values for rendering a `Template`.
#[derive(Debug, Default, Clone)]
pub struct Vars {
    map: HashMap<&'static str, String>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: &'static str, value: impl Display) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &'static str, value: impl Display) {
        self.map.insert(key, value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

impl Template {
    pub fn new(name: &str, text: &str) -> Result<Self, Error> {
        parse_template(text)?;
        Ok(Self {
            name: name.to_owned(),
            text: text.to_owned(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substitute every `{placeholder}`; fails if one has no value in `vars`.
    pub fn render(&self, vars: &Vars) -> Result<String, Error> {
        // already validated in `new`:
        let pieces = parse_template(&self.text)?;
        let mut out = String::with_capacity(self.text.len() * 2);
        for piece in pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Var(var) => {
                    let val = vars.get(var).ok_or_else(|| {
                        Error::UndefinedPlaceholder(self.name.clone(), var.to_owned())
                    })?;
                    out.push_str(val);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    #[test]
    fn test_render() -> Result<()> {
        let tmpl = Template::new("md5sum", "md5sum {archive} > {output}")?;
        let vars = Vars::new()
            .with("archive", "/out/GCF-2024-001_240101.7za")
            .with("output", "/out/md5sum_GCF-2024-001_240101_archive.txt");
        assert_eq!(
            "md5sum /out/GCF-2024-001_240101.7za > /out/md5sum_GCF-2024-001_240101_archive.txt",
            tmpl.render(&vars)?
        );
        Ok(())
    }
    #[test]
    fn test_undefined_placeholder() -> Result<()> {
        let tmpl = Template::new("fastqc", "fastqc {input} -o {outdir}")?;
        let err = tmpl.render(&Vars::new().with("input", "x.fastq.gz")).unwrap_err();
        assert!(matches!(err, Error::UndefinedPlaceholder(name, var) if name == "fastqc" && var == "outdir"));
        Ok(())
    }
    #[test]
    fn test_invalid_template() {
        assert!(Template::new("broken", "echo {oops").is_err());
    }
}
