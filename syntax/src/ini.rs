use combine::EasyParser;

use crate::ast::Section;
use crate::parse::{parse_document, Error};

/// Parsed `key = value` config file.
///
/// Sections keep file order; key lookups ignore ascii case, section lookups don't.
#[derive(Debug, Default)]
pub struct Ini<'a> {
    sections: Vec<IniSection<'a>>,
}

/// A single `[name]` block of an ini file.
#[derive(Debug)]
pub struct IniSection<'a> {
    pub name: &'a str,
    entries: Vec<(&'a str, &'a str)>,
}

impl<'a> Ini<'a> {
    pub fn section(&self, name: &str) -> Option<&IniSection<'a>> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Convenience for `section(section)?.get(key)`.
    pub fn get(&self, section: &str, key: &str) -> Option<&'a str> {
        self.section(section).and_then(|s| s.get(key))
    }

    pub fn sections(&self) -> impl Iterator<Item = &IniSection<'a>> {
        self.sections.iter()
    }
}

impl<'a> IniSection<'a> {
    /// Value for `key`. If a key is repeated, the last one wins.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
    }

    /// All entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.entries.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse an ini file. Lines starting with `#` or `;` are comments.
pub fn parse_ini(text: &str) -> Result<Ini<'_>, Error> {
    let doc = parse_document(text)?;

    if let Some(stray) = doc.preamble.iter().find(|l| !is_skippable(l)) {
        return Err(Error::at(
            stray,
            0,
            "entry found before the first [Section] header".to_owned(),
        ));
    }

    let mut sections = Vec::with_capacity(doc.sections.len());
    for section in &doc.sections {
        sections.push(parse_section(section)?);
    }
    Ok(Ini { sections })
}

fn is_skippable(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#') || line.starts_with(';')
}

fn parse_section<'a>(section: &Section<'a>) -> Result<IniSection<'a>, Error> {
    let mut entries = Vec::with_capacity(section.lines.len());
    for line in &section.lines {
        if is_skippable(line) {
            continue;
        }
        let ((k, v), _) = entry::key_value()
            .easy_parse(*line)
            .map_err(|e| Error::at(line, e.position.translate_position(*line), format!("{}", e)))?;
        entries.push((k.trim(), v.trim()));
    }
    Ok(IniSection {
        name: section.name.trim(),
        entries,
    })
}

mod entry {
    use crate::parse::prelude::*;

    p! {
        key_value() -> (&'a str, &'a str), {
            recognize(skip_many1(none_of("=\n".chars())))
                .skip(char('='))
                .and(recognize(skip_many(any())))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;

    const TEXT: &str = "\
# comment before anything
[Paths]
outputDir = /data/output
nova_baseDir=/mnt/seq/nova
; another comment

[Pipelines]
10X Genomics Chromium Single Cell 3p GEM Library & Gel Bead Kit v3 = single-cell
[Commands]
bcl_convert = bcl-convert --sample-sheet {sample_sheet} --output-directory={output_dir}
";

    #[test]
    fn test_parse_ini() -> Result<()> {
        let ini = parse_ini(TEXT)?;
        assert_eq!(Some("/data/output"), ini.get("Paths", "outputDir"));
        assert_eq!(Some("/data/output"), ini.get("Paths", "OUTPUTDIR"));
        assert_eq!(Some("/mnt/seq/nova"), ini.get("Paths", "nova_basedir"));
        assert_eq!(
            Some("single-cell"),
            ini.get(
                "Pipelines",
                "10X Genomics Chromium Single Cell 3p GEM Library & Gel Bead Kit v3"
            )
        );
        // only the first '=' separates key from value:
        assert_eq!(
            Some("bcl-convert --sample-sheet {sample_sheet} --output-directory={output_dir}"),
            ini.get("Commands", "bcl_convert")
        );
        assert_eq!(None, ini.get("paths", "outputDir"));
        Ok(())
    }

    #[test]
    fn test_last_duplicate_wins() -> Result<()> {
        let ini = parse_ini("[System]\nsleeptime = 1\nsleeptime = 2\n")?;
        assert_eq!(Some("2"), ini.get("System", "sleeptime"));
        Ok(())
    }

    #[test]
    fn test_errors() {
        assert!(parse_ini("key = value\n[Section]\n").is_err());
        assert!(parse_ini("[Section]\nno delimiter here\n").is_err());
    }
}
