use crate::ast::{Document, Section};
use crate::parse::{parse_document, Error};

/// An instrument sample sheet: `[Header]`, `[Reads]`, `[Settings]`, `[Data]`
/// and the facility-specific `[CustomOptions]` block, all comma separated.
#[derive(Debug)]
pub struct SampleSheet<'a> {
    doc: Document<'a>,
}

/// The `[Data]` table: first non-empty row is the header.
#[derive(Debug, PartialEq, Eq)]
pub struct DataTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl<'a> SampleSheet<'a> {
    pub fn parse(text: &'a str) -> Result<Self, Error> {
        Ok(Self {
            doc: parse_document(text)?,
        })
    }

    /// Key/value pairs of the `[CustomOptions]` block, using the first two columns.
    /// `None` if the sheet has no such block.
    pub fn custom_options(&self) -> Option<Vec<(&'a str, &'a str)>> {
        let section = self.doc.section("CustomOptions")?;
        let opts = section
            .content_lines()
            .filter_map(|line| {
                let mut fields = fields(line);
                let key = fields.next().unwrap_or_default();
                let value = fields.next().unwrap_or_default();
                (!key.is_empty()).then_some((key, value))
            })
            .collect();
        Some(opts)
    }

    /// The `[Data]` table, read as csv so quoted fields may hold commas.
    pub fn data(&self) -> Result<Option<DataTable>, Error> {
        self.doc.section("Data").map(data_table).transpose()
    }
}

fn fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(',').map(str::trim)
}

fn data_table(section: &Section) -> Result<DataTable, Error> {
    let text = section.content_lines().collect::<Vec<_>>().join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            let pos = e.position().map(|p| p.byte() as usize).unwrap_or(0);
            Error::at(&text, pos, e.to_string())
        })?;
        // rows of nothing but commas are excel padding:
        if record.iter().any(|f| !f.is_empty()) {
            rows.push(record.iter().map(str::to_owned).collect::<Vec<_>>());
        }
    }
    let mut rows = rows.into_iter();
    let header = rows.next().unwrap_or_default();
    Ok(DataTable {
        header,
        rows: rows.collect(),
    })
}

impl DataTable {
    /// Index of a header column, ignoring ascii case.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    /// Values of the named column, one per row (empty string where a row is short).
    pub fn values(&self, name: &str) -> Vec<&str> {
        match self.column(name) {
            Some(idx) => self
                .rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or_default())
                .collect(),
            None => Vec::with_capacity(0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;

    const SHEET: &str = "\
[Header],,,
IEMFileVersion,5,,
[Reads],,,
151,,,
151,,,
[Data],,,
Lane,Sample_ID,Sample_Name,Sample_Project
1,S1,S1,GCF-2024-001
1,S2,S2,GCF-2024-001
2,S3,S3,GCF-2024-002
,,,
[CustomOptions],,,
Libprep,Illumina TruSeq Stranded mRNA,,
SensitiveData,true,,
User,someone@example.org
,ignored,,
";

    #[test]
    fn test_custom_options() -> Result<()> {
        let sheet = SampleSheet::parse(SHEET)?;
        let opts = sheet.custom_options().unwrap();
        assert_eq!(
            vec![
                ("Libprep", "Illumina TruSeq Stranded mRNA"),
                ("SensitiveData", "true"),
                ("User", "someone@example.org"),
            ],
            opts
        );
        Ok(())
    }

    #[test]
    fn test_missing_custom_options() -> Result<()> {
        let sheet = SampleSheet::parse("[Data]\nLane,Sample_ID\n1,S1\n")?;
        assert!(sheet.custom_options().is_none());
        Ok(())
    }

    #[test]
    fn test_data() -> Result<()> {
        let sheet = SampleSheet::parse(SHEET)?;
        let data = sheet.data()?.unwrap();
        assert_eq!(3, data.rows.len());
        assert_eq!(Some(3), data.column("sample_project"));
        assert_eq!(
            vec!["GCF-2024-001", "GCF-2024-001", "GCF-2024-002"],
            data.values("Sample_Project")
        );
        assert!(data.values("Index").is_empty());
        Ok(())
    }

    #[test]
    fn test_quoted_fields() -> Result<()> {
        let sheet = SampleSheet::parse(
            "[Data],,,\n\
             Sample_ID,Description,Sample_Project\n\
             S1,\"liver, left lobe\",GCF-2024-001\n\
             S2,\"say \"\"hi\"\"\",GCF-2024-002\n",
        )?;
        let data = sheet.data()?.unwrap();
        assert_eq!(
            vec!["liver, left lobe", "say \"hi\""],
            data.values("Description")
        );
        assert_eq!(
            vec!["GCF-2024-001", "GCF-2024-002"],
            data.values("Sample_Project")
        );
        Ok(())
    }

    #[test]
    fn test_no_data_section() -> Result<()> {
        let sheet = SampleSheet::parse("[Header]\nIEMFileVersion,5\n")?;
        assert!(sheet.data()?.is_none());
        Ok(())
    }
}
