use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use syntax::SampleSheet;

/// Run-level flags from a sample sheet's `[CustomOptions]` block.
///
/// Known keys are promoted to typed fields; anything else is kept
/// in `extra` for stages that want ad hoc values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub organism: String,
    pub libprep: String,
    pub user: String,
    pub adapter: String,
    pub adapter_read2: String,
    pub rerun: bool,
    pub single_cell: bool,
    pub remove_human_reads: bool,
    pub sensitive_data: bool,
    pub reverse_complement_index_p5: bool,
    pub reverse_complement_index_p7: bool,
    pub trim_adapter: bool,
    pub extra: BTreeMap<String, String>,
}

fn str2bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

impl RunOptions {
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut opts = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.trim(), value.trim());
            match key {
                "Organism" => opts.organism = value.to_owned(),
                "Libprep" => opts.libprep = value.to_owned(),
                "User" => opts.user = value.to_owned(),
                "Adapter" => opts.adapter = value.to_owned(),
                "AdapterRead2" => opts.adapter_read2 = value.to_owned(),
                "Rerun" => opts.rerun = str2bool(value),
                "SingleCell" => opts.single_cell = str2bool(value),
                "RemoveHumanReads" => opts.remove_human_reads = str2bool(value),
                "SensitiveData" => opts.sensitive_data = str2bool(value),
                "ReverseComplementIndexP5" => opts.reverse_complement_index_p5 = str2bool(value),
                "ReverseComplementIndexP7" => opts.reverse_complement_index_p7 = str2bool(value),
                "TrimAdapter" => opts.trim_adapter = str2bool(value),
                "" => {}
                _ => {
                    opts.extra.insert(key.to_owned(), value.to_owned());
                }
            }
        }
        opts
    }

    /// Look up a custom option that has no typed field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

/// Read a sample sheet and return its custom options,
/// or `None` if it has no `[CustomOptions]` block.
pub fn read_custom_options(path: &Path) -> Result<Option<RunOptions>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let sheet = SampleSheet::parse(&text).with_context(|| format!("parsing {:?}", path))?;
    Ok(sheet.custom_options().map(RunOptions::from_pairs))
}
