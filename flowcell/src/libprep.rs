/// 10X Genomics kits we know how to demultiplex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenXKit {
    VisiumSpatial,
    Atac,
    GeneExpression3p,
    Other,
}

impl TenXKit {
    fn from_name(name: &str) -> Self {
        if name.contains("Visium") {
            Self::VisiumSpatial
        } else if name.contains("ATAC") {
            Self::Atac
        } else if name.contains("3p GEM") {
            Self::GeneExpression3p
        } else {
            Self::Other
        }
    }

    /// Key in `[Commands]` holding the mkfastq invocation for this kit.
    pub fn mkfastq_command(&self) -> &'static str {
        match self {
            Self::VisiumSpatial => "cellranger_spatial_mkfastq",
            Self::Atac => "cellranger_atac_mkfastq",
            Self::GeneExpression3p | Self::Other => "cellranger_mkfastq",
        }
    }
}

/// Which demultiplexer family a run is converted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterFamily {
    /// cellranger mkfastq, per kit
    TenX(TenXKit),
    /// bcl-convert, or bcl2fastq when forced
    Illumina,
}

/// Library prep kind, resolved once from the `Libprep` custom option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Libprep {
    TenX(TenXKit),
    ParseBiosciences,
    Qiaseq,
    Standard(String),
    #[default]
    Unspecified,
}

/// Everything about the pipeline that depends on the library prep kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepPolicy {
    pub converter: ConverterFamily,
    /// normalize converter file names (`_S<n>`, `_001`)
    pub rename_fastqs: bool,
    pub deduplicate: bool,
    /// skip the contamination screen on single reads
    pub skip_single_read_qc: bool,
    /// human read removal may be requested with `RemoveHumanReads`
    pub allow_decontamination: bool,
    /// the converter leaves an extra flowcell-named dir that goes into the archive
    pub archive_flowcell_dir: bool,
    /// attach per-sample single cell summaries to the finished message
    pub single_cell_reports: bool,
}

impl Default for PrepPolicy {
    fn default() -> Self {
        Self {
            converter: ConverterFamily::Illumina,
            rename_fastqs: true,
            deduplicate: true,
            skip_single_read_qc: false,
            allow_decontamination: true,
            archive_flowcell_dir: false,
            single_cell_reports: false,
        }
    }
}

impl Libprep {
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            Self::Unspecified
        } else if name.starts_with("10X Genomics") {
            Self::TenX(TenXKit::from_name(name))
        } else if name.starts_with("Parse Biosciences") {
            Self::ParseBiosciences
        } else if name.to_ascii_lowercase().contains("qiaseq") {
            Self::Qiaseq
        } else {
            Self::Standard(name.to_owned())
        }
    }

    pub fn is_ten_x(&self) -> bool {
        matches!(self, Self::TenX(_))
    }

    pub fn policy(&self) -> PrepPolicy {
        let default = PrepPolicy::default();
        match self {
            Self::TenX(kit) => PrepPolicy {
                converter: ConverterFamily::TenX(*kit),
                rename_fastqs: false,
                deduplicate: false,
                skip_single_read_qc: true,
                allow_decontamination: false,
                archive_flowcell_dir: true,
                single_cell_reports: *kit == TenXKit::GeneExpression3p,
            },
            Self::ParseBiosciences => PrepPolicy {
                deduplicate: false,
                skip_single_read_qc: true,
                allow_decontamination: false,
                single_cell_reports: true,
                ..default
            },
            // UMIs make read-level dedup meaningless
            Self::Qiaseq => PrepPolicy {
                deduplicate: false,
                ..default
            },
            Self::Standard(_) | Self::Unspecified => default,
        }
    }
}
