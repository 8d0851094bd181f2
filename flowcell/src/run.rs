use std::path::{Path, PathBuf};

use crate::{Error, Libprep, PrepPolicy, RunOptions, StaticConfig};

/// State of the one flowcell currently being processed.
///
/// Filled in three steps (`begin`, `apply_custom`, `set_pipeline_from`)
/// and cleared with `reset` before the next candidate is looked at.
/// Accessors for fields a step has not set yet return `NoActiveRun`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunContext {
    run_id: String,
    flowcell_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    sample_sheet: Option<PathBuf>,
    submission_form: Option<PathBuf>,
    options: RunOptions,
    libprep: Libprep,
    policy: PrepPolicy,
    pipeline: Option<String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run for the flowcell at `flowcell_path`.
    /// Only identity and paths are known at this point.
    pub fn begin(&mut self, flowcell_path: &Path, output_root: &Path) -> Result<(), Error> {
        self.reset();
        let run_id = flowcell_path
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::InvalidRunDir(flowcell_path.to_string_lossy().into_owned()))?;
        self.run_id = run_id.to_owned();
        self.output_path = Some(output_root.join(run_id));
        self.flowcell_path = Some(flowcell_path.to_path_buf());
        Ok(())
    }

    /// Promote the sample sheet's custom options. `options` is `None` when no
    /// sheet with a `[CustomOptions]` block was found.
    pub fn apply_custom(
        &mut self,
        options: Option<RunOptions>,
        sample_sheet: Option<PathBuf>,
        submission_form: Option<PathBuf>,
    ) -> Result<(), Error> {
        if !self.is_active() {
            return Err(Error::NoActiveRun);
        }
        let (Some(options), Some(sheet), Some(form)) = (options, sample_sheet, submission_form)
        else {
            return Err(Error::MissingSampleSheet(self.run_id.clone()));
        };
        self.libprep = Libprep::from_name(&options.libprep);
        self.policy = self.libprep.policy();
        self.options = options;
        self.sample_sheet = Some(sheet);
        self.submission_form = Some(form);
        Ok(())
    }

    /// Resolve the analysis workflow from the library prep kit,
    /// falling back to the `default` pipeline entry.
    pub fn set_pipeline_from(&mut self, config: &StaticConfig) -> Result<(), Error> {
        if self.sample_sheet.is_none() {
            return Err(Error::NoActiveRun);
        }
        self.pipeline = config
            .pipeline_for(&self.options.libprep)
            .or_else(|| config.pipeline_for("default"))
            .map(str::to_owned);
        if self.pipeline.is_none() {
            log::warn!(
                "{}: no pipeline configured for library prep \"{}\"",
                self.run_id,
                self.options.libprep
            );
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        !self.run_id.is_empty()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn flowcell_path(&self) -> Result<&Path, Error> {
        self.flowcell_path.as_deref().ok_or(Error::NoActiveRun)
    }

    pub fn output_path(&self) -> Result<&Path, Error> {
        self.output_path.as_deref().ok_or(Error::NoActiveRun)
    }

    pub fn sample_sheet(&self) -> Result<&Path, Error> {
        self.sample_sheet.as_deref().ok_or(Error::NoActiveRun)
    }

    pub fn submission_form(&self) -> Result<&Path, Error> {
        self.submission_form.as_deref().ok_or(Error::NoActiveRun)
    }

    /// `240415` in `240415_A01990_0345_BHXXXXXX`
    pub fn run_date(&self) -> &str {
        self.run_id.split('_').next().unwrap_or_default()
    }

    /// `A01990` in `240415_A01990_0345_BHXXXXXX`
    pub fn instrument(&self) -> &str {
        self.run_id.split('_').nth(1).unwrap_or_default()
    }

    /// `HXXXXXX` in `240415_A01990_0345_BHXXXXXX` (flowcell side prefix dropped)
    pub fn flowcell_id(&self) -> &str {
        let last = self.run_id.rsplit('_').next().unwrap_or_default();
        last.get(1..).unwrap_or_default()
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn libprep(&self) -> &Libprep {
        &self.libprep
    }

    pub fn policy(&self) -> &PrepPolicy {
        &self.policy
    }

    pub fn pipeline(&self) -> Result<&str, Error> {
        self.pipeline
            .as_deref()
            .ok_or_else(|| Error::NoPipeline(self.options.libprep.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ConverterFamily, TenXKit};
    use anyhow::Result;

    const RUN: &str = "/seq/nova/240415_A01990_0345_BHXXXXXX";

    fn config() -> Result<StaticConfig> {
        Ok(StaticConfig::from_ini_str(
            "[Paths]\ninstrument_roots = /seq/nova\noutputDir = /out\nlogDir = /logs\n\n[Pipelines]\n10X Genomics Chromium Single Cell 3p GEM Library & Gel Bead Kit v3 = single-cell\ndefault = microbe\n",
        )?)
    }

    fn options(libprep: &str) -> RunOptions {
        RunOptions::from_pairs([("Libprep", libprep), ("SensitiveData", "1")])
    }

    #[test]
    fn test_lifecycle() -> Result<()> {
        let mut run = RunContext::new();
        assert!(!run.is_active());
        assert!(matches!(run.output_path(), Err(Error::NoActiveRun)));

        run.begin(Path::new(RUN), Path::new("/out"))?;
        assert_eq!("240415_A01990_0345_BHXXXXXX", run.run_id());
        assert_eq!(Path::new("/out/240415_A01990_0345_BHXXXXXX"), run.output_path()?);
        assert_eq!("240415", run.run_date());
        assert_eq!("A01990", run.instrument());
        assert_eq!("HXXXXXX", run.flowcell_id());
        assert!(run.sample_sheet().is_err());

        run.apply_custom(
            Some(options(
                "10X Genomics Chromium Single Cell 3p GEM Library & Gel Bead Kit v3",
            )),
            Some(PathBuf::from("/out/run/SampleSheet.csv")),
            Some(PathBuf::from("/out/run/Sample-Submission-Form.xlsx")),
        )?;
        assert!(run.options().sensitive_data);
        assert_eq!(
            ConverterFamily::TenX(TenXKit::GeneExpression3p),
            run.policy().converter
        );

        run.set_pipeline_from(&config()?)?;
        assert_eq!("single-cell", run.pipeline()?);

        run.reset();
        assert_eq!(RunContext::default(), run);
        Ok(())
    }

    #[test]
    fn test_missing_sample_sheet() -> Result<()> {
        let mut run = RunContext::new();
        run.begin(Path::new(RUN), Path::new("/out"))?;
        let err = run
            .apply_custom(
                Some(options("x")),
                Some(PathBuf::from("/out/run/SampleSheet.csv")),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::MissingSampleSheet(id) if id == "240415_A01990_0345_BHXXXXXX"));
        let err = run.apply_custom(None, None, None).unwrap_err();
        assert!(matches!(err, Error::MissingSampleSheet(_)));
        Ok(())
    }

    #[test]
    fn test_begin_clears_previous_run() -> Result<()> {
        let mut run = RunContext::new();
        run.begin(Path::new(RUN), Path::new("/out"))?;
        run.apply_custom(
            Some(options("Illumina TruSeq")),
            Some(PathBuf::from("a")),
            Some(PathBuf::from("b")),
        )?;
        run.set_pipeline_from(&config()?)?;
        assert_eq!("microbe", run.pipeline()?);

        run.begin(Path::new("/seq/nova/240501_A01990_0346_AHYYYYYY"), Path::new("/out"))?;
        assert!(run.sample_sheet().is_err());
        assert!(run.pipeline().is_err());
        assert_eq!(&RunOptions::default(), run.options());
        Ok(())
    }

    #[test]
    fn test_set_pipeline_requires_options() -> Result<()> {
        let mut run = RunContext::new();
        run.begin(Path::new(RUN), Path::new("/out"))?;
        assert!(matches!(
            run.set_pipeline_from(&config()?),
            Err(Error::NoActiveRun)
        ));
        Ok(())
    }
}
