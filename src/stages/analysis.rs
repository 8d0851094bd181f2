use std::path::Path;

use anyhow::Result;

use flowcell::{names, Vars};
use pool::Pool;

use super::{arg, Context, Error, Stage};
use crate::fs::paths;

const WORKFLOW: &str = "snakemake --use-singularity --cores 32 -p multiqc_report";

/// Per-project analysis workflow, run in scratch space; reports are copied
/// back into the output dir.
pub struct Analysis;

impl Stage for Analysis {
    fn name(&self) -> &'static str {
        "analysis"
    }

    fn marker(&self) -> Option<&'static str> {
        Some(names::ANALYSIS_DONE)
    }

    fn run(&self, ctx: &Context) -> Result<String> {
        // no marker without a workflow; the run waits for [Pipelines] to be fixed:
        let pipeline = ctx.run.pipeline()?;
        let projects = ctx.projects()?;
        let pool = Pool::fail_fast(self.name(), ctx.config.concurrency.limit(self.name()));
        pool.run(&projects, |project: &String| analyze(ctx, project, pipeline))?;
        Ok(String::new())
    }
}

fn analyze(ctx: &Context, project: &str, pipeline: &str) -> Result<()> {
    let output = ctx.output()?;
    let date = ctx.run.run_date();
    let scratch = &ctx.config.paths.scratch_dir;
    let dir = paths::analysis_dir(scratch, project, date);
    let log = ctx.log(&format!("analysis_{project}"));

    ctx.fs.create_dir(dir.join("src"))?;
    ctx.fs.create_dir(dir.join("data"))?;
    ctx.fs.replace_with_copy(
        &ctx.config.paths.workflow_dir,
        dir.join("src").join("gcf-workflows"),
    )?;

    let skip_fastq = if dir.join("data/raw/fastq").exists() {
        "--skip-create-fastq-dir"
    } else {
        ""
    };
    let vars = Vars::new()
        .with("runfolder", arg(output))
        .with("project", project)
        .with("libkit", arg(Path::new(&ctx.run.options().libprep)))
        .with("machine", arg(Path::new(ctx.config.sequencer_name(ctx.run.instrument()))))
        .with("pipeline", pipeline)
        .with("skip_fastq", skip_fastq);
    ctx.runner.run(&ctx.runner.cmd("configmaker", &vars)?.cwd(&dir), &log)?;
    ctx.runner.run(&ctx.runner.cmd_or("workflow", WORKFLOW, &vars)?.cwd(&dir), &log)?;

    copy_back(ctx, project, pipeline)
}

fn copy_back(ctx: &Context, project: &str, pipeline: &str) -> Result<()> {
    let output = ctx.output()?;
    let date = ctx.run.run_date();
    let scratch = &ctx.config.paths.scratch_dir;
    let results = paths::analysis_results(scratch, project, date, pipeline);
    let required = |path: &Path| -> Result<()> {
        if !path.exists() {
            return Err(Error::MissingOutput(path.to_string_lossy().into_owned()).into());
        }
        Ok(())
    };

    let report = results.join(format!("multiqc_{project}.html"));
    required(&report)?;
    ctx.fs.copy(&report, paths::multiqc_report(output, project, date))?;

    let summaries = ctx.fs.glob(results.join("summaries"), "all_samples*.html")?;
    if let Some(summary) = summaries.first() {
        ctx.fs.copy(summary, paths::single_cell_summary(output, project, date))?;
    }

    let sample_info = paths::analysis_dir(scratch, project, date).join("data/tmp/sample_info.tsv");
    required(&sample_info)?;
    ctx.fs.copy(&sample_info, paths::sample_info(output, project))?;

    let mqc_config = results.join(".multiqc_config.yaml");
    if mqc_config.exists() {
        ctx.fs.copy(&mqc_config, output.join(format!(".multiqc_config_{project}.yaml")))?;
    }

    ctx.fs.replace_with_copy(&results, paths::qc_dir(output, project).join("bfq"))?;
    Ok(())
}
