use std::path::PathBuf;

use anyhow::Result;

use flowcell::{names, Vars};
use pool::Pool;

use super::{arg, Context, Error, ReadPair, Stage};
use crate::fs::paths;

const READ_QUALITY: &str = "fastqc";
const CONTAMINATION: &str = "fastq_screen";

/// Adapter trimming and decontamination (in place, all must succeed),
/// then read quality and contamination reports (failures tolerated).
pub struct Qc;

#[derive(Debug)]
struct Report {
    tool: &'static str,
    project: String,
    fastq: PathBuf,
}

impl Stage for Qc {
    fn name(&self) -> &'static str {
        "qc"
    }

    fn marker(&self) -> Option<&'static str> {
        Some(names::QC_DONE)
    }

    fn run(&self, ctx: &Context) -> Result<String> {
        let pairs = ctx.read_pairs()?;
        let options = ctx.run.options();
        let limit = ctx.config.concurrency.limit(self.name());
        let log = ctx.log(self.name());

        if options.trim_adapter && ctx.runner.has("trim") {
            Pool::fail_fast("trim", limit).run(&pairs, |pair: &ReadPair| {
                let vars = pair_vars(pair)
                    .with("adapter", &options.adapter)
                    .with("adapter2", &options.adapter_read2);
                ctx.runner.run_tool("trim", &vars, &log)
            })?;
        }
        if options.remove_human_reads {
            if ctx.run.policy().allow_decontamination && ctx.runner.has("decontaminate") {
                Pool::fail_fast("decontaminate", limit).run(&pairs, |pair: &ReadPair| {
                    let vars = pair_vars(pair).with("organism", &options.organism);
                    ctx.runner.run_tool("decontaminate", &vars, &log)
                })?;
            } else {
                ctx.note(format!(
                    "human read removal was requested but is not available for \"{}\"",
                    options.libprep
                ));
            }
        }

        let reports = reports(ctx, &pairs);
        if reports.is_empty() {
            return Ok(String::new());
        }
        let output = ctx.output()?;
        let summary = Pool::tolerant("read qc", limit).run(&reports, |report: &Report| {
            let outdir = paths::qc_dir(output, &report.project).join(report.tool);
            ctx.fs.create_dir(&outdir)?;
            let vars = Vars::new()
                .with("input", arg(&report.fastq))
                .with("outdir", arg(&outdir));
            ctx.runner.run_tool(report.tool, &vars, &log)
        })?;
        for (item, e) in summary.failures.iter() {
            ctx.note(format!("QC failed for {item}: {e:#}"));
        }

        if ctx.runner.has(READ_QUALITY) {
            for project in ctx.projects()? {
                let outdir = paths::qc_dir(output, &project).join(READ_QUALITY);
                if !ctx.fs.exists(&outdir) || ctx.fs.glob(&outdir, "*")?.is_empty() {
                    return Err(Error::MissingQcOutput(project).into());
                }
            }
        }
        Ok(String::new())
    }
}

fn pair_vars(pair: &ReadPair) -> Vars {
    Vars::new()
        .with("r1", arg(&pair.r1))
        .with("r2", pair.r2.as_deref().map(arg).unwrap_or_default())
}

/// Read quality for every fastq; contamination screen on R1 only, unless the kit skips it.
fn reports(ctx: &Context, pairs: &[ReadPair]) -> Vec<Report> {
    let screen = ctx.runner.has(CONTAMINATION) && !ctx.run.policy().skip_single_read_qc;
    let quality = ctx.runner.has(READ_QUALITY);
    let mut reports = Vec::new();
    for pair in pairs {
        let Some(project) = ctx.project_of(&pair.r1) else {
            continue;
        };
        if quality {
            for fastq in pair.files() {
                reports.push(Report {
                    tool: READ_QUALITY,
                    project: project.clone(),
                    fastq: fastq.clone(),
                });
            }
        }
        if screen {
            reports.push(Report {
                tool: CONTAMINATION,
                project: project.clone(),
                fastq: pair.r1.clone(),
            });
        }
    }
    reports
}
