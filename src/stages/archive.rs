use std::path::PathBuf;

use anyhow::Result;

use flowcell::{names, Vars};
use pool::Pool;

use super::{arg, Context, Stage};
use crate::exec::{quote_all, Cmd};
use crate::fs::paths;

const PASSWORD: &str = "xkcdpass -n 5 -d '-' -v '[a-z]'";
const ARCHIVE: &str = "7za a {password_opt} {archive} {sources}";
const ARCHIVE_QC: &str = "7z a -l {password_opt} {archive} {sources}";

/// Holds the password while the archiver runs, so it never shows up in a logged command line.
const PASSWORD_ENV: &str = "BFQ_ARCHIVE_PASSWORD";
const PASSWORD_OPT: &str = "-p\"$BFQ_ARCHIVE_PASSWORD\"";

/// Two delivery archives per project: the data (`<p>_<date>.7za`)
/// and the QC output (`QC_<p>_<date>.7za`).
///
/// Sensitive runs get a fresh password per archive, written next to it as
/// `encryption.<name>`.
pub struct Archive;

impl Stage for Archive {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn marker(&self) -> Option<&'static str> {
        Some(names::ARCHIVE_DONE)
    }

    fn run(&self, ctx: &Context) -> Result<String> {
        let projects = ctx.projects()?;
        let pool = Pool::fail_fast(self.name(), ctx.config.concurrency.limit(self.name()));
        pool.run(&projects, |project: &String| {
            archive_data(ctx, project)?;
            archive_qc(ctx, project)
        })?;
        Ok(String::new())
    }
}

fn archive_data(ctx: &Context, project: &str) -> Result<()> {
    let output = ctx.output()?;
    let mut sources = vec![output.join(project)];
    for name in ["Stats", "Reports"] {
        sources.push(output.join(name));
    }
    sources.extend(ctx.fs.glob(output, "Undetermined*.fastq.gz")?);
    sources.push(paths::sample_info(output, project));
    sources.push(output.join(names::SAMPLE_SHEET));
    sources.push(output.join(names::SUBMISSION_FORM));
    sources.push(paths::fastq_checksum(output, project));
    if ctx.run.policy().archive_flowcell_dir {
        sources.push(output.join(ctx.run.flowcell_id()));
    }
    sources.retain(|s| ctx.fs.exists(s));

    make_archive(ctx, "archive", ARCHIVE, project, &sources)
}

/// The workflow's results in scratch space, or the copy in the output dir
/// if scratch has been cleaned up.
fn archive_qc(ctx: &Context, project: &str) -> Result<()> {
    let output = ctx.output()?;
    let mut sources: Vec<PathBuf> = Vec::with_capacity(1);
    if let Ok(pipeline) = ctx.run.pipeline() {
        let scratch = &ctx.config.paths.scratch_dir;
        let results = paths::analysis_results(scratch, project, ctx.run.run_date(), pipeline);
        if results.exists() {
            sources.push(results);
        }
    }
    if sources.is_empty() {
        let qc = paths::qc_dir(output, project);
        if qc.exists() {
            sources.push(qc);
        }
    }
    if sources.is_empty() {
        ctx.note(format!("no QC output to archive for {project}"));
        return Ok(());
    }
    let name = format!("{}{project}", names::QC_PREFIX);
    make_archive(ctx, "archive_qc", ARCHIVE_QC, &name, &sources)
}

fn make_archive(
    ctx: &Context,
    tool: &str,
    default: &str,
    name: &str,
    sources: &[PathBuf],
) -> Result<()> {
    let output = ctx.output()?;
    let archive = paths::archive(output, name, ctx.run.run_date());
    ctx.fs.delete(&archive)?;

    let password = if ctx.run.options().sensitive_data {
        Some(new_password(ctx, name)?)
    } else {
        None
    };
    let vars = Vars::new()
        .with("archive", arg(&archive))
        .with("sources", quote_all(sources))
        .with("password_opt", if password.is_some() { PASSWORD_OPT } else { "" });
    let mut cmd: Cmd = ctx.runner.cmd_or(tool, default, &vars)?.cwd(output);
    if let Some(password) = &password {
        cmd = cmd.env(PASSWORD_ENV, password);
    }
    log::info!("{}: archiving {:?}", ctx.run.run_id(), archive);
    ctx.runner.run(&cmd, &ctx.log("archive"))
}

/// Make a password and store it in `encryption.<name>`.
fn new_password(ctx: &Context, name: &str) -> Result<String> {
    let cmd = ctx.runner.cmd_or("password", PASSWORD, &Vars::new())?;
    let password = ctx.runner.capture(&cmd)?;
    let file = paths::password_file(ctx.output()?, name);
    ctx.fs.write_file(&file, &format!("{password}\n"))?;
    Ok(password)
}
