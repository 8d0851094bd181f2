use std::path::{Path, PathBuf};

use anyhow::Result;

use flowcell::Vars;
use pool::Pool;

use super::{arg, Context, Stage};
use crate::fs::paths;

const MD5SUM_FASTQ: &str =
    "find {project} -type f -name '*.fastq.gz' | sort | xargs -r md5sum > {checksum}";
const MD5SUM_ARCHIVE: &str = "md5sum {archive} > {checksum}";

/// `md5sum_<project>_fastq.txt` for every project.
///
/// No marker: a checksum file is redone whenever any fastq of its project
/// is newer than it.
pub struct FastqChecksum;

/// `md5sum_<archive>_archive.txt` for every `.7za` in the output dir.
pub struct ArchiveChecksum;

#[derive(Debug)]
struct Job {
    /// project name or archive path, as the command expects it
    subject: String,
    checksum: PathBuf,
}

impl Stage for FastqChecksum {
    fn name(&self) -> &'static str {
        "checksum"
    }

    fn marker(&self) -> Option<&'static str> {
        None
    }

    fn run(&self, ctx: &Context) -> Result<String> {
        let output = ctx.output()?;
        let mut jobs = Vec::new();
        for project in ctx.projects()? {
            let checksum = paths::fastq_checksum(output, &project);
            if ctx.fs.is_current(&checksum, &ctx.project_fastqs(&project)?)? {
                log::debug!("{:?} is up to date", checksum);
                continue;
            }
            jobs.push(Job {
                subject: project,
                checksum,
            });
        }
        run_jobs(ctx, self.name(), &jobs, |job| {
            let vars = Vars::new()
                .with("project", &job.subject)
                .with("checksum", arg(&job.checksum));
            ctx.runner.cmd_or("md5sum_fastq", MD5SUM_FASTQ, &vars)
        })
    }
}

impl Stage for ArchiveChecksum {
    fn name(&self) -> &'static str {
        "archive checksum"
    }

    fn marker(&self) -> Option<&'static str> {
        None
    }

    fn run(&self, ctx: &Context) -> Result<String> {
        let mut jobs = Vec::new();
        for archive in ctx.fs.glob(ctx.output()?, "*.7za")? {
            let checksum = paths::archive_checksum(&archive);
            if ctx.fs.is_current(&checksum, [&archive])? {
                continue;
            }
            jobs.push(Job {
                subject: arg(&archive),
                checksum,
            });
        }
        run_jobs(ctx, "checksum", &jobs, |job| {
            let vars = Vars::new()
                .with("archive", &job.subject)
                .with("checksum", arg(&job.checksum));
            ctx.runner.cmd_or("md5sum_archive", MD5SUM_ARCHIVE, &vars)
        })
    }
}

/// Run each job in the output dir. A failed job's partial checksum file is
/// removed so it can't pass for current next time.
fn run_jobs<F>(ctx: &Context, stage: &str, jobs: &[Job], cmd: F) -> Result<String>
where
    F: Fn(&Job) -> Result<crate::exec::Cmd> + Sync,
{
    let output: &Path = ctx.output()?;
    let log = ctx.log("checksum");
    let pool = Pool::fail_fast(stage, ctx.config.concurrency.limit("checksum"));
    pool.run(jobs, |job: &Job| {
        let result = cmd(job).and_then(|cmd| ctx.runner.run(&cmd.cwd(output), &log));
        if result.is_err() {
            ctx.fs.delete(&job.checksum)?;
        }
        result
    })?;
    Ok(String::new())
}
