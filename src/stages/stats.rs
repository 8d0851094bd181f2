use std::path::Path;

use anyhow::Result;

use flowcell::{names, Vars};

use super::{arg, Context, Error, Stage};
use crate::fs::paths;

const INTEROP_SUMMARY: &str = "interop_summary {output} --csv=1 > {dest}";
const INTEROP_INDEX_SUMMARY: &str = "interop_index-summary {output} --csv=1 > {dest}";
const MULTIQC: &str = "multiqc -f {stats_dir} --filename {report} --title {title} {modules}";

/// Sequencer run metrics: run parameters, interop summaries and the
/// sequencer stats report.
pub struct Stats;

impl Stage for Stats {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn marker(&self) -> Option<&'static str> {
        Some(names::STATS_DONE)
    }

    fn run(&self, ctx: &Context) -> Result<String> {
        let output = ctx.output()?;
        let flowcell = ctx.run.flowcell_path()?;
        let stats_dir = output.join("Stats");
        let log = ctx.log(self.name());
        ctx.fs.create_dir(&stats_dir)?;

        let run_info = flowcell.join("RunInfo.xml");
        if !run_info.exists() {
            return Err(Error::MissingOutput(run_info.to_string_lossy().into_owned()).into());
        }
        ctx.fs.copy(&run_info, output.join("RunInfo.xml"))?;
        // newer instruments write runParameters.xml
        let params = ctx.fs.glob(flowcell, "[Rr]unParameters.xml")?;
        let Some(params) = params.first() else {
            let missing = flowcell.join("RunParameters.xml");
            return Err(Error::MissingOutput(missing.to_string_lossy().into_owned()).into());
        };
        ctx.fs.copy(params, output.join("RunParameters.xml"))?;

        for (tool, default, csv) in [
            ("interop_summary", INTEROP_SUMMARY, "interop_summary.csv"),
            ("interop_index_summary", INTEROP_INDEX_SUMMARY, "interop_index-summary.csv"),
        ] {
            let vars = Vars::new()
                .with("output", arg(output))
                .with("dest", arg(&stats_dir.join(csv)));
            let cmd = ctx.runner.cmd_or(tool, default, &vars)?.cwd(output);
            ctx.runner.run(&cmd, &log)?;
        }

        let projects = ctx.projects()?;
        let vars = Vars::new()
            .with("stats_dir", arg(&stats_dir))
            .with("report", arg(&paths::sequencer_stats(output, &projects)))
            .with("title", arg(Path::new(&projects.join(", "))))
            .with("modules", modules(ctx));
        let cmd = ctx.runner.cmd_or("multiqc", MULTIQC, &vars)?.cwd(&stats_dir);
        ctx.runner.run(&cmd, &log)?;
        Ok(String::new())
    }
}

/// Report modules matching the converter's stats layout.
fn modules(ctx: &Context) -> &'static str {
    let system = &ctx.config.system;
    let legacy_fixture = system.test_fixture
        && ctx
            .output()
            .map(|o| !o.join("Stats").join("Demultiplex_Stats.csv").exists())
            .unwrap_or(false);
    if system.force_bcl2fastq || legacy_fixture {
        if legacy_fixture && !system.force_bcl2fastq {
            log::info!("test flowcell was made with bcl2fastq, using its report modules");
        }
        "-m interop -m bcl2fastq"
    } else {
        "-m interop -m bclconvert"
    }
}

#[cfg(test)]
mod test {
    use super::super::testing::Fixture;
    use super::*;
    use std::fs;

    const TOOLS: &str = "[Commands]\n\
        interop_summary = echo Lane,Reads > {dest}\n\
        interop_index_summary = touch {dest}\n\
        multiqc = echo {modules} > {report}\n";

    fn flowcell_files(fx: &Fixture) -> Result<()> {
        fs::write(fx.flowcell().join("RunInfo.xml"), "<RunInfo/>")?;
        fs::write(fx.flowcell().join("runParameters.xml"), "<RunParameters/>")?;
        Ok(())
    }

    #[test]
    fn test_stats() -> Result<()> {
        let fx = Fixture::new(TOOLS)?;
        flowcell_files(&fx)?;
        fx.touch("GCF-2024-001/a_R1.fastq.gz")?;
        fx.touch("GCF-2024-002/b_R1.fastq.gz")?;
        Stats.run(&fx.ctx())?;

        let out = fx.output();
        assert!(out.join("RunInfo.xml").exists());
        assert!(out.join("RunParameters.xml").exists());
        assert_eq!("Lane,Reads\n", fs::read_to_string(out.join("Stats/interop_summary.csv"))?);
        assert!(out.join("Stats/interop_index-summary.csv").exists());
        let report = out.join("Stats/sequencer_stats_GCF-2024-001_GCF-2024-002.html");
        assert_eq!("-m interop -m bclconvert\n", fs::read_to_string(report)?);
        Ok(())
    }

    #[test]
    fn test_legacy_fixture_modules() -> Result<()> {
        let fx = Fixture::new(&format!("[System]\ntest_fixture = 1\n{TOOLS}"))?;
        flowcell_files(&fx)?;
        fx.touch("GCF-2024-001/a_R1.fastq.gz")?;
        Stats.run(&fx.ctx())?;
        let report = fx.output().join("Stats/sequencer_stats_GCF-2024-001.html");
        assert_eq!("-m interop -m bcl2fastq\n", fs::read_to_string(report)?);
        Ok(())
    }

    #[test]
    fn test_missing_run_info() -> Result<()> {
        let fx = Fixture::new(TOOLS)?;
        assert!(Stats.run(&fx.ctx()).is_err());
        Ok(())
    }
}
