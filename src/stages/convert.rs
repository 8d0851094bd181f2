use std::path::Path;

use anyhow::Result;

use flowcell::{names, ConverterFamily, Vars};

use super::{arg, Context, Stage};
use crate::exec::Cmd;
use crate::fs::paths;

/// Written by bcl2fastq when two samples' barcodes are too close
/// for the default mismatch tolerance.
const BARCODE_COLLISION: &str = "<bcl2fastq::layout::BarcodeCollisionError>";
const STRICT_BARCODES: &str = "--barcode-mismatches 0";

const BCL_CONVERT: &str = "bcl-convert --force --bcl-input-directory {run_dir} \
    --output-directory {output} --sample-sheet {sample_sheet} \
    --bcl-sampleproject-subdirectories true --no-lane-splitting true \
    --output-legacy-stats true";
const BCL2FASTQ: &str = "bcl2fastq --sample-sheet {sample_sheet} -o {output} \
    -R {run_dir} --interop-dir {output}/InterOp";
const MKFASTQ: &str = "cellranger mkfastq --output-dir={output} \
    --sample-sheet={sample_sheet} --run={run_dir}";

/// Demultiplex the run folder into per-sample fastqs.
pub struct Convert;

/// Which converter runs, and what goes in the marker.
struct Converter {
    tool: &'static str,
    default: &'static str,
    /// recorded in `bcl.done`
    name: &'static str,
    version_key: &'static str,
    retry_on_collision: bool,
}

impl Converter {
    fn choose(ctx: &Context) -> Self {
        match ctx.run.policy().converter {
            ConverterFamily::TenX(kit) => Self {
                tool: kit.mkfastq_command(),
                default: MKFASTQ,
                name: "cellranger mkfastq",
                version_key: "cellranger",
                retry_on_collision: false,
            },
            ConverterFamily::Illumina if ctx.config.system.force_bcl2fastq => Self {
                tool: "bcl2fastq",
                default: BCL2FASTQ,
                name: "bcl2fastq",
                version_key: "bcl2fastq",
                retry_on_collision: true,
            },
            ConverterFamily::Illumina => Self {
                tool: "bcl-convert",
                default: BCL_CONVERT,
                name: "bcl-convert",
                version_key: "bcl-convert",
                retry_on_collision: false,
            },
        }
    }
}

impl Stage for Convert {
    fn name(&self) -> &'static str {
        "convert"
    }

    fn marker(&self) -> Option<&'static str> {
        Some(names::CONVERT_DONE)
    }

    fn run(&self, ctx: &Context) -> Result<String> {
        let output = ctx.output()?;
        let flowcell = ctx.run.flowcell_path()?;
        let log = paths::conversion_log(&ctx.config.paths.log_dir, ctx.run.run_id());

        ctx.fs.create_dir(output)?;
        ctx.fs.create_parent_dir(&log)?;
        let interop = flowcell.join("InterOp");
        if interop.is_dir() {
            ctx.fs.copy(&interop, output.join("InterOp"))?;
        }

        let converter = Converter::choose(ctx);
        let vars = Vars::new()
            .with("run_dir", arg(flowcell))
            .with("output", arg(output))
            .with("sample_sheet", arg(ctx.run.sample_sheet()?));
        let cmd = ctx
            .runner
            .cmd_or(converter.tool, converter.default, &vars)?
            .cwd(output)
            .truncate_log();

        if let Err(e) = ctx.runner.run(&cmd, &log) {
            if !(converter.retry_on_collision && has_barcode_collision(ctx, &log)) {
                return Err(e);
            }
            log::warn!(
                "{}: barcode collision, retrying with {STRICT_BARCODES}",
                ctx.run.run_id()
            );
            let retry: Cmd = cmd.with_args(STRICT_BARCODES);
            ctx.runner.run(&retry, &log)?;
        }

        link_legacy_stats(ctx, output)?;

        let version = ctx.config.version(converter.version_key);
        Ok(format!("{}\t{}", converter.name, version))
    }
}

fn has_barcode_collision(ctx: &Context, log: &Path) -> bool {
    ctx.fs
        .read_to_string(log)
        .map(|text| text.contains(BARCODE_COLLISION))
        .unwrap_or(false)
}

/// bcl-convert puts bcl2fastq-style stats under Reports/legacy; reports expect them in Stats.
fn link_legacy_stats(ctx: &Context, output: &Path) -> Result<()> {
    let legacy = output.join("Reports").join("legacy").join("Stats");
    let stats = output.join("Stats");
    if legacy.is_dir() && !ctx.fs.exists(&stats) {
        ctx.fs.symlink(Path::new("Reports/legacy/Stats"), &stats)?;
    }
    Ok(())
}
