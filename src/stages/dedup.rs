use anyhow::Result;

use flowcell::{names, Vars};
use pool::Pool;

use super::{arg, Context, ReadPair, Stage};

/// Remove duplicate reads, one pool item per read pair.
///
/// The `dedup` command must replace its input files in place.
pub struct Dedup;

impl Stage for Dedup {
    fn name(&self) -> &'static str {
        "dedup"
    }

    fn marker(&self) -> Option<&'static str> {
        Some(names::DEDUP_DONE)
    }

    fn run(&self, ctx: &Context) -> Result<String> {
        if !ctx.run.policy().deduplicate || !ctx.runner.has("dedup") {
            log::info!("{}: deduplication not needed", ctx.run.run_id());
            return Ok(String::new());
        }
        let output = ctx.output()?;
        let pairs = ctx.read_pairs()?;
        let log = ctx.log(self.name());
        let pool = Pool::fail_fast(self.name(), ctx.config.concurrency.limit(self.name()));
        pool.run(&pairs, |pair: &ReadPair| {
            let vars = Vars::new()
                .with("r1", arg(&pair.r1))
                .with("r2", pair.r2.as_deref().map(arg).unwrap_or_default());
            let cmd = ctx.runner.cmd("dedup", &vars)?.cwd(output);
            ctx.runner.run(&cmd, &log)
        })?;
        Ok(String::new())
    }
}

#[cfg(test)]
mod test {
    use super::super::testing::Fixture;
    use super::*;
    use std::fs;

    #[test]
    fn test_dedup_each_pair() -> Result<()> {
        let fx = Fixture::new("[Commands]\ndedup = echo {r1} {r2} >> calls\n")?;
        let a1 = fx.touch("GCF-2024-001/a_R1.fastq.gz")?;
        let a2 = fx.touch("GCF-2024-001/a_R2.fastq.gz")?;
        let b1 = fx.touch("GCF-2024-001/b_R1.fastq.gz")?;
        Dedup.run(&fx.ctx())?;

        let calls = fs::read_to_string(fx.output().join("calls"))?;
        let mut calls: Vec<&str> = calls.lines().map(str::trim).collect();
        calls.sort();
        let expected = [
            format!("{} {}", a1.display(), a2.display()),
            b1.display().to_string(),
        ];
        assert_eq!(expected.to_vec(), calls);
        Ok(())
    }

    #[test]
    fn test_not_configured() -> Result<()> {
        let fx = Fixture::new("")?;
        fx.touch("GCF-2024-001/a_R1.fastq.gz")?;
        assert_eq!("", Dedup.run(&fx.ctx())?);
        Ok(())
    }

    #[test]
    fn test_one_failure_fails_stage() -> Result<()> {
        let fx = Fixture::new("[Commands]\ndedup = case {r1} in *b_R1*) false;; esac\n")?;
        fx.touch("GCF-2024-001/a_R1.fastq.gz")?;
        fx.touch("GCF-2024-001/b_R1.fastq.gz")?;
        assert!(Dedup.run(&fx.ctx()).is_err());
        Ok(())
    }
}
