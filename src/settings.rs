use std::path::{Path, PathBuf};

use anyhow::Result;

use flowcell::StaticConfig;

use crate::args::{Args, ManagerArgs};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Config file {0:?} does not exist")]
    NoConfigFile(PathBuf),
}

/// Settings are like Args, except the config file has been loaded and the
/// command-line overrides applied to it.
#[derive(Debug)]
pub struct Settings {
    pub config: StaticConfig,
    pub config_path: PathBuf,
    pub verbose: u8,
    pub once: bool,
    pub log_file: Option<PathBuf>,
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let mut config = load(&args.config)?;

        // flags and env switches only ever turn these on:
        config.system.force_bcl2fastq |= args.force_bcl2fastq;
        config.system.test_fixture |= args.test_fixture;
        if let Some(scratch) = args.scratch_dir {
            config.paths.scratch_dir = scratch;
        }

        Ok(Self {
            config,
            config_path: args.config,
            verbose: args.verbose,
            once: args.once,
            log_file: args.log_file,
        })
    }
}

/// Loaded config for the management tool.
pub fn manager_config(args: &ManagerArgs) -> Result<StaticConfig> {
    load(&args.config)
}

fn load(path: &Path) -> Result<StaticConfig> {
    if !path.exists() {
        return Err(Error::NoConfigFile(path.to_path_buf()).into());
    }
    StaticConfig::load(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;
    use std::fs;

    #[test]
    fn test_overrides() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ini = dir.path().join("bfq.ini");
        fs::write(
            &ini,
            "[Paths]\ninstrument_roots = /seq\noutputDir = /out\nlogDir = /logs\n\
             scratchDir = /scratch\n",
        )?;
        let ini_arg = ini.to_string_lossy().into_owned();

        let args = Args::try_parse_from(["bfq", "-c", &ini_arg, "--scratch-dir", "/fast"])?;
        let settings = Settings::try_from(args)?;
        assert_eq!(PathBuf::from("/fast"), settings.config.paths.scratch_dir);

        let args = Args::try_parse_from(["bfq", "-c", &ini_arg, "--force-bcl2fastq"])?;
        let settings = Settings::try_from(args)?;
        assert!(settings.config.system.force_bcl2fastq);
        assert!(!settings.config.system.test_fixture);

        let args = Args::try_parse_from(["bfq", "-c", "/no/such.ini"])?;
        assert!(Settings::try_from(args).is_err());
        Ok(())
    }
}
