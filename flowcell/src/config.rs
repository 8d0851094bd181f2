use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use syntax::{parse_ini, Ini, IniSection};
use util::HashMap;

use crate::{names, Error, Template};

/// Instrument id → file the instrument writes once a run is fully copied.
pub const DEFAULT_COMPLETION_FILES: &[(&str, &str)] = &[
    ("SN7001334", "ImageAnalysis_Netcopy_complete.txt"),
    ("NB501038", "RunCompletionStatus.xml"),
    ("M026575", "ImageAnalysis_Netcopy_complete.txt"),
    ("M03942", "ImageAnalysis_Netcopy_complete.txt"),
    ("M05617", "ImageAnalysis_Netcopy_complete.txt"),
    ("M71102", "ImageAnalysis_Netcopy_complete.txt"),
    ("K00251", "SequencingComplete.txt"),
    ("A01990", "CopyComplete.txt"),
    ("MN00686", "CopyComplete.txt"),
];

const DEFAULT_WORKFLOW_DIR: &str = "/opt/gcf-workflows";
const SECONDS_PER_HOUR: f64 = 60.0 * 60.0;

/// `[Paths]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub instrument_roots: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub report_dir: PathBuf,
    /// holds the ledger file
    pub manager_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub workflow_dir: PathBuf,
}

/// `[System]`
#[derive(Debug, Clone, PartialEq)]
pub struct System {
    pub sleep: Duration,
    pub min_space_gib: f64,
    /// `None` means external tools may run forever
    pub tool_timeout: Option<Duration>,
    pub force_bcl2fastq: bool,
    pub test_fixture: bool,
}

/// `[Concurrency]`: a per-item cost for each pooled stage, out of `total_slots`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concurrency {
    pub total_slots: usize,
    costs: HashMap<String, usize>,
}

/// `[Email]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Email {
    pub host: String,
    pub from_address: String,
    pub finished_to: Vec<String>,
    pub error_to: Vec<String>,
    /// reads a complete MIME message on stdin
    pub command: Option<String>,
}

/// Everything read from the config file. Built once, then only borrowed.
#[derive(Debug, Clone)]
pub struct StaticConfig {
    pub paths: Paths,
    pub system: System,
    pub concurrency: Concurrency,
    pub email: Email,
    commands: HashMap<String, Template>,
    versions: HashMap<String, String>,
    instruments: Vec<(String, String)>,
    sequencers: HashMap<String, String>,
    pipelines: HashMap<String, String>,
}

impl Concurrency {
    pub fn new(total_slots: usize) -> Self {
        Self {
            total_slots,
            costs: HashMap::default(),
        }
    }

    pub fn with_cost(mut self, stage: &str, cost: usize) -> Self {
        self.costs.insert(stage.to_owned(), cost);
        self
    }

    /// How many items of `stage` may run at once. Never less than one.
    pub fn limit(&self, stage: &str) -> usize {
        let cost = self.costs.get(stage).copied().unwrap_or(1).max(1);
        (self.total_slots / cost).max(1)
    }
}

impl StaticConfig {
    /// Read and parse the config file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        let config = Self::from_ini_str(&text).with_context(|| format!("loading config {:?}", path))?;
        Ok(config)
    }

    pub fn from_ini_str(text: &str) -> Result<Self, Error> {
        let ini = parse_ini(text)?;
        let commands = section_entries(&ini, "Commands")
            .map(|(k, v)| Ok((k.to_owned(), Template::new(k, v)?)))
            .collect::<Result<_, Error>>()?;
        let mut instruments: Vec<(String, String)> = section_entries(&ini, "Instruments")
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        if instruments.is_empty() {
            instruments = DEFAULT_COMPLETION_FILES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }

        Ok(Self {
            paths: paths(&ini)?,
            system: system(&ini)?,
            concurrency: concurrency(&ini)?,
            email: email(&ini),
            commands,
            versions: owned_map(&ini, "Version"),
            instruments,
            sequencers: owned_map(&ini, "Sequencers"),
            pipelines: owned_map(&ini, "Pipelines"),
        })
    }

    pub fn command(&self, name: &str) -> Result<&Template, Error> {
        self.commands
            .get(name)
            .ok_or_else(|| Error::UnknownCommand(name.to_owned()))
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Version string recorded alongside a converter; `unknown` if not configured.
    pub fn version(&self, tool: &str) -> &str {
        self.versions.get(tool).map(String::as_str).unwrap_or("unknown")
    }

    /// (instrument id, completion file name) pairs.
    pub fn instruments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.instruments.iter().map(|(i, f)| (i.as_str(), f.as_str()))
    }

    /// Human-readable sequencer name for an instrument id.
    pub fn sequencer_name(&self, instrument: &str) -> &str {
        self.sequencers
            .get(instrument)
            .map(String::as_str)
            .unwrap_or("Sequencer could not be automatically determined.")
    }

    pub fn pipeline_for(&self, libprep: &str) -> Option<&str> {
        self.pipelines.get(libprep.trim()).map(String::as_str)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.paths.manager_dir.join(names::LEDGER_FILE)
    }
}

fn section_entries<'a>(
    ini: &'a Ini<'a>,
    name: &str,
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    ini.section(name).into_iter().flat_map(|s: &'a IniSection<'a>| s.entries())
}

fn owned_map(ini: &Ini, name: &str) -> HashMap<String, String> {
    section_entries(ini, name)
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

fn required<'a>(ini: &Ini<'a>, section: &'static str, key: &'static str) -> Result<&'a str, Error> {
    ini.get(section, key)
        .filter(|v| !v.is_empty())
        .ok_or(Error::MissingConfigValue(section, key))
}

fn number<T: FromStr>(ini: &Ini, section: &'static str, key: &str, default: T) -> Result<T, Error> {
    match ini.get(section, key) {
        None | Some("") => Ok(default),
        Some(val) => val
            .parse()
            .map_err(|_| Error::InvalidConfigValue(section, key.to_owned(), val.to_owned())),
    }
}

fn flag(ini: &Ini, section: &'static str, key: &str) -> Result<bool, Error> {
    match ini.get(section, key).map(str::to_ascii_lowercase).as_deref() {
        None | Some("") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(val) => Err(Error::InvalidConfigValue(section, key.to_owned(), val.to_owned())),
    }
}

fn list(val: &str) -> impl Iterator<Item = &str> {
    val.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn paths(ini: &Ini) -> Result<Paths, Error> {
    const S: &str = "Paths";
    let instrument_roots: Vec<PathBuf> = match ini.get(S, "instrument_roots") {
        Some(roots) => list(roots).map(PathBuf::from).collect(),
        None => ["nova_baseDir", "ekista_baseDir"]
            .into_iter()
            .filter_map(|k| ini.get(S, k))
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .collect(),
    };
    if instrument_roots.is_empty() {
        return Err(Error::MissingConfigValue(S, "instrument_roots"));
    }

    let output_dir = PathBuf::from(required(ini, S, "outputDir")?);
    let log_dir = PathBuf::from(required(ini, S, "logDir")?);
    let optional = |key, default: &Path| {
        ini.get(S, key)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default.to_path_buf())
    };

    Ok(Paths {
        report_dir: optional("reportDir", &log_dir),
        manager_dir: optional("managerDir", &output_dir),
        scratch_dir: optional("scratchDir", &std::env::temp_dir()),
        workflow_dir: optional("workflowDir", Path::new(DEFAULT_WORKFLOW_DIR)),
        instrument_roots,
        output_dir,
        log_dir,
    })
}

fn system(ini: &Ini) -> Result<System, Error> {
    const S: &str = "System";
    let sleep_hours: f64 = number(ini, S, "sleeptime", 1.0)?;
    let timeout_minutes: f64 = number(ini, S, "tool_timeout", 0.0)?;
    if sleep_hours < 0.0 || timeout_minutes < 0.0 {
        let (key, val) = if sleep_hours < 0.0 {
            ("sleeptime", sleep_hours)
        } else {
            ("tool_timeout", timeout_minutes)
        };
        return Err(Error::InvalidConfigValue(S, key.to_owned(), val.to_string()));
    }
    Ok(System {
        sleep: Duration::from_secs_f64(sleep_hours * SECONDS_PER_HOUR),
        min_space_gib: number(ini, S, "minspace", 0.0)?,
        tool_timeout: (timeout_minutes > 0.0).then(|| Duration::from_secs_f64(timeout_minutes * 60.0)),
        force_bcl2fastq: flag(ini, S, "force_bcl2fastq")?,
        test_fixture: flag(ini, S, "test_fixture")?,
    })
}

fn concurrency(ini: &Ini) -> Result<Concurrency, Error> {
    const S: &str = "Concurrency";
    let default_slots = std::thread::available_parallelism().map_or(1, |n| n.get());
    let mut conc = Concurrency::new(number(ini, S, "total_slots", default_slots)?);
    for (key, _) in section_entries(ini, S) {
        if key.eq_ignore_ascii_case("total_slots") {
            continue;
        }
        let cost: usize = number(ini, S, key, 1)?;
        conc = conc.with_cost(&key.to_ascii_lowercase(), cost);
    }
    Ok(conc)
}

fn email(ini: &Ini) -> Email {
    const S: &str = "Email";
    let get = |key| ini.get(S, key).unwrap_or_default().to_owned();
    let addrs = |key| -> Vec<String> {
        list(ini.get(S, key).unwrap_or_default())
            .map(str::to_owned)
            .collect()
    };
    Email {
        host: get("host"),
        from_address: get("from_address"),
        finished_to: addrs("finished_to"),
        error_to: addrs("error_to"),
        command: ini.get(S, "command").filter(|c| !c.is_empty()).map(str::to_owned),
    }
}
