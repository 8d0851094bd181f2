use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use flowcell::StaticConfig;
use syntax::SampleSheet;
use util::format_duration;

use super::{Kind, Message, Notifier};
use crate::fs::{paths, Fs};
use crate::stages::Context;

const SUBJECT_PREFIX: &str = "[bfq]";
const GIB: f64 = (1u64 << 30) as f64;

const STYLE: &str = "<style>
table {
  border-collapse: collapse;
}
th {
  padding: 4px;
}
td {
  text-align:center;
}
table, th, td {
  border: 1px solid black;
}
</style>";

/// The message sent once a flowcell's fastqs, QC and reports are ready.
///
/// With `single_cell` false, single cell summaries are left out even for
/// kits that normally attach them.
pub fn finished(ctx: &Context, run_time: Duration, single_cell: bool) -> Result<Message> {
    let output = ctx.output()?;
    let run = ctx.run;
    let projects = ctx.projects()?;
    let joined = projects.join(", ");
    let user = run.options().user.trim();

    let mut body = String::with_capacity(4096);
    body.push_str("<html>\n<head>\n");
    body.push_str(STYLE);
    body.push_str("\n</head>\n<body>\n");
    let _ = writeln!(body, "<strong>Short summary for {}. </strong>\n<br>", escape(&joined));
    if !user.is_empty() && user != "N/A" {
        let _ = writeln!(body, "<strong>User: {} </strong>\n<br>", escape(user));
    }
    let _ = writeln!(body, "Flow cell: {} \n<br>", run.run_id());
    let sequencer = ctx.config.sequencer_name(run.instrument());
    let _ = writeln!(body, "Sequencer: {} \n<br>\n<br>", escape(sequencer));
    let _ = writeln!(body, "bfq run time: {} \n<br>", format_duration(run_time));
    body.push_str(&disk_space(ctx.config, ctx.fs));

    let interop = ctx.fs.read_to_string(output.join("Stats").join("interop_summary.csv"));
    let demux = ctx.fs.read_to_string(output.join("Stats").join("Demultiplex_Stats.csv"));
    match interop.ok().and_then(|i| lane_metrics(&i, demux.ok().as_deref())) {
        Some(table) => {
            body.push_str("\n<br><strong>Flowcell metrics </strong>\n<br>");
            body.push_str(&table);
        }
        None => body.push_str("Not able to generate table for flowcell metrics.\n<br>"),
    }

    body.push_str("<br>");
    body.push_str(&sample_sheet_summary(ctx, &projects));

    let notes = ctx.notes();
    if !notes.is_empty() {
        body.push_str("\n<br><strong>Problems</strong>\n<br>");
        for note in notes {
            let _ = writeln!(body, "{}\n<br>", escape(&note));
        }
    }
    body.push_str("\n</body>\n</html>");

    let date = run.run_date();
    let mut attachments: Vec<PathBuf> = Vec::with_capacity(projects.len() * 2 + 1);
    for project in &projects {
        attachments.push(paths::multiqc_report(output, project, date));
        if single_cell && run.policy().single_cell_reports {
            attachments.push(paths::single_cell_summary(output, project, date));
        }
    }
    attachments.push(paths::sequencer_stats(output, &projects));
    attachments.retain(|a| {
        let found = ctx.fs.exists(a);
        if !found {
            log::warn!("{}: {:?} not found; not attaching it", run.run_id(), a);
        }
        found
    });

    Ok(Message {
        kind: Kind::Finished,
        run_id: run.run_id().to_owned(),
        subject: format!("{SUBJECT_PREFIX} {joined} processed"),
        body,
        html: true,
        attachments,
    })
}

/// Send the finished message. Single cell summaries can make it too large
/// for the mail server, so for kits that attach them a failure is retried
/// once without them.
pub fn send_finished(notifier: &dyn Notifier, ctx: &Context, run_time: Duration) -> Result<()> {
    let msg = finished(ctx, run_time, true)?;
    match notifier.send(&msg) {
        Ok(()) => Ok(()),
        Err(e) if ctx.run.policy().single_cell_reports => {
            log::info!(
                "{}: finished message failed ({e:#}); retrying without single cell summaries",
                ctx.run.run_id()
            );
            notifier.send(&finished(ctx, run_time, false)?)
        }
        Err(e) => Err(e),
    }
}

/// The message sent once archives and their checksums are made.
pub fn finalized(ctx: &Context, finalize_time: Duration, run_time: Duration) -> Result<Message> {
    let joined = ctx.projects()?.join(", ");
    let body = format!(
        "{joined} has been finalized and prepared for delivery.\n\n\
         md5sum and 7zip runtime: {}\n\
         Total runtime for bfq: {}\n",
        format_duration(finalize_time),
        format_duration(run_time),
    );
    Ok(Message {
        kind: Kind::Finalized,
        run_id: ctx.run.run_id().to_owned(),
        subject: format!("{SUBJECT_PREFIX} {joined} finalized"),
        body,
        html: false,
        attachments: Vec::with_capacity(0),
    })
}

/// Report a failure; `summary` says what was going on at the time.
pub fn error(run_id: &str, summary: &str, err: &anyhow::Error) -> Message {
    Message {
        kind: Kind::Error,
        run_id: run_id.to_owned(),
        subject: format!("{SUBJECT_PREFIX} error processing {run_id}"),
        body: format!("{summary}\n\nError: {err:?}\n"),
        html: false,
        attachments: Vec::with_capacity(0),
    }
}

/// Free space lines for the output dir and every instrument root.
pub fn disk_space(config: &StaticConfig, fs: &Fs) -> String {
    let mut out = String::with_capacity(256);
    let mut line = |label: &str, path: &std::path::Path| match fs.disk_space(path) {
        Ok((free, total)) => {
            let (free, total) = (free as f64 / GIB, total as f64 / GIB);
            let pct = if total > 0.0 { 100.0 * free / total } else { 0.0 };
            let _ = writeln!(
                out,
                "Current free space for {label}: {free:.0} of {total:.0} GiB ({pct:5.2}%)\n<br>"
            );
        }
        Err(e) => log::warn!("unable to read free space for {label}: {e:#}"),
    };
    line("output", &config.paths.output_dir);
    for root in &config.paths.instrument_roots {
        line("instruments", root);
    }
    out.push_str("<br>\n");
    out
}

/// How many samples the sample sheet lists for each project.
fn sample_sheet_summary(ctx: &Context, projects: &[String]) -> String {
    let text = match ctx.run.sample_sheet() {
        Ok(sheet) => ctx.fs.read_to_string(sheet),
        Err(e) => Err(e.into()),
    };
    let counts = text.ok().and_then(|text| {
        let sheet = SampleSheet::parse(&text).ok()?;
        let data = sheet.data().ok()??;
        let project_col = data.values("Sample_Project");
        let id_col = data.values("Sample_ID");
        let mut counts: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (i, project) in project_col.iter().enumerate() {
            let id = id_col.get(i).copied().unwrap_or_default();
            let id = if id.is_empty() { i.to_string() } else { id.to_owned() };
            counts.entry(project.to_string()).or_default().insert(id);
        }
        Some(counts)
    });
    let Some(counts) = counts else {
        return "Not able to read the sample sheet.\n<br>".to_owned();
    };

    let mut out = String::from("<strong>Sample sheet info</strong>\n<br>");
    for project in projects {
        let n = counts.get(project).map(BTreeSet::len).unwrap_or(0);
        let _ = writeln!(
            out,
            "<strong>{project}</strong>: Found {n} samples in samplesheet.\n<br>"
        );
    }
    out
}

#[derive(Debug)]
struct LaneRow {
    lane: String,
    density: f64,
    cluster_pf: f64,
    reads: f64,
    aligned: f64,
    q30: f64,
}

/// Per-lane table (html) from `interop_summary --csv=1` output: density,
/// clusters passing filter, reads, PhiX and Q30 for each non-index read,
/// plus the undetermined share per lane when converter stats are given.
/// `None` if the summary can't be read.
pub fn lane_metrics(interop: &str, demux: Option<&str>) -> Option<String> {
    // the per-read tables follow the first blank line and one more header line:
    let lines: Vec<&str> = interop
        .lines()
        .skip_while(|l| !l.trim().is_empty())
        .skip(2)
        .collect();

    let mut starts = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("Read") && !line.contains(',') {
            starts.push(i);
        } else if line.starts_with("Extracted") {
            starts.push(i);
            break;
        }
    }

    let mut reads: Vec<Vec<LaneRow>> = Vec::new();
    for w in starts.windows(2) {
        if lines[w[0]].trim_end().ends_with("(I)") {
            continue;
        }
        reads.push(read_section(&lines[w[0] + 1..w[1]])?);
    }
    let first = reads.first().filter(|r| !r.is_empty())?;
    let undetermined = demux.and_then(undetermined_by_lane);

    let mut header = vec![
        "Lane",
        "Density",
        "% Cluster PF",
        "Total Reads (M)",
        "% PhiX",
        if reads.len() > 1 { "R1 %>=Q30" } else { "%>=Q30" },
    ];
    if reads.len() > 1 {
        header.push("R2 %>=Q30");
    }
    if undetermined.is_some() {
        header.push("% Undetermined");
    }

    let mut out = String::from("<table border=\"1\">\n<tr>");
    for h in header {
        let _ = write!(out, "<th>{}</th>", escape(h));
    }
    out.push_str("</tr>\n");
    for (i, row) in first.iter().enumerate() {
        let mut cells = vec![
            row.lane.clone(),
            format!("{:.2}", row.density),
            format!("{:.2}", row.cluster_pf),
            format!("{:.2}", row.reads),
            format!("{:.2}", row.aligned),
            format!("{:.2}", row.q30),
        ];
        if let Some(r2) = reads.get(1) {
            cells.push(r2.get(i).map(|r| format!("{:.2}", r.q30)).unwrap_or_default());
        }
        if let Some(undetermined) = &undetermined {
            let pct = undetermined.get(&row.lane);
            cells.push(pct.map(|p| format!("{p:.2}")).unwrap_or_default());
        }
        out.push_str("<tr>");
        for cell in cells {
            let _ = write!(out, "<td>{}</td>", escape(&cell));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
    Some(out)
}

/// Lane-level rows (surface `-`) of one read's table.
fn read_section(lines: &[&str]) -> Option<Vec<LaneRow>> {
    let text = lines.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers().ok()?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);
    let (lane, surface) = (col("Lane")?, col("Surface")?);
    let (density, pf, reads, aligned, q30) = (
        col("Density")?,
        col("Cluster PF")?,
        col("Reads")?,
        col("Aligned")?,
        col("%>=Q30")?,
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.ok()?;
        if record.get(surface)?.trim() != "-" {
            continue;
        }
        rows.push(LaneRow {
            lane: record.get(lane)?.trim().to_owned(),
            density: first_number(record.get(density)?)?,
            cluster_pf: first_number(record.get(pf)?)?,
            reads: first_number(record.get(reads)?)?,
            aligned: first_number(record.get(aligned)?)?,
            q30: first_number(record.get(q30)?)?,
        });
    }
    Some(rows)
}

/// `2829 +/- 47` -> 2829.0
fn first_number(field: &str) -> Option<f64> {
    field.split_whitespace().next()?.parse().ok()
}

/// Percentage of undetermined reads per lane, from the converter's
/// `Demultiplex_Stats.csv`.
fn undetermined_by_lane(demux: &str) -> Option<BTreeMap<String, f64>> {
    let mut reader = csv::Reader::from_reader(demux.as_bytes());
    let headers = reader.headers().ok()?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);
    let (lane, sample, reads) = (col("Lane")?, col("SampleID")?, col("# Reads")?);

    let mut totals: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for record in reader.records() {
        let record = record.ok()?;
        let n: f64 = record.get(reads)?.trim().parse().ok()?;
        let entry = totals.entry(record.get(lane)?.trim().to_owned()).or_default();
        entry.0 += n;
        if record.get(sample)?.trim() == "Undetermined" {
            entry.1 += n;
        }
    }
    Some(
        totals
            .into_iter()
            .filter(|(_, (total, _))| *total > 0.0)
            .map(|(lane, (total, undetermined))| (lane, 100.0 * undetermined / total))
            .collect(),
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
