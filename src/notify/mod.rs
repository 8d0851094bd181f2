use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use base64::Engine;

use flowcell::{StaticConfig, Template, Vars};

use crate::exec::{quote, Cmd, Runner};
use crate::fs::{paths, Fs};

/// Finished, finalized and error messages
mod report;
pub use report::{error, finalized, send_finished};

const BASE64_LINE: usize = 76;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Finished,
    Finalized,
    Error,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::Finalized => "finalized",
            Self::Error => "error",
        }
    }
}

/// A message about one flowcell.
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: Kind,
    pub run_id: String,
    pub subject: String,
    pub body: String,
    pub html: bool,
    pub attachments: Vec<PathBuf>,
}

/// Sends messages about flowcells to the people running the facility.
pub trait Notifier {
    fn send(&self, msg: &Message) -> Result<()>;
}

impl<N: Notifier + ?Sized> Notifier for std::rc::Rc<N> {
    fn send(&self, msg: &Message) -> Result<()> {
        (**self).send(msg)
    }
}

/// Saves every message under the report dir and, if `[Email] command` is
/// set, mails it by piping a MIME message into that command.
///
/// The command is a template; `{host}`, `{from}` and `{to}` are available.
#[derive(Debug, Clone)]
pub struct MailNotifier {
    config: StaticConfig,
    fs: Fs,
}

impl MailNotifier {
    pub fn new(config: StaticConfig, fs: Fs) -> Self {
        Self { config, fs }
    }

    fn recipients(&self, kind: Kind) -> &[String] {
        match kind {
            Kind::Finished => &self.config.email.finished_to,
            Kind::Finalized | Kind::Error => &self.config.email.error_to,
        }
    }

    /// Where the message body is kept.
    fn report_path(&self, msg: &Message) -> PathBuf {
        let report_dir = &self.config.paths.report_dir;
        match msg.kind {
            Kind::Error => paths::error_report(report_dir, &msg.run_id),
            kind => {
                let ext = if msg.html { "html" } else { "txt" };
                paths::message_report(report_dir, &msg.run_id, kind.as_str(), ext)
            }
        }
    }

    fn mail(&self, command: &str, msg: &Message) -> Result<()> {
        let to = self.recipients(msg.kind);
        if to.is_empty() {
            log::warn!("no recipients for {} messages; not mailing", msg.kind.as_str());
            return Ok(());
        }
        let email = &self.config.email;
        let mime = mime(&email.from_address, to, msg)?;
        let report_dir = &self.config.paths.report_dir;
        let eml = paths::message_report(report_dir, &msg.run_id, msg.kind.as_str(), "eml");
        self.fs.write_file(&eml, &mime)?;

        let vars = Vars::new()
            .with("host", &email.host)
            .with("from", &email.from_address)
            .with("to", to.join(","));
        let line = Template::new("mail", command)?.render(&vars)?;
        let cmd = Cmd::new("mail", format!("{line} < {}", quote(&eml)));
        let log = paths::stage_log(&self.config.paths.log_dir, &msg.run_id, "notify");
        Runner::new(&self.config, &self.fs).run(&cmd, &log)
    }
}

impl Notifier for MailNotifier {
    fn send(&self, msg: &Message) -> Result<()> {
        let report = self.report_path(msg);
        self.fs.create_parent_dir(&report)?;
        self.fs.write_file(&report, &msg.body)?;
        log::info!("{}: {} message saved to {:?}", msg.run_id, msg.kind.as_str(), report);

        match &self.config.email.command {
            Some(command) => self
                .mail(command, msg)
                .with_context(|| format!("mailing {} message for {}", msg.kind.as_str(), msg.run_id)),
            None => {
                log::debug!("no mail command configured");
                Ok(())
            }
        }
    }
}

/// A `multipart/mixed` message: the body, then each attachment in base64.
fn mime(from: &str, to: &[String], msg: &Message) -> Result<String> {
    let now = chrono::Local::now();
    let boundary = format!("=_bfq_{}", now.format("%Y%m%d%H%M%S%f"));
    let subtype = if msg.html { "html" } else { "plain" };

    let mut out = String::with_capacity(msg.body.len() + 1024);
    out.push_str(&format!("From: {from}\r\n"));
    out.push_str(&format!("To: {}\r\n", to.join(", ")));
    out.push_str(&format!("Subject: {}\r\n", msg.subject));
    out.push_str(&format!("Date: {}\r\n", now.to_rfc2822()));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str(&format!("Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n"));

    out.push_str(&format!("--{boundary}\r\n"));
    out.push_str(&format!("Content-Type: text/{subtype}; charset=\"utf-8\"\r\n"));
    out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
    out.push_str(&msg.body);
    out.push_str("\r\n");

    for file in &msg.attachments {
        out.push_str(&format!("--{boundary}\r\n"));
        out.push_str(&attachment(file)?);
    }
    out.push_str(&format!("--{boundary}--\r\n"));
    Ok(out)
}

fn attachment(file: &Path) -> Result<String> {
    let bytes = std::fs::read(file).with_context(|| format!("reading attachment {:?}", file))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2 + 256);
    out.push_str(&format!("Content-Type: application/octet-stream; name=\"{name}\"\r\n"));
    out.push_str("Content-Transfer-Encoding: base64\r\n");
    out.push_str(&format!("Content-Disposition: attachment; filename=\"{name}\"\r\n\r\n"));
    // base64 output is ascii, so byte chunks are valid str slices:
    for line in encoded.as_bytes().chunks(BASE64_LINE) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push_str("\r\n");
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    /// Keeps messages instead of sending them; fails any message whose
    /// attachments contain `fail_on`.
    #[derive(Default)]
    pub struct Recording {
        pub sent: RefCell<Vec<Message>>,
        pub fail_on: Option<&'static str>,
    }

    impl Notifier for Recording {
        fn send(&self, msg: &Message) -> Result<()> {
            if let Some(pat) = self.fail_on {
                if msg.attachments.iter().any(|a| a.to_string_lossy().contains(pat)) {
                    anyhow::bail!("message too large");
                }
            }
            self.sent.borrow_mut().push(msg.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn config(dir: &Path, email: &str) -> Result<StaticConfig> {
        let d = dir.display();
        Ok(StaticConfig::from_ini_str(&format!(
            "[Paths]\ninstrument_roots = {d}/seq\noutputDir = {d}/out\nlogDir = {d}/logs\n\
             reportDir = {d}/reports\n{email}\n"
        ))?)
    }

    fn message(kind: Kind, attachments: Vec<PathBuf>) -> Message {
        Message {
            kind,
            run_id: "240415_A01990_0345_BHXXXXXX".to_owned(),
            subject: "[bfq] GCF-2024-001 processed".to_owned(),
            body: "<strong>done</strong>".to_owned(),
            html: true,
            attachments,
        }
    }

    #[test]
    fn test_saved_without_mail_command() -> Result<()> {
        let dir = tempdir()?;
        let notifier = MailNotifier::new(config(dir.path(), "")?, Fs::new([dir.path()], false));
        notifier.send(&message(Kind::Finished, vec![]))?;
        let mut err = message(Kind::Error, vec![]);
        err.body = "convert stage failed".to_owned();
        notifier.send(&err)?;

        let reports = dir.path().join("reports");
        assert_eq!(
            "<strong>done</strong>",
            fs::read_to_string(reports.join("240415_A01990_0345_BHXXXXXX.finished.html"))?
        );
        assert_eq!(
            "convert stage failed",
            fs::read_to_string(reports.join("240415_A01990_0345_BHXXXXXX.error"))?
        );
        Ok(())
    }

    #[test]
    fn test_mail_command_gets_mime() -> Result<()> {
        let dir = tempdir()?;
        let d = dir.path().display();
        let email = format!(
            "[Email]\nhost = smtp.example.com\nfrom_address = bfq@example.com\n\
             finished_to = a@example.com, b@example.com\n\
             command = echo {{host}} {{to}} > {d}/mailed; cat >> {d}/mailed\n"
        );
        let notifier = MailNotifier::new(config(dir.path(), &email)?, Fs::new([dir.path()], false));
        let report = dir.path().join("multiqc_GCF-2024-001_240415.html");
        fs::write(&report, "<html>report</html>")?;
        notifier.send(&message(Kind::Finished, vec![report]))?;

        let mailed = fs::read_to_string(dir.path().join("mailed"))?;
        assert!(mailed.starts_with("smtp.example.com a@example.com,b@example.com\n"));
        assert!(mailed.contains("To: a@example.com, b@example.com\r\n"));
        assert!(mailed.contains("Content-Type: text/html"));
        assert!(mailed.contains("filename=\"multiqc_GCF-2024-001_240415.html\""));
        let encoded = base64::engine::general_purpose::STANDARD.encode("<html>report</html>");
        assert!(mailed.contains(&encoded));
        Ok(())
    }

    #[test]
    fn test_missing_attachment_fails() -> Result<()> {
        let dir = tempdir()?;
        let email = "[Email]\nfinished_to = a@example.com\ncommand = cat > /dev/null\n";
        let notifier = MailNotifier::new(config(dir.path(), email)?, Fs::new([dir.path()], false));
        let msg = message(Kind::Finished, vec![dir.path().join("nope.html")]);
        assert!(notifier.send(&msg).is_err());
        Ok(())
    }
}
