use colored::Colorize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// label, error count, and the first failure
    #[error("{0} failed due to {1} errors, first: {2}")]
    AggregatedErrors(String, usize, String),
    #[error("{0}: a worker thread panicked")]
    WorkerPanicked(String),
    #[error("{0}: unable to start worker threads")]
    Build(String, #[source] rayon::ThreadPoolBuildError),
}

/// Failures collected from the items of one pool run.
#[derive(Debug)]
pub struct Errors {
    errors: Vec<(String, anyhow::Error)>,
}

impl Default for Errors {
    fn default() -> Self {
        Self {
            // we don't mind reallocating if we're already in an error state:
            errors: Vec::with_capacity(0),
        }
    }
}

impl Errors {
    pub fn add(&mut self, item: String, e: anyhow::Error) {
        log::trace!("{item}: {e:?}");
        self.errors.push((item, e));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// (item label, error) pairs, in item order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &anyhow::Error)> {
        self.errors.iter().map(|(item, e)| (item.as_str(), e))
    }

    /// Print full list of errors to stderr, fail w/ an aggregated error
    /// if there were one or more errors.
    pub fn print_recap(&self, label: &str) -> Result<(), Error> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            eprintln!("\nEncountered errors while {label}:\n");
            for (item, e) in &self.errors {
                eprintln!("{} {item}: {e:?}\n", "ERROR".red());
            }
            let first = self
                .errors
                .first()
                .map(|(item, e)| format!("{item}: {e:#}"))
                .unwrap_or_default();
            Err(Error::AggregatedErrors(label.to_owned(), self.errors.len(), first))
        }
    }
}
