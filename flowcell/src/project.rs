use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static PROJECT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^GCF-[0-9]{4}-[0-9]{3,}").expect("valid project id regex"));

/// The project identifier at the start of a single path component, if any.
pub fn project_id(component: &str) -> Option<&str> {
    PROJECT_ID.find(component).map(|m| m.as_str())
}

/// All project identifiers appearing as a path component of any of `paths`.
pub fn project_names<'a, I>(paths: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut names = BTreeSet::new();
    for path in paths {
        for component in path.components() {
            if let Some(id) = component.as_os_str().to_str().and_then(project_id) {
                names.insert(id.to_owned());
            }
        }
    }
    names
}
