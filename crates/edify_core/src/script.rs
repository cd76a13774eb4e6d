use std::collections::BTreeSet;
use std::fmt;

/// The updater-script being assembled.
///
/// Every generator operation takes the script by `&mut` and appends to it.
/// An entry may span several lines; rendering joins entries with newlines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    entries: Vec<String>,
    mounts: BTreeSet<String>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::trace!(entry = %entry, "append");
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mounts(&self) -> impl Iterator<Item = &str> {
        self.mounts.iter().map(String::as_str)
    }

    pub(crate) fn record_mount(&mut self, mount_point: &str) {
        self.mounts.insert(mount_point.to_string());
    }

    pub(crate) fn take_mounts(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.mounts)
    }

    pub fn render(&self) -> String {
        let mut out = self.entries.join("\n");
        out.push('\n');
        out
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
