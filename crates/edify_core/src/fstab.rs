use crate::error::{EdifyError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    Mtd,
    Emmc,
    Bml,
}

impl PartitionType {
    pub fn from_fs_type(fs_type: &str) -> Result<Self> {
        match fs_type {
            "yaffs2" | "mtd" => Ok(PartitionType::Mtd),
            "ext2" | "ext3" | "ext4" | "emmc" | "vfat" => Ok(PartitionType::Emmc),
            "bml" | "rfs" => Ok(PartitionType::Bml),
            other => Err(EdifyError::UnknownFsType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionType::Mtd => "MTD",
            PartitionType::Emmc => "EMMC",
            PartitionType::Bml => "BML",
        }
    }
}

impl fmt::Display for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FstabEntry {
    pub mount_point: String,
    pub fs_type: String,
    pub device: String,
    #[serde(default)]
    pub device2: Option<String>,
    #[serde(default)]
    /// Negative values reserve space at the end of the partition.
    pub length: i64,
}

impl FstabEntry {
    pub fn partition_type(&self) -> Result<PartitionType> {
        PartitionType::from_fs_type(&self.fs_type)
    }
}

/// Partitions keyed by mount point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fstab {
    entries: BTreeMap<String, FstabEntry>,
}

impl Fstab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a v1 `recovery.fstab`:
    /// `<mount_point> <fs_type> <device> [<device2>] [<options>]`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut fstab = Fstab::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            fstab.insert(parse_line(idx + 1, line)?);
        }
        Ok(fstab)
    }

    pub fn insert(&mut self, entry: FstabEntry) {
        self.entries.insert(entry.mount_point.clone(), entry);
    }

    pub fn get(&self, mount_point: &str) -> Result<&FstabEntry> {
        self.entries
            .get(mount_point)
            .ok_or_else(|| EdifyError::UnknownMountPoint(mount_point.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FstabEntry> {
        self.entries.values()
    }
}

impl FromIterator<FstabEntry> for Fstab {
    fn from_iter<I: IntoIterator<Item = FstabEntry>>(iter: I) -> Self {
        let mut fstab = Fstab::new();
        for entry in iter {
            fstab.insert(entry);
        }
        fstab
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<FstabEntry> {
    let pieces: Vec<&str> = line.split_whitespace().collect();
    if !(3..=5).contains(&pieces.len()) {
        return Err(EdifyError::FstabParse {
            line: line_no,
            reason: format!("malformed entry \"{}\"", line),
        });
    }

    let mut entry = FstabEntry {
        mount_point: pieces[0].to_string(),
        fs_type: pieces[1].to_string(),
        device: pieces[2].to_string(),
        device2: None,
        length: 0,
    };

    let options = match pieces.get(3) {
        Some(p) if p.starts_with('/') => {
            entry.device2 = Some(p.to_string());
            pieces.get(4).copied()
        }
        Some(p) if pieces.len() == 4 => Some(*p),
        Some(_) => {
            return Err(EdifyError::FstabParse {
                line: line_no,
                reason: format!("unexpected field after options in \"{}\"", line),
            });
        }
        None => None,
    };

    for opt in options.into_iter().flat_map(|o| o.split(',')) {
        if let Some(len) = opt.strip_prefix("length=") {
            entry.length = len.parse().map_err(|_| EdifyError::FstabParse {
                line: line_no,
                reason: format!("bad length \"{}\"", len),
            })?;
        } else {
            tracing::warn!(mount_point = %entry.mount_point, option = opt, "unknown fstab option");
        }
    }

    Ok(entry)
}
