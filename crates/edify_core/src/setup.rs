use serde::Deserialize;

/// Permission bits in the `0<octal>` form edify's `set_perm` expects.
pub fn octal_mode(mode: u32) -> String {
    format!("0{:o}", mode)
}

/// A device-specific command appended right after the device assertion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum SetupStep {
    /// Extract an executable from the package and make it runnable.
    Tool {
        name: String,
        #[serde(default)]
        dest: Option<String>,
        #[serde(default)]
        uid: u32,
        #[serde(default)]
        gid: u32,
        #[serde(default = "default_tool_mode")]
        mode: u32,
    },
    Extract {
        source: String,
        dest: String,
    },
    Raw {
        line: String,
    },
}

fn default_tool_mode() -> u32 {
    0o777
}

impl SetupStep {
    pub fn tool(name: &str) -> Self {
        SetupStep::Tool {
            name: name.to_string(),
            dest: None,
            uid: 0,
            gid: 0,
            mode: default_tool_mode(),
        }
    }

    pub fn extract(source: &str, dest: &str) -> Self {
        SetupStep::Extract {
            source: source.to_string(),
            dest: dest.to_string(),
        }
    }

    pub fn raw(line: &str) -> Self {
        SetupStep::Raw { line: line.to_string() }
    }

    /// mke2fs, busybox and bmlunlock into /tmp, then the boot image.
    pub fn samsung_bml() -> Vec<SetupStep> {
        vec![
            SetupStep::tool("mke2fs"),
            SetupStep::tool("busybox"),
            SetupStep::tool("bmlunlock"),
            SetupStep::extract("boot.img", "/tmp/boot.img"),
        ]
    }

    /// Archive member this step reads from the package, if any.
    pub fn archive_member(&self) -> Option<&str> {
        match self {
            SetupStep::Tool { name, .. } => Some(name),
            SetupStep::Extract { source, .. } => Some(source),
            SetupStep::Raw { .. } => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            SetupStep::Tool { name, dest, uid, gid, mode } => {
                let dest = dest.clone().unwrap_or_else(|| format!("/tmp/{}", name));
                format!(
                    "package_extract_file(\"{}\", \"{}\");\nset_perm({}, {}, {}, \"{}\");",
                    name,
                    dest,
                    uid,
                    gid,
                    octal_mode(*mode),
                    dest
                )
            }
            SetupStep::Extract { source, dest } => {
                format!("package_extract_file(\"{}\", \"{}\");", source, dest)
            }
            SetupStep::Raw { line } => line.clone(),
        }
    }
}
