use crate::error::AcquireError;
use std::path::Path;

pub const DEFAULT_MIRRORS: &[&str] = &["https://github.com/pokt-network/pocket-core/archive/"];

const OUT_PLACEHOLDER: &str = "{out}";
const SRC_PLACEHOLDER: &str = "{src}";

/// Command that turns an extracted source tree into a binary.
///
/// `{out}` is replaced with the output binary path and `{src}` with the
/// source root. The command runs with the source root as working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecipe {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for BuildRecipe {
    fn default() -> Self {
        Self {
            program: "go".to_string(),
            args: ["build", "-o", OUT_PLACEHOLDER, "./app/cmd/pocket_core"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl BuildRecipe {
    /// Splits a command line on whitespace. Returns `None` for an empty line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn render(&self, out: &Path, src: &Path) -> Vec<String> {
        let out = out.to_string_lossy();
        let src = src.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(OUT_PLACEHOLDER, &out).replace(SRC_PLACEHOLDER, &src))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AcquireConfig {
    /// Base URLs, each joined directly with `<version><archive_ext>`.
    pub mirrors: Vec<String>,
    pub archive_ext: String,
    pub build: BuildRecipe,
    /// Fetch `<link>.sha256` and compare it with the archive digest.
    pub verify_checksum: bool,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            mirrors: DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect(),
            archive_ext: ".tar.gz".to_string(),
            build: BuildRecipe::default(),
            verify_checksum: false,
        }
    }
}

impl AcquireConfig {
    pub fn mirror_links(&self, version: &str) -> Result<Vec<String>, AcquireError> {
        if version.is_empty() {
            return Err(AcquireError::EmptyVersion);
        }
        if self.mirrors.is_empty() {
            return Err(AcquireError::NoMirrors);
        }
        Ok(self
            .mirrors
            .iter()
            .map(|mirror| format!("{mirror}{version}{}", self.archive_ext))
            .collect())
    }
}
