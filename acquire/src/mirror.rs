use crate::Acquire;
use crate::archive::{extract_tar_gz, parse_checksum, source_root};
use crate::config::AcquireConfig;
use crate::error::AcquireError;
use async_trait::async_trait;
use cutover_core::{Layout, UpgradeInfo, check_binary, escape_upgrade_name};
use cutover_install::{InstallOptions, install};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;

const SOURCE_DIR: &str = "src";
const BUILD_DIR: &str = "build";

/// Downloads source archives from a list of mirrors, then installs the
/// prebuilt or freshly built binary under `upgrades/`.
#[derive(Debug, Clone)]
pub struct MirrorAcquirer {
    layout: Layout,
    config: AcquireConfig,
    client: Client,
}

impl MirrorAcquirer {
    pub fn new(layout: Layout, config: AcquireConfig) -> Result<Self, AcquireError> {
        let client = Client::builder()
            .user_agent(concat!("cutover/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            layout,
            config,
            client,
        })
    }

    fn scratch_dir(&self, upgrade: &UpgradeInfo) -> PathBuf {
        self.layout
            .downloads_dir()
            .join(escape_upgrade_name(&upgrade.name))
    }

    /// Installs the binary contained in (or built from) an already downloaded
    /// archive.
    pub async fn install_archive(
        &self,
        upgrade: &UpgradeInfo,
        archive: &Path,
    ) -> Result<(), AcquireError> {
        let scratch = self.scratch_dir(upgrade);
        reset_dir(&scratch).await?;

        let result = self.install_from(upgrade, archive, &scratch).await;
        cleanup(&scratch).await;
        result
    }

    async fn install_from(
        &self,
        upgrade: &UpgradeInfo,
        archive: &Path,
        scratch: &Path,
    ) -> Result<(), AcquireError> {
        let extracted = scratch.join(SOURCE_DIR);
        tokio::fs::create_dir_all(&extracted).await?;

        let (archive_path, target) = (archive.to_path_buf(), extracted.clone());
        tokio::task::spawn_blocking(move || extract_tar_gz(&archive_path, &target)).await??;

        let root = source_root(&extracted)?;
        let binary = match self.prebuilt(&root, &extracted) {
            Some(prebuilt) => {
                tracing::info!(upgrade = %upgrade.name, binary = ?prebuilt, "Using prebuilt binary");
                prebuilt
            }
            None => self.build(upgrade, &root, &scratch.join(BUILD_DIR)).await?,
        };

        let dst = self.layout.upgrade_bin(&upgrade.name);
        let opts = InstallOptions::atomic().mkdir_all();
        let (src, dst_path) = (binary.clone(), dst.clone());
        tokio::task::spawn_blocking(move || install(&src, &dst_path, &opts)).await??;

        check_binary(&dst)?;
        tracing::info!(upgrade = %upgrade.name, binary = ?dst, "Installed upgrade binary");
        Ok(())
    }

    fn prebuilt(&self, root: &Path, extracted: &Path) -> Option<PathBuf> {
        [root, extracted]
            .into_iter()
            .map(|dir| dir.join("bin").join(self.layout.name()))
            .find(|candidate| {
                std::fs::symlink_metadata(candidate).is_ok_and(|meta| meta.file_type().is_file())
            })
    }

    async fn build(
        &self,
        upgrade: &UpgradeInfo,
        root: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf, AcquireError> {
        tokio::fs::create_dir_all(out_dir).await?;
        let out = out_dir.join(self.layout.name());
        let recipe = &self.config.build;
        let args = recipe.render(&out, root);

        tracing::info!(
            upgrade = %upgrade.name,
            program = %recipe.program,
            args = ?args,
            src = ?root,
            "Building upgrade binary"
        );

        let status = tokio::process::Command::new(&recipe.program)
            .args(&args)
            .current_dir(root)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| AcquireError::BuildSpawn {
                program: recipe.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(AcquireError::Build {
                program: recipe.program.clone(),
                status: status.to_string(),
            });
        }
        if !out.is_file() {
            return Err(AcquireError::NotProduced(out));
        }
        Ok(out)
    }

    /// Streams the archive into `<dest>.part`, hashing it on the way, and
    /// renames it to `dest` once the body is complete and verified.
    async fn download(&self, link: &str, dest: &Path) -> Result<(), AcquireError> {
        let response = self.client.get(link).send().await?;
        if !response.status().is_success() {
            return Err(AcquireError::Download {
                url: link.to_string(),
                status: response.status(),
            });
        }

        let part = part_path(dest);
        let result = self.stream_to(link, response, &part, dest).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        result
    }

    async fn stream_to(
        &self,
        link: &str,
        response: reqwest::Response,
        part: &Path,
        dest: &Path,
    ) -> Result<(), AcquireError> {
        let mut file = tokio::fs::File::create(part).await?;
        let mut hasher = Sha256::new();
        let stream = response.bytes_stream();
        tokio::pin!(stream);
        let mut size = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.sync_all().await?;
        drop(file);

        let digest = hex::encode(hasher.finalize());
        tracing::debug!(link = %link, size, digest = %digest, "Downloaded archive");

        if self.config.verify_checksum {
            self.verify(link, &digest).await?;
        }
        tokio::fs::rename(part, dest).await?;
        Ok(())
    }

    async fn verify(&self, link: &str, actual: &str) -> Result<(), AcquireError> {
        let url = format!("{link}.sha256");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AcquireError::Download {
                url,
                status: response.status(),
            });
        }
        let body = response.text().await?;
        let expected = parse_checksum(&body).ok_or_else(|| AcquireError::ChecksumFormat(url))?;
        if expected != actual {
            return Err(AcquireError::ChecksumMismatch {
                expected,
                actual: actual.to_string(),
            });
        }
        tracing::debug!(link = %link, digest = %actual, "Checksum verified");
        Ok(())
    }

    /// Tries every mirror in order and keeps the first archive that downloads.
    async fn fetch(&self, upgrade: &UpgradeInfo, dest: &Path) -> Result<(), AcquireError> {
        let links = self.config.mirror_links(&upgrade.version)?;
        let mut last = None;

        for link in links {
            tracing::info!(upgrade = %upgrade.name, link = %link, "Downloading upgrade");
            match self.download(&link, dest).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(link = %link, error = %e, "Mirror failed");
                    last = Some(e.to_string());
                }
            }
        }

        Err(AcquireError::AllMirrorsFailed {
            version: upgrade.version.clone(),
            last: last.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Acquire for MirrorAcquirer {
    async fn acquire(&self, upgrade: &UpgradeInfo) -> Result<(), AcquireError> {
        let bin = self.layout.upgrade_bin(&upgrade.name);
        if check_binary(&bin).is_ok() {
            tracing::debug!(upgrade = %upgrade.name, binary = ?bin, "Upgrade binary already installed");
            return Ok(());
        }

        let scratch = self.scratch_dir(upgrade);
        reset_dir(&scratch).await?;

        let archive = scratch.join(format!("archive{}", self.config.archive_ext));
        let result = match self.fetch(upgrade, &archive).await {
            Ok(()) => self.install_from(upgrade, &archive, &scratch).await,
            Err(e) => Err(e),
        };
        cleanup(&scratch).await;
        result
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

async fn reset_dir(dir: &Path) -> Result<(), AcquireError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

async fn cleanup(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        tracing::warn!(dir = ?dir, error = %e, "Failed to remove scratch directory");
    }
}
