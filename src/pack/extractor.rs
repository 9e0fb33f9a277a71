use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::reader::ArchiveReader;

/// Map an entry name onto a path below `root`.
///
/// Entry names always use `/` separators. Absolute names, drive prefixes and
/// `..` components are refused so that extraction cannot escape `root`. With
/// `junk_paths` only the final component is kept.
pub fn output_path(root: &Path, name: &str, junk_paths: bool) -> Result<PathBuf> {
    let relative = Path::new(name);
    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::UnsafePath(name.to_string()));
            }
        }
    }

    if junk_paths {
        clean = match clean.file_name() {
            Some(base) => PathBuf::from(base),
            None => return Err(Error::UnsafePath(name.to_string())),
        };
    }
    if clean.as_os_str().is_empty() {
        return Err(Error::UnsafePath(name.to_string()));
    }

    Ok(root.join(clean))
}

/// Writes pack entries to disk or to a stream
pub struct PackExtractor<'a, R: ReadAt + ?Sized> {
    reader: &'a ArchiveReader<R>,
}

impl<'a, R: ReadAt + ?Sized> PackExtractor<'a, R> {
    pub fn new(reader: &'a ArchiveReader<R>) -> Self {
        Self { reader }
    }

    /// Extract entry data to memory
    pub async fn extract_to_memory(&self, name: &str) -> Result<Vec<u8>> {
        self.reader.read(name).await
    }

    /// Extract entry to disk, creating parent directories as needed
    pub async fn extract_to_file(&self, name: &str, output_path: &Path) -> Result<()> {
        // Decode first so a failed entry leaves no partial file behind
        let data = self.extract_to_memory(name).await?;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::File::create(output_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        Ok(())
    }

    /// Extract entry to any async writer
    pub async fn extract_to_writer<W: AsyncWrite + Unpin>(
        &self,
        name: &str,
        writer: &mut W,
    ) -> Result<()> {
        let data = self.extract_to_memory(name).await?;
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Extract entry to stdout
    pub async fn extract_to_stdout(&self, name: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        self.extract_to_writer(name, &mut stdout).await
    }
}
