use std::fmt;
use std::path::Path;

use crate::TransferError;
use crate::source::{ContentSource, FileSource};

/// Immutable description of one upload.
pub struct FileInfo {
    /// Identifier of the destination folder.
    pub folder_id: String,
    /// Name of the item to create.
    pub name: String,
    /// Exact number of bytes the source yields.
    pub size: u64,
    /// Where the bytes come from.
    pub source: Box<dyn ContentSource>,
}

impl FileInfo {
    pub fn new(
        folder_id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        source: impl ContentSource + 'static,
    ) -> Self {
        Self {
            folder_id: folder_id.into(),
            name: name.into(),
            size,
            source: Box::new(source),
        }
    }

    /// Describes a local file, taking its size from the filesystem.
    ///
    /// `name` defaults to the file name of `path`.
    pub async fn from_path(
        folder_id: impl Into<String>,
        path: &Path,
        name: Option<String>,
    ) -> Result<Self, TransferError> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(TransferError::InvalidName(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        let name = match name {
            Some(name) => name,
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))?,
        };
        Ok(Self::new(folder_id, name, metadata.len(), FileSource::new(path)))
    }
}

impl fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfo")
            .field("folder_id", &self.folder_id)
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
