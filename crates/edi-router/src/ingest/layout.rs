//! Managed directory layout

use std::path::{Path, PathBuf};

use super::ProcessingState;

pub const DEFAULT_INCOMING_DIR: &str = "incoming";
pub const DEFAULT_PROCESSING_DIR: &str = "processing";
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";
pub const DEFAULT_ERROR_DIR: &str = "errors";

/// The four directories a file moves between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub incoming: PathBuf,
    pub processing: PathBuf,
    pub archive: PathBuf,
    pub errors: PathBuf,
}

impl DirectoryLayout {
    /// Layout with the default sub-directory names under `base`
    pub fn under(base: impl AsRef<Path>) -> Self {
        Self::with_names(
            base,
            DEFAULT_INCOMING_DIR,
            DEFAULT_PROCESSING_DIR,
            DEFAULT_ARCHIVE_DIR,
            DEFAULT_ERROR_DIR,
        )
    }

    pub fn with_names(
        base: impl AsRef<Path>,
        incoming: &str,
        processing: &str,
        archive: &str,
        errors: &str,
    ) -> Self {
        let base = base.as_ref();
        Self {
            incoming: base.join(incoming),
            processing: base.join(processing),
            archive: base.join(archive),
            errors: base.join(errors),
        }
    }

    pub fn dir_for(&self, state: ProcessingState) -> &Path {
        match state {
            ProcessingState::Incoming => &self.incoming,
            ProcessingState::Processing => &self.processing,
            ProcessingState::Archived => &self.archive,
            ProcessingState::Errored => &self.errors,
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [&self.incoming, &self.processing, &self.archive, &self.errors]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_base() {
        let layout = DirectoryLayout::under("/data/edi");
        assert_eq!(layout.incoming, PathBuf::from("/data/edi/incoming"));
        assert_eq!(layout.dir_for(ProcessingState::Errored), Path::new("/data/edi/errors"));
        assert_eq!(layout.all().len(), 4);
    }
}
