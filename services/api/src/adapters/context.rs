//! services/api/src/adapters/context.rs
//!
//! This module contains the filesystem adapter for per-subject study material.
//! It implements the `SubjectContextService` port from the `core` crate: each
//! subject maps to a PDF syllabus and a plain-text notes file under one
//! directory, and a load succeeds only when both are readable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tutor_core::domain::SubjectContext;
use tutor_core::ports::{PortError, PortResult, SubjectContextService};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A filesystem adapter that implements the `SubjectContextService` port.
#[derive(Clone)]
pub struct FsContextAdapter {
    dir: PathBuf,
}

impl FsContextAdapter {
    /// Creates a new `FsContextAdapter` rooted at `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

/// Derives the file-name stem for a subject: spaces become underscores and
/// slashes become hyphens so every catalogue entry maps to a safe file name.
fn subject_file_stem(subject: &str) -> String {
    subject.replace(' ', "_").replace('/', "-")
}

fn missing(path: &Path) -> PortError {
    PortError::NotFound(format!("File not found: {}", path.display()))
}

//=========================================================================================
// `SubjectContextService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SubjectContextService for FsContextAdapter {
    /// All-or-nothing load: both files are checked before either is read, so
    /// a missing notes file never yields a half-activated subject.
    async fn load(&self, subject: &str) -> PortResult<SubjectContext> {
        let stem = subject_file_stem(subject);
        let syllabus_path = self.dir.join(format!("syl_{}.pdf", stem));
        let notes_path = self.dir.join(format!("con_{}.txt", stem));

        if !syllabus_path.exists() {
            return Err(missing(&syllabus_path));
        }
        if !notes_path.exists() {
            return Err(missing(&notes_path));
        }

        // PDF extraction is CPU-bound and blocking.
        let syllabus = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text(&syllabus_path)
                .map_err(|e| PortError::Unexpected(format!("Error reading PDF file: {}", e)))
        })
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))??;

        let notes = tokio::fs::read_to_string(&notes_path)
            .await
            .map_err(|e| PortError::Unexpected(format!("Error reading text file: {}", e)))?;

        Ok(SubjectContext { syllabus, notes })
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_names_map_to_safe_file_stems() {
        assert_eq!(subject_file_stem("Mathematics"), "Mathematics");
        assert_eq!(
            subject_file_stem("Human and Social Biology"),
            "Human_and_Social_Biology"
        );
        assert_eq!(subject_file_stem("Maths/Stats"), "Maths-Stats");
    }

    #[tokio::test]
    async fn missing_syllabus_aborts_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FsContextAdapter::new(dir.path().to_path_buf());

        let result = adapter.load("Mathematics").await;
        assert!(matches!(result, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_notes_aborts_before_any_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("syl_Mathematics.pdf"), b"not a real pdf").unwrap();
        let adapter = FsContextAdapter::new(dir.path().to_path_buf());

        // The notes check runs before PDF extraction, so the bogus PDF is
        // never touched.
        let result = adapter.load("Mathematics").await;
        assert!(matches!(result, Err(PortError::NotFound(_))));
    }
}
