// RidiSync - RIDI Books Library Export
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Exporting decrypted books
//!
//! # Per Book
//! 1. Derive the session key and decrypt (blocking pool)
//! 2. Name the output `<title>.<ext>`, or `<id>.<ext>` without a title
//! 3. Pick a free name in the output directory and write the bytes as-is
//!
//! A failing book is reported and skipped; it never stops a batch.

use crate::book::{BookAsset, FileKind};
use crate::crypto::{decrypt_content, derive_session_key};
use crate::error::Result;
use crate::file::paths::{avoid_collision, sanitize_filename};
use crate::metadata::extract_title;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Export state of one book
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Processing,
    Success(PathBuf),
    Failed(String),
}

/// Progress event emitted while exporting
#[derive(Debug, Clone)]
pub struct ExportProgress {
    pub book_id: String,
    /// Source file name (`<id>.<ext>`)
    pub file_name: String,
    pub status: ExportStatus,
}

/// A book that could not be exported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome of a batch export
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub success: usize,
    pub total: usize,
    pub failures: Vec<ExportFailure>,
}

impl ExportSummary {
    pub fn all_succeeded(&self) -> bool {
        self.success == self.total
    }
}

/// Writes decrypted books into one output directory
#[derive(Debug)]
pub struct ExportService {
    output_dir: PathBuf,
}

impl ExportService {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Export a single book
    ///
    /// # Arguments
    /// * `asset` - Book to export
    /// * `device_id` - Device the library was downloaded with
    /// * `on_progress` - Receives `Processing`, then `Success` or `Failed`
    ///
    /// # Returns
    /// Path of the written file
    ///
    /// # Errors
    /// Any key derivation, decryption or write failure for this book
    pub async fn export_book<F>(
        &self,
        asset: &BookAsset,
        device_id: &str,
        on_progress: &mut F,
    ) -> Result<PathBuf>
    where
        F: FnMut(&ExportProgress),
    {
        let file_name = asset.file_name(FileKind::Book);
        let mut emit = |status: ExportStatus| {
            on_progress(&ExportProgress {
                book_id: asset.id().to_string(),
                file_name: file_name.clone(),
                status,
            })
        };

        emit(ExportStatus::Processing);

        match self.write_book(asset, device_id).await {
            Ok(path) => {
                info!(book_id = asset.id(), path = %path.display(), "exported");
                emit(ExportStatus::Success(path.clone()));
                Ok(path)
            }
            Err(e) => {
                warn!(book_id = asset.id(), error = %e, "export failed");
                emit(ExportStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Export books one after another
    ///
    /// Failures are collected into the summary instead of returned.
    pub async fn export_books<F>(
        &self,
        books: &[BookAsset],
        device_id: &str,
        mut on_progress: F,
    ) -> ExportSummary
    where
        F: FnMut(&ExportProgress),
    {
        let mut summary = ExportSummary {
            total: books.len(),
            ..Default::default()
        };

        for book in books {
            match self.export_book(book, device_id, &mut on_progress).await {
                Ok(_) => summary.success += 1,
                Err(e) => summary.failures.push(ExportFailure {
                    id: book.id().to_string(),
                    reason: e.user_message(),
                }),
            }
        }

        info!(success = summary.success, total = summary.total, "batch export finished");
        summary
    }

    async fn write_book(&self, asset: &BookAsset, device_id: &str) -> Result<PathBuf> {
        let (content, title) = decrypt_with_title(asset.clone(), device_id.to_string()).await?;
        let name = output_file_name(asset, title.as_deref());

        fs::create_dir_all(&self.output_dir).await?;
        let target = avoid_collision(&self.output_dir.join(name))?;
        fs::write(&target, &content).await?;

        Ok(target)
    }
}

/// Decrypt a book and read its title on the blocking pool
pub async fn decrypt_with_title(
    asset: BookAsset,
    device_id: String,
) -> Result<(Vec<u8>, Option<String>)> {
    tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, Option<String>)> {
        let key = derive_session_key(&asset, &device_id)?;
        let content = decrypt_content(&asset, &key)?;
        let title = extract_title(asset.format(), &content);
        Ok((content, title))
    })
    .await?
}

/// Output file name for a book
pub fn output_file_name(asset: &BookAsset, title: Option<&str>) -> String {
    match title {
        Some(title) => format!("{}.{}", sanitize_filename(title), asset.format().extension()),
        None => asset.file_name(FileKind::Book),
    }
}
