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


//! Book listing and selection
//!
//! Selection by name needs the title, which needs decryption. Those
//! operations take the device id and run the crypto on the blocking pool.

use crate::book::{discover_books, library_path, BookAsset, BookFormat, FileKind};
use crate::crypto::{decrypt_content, derive_session_key};
use crate::error::{RidiError, Result};
use crate::file::export::decrypt_with_title;
use crate::metadata::{extract_cover, extract_title};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Title shown for books without one
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// A book with its display metadata
#[derive(Debug, Clone, Serialize)]
pub struct BookSummary {
    pub id: String,
    pub format: BookFormat,
    pub title: String,
    /// `data:` URI, EPUB only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

/// Library queries for one account
#[derive(Debug, Default, Clone, Copy)]
pub struct BookService;

impl BookService {
    pub fn new() -> Self {
        Self
    }

    /// Downloaded books of an account
    ///
    /// # Errors
    /// - FileNotFound if the library folder does not exist
    /// - NoBooksFound if no book has its `.dat` key file
    pub fn available_books(&self, user_idx: &str) -> Result<Vec<BookAsset>> {
        let root = library_path(user_idx)?;
        if !root.exists() {
            return Err(RidiError::FileNotFound(format!(
                "Library path not found for user {}: {}",
                user_idx,
                root.display()
            )));
        }
        self.available_books_in(&root)
    }

    /// Downloaded books under an explicit library folder
    pub fn available_books_in(&self, root: &Path) -> Result<Vec<BookAsset>> {
        let books: Vec<BookAsset> = discover_books(root)
            .into_iter()
            .filter(|b| b.file(FileKind::Data).exists())
            .collect();

        if books.is_empty() {
            return Err(RidiError::NoBooksFound("No books found in library.".into()));
        }
        debug!(count = books.len(), root = %root.display(), "books available");
        Ok(books)
    }

    /// Keep the book with exactly this id (all books without a filter)
    ///
    /// # Errors
    /// - NoBooksFound if nothing matches
    pub fn filter_by_id(&self, books: Vec<BookAsset>, id: Option<&str>) -> Result<Vec<BookAsset>> {
        let Some(id) = id else {
            return Ok(books);
        };

        let filtered: Vec<BookAsset> = books.into_iter().filter(|b| b.id() == id).collect();
        if filtered.is_empty() {
            return Err(RidiError::NoBooksFound(format!("No books found with ID: {}", id)));
        }
        Ok(filtered)
    }

    /// Keep books whose title contains `name` (all books without a filter)
    ///
    /// Books that fail to decrypt are left out.
    pub async fn filter_by_name(
        &self,
        books: Vec<BookAsset>,
        device_id: &str,
        name: Option<&str>,
    ) -> Vec<BookAsset> {
        let Some(name) = name else {
            return books;
        };

        let mut matched = Vec::new();
        for book in books {
            match decrypt_with_title(book.clone(), device_id.to_string()).await {
                Ok((_, Some(title))) if title.contains(name) => matched.push(book),
                Ok(_) => {}
                Err(e) => debug!(book_id = book.id(), error = %e, "skipped in name filter"),
            }
        }
        matched
    }

    /// Title and cover of every book
    ///
    /// `on_progress` gets `(current, total, book_id)` before each book.
    /// A book that fails to decrypt gets an `[Error: ...]` title.
    pub async fn books_with_metadata<F>(
        &self,
        books: &[BookAsset],
        device_id: &str,
        mut on_progress: F,
    ) -> Vec<BookSummary>
    where
        F: FnMut(usize, usize, &str),
    {
        let mut summaries = Vec::with_capacity(books.len());

        for (i, book) in books.iter().enumerate() {
            on_progress(i + 1, books.len(), book.id());

            let summary = match summarize(book.clone(), device_id.to_string()).await {
                Ok(summary) => summary,
                Err(e) => BookSummary {
                    id: book.id().to_string(),
                    format: book.format(),
                    title: format!("[Error: {}]", e),
                    cover: None,
                },
            };
            summaries.push(summary);
        }

        summaries
    }
}

async fn summarize(book: BookAsset, device_id: String) -> Result<BookSummary> {
    tokio::task::spawn_blocking(move || -> Result<BookSummary> {
        let key = derive_session_key(&book, &device_id)?;
        let content = decrypt_content(&book, &key)?;

        Ok(BookSummary {
            id: book.id().to_string(),
            format: book.format(),
            title: extract_title(book.format(), &content).unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            cover: extract_cover(book.format(), &content),
        })
    })
    .await?
}
