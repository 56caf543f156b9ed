use std::path::{Path, PathBuf};

use crate::docx;
use crate::error::Error;
use crate::layout;
use crate::model::Document;
use crate::pdf;

/// Page selection for [`Converter::convert_with`]. Page numbers are 1-based and inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvertOptions {
    pub first_page: u32,
    /// `None` converts through the last page.
    pub last_page: Option<u32>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            first_page: 1,
            last_page: None,
        }
    }
}

/// A PDF loaded for conversion.
///
/// The document is held from [`Converter::open`] until [`Converter::close`] or drop,
/// so it is released on every path out of a conversion, including early returns.
pub struct Converter {
    path: PathBuf,
    document: lopdf::Document,
}

#[cfg(test)]
thread_local! {
    static LIVE: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

#[cfg(test)]
pub(crate) fn live_converters() -> usize {
    LIVE.with(|c| c.get())
}

impl Converter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let document = pdf::load(&path)?;
        log::info!(
            "opened {} (PDF {}, {} pages)",
            path.display(),
            document.version,
            document.get_pages().len()
        );
        #[cfg(test)]
        LIVE.with(|c| c.set(c.get() + 1));
        Ok(Converter { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    pub fn convert(&mut self, output: impl AsRef<Path>) -> Result<(), Error> {
        self.convert_with(output, &ConvertOptions::default())
    }

    pub fn convert_with(
        &mut self,
        output: impl AsRef<Path>,
        options: &ConvertOptions,
    ) -> Result<(), Error> {
        let output = output.as_ref();
        let pages = self.document.get_pages();
        let page_count = pages.len() as u32;
        let first = options.first_page;
        let last = options.last_page.unwrap_or(page_count);
        if first == 0 || first > last || last > page_count {
            return Err(Error::InvalidPageRange {
                first,
                last,
                page_count,
            });
        }

        let (title, author) = pdf::document_info(&self.document);
        let mut doc = Document {
            title,
            author,
            pages: Vec::with_capacity((last - first + 1) as usize),
        };

        for (&number, &page_id) in pages.range(first..=last) {
            let text = pdf::extract_page(&self.document, number, page_id)?;
            let page = layout::layout_page(text);
            log::debug!(
                "page {number}: {}x{}pt, {} paragraphs, {} characters",
                page.width,
                page.height,
                page.paragraphs.len(),
                page.paragraphs
                    .iter()
                    .map(|p| p.text().chars().count())
                    .sum::<usize>()
            );
            doc.pages.push(page);
        }

        let bytes = docx::render(&doc)?;
        std::fs::write(output, &bytes)?;
        log::info!(
            "wrote {} ({} pages, {} bytes)",
            output.display(),
            doc.pages.len(),
            bytes.len()
        );
        Ok(())
    }

    /// Releases the loaded document.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Converter {
    fn drop(&mut self) {
        #[cfg(test)]
        LIVE.with(|c| c.set(c.get() - 1));
        log::debug!("released converter for {}", self.path.display());
    }
}
