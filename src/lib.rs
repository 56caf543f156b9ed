mod cmap;
mod converter;
mod docx;
mod error;
mod fonts;
mod layout;
mod model;
mod pdf;

pub use converter::{ConvertOptions, Converter};
pub use error::Error;

use std::path::Path;

/// Converts every page of `input` into a DOCX written to `output`.
///
/// The converter is released before returning, whether or not the conversion succeeded.
pub fn convert_pdf_to_docx(input: &Path, output: &Path) -> Result<(), Error> {
    let mut converter = Converter::open(input)?;
    let result = converter.convert(output);
    converter.close();
    result
}
