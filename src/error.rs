use std::fmt;

#[derive(Debug)]
pub enum Error {
    InvalidPdf(String),
    Encrypted,
    InvalidPageRange {
        first: u32,
        last: u32,
        page_count: u32,
    },
    Pdf(lopdf::Error),
    Zip(zip::result::ZipError),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPdf(reason) => write!(f, "not a valid PDF file: {reason}"),
            Error::Encrypted => write!(f, "encrypted PDF files are not supported"),
            Error::InvalidPageRange {
                first,
                last,
                page_count,
            } => write!(
                f,
                "invalid page range {first}-{last} (document has {page_count} pages)"
            ),
            Error::Pdf(e) => write!(f, "PDF error: {e}"),
            Error::Zip(e) => write!(f, "ZIP error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Pdf(e) => Some(e),
            Error::Zip(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<lopdf::Error> for Error {
    fn from(e: lopdf::Error) -> Self {
        Error::Pdf(e)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::Zip(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
