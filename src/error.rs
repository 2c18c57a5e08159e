use quick_xml::Error as XMLError;
use std::{str::Utf8Error, string::FromUtf8Error};

/// Wrapper around `std::Result`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors of the xml layer: reading, tree manipulation, path evaluation and writing.
#[derive(Debug)]
pub enum Error {
    /// [`std::io`] related error.
    Io(std::io::Error),
    /// Decoding related error.
    /// Maybe the XML declaration has an encoding value that it doesn't recognize,
    /// or it doesn't match its actual encoding,
    CannotDecode,
    /// Assorted errors while parsing XML.
    MalformedXML(String),
    /// A path expression could not be compiled.
    MalformedPath(String),
    /// The container element cannot have a parent.
    ContainerCannotMove,
    /// You need to call `element.detach()` before assigning another parent.
    HasAParent,
    /// Element was not found among the children of the given parent.
    NotFound,
    /// The document has no root element to append to.
    NoRootElement,
    /// An element expected to have a child with this name doesn't.
    MissingElement(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO Error: {}", err),
            Error::CannotDecode => write!(f, "Cannot decode XML"),
            Error::MalformedXML(err) => write!(f, "Malformed XML: {}", err),
            Error::MalformedPath(err) => write!(f, "Malformed path expression: {}", err),
            Error::ContainerCannotMove => write!(f, "Container element cannot move"),
            Error::HasAParent => write!(
                f,
                "Element already has a parent. Call detach() before changing parent."
            ),
            Error::NotFound => write!(f, "Element not found among children"),
            Error::NoRootElement => write!(f, "Document has no root element"),
            Error::MissingElement(name) => write!(f, "Missing <{}> child element", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<XMLError> for Error {
    fn from(err: XMLError) -> Error {
        match err {
            XMLError::EndEventMismatch { expected, found } => Error::MalformedXML(format!(
                "Closing tag mismatch. Expected {}, found {}",
                expected, found,
            )),
            XMLError::Io(err) => Error::Io(err),
            XMLError::Utf8(_) => Error::CannotDecode,
            err => Error::MalformedXML(err.to_string()),
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_: FromUtf8Error) -> Error {
        Error::CannotDecode
    }
}

impl From<Utf8Error> for Error {
    fn from(_: Utf8Error) -> Error {
        Error::CannotDecode
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
