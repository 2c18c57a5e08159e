//! Edit a single servlet filter in a `web.xml` deployment descriptor.
//!
//! [`FilterDescriptorEditor`] loads a descriptor, adds, updates and removes the
//! `<init-param>`s of one configured `<filter>` (creating the filter and its
//! `<filter-mapping>` on demand), and writes the result back on [`FilterDescriptorEditor::save`].
//! The filter identity and all element names come from [`FilterConfig`].
//!
//! The underlying tree is a small read-modify-write XML document model: [`Document`]
//! owns every node and [`Element`] is a copyable id into it. [`PathExpr`] selects
//! elements with a subset of XPath.
//!
//! Errors are logged with [`tracing`]; install a subscriber to see them.
mod config;
mod document;
mod editor;
mod element;
mod error;
mod parser;
pub mod path;

pub use crate::config::{ConfigError, FilterConfig, FILTER_PLACEHOLDER, NAME_PLACEHOLDER};
pub use crate::document::{Document, Node};
pub use crate::editor::{EditorError, EditorResult, FilterDescriptorEditor};
pub use crate::element::{Element, ElementBuilder};
pub use crate::error::{Error, Result};
pub use crate::parser::ReadOptions;
pub use crate::path::PathExpr;
