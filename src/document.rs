use crate::element::{Element, ElementData};
use crate::error::{Error, Result};
use crate::parser::{DocumentParser, ReadOptions};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    CData(String),
    PI(String),
    DocType(String),
}

impl Node {
    pub fn as_element(&self) -> Option<Element> {
        match self {
            Self::Element(elem) => Some(*elem),
            _ => None,
        }
    }

    pub(crate) fn build_text_content(&self, document: &Document, buf: &mut String) {
        match self {
            Node::Element(elem) => elem.build_text_content(document, buf),
            Node::Text(text) => buf.push_str(text),
            Node::CData(text) => buf.push_str(text),
            _ => {}
        }
    }

    /// Returns content if node is `Text` or `CData`.
    /// If node is `Element`, return [`Element::text_content()`]
    pub fn text_content(&self, document: &Document) -> String {
        let mut buf = String::new();
        self.build_text_content(document, &mut buf);
        buf
    }
}

/// Represents a XML document.
///
/// Use [`Document::parse_file()`], [`Document::parse_str()`] or [`Document::from_str()`] to parse xml.
///
/// # Examples
/// ```
/// use webxml_filter::Document;
///
/// let mut doc = Document::parse_str(r#"<?xml version="1.0" encoding="UTF-8"?>
/// <web-app>
///     <display-name>shop</display-name>
/// </web-app>
/// "#).unwrap();
/// let name = doc
///     .root_element()
///     .unwrap()
///     .find(&doc, "display-name")
///     .unwrap();
/// name.set_text_content(&mut doc, "store");
/// let xml = doc.write_str().unwrap();
/// assert!(xml.contains("<display-name>store</display-name>"));
/// ```
#[derive(Debug)]
pub struct Document {
    pub(crate) store: Vec<ElementData>,
    container: Element,

    pub(crate) version: String,
    pub(crate) standalone: bool,
}

impl Document {
    /// Create a blank new xml document.
    pub fn new() -> Document {
        let (container, container_data) = Element::container();
        Document {
            store: vec![container_data],
            container,
            version: String::from("1.0"),
            standalone: false,
        }
    }

    /// The pseudo-element holding the top-level nodes.
    pub fn container(&self) -> Element {
        self.container
    }

    /// Get first element of document.
    pub fn root_element(&self) -> Option<Element> {
        self.container
            .children(self)
            .iter()
            .find_map(|node| node.as_element())
    }

    pub fn root_nodes(&self) -> &Vec<Node> {
        self.container.children(self)
    }

    pub fn push_root_node(&mut self, node: Node) -> Result<()> {
        let container = self.container;
        container.push_child(self, node)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn standalone(&self) -> bool {
        self.standalone
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

// Read
impl Document {
    pub fn parse_str(str: &str) -> Result<Document> {
        DocumentParser::parse_reader(str.as_bytes(), ReadOptions::default())
    }

    pub fn parse_str_with_opts(str: &str, opts: ReadOptions) -> Result<Document> {
        DocumentParser::parse_reader(str.as_bytes(), opts)
    }

    /// # Errors
    ///
    /// - [`Error::Io`]: The file could not be opened or read.
    /// - [`Error::CannotDecode`]: Could not decode XML.
    /// - [`Error::MalformedXML`]: Could not read XML.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Document> {
        Self::parse_file_with_opts(path, ReadOptions::default())
    }

    pub fn parse_file_with_opts<P: AsRef<Path>>(path: P, opts: ReadOptions) -> Result<Document> {
        let file = File::open(path)?;
        DocumentParser::parse_reader(file, opts)
    }

    pub fn parse_reader<R: Read>(reader: R) -> Result<Document> {
        DocumentParser::parse_reader(reader, ReadOptions::default())
    }

    pub fn parse_reader_with_opts<R: Read>(reader: R, opts: ReadOptions) -> Result<Document> {
        DocumentParser::parse_reader(reader, opts)
    }
}

// Write
impl Document {
    /// Writes document as xml string.
    pub fn write_str(&self) -> Result<String> {
        let mut buf: Vec<u8> = Vec::with_capacity(200);
        self.write(&mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Truncates the file at `path` and writes the document into it.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write document to writer. Will be written in UTF-8.
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        let container = self.container();
        let mut writer = Writer::new_with_indent(writer, b' ', 4);
        self.write_decl(&mut writer)?;
        self.write_nodes(&mut writer, container.children(self))?;
        writer.write_event(Event::Eof)?;
        Ok(())
    }

    fn write_decl(&self, writer: &mut Writer<impl Write>) -> Result<()> {
        let standalone = match self.standalone {
            true => Some("yes".as_bytes()),
            false => None,
        };
        writer.write_event(Event::Decl(BytesDecl::new(
            self.version.as_bytes(),
            Some("UTF-8".as_bytes()),
            standalone,
        )))?;
        Ok(())
    }

    fn write_nodes(&self, writer: &mut Writer<impl Write>, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            match node {
                Node::Element(eid) => self.write_element(writer, *eid)?,
                Node::Text(text) => {
                    writer.write_event(Event::Text(BytesText::from_plain_str(text)))?
                }
                // DocType, Comment, CData, and PI content is kept raw.
                Node::DocType(text) => {
                    // the writer puts no space after `<!DOCTYPE`
                    let text = if text.starts_with(char::is_whitespace) {
                        text.to_string()
                    } else {
                        format!(" {}", text)
                    };
                    writer.write_event(Event::DocType(BytesText::from_escaped_str(&text)))?
                }
                Node::Comment(text) => {
                    writer.write_event(Event::Comment(BytesText::from_escaped_str(text)))?
                }
                Node::CData(text) => {
                    writer.write_event(Event::CData(BytesText::from_escaped_str(text)))?
                }
                Node::PI(text) => {
                    writer.write_event(Event::PI(BytesText::from_escaped_str(text)))?
                }
            };
        }
        Ok(())
    }

    fn write_element(&self, writer: &mut Writer<impl Write>, element: Element) -> Result<()> {
        let name_bytes = element.full_name(self).as_bytes();
        let mut start = BytesStart::borrowed_name(name_bytes);
        for (key, val) in element.attributes(self) {
            start.push_attribute((key.as_bytes(), val.as_bytes()));
        }
        if element.has_children(self) {
            writer.write_event(Event::Start(start))?;
            self.write_nodes(writer, element.children(self))?;
            writer.write_event(Event::End(BytesEnd::borrowed(name_bytes)))?;
        } else {
            writer.write_event(Event::Empty(start))?;
        }
        Ok(())
    }
}

impl FromStr for Document {
    type Err = Error;

    fn from_str(s: &str) -> Result<Document> {
        Document::parse_str(s)
    }
}
