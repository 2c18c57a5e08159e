use crate::document::{Document, Node};
use crate::element::Element;
use crate::error::{Error, Result};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;

/// Options when parsing xml.
///
/// `empty_text_node`: `<tag></tag>` will have a `Node::Text("")` as its children, while `<tag />` won't.
///
/// `require_decl`: Fail with [`Error::MalformedXML`] if the document doesn't start with `<?xml ... ?>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    pub empty_text_node: bool,
    pub require_decl: bool,
}

impl Default for ReadOptions {
    fn default() -> ReadOptions {
        ReadOptions {
            empty_text_node: true,
            require_decl: false,
        }
    }
}

// Pick the encoding from the BOM, the byte pattern of `<?`, or the declared label.
// Returns the encoding and the length of the BOM to skip.
fn detect_encoding(bytes: &[u8]) -> Result<(&'static Encoding, usize)> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return Ok((encoding, bom_len));
    }
    match bytes {
        [0x00, 0x3c, 0x00, 0x3f, ..] => Ok((UTF_16BE, 0)),
        [0x3c, 0x00, 0x3f, 0x00, ..] => Ok((UTF_16LE, 0)),
        _ => match declared_encoding(bytes) {
            Some(label) => {
                let encoding = Encoding::for_label(label.as_bytes()).ok_or(Error::CannotDecode)?;
                // An ASCII compatible byte stream cannot be in a UTF-16 encoding.
                if !encoding.is_ascii_compatible() {
                    return Err(Error::CannotDecode);
                }
                Ok((encoding, 0))
            }
            None => Ok((UTF_8, 0)),
        },
    }
}

// Reads the `encoding` pseudo-attribute out of a leading `<?xml ... ?>`.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    if !bytes.starts_with(b"<?xml") {
        return None;
    }
    let end = bytes.windows(2).position(|w| w == b"?>")?;
    let decl = String::from_utf8_lossy(&bytes[..end]);
    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    let label = &rest[..rest.find(quote)?];
    Some(label.to_string())
}

fn decode(bytes: &[u8]) -> Result<String> {
    let (encoding, bom_len) = detect_encoding(bytes)?;
    let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
    if had_errors {
        return Err(Error::CannotDecode);
    }
    Ok(text.into_owned())
}

pub(crate) struct DocumentParser {
    document: Document,
    read_opts: ReadOptions,
    started: bool, // any event was handled
}

impl DocumentParser {
    pub(crate) fn new(opts: ReadOptions) -> DocumentParser {
        DocumentParser {
            document: Document::new(),
            read_opts: opts,
            started: false,
        }
    }

    pub(crate) fn parse_reader<R: Read>(mut reader: R, opts: ReadOptions) -> Result<Document> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let text = decode(&bytes)?;
        let mut parser = DocumentParser::new(opts);
        parser.parse_content(&text)?;
        Ok(parser.document)
    }

    fn handle_decl(&mut self, ev: &BytesDecl) -> Result<()> {
        self.document.version = String::from_utf8(ev.version()?.to_vec())?;
        self.document.standalone = match ev.standalone() {
            Some(res) => {
                let val = std::str::from_utf8(&*res?)?.to_lowercase();
                if val == "yes" {
                    true
                } else if val == "no" {
                    false
                } else {
                    return Err(Error::MalformedXML(
                        "Standalone Document Declaration has non boolean value".to_string(),
                    ));
                }
            }
            None => false,
        };
        Ok(())
    }

    fn handle_bytes_start(&mut self, parent: Element, ev: &BytesStart) -> Result<Element> {
        let full_name = String::from_utf8(ev.name().to_vec())?;
        let mut attributes = Vec::new();
        for attr in ev.attributes() {
            let attr = attr?;
            let key = String::from_utf8(attr.key.to_vec())?;
            let value = String::from_utf8(attr.unescaped_value()?.to_vec())?;
            attributes.push((key, value));
        }
        let doc = &mut self.document;
        let element = Element::with_attributes(doc, full_name, attributes);
        parent.push_child(doc, Node::Element(element))?;
        Ok(element)
    }

    // Returns if document parsing is finished.
    fn handle_event(&mut self, element_stack: &mut Vec<Element>, event: Event) -> Result<bool> {
        // Empty text between adjacent tags is no node, and
        // whitespace outside the root element is layout only.
        if let Event::Text(ref ev) = event {
            let top_level = element_stack.len() <= 1;
            if ev.is_empty() || (top_level && ev.iter().all(|b| b.is_ascii_whitespace())) {
                return Ok(false);
            }
        }
        if !self.started && self.read_opts.require_decl && !matches!(event, Event::Decl(_)) {
            return Err(Error::MalformedXML(
                "Didn't find XML Declaration at the start of file".to_string(),
            ));
        }
        // element_stack always holds the container at the bottom
        let parent = match element_stack.last() {
            Some(elem) => *elem,
            None => self.document.container(),
        };
        match event {
            Event::Start(ref ev) => {
                let element = self.handle_bytes_start(parent, ev)?;
                element_stack.push(element);
            }
            Event::End(_) => {
                if element_stack.len() <= 1 {
                    return Err(Error::MalformedXML(
                        "Closing tag without an opening tag".to_string(),
                    ));
                }
                // quick-xml checks if tag names match for us
                let doc = &mut self.document;
                parent.drop_layout_text(doc);
                if self.read_opts.empty_text_node && !parent.has_children(doc) {
                    // distinguish <tag></tag> and <tag />
                    parent.push_child(doc, Node::Text(String::new()))?;
                }
                element_stack.pop();
            }
            Event::Empty(ref ev) => {
                self.handle_bytes_start(parent, ev)?;
            }
            Event::Text(ev) => {
                let content = String::from_utf8(ev.unescaped()?.to_vec())?;
                parent.push_child(&mut self.document, Node::Text(content))?;
            }
            Event::DocType(ev) => {
                let content = String::from_utf8(ev.to_vec())?;
                parent.push_child(&mut self.document, Node::DocType(content))?;
            }
            // Comment, CData, and PI content is kept as it is.
            Event::Comment(ev) => {
                let content = String::from_utf8(ev.to_vec())?;
                parent.push_child(&mut self.document, Node::Comment(content))?;
            }
            Event::CData(ev) => {
                let content = String::from_utf8(ev.to_vec())?;
                parent.push_child(&mut self.document, Node::CData(content))?;
            }
            Event::PI(ev) => {
                let content = String::from_utf8(ev.to_vec())?;
                parent.push_child(&mut self.document, Node::PI(content))?;
            }
            Event::Decl(ev) => {
                if self.started {
                    return Err(Error::MalformedXML(
                        "XML Declaration is only allowed at the start of file".to_string(),
                    ));
                }
                self.handle_decl(&ev)?;
            }
            Event::Eof => {
                if element_stack.len() > 1 {
                    return Err(Error::MalformedXML(format!(
                        "Unclosed tag <{}>",
                        parent.full_name(&self.document)
                    )));
                }
                return Ok(true);
            }
        }
        self.started = true;
        Ok(false)
    }

    fn parse_content(&mut self, text: &str) -> Result<()> {
        // Text is kept untrimmed; only layout whitespace between elements is dropped.
        let mut reader = Reader::from_str(text);
        let mut buf = Vec::with_capacity(200); // reduce time increasing capacity at start.
        let mut element_stack: Vec<Element> = vec![self.document.container()];

        loop {
            let ev = reader.read_event(&mut buf)?;
            if self.handle_event(&mut element_stack, ev)? {
                return Ok(());
            }
            buf.clear();
        }
    }
}
