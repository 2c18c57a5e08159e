use crate::document::{Document, Node};
use crate::error::{Error, Result};

#[derive(Debug)]
pub(crate) struct ElementData {
    full_name: String,
    attributes: Vec<(String, String)>, // in document order, xmlns declarations included
    parent: Option<Element>,
    children: Vec<Node>,
}

/// Represents an XML element.
///
/// This struct only contains a unique usize id and implements trait `Copy`.
/// So you do not need to bother with having a reference.
///
/// Because the actual data of the element is stored in [`Document`],
/// most methods takes `&Document` or `&mut Document` as its first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Element {
    id: usize,
}

impl Element {
    /// Create a new empty element with name. It has no parent until pushed somewhere.
    pub fn new<S: Into<String>>(document: &mut Document, name: S) -> Element {
        Self::with_attributes(document, name.into(), Vec::new())
    }

    pub(crate) fn with_attributes(
        document: &mut Document,
        full_name: String,
        attributes: Vec<(String, String)>,
    ) -> Element {
        let elem = Element {
            id: document.store.len(),
        };
        document.store.push(ElementData {
            full_name,
            attributes,
            parent: None,
            children: Vec::new(),
        });
        elem
    }

    /// Start building an element; finish with [`ElementBuilder::push_to`].
    pub fn build<S: Into<String>>(name: S) -> ElementBuilder {
        ElementBuilder::new(name.into())
    }

    pub(crate) fn container() -> (Element, ElementData) {
        let elem_data = ElementData {
            full_name: String::new(),
            attributes: Vec::new(),
            parent: None,
            children: Vec::new(),
        };
        (Element { id: 0 }, elem_data)
    }

    /// The container holds the top-level nodes of a document and never has a parent.
    pub fn is_container(&self) -> bool {
        self.id == 0
    }

    pub fn separate_prefix_name(full_name: &str) -> (&str, &str) {
        match full_name.split_once(':') {
            Some((prefix, name)) => (prefix, name),
            None => ("", full_name),
        }
    }
}

impl Element {
    fn data<'a>(&self, document: &'a Document) -> &'a ElementData {
        &document.store[self.id]
    }

    fn mut_data<'a>(&self, document: &'a mut Document) -> &'a mut ElementData {
        &mut document.store[self.id]
    }

    /// Get raw name of element, including its namespace prefix.
    pub fn full_name<'a>(&self, document: &'a Document) -> &'a str {
        &self.data(document).full_name
    }

    /// `<prefix:name>` -> `"prefix"`.
    pub fn prefix<'a>(&self, document: &'a Document) -> &'a str {
        Self::separate_prefix_name(self.full_name(document)).0
    }

    /// `<prefix:name>` -> `"name"`.
    pub fn name<'a>(&self, document: &'a Document) -> &'a str {
        Self::separate_prefix_name(self.full_name(document)).1
    }

    /// Attributes in document order. Names keep their prefix.
    pub fn attributes<'a>(&self, document: &'a Document) -> &'a [(String, String)] {
        &self.data(document).attributes
    }

    pub fn attribute<'a>(&self, document: &'a Document, name: &str) -> Option<&'a str> {
        self.attributes(document)
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, val)| val.as_str())
    }

    pub fn parent(&self, document: &Document) -> Option<Element> {
        self.data(document).parent
    }

    pub fn has_parent(&self, document: &Document) -> bool {
        self.parent(document).is_some()
    }

    pub fn children<'a>(&self, document: &'a Document) -> &'a Vec<Node> {
        &self.data(document).children
    }

    pub fn has_children(&self, document: &Document) -> bool {
        !self.children(document).is_empty()
    }

    pub fn child_elements(&self, document: &Document) -> Vec<Element> {
        self.children(document)
            .iter()
            .filter_map(|node| node.as_element())
            .collect()
    }

    /// First child element with this full name.
    pub fn find(&self, document: &Document, name: &str) -> Option<Element> {
        self.children(document)
            .iter()
            .filter_map(|node| node.as_element())
            .find(|elem| elem.full_name(document) == name)
    }

    pub fn find_all(&self, document: &Document, name: &str) -> Vec<Element> {
        self.children(document)
            .iter()
            .filter_map(|node| node.as_element())
            .filter(|elem| elem.full_name(document) == name)
            .collect()
    }

    pub(crate) fn build_text_content(&self, document: &Document, buf: &mut String) {
        for node in self.children(document) {
            node.build_text_content(document, buf);
        }
    }

    /// Concatenated text of all descendant text and CDATA nodes.
    ///
    /// Implementation of [Node.textContent](https://developer.mozilla.org/en-US/docs/Web/API/Node/textContent)
    pub fn text_content(&self, document: &Document) -> String {
        let mut buf = String::new();
        self.build_text_content(document, &mut buf);
        buf
    }

    /// Replaces all children with a single text node.
    /// Child elements that were removed lose their parent.
    pub fn set_text_content<S: Into<String>>(&self, document: &mut Document, text: S) {
        let removed = std::mem::take(&mut self.mut_data(document).children);
        for node in removed {
            if let Node::Element(elem) = node {
                elem.mut_data(document).parent = None;
            }
        }
        self.mut_data(document).children.push(Node::Text(text.into()));
    }

    /// Drops whitespace-only text children when the element also has child elements.
    /// Text of leaf elements is left as it is.
    pub(crate) fn drop_layout_text(&self, document: &mut Document) {
        let children = &mut self.mut_data(document).children;
        if children.iter().any(|node| node.as_element().is_some()) {
            children.retain(|node| !matches!(node, Node::Text(text) if text.trim().is_empty()));
        }
    }

    /// Equivalent to `vec.push()`.
    ///
    /// # Errors
    ///
    /// - [`Error::ContainerCannotMove`]: The container can't be a child.
    /// - [`Error::HasAParent`]: If node is an element, it must not have a parent.
    /// Call `elem.detach()` before.
    pub fn push_child(&self, document: &mut Document, node: Node) -> Result<()> {
        if let Node::Element(elem) = node {
            if elem.is_container() {
                return Err(Error::ContainerCannotMove);
            }
            let data = elem.mut_data(document);
            if data.parent.is_some() {
                return Err(Error::HasAParent);
            }
            data.parent = Some(*self);
        }
        self.mut_data(document).children.push(node);
        Ok(())
    }

    /// Remove child element by value.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`]: Element was not found among its children.
    pub fn remove_child_elem(&self, document: &mut Document, element: Element) -> Result<()> {
        let children = &mut self.mut_data(document).children;
        let pos = children
            .iter()
            .position(|node| node.as_element() == Some(element))
            .ok_or(Error::NotFound)?;
        children.remove(pos);
        element.mut_data(document).parent = None;
        Ok(())
    }

    /// Removes the element from its parent. Does nothing if it has none.
    pub fn detach(&self, document: &mut Document) -> Result<()> {
        if self.is_container() {
            return Err(Error::ContainerCannotMove);
        }
        match self.parent(document) {
            Some(parent) => parent.remove_child_elem(document, *self),
            None => Ok(()),
        }
    }
}

/// Builder returned by [`Element::build`].
///
/// ```
/// use webxml_filter::{Document, Element};
///
/// let mut doc = Document::new();
/// let container = doc.container();
/// let root = Element::build("web-app").push_to(&mut doc, container);
/// Element::build("display-name")
///     .text_content("shop")
///     .push_to(&mut doc, root);
/// assert_eq!(root.text_content(&doc), "shop");
/// ```
#[derive(Debug, Clone)]
pub struct ElementBuilder {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
}

impl ElementBuilder {
    fn new(name: String) -> ElementBuilder {
        ElementBuilder {
            name,
            attributes: Vec::new(),
            text: None,
        }
    }

    pub fn attribute<S, T>(mut self, name: S, value: T) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn text_content<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    fn finish(self, document: &mut Document) -> Element {
        let elem = Element::with_attributes(document, self.name, self.attributes);
        if let Some(text) = self.text {
            elem.mut_data(document).children.push(Node::Text(text));
        }
        elem
    }

    /// Create the element and push it as the last child of `parent`.
    pub fn push_to(self, document: &mut Document, parent: Element) -> Element {
        let elem = self.finish(document);
        // A freshly created element has no parent and is never the container.
        elem.mut_data(document).parent = Some(parent);
        parent
            .mut_data(document)
            .children
            .push(Node::Element(elem));
        elem
    }
}
