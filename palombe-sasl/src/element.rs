//! Tree-shaped protocol elements as exchanged with the stream tokenizer.
//!
//! The tokenizer that turns raw bytes into these trees (and back) lives
//! outside this crate; negotiation code only ever reads tag names,
//! attributes and direct children.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn ns(&self) -> Option<&str> {
        self.attr("xmlns")
    }

    /// First element child carrying the given tag name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|node| match node {
            Node::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter_map(move |node| match node {
            Node::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// Concatenation of the direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in self.children.iter() {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_and_child_lookup() {
        let el = Element::new("features")
            .with_attr("xmlns", "jabber:client")
            .with_child(Element::new("mechanisms").with_child(Element::new("mechanism").with_text("PLAIN")));

        assert_eq!(el.ns(), Some("jabber:client"));
        let mechs = el.child("mechanisms").unwrap();
        assert_eq!(mechs.child("mechanism").unwrap().text(), "PLAIN");
        assert!(el.child("starttls").is_none());
    }

    #[test]
    fn first_child_of_name_wins() {
        let el = Element::new("q")
            .with_child(Element::new("m").with_text("a"))
            .with_child(Element::new("m").with_text("b"));
        assert_eq!(el.child("m").unwrap().text(), "a");
        assert_eq!(el.children_named("m").count(), 2);
    }
}
