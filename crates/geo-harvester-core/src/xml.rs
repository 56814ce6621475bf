//! A small owned element tree over `quick-xml`.
//!
//! Source documents are parsed once per record into an [`Element`] tree keyed
//! by *local* names (namespace prefixes are dropped), which lets ISO 19139's
//! `gmd:`/`gco:` soup and FGDC's plain tags be queried the same way:
//!
//! ```text
//! doc.select("idinfo/citation/citeinfo/title")
//!        │        └──────────────┬──────────┘
//!        │             child steps
//!        └── first step matches the element itself or any descendant
//! ```
//!
//! Text is whitespace-normalized on read. [`Element::to_xml`] writes an
//! element back out, used to emit one MARC record at a time from a
//! multi-record export.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },
    #[error("document has no root element")]
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, String> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            attributes.push((key, value.to_string()));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct text content with runs of whitespace collapsed.
    pub fn text(&self) -> String {
        self.text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Text exactly as read, for fixed-position values such as MARC leaders.
    pub fn raw_text(&self) -> &str {
        &self.text
    }

    /// All descendant text, joined with single spaces.
    pub fn deep_text(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ")
    }

    fn collect_text(&self, out: &mut Vec<String>) {
        let own = self.text();
        if !own.is_empty() {
            out.push(own);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// This element and every descendant, depth first.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(el) = stack.pop() {
            out.push(el);
            for child in el.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Resolve a slash-separated path of local names.
    ///
    /// The first step matches this element or any descendant; each later
    /// step walks direct children. `*` matches any name.
    pub fn select(&self, path: &str) -> Vec<&Element> {
        let mut steps = path.split('/').filter(|s| !s.is_empty());
        let Some(first) = steps.next() else {
            return vec![self];
        };
        let mut current: Vec<&Element> = self
            .descendants()
            .into_iter()
            .filter(|e| step_matches(first, &e.name))
            .collect();
        for step in steps {
            current = current
                .into_iter()
                .flat_map(|e| e.children.iter().filter(|c| step_matches(step, &c.name)))
                .collect();
        }
        current
    }

    pub fn select_first(&self, path: &str) -> Option<&Element> {
        self.select(path).into_iter().next()
    }

    /// Non-empty normalized texts of every match, in document order.
    pub fn select_texts(&self, path: &str) -> Vec<String> {
        self.select(path)
            .into_iter()
            .map(Element::text)
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn select_text(&self, path: &str) -> Option<String> {
        self.select_texts(path).into_iter().next()
    }

    /// Serialize this element (not a full document) back to XML.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", k, quick_xml::escape::escape(v.as_str())));
        }
        if self.children.is_empty() && self.text.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&quick_xml::escape::escape(self.text.as_str()));
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn step_matches(step: &str, name: &str) -> bool {
    step == "*" || step == name
}

/// Parse a document into its root element.
pub fn parse(bytes: &[u8]) -> Result<Element, XmlError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    let err = |reader: &Reader<&[u8]>, message: String| XmlError::Parse {
        position: reader.buffer_position() as u64,
        message,
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let el = Element::from_start(&e).map_err(|m| err(&reader, m))?;
                stack.push(el);
            }
            Ok(Event::Empty(e)) => {
                let el = Element::from_start(&e).map_err(|m| err(&reader, m))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = root.or(Some(el)),
                }
            }
            Ok(Event::Text(te)) => {
                let text = te.unescape().map_err(|e| err(&reader, e.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    push_text(&mut current.text, &text);
                }
            }
            Ok(Event::CData(cd)) => {
                let text = String::from_utf8_lossy(&cd).to_string();
                if let Some(current) = stack.last_mut() {
                    push_text(&mut current.text, &text);
                }
            }
            Ok(Event::End(_)) => {
                let Some(done) = stack.pop() else {
                    return Err(err(&reader, "unbalanced end tag".to_string()));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => root = root.or(Some(done)),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(err(&reader, e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::Parse {
            position: reader.buffer_position() as u64,
            message: format!("unclosed element <{}>", stack[stack.len() - 1].name),
        });
    }
    root.ok_or(XmlError::Empty)
}

fn push_text(buf: &mut String, text: &str) {
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISO: &str = r#"<?xml version="1.0"?>
<gmd:MD_Metadata xmlns:gmd="http://www.isotc211.org/2005/gmd" xmlns:gco="http://www.isotc211.org/2005/gco">
  <gmd:identificationInfo>
    <gmd:MD_DataIdentification>
      <gmd:citation><gmd:CI_Citation>
        <gmd:title><gco:CharacterString>Bus   Routes &amp; Stops</gco:CharacterString></gmd:title>
      </gmd:CI_Citation></gmd:citation>
      <gmd:descriptiveKeywords><gmd:MD_Keywords>
        <gmd:keyword><gco:CharacterString>transit</gco:CharacterString></gmd:keyword>
        <gmd:keyword><gco:CharacterString>bus</gco:CharacterString></gmd:keyword>
        <gmd:type><gmd:MD_KeywordTypeCode codeListValue="theme"/></gmd:type>
      </gmd:MD_Keywords></gmd:descriptiveKeywords>
    </gmd:MD_DataIdentification>
  </gmd:identificationInfo>
</gmd:MD_Metadata>"#;

    #[test]
    fn select_by_local_names() {
        let doc = parse(ISO.as_bytes()).unwrap();
        assert_eq!(doc.name, "MD_Metadata");
        assert_eq!(
            doc.select_text("citation/CI_Citation/title/CharacterString"),
            Some("Bus Routes & Stops".to_string())
        );
        assert_eq!(
            doc.select_texts("MD_Keywords/keyword/CharacterString"),
            vec!["transit", "bus"]
        );
        let code = doc.select_first("MD_KeywordTypeCode").unwrap();
        assert_eq!(code.attr("codeListValue"), Some("theme"));
    }

    #[test]
    fn missing_paths_are_empty() {
        let doc = parse(ISO.as_bytes()).unwrap();
        assert!(doc.select("idinfo/citation").is_empty());
        assert_eq!(doc.select_text("nope"), None);
    }

    #[test]
    fn malformed_documents_error() {
        assert!(parse(b"<a><b></a>").is_err());
        assert!(parse(b"").is_err());
        assert!(parse(b"<a><b>").is_err());
    }

    #[test]
    fn to_xml_escapes_and_nests() {
        let doc = parse(br#"<record><datafield tag="245"><subfield code="a">A &lt; B</subfield></datafield><leader/></record>"#).unwrap();
        assert_eq!(
            doc.to_xml(),
            r#"<record><datafield tag="245"><subfield code="a">A &lt; B</subfield></datafield><leader/></record>"#
        );
    }
}
