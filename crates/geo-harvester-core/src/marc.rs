//! MARC XML records.
//!
//! A bulk export is one `<collection>` of `<record>`s. [`records`] splits a
//! parsed export into [`MarcRecord`]s, each of which keeps its own XML
//! element so it can be mirrored and re-parsed on its own.

use crate::xml::Element;

#[derive(Debug, Clone, PartialEq)]
pub struct DataField {
    pub tag: String,
    pub ind1: String,
    pub ind2: String,
    pub subfields: Vec<(String, String)>,
}

impl DataField {
    pub fn subfield(&self, code: &str) -> impl Iterator<Item = &str> {
        let code = code.to_string();
        self.subfields
            .iter()
            .filter(move |(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }

    /// Values of the given subfield codes, in field order, joined by spaces.
    pub fn joined(&self, codes: &[&str]) -> String {
        self.subfields
            .iter()
            .filter(|(c, _)| codes.contains(&c.as_str()))
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarcRecord {
    pub leader: String,
    pub control_fields: Vec<(String, String)>,
    pub data_fields: Vec<DataField>,
    element: Element,
}

impl MarcRecord {
    pub fn from_element(record: &Element) -> Self {
        let leader = record
            .child("leader")
            .map(|l| l.raw_text().to_string())
            .unwrap_or_default();
        let control_fields = record
            .children_named("controlfield")
            .map(|c| {
                (
                    c.attr("tag").unwrap_or_default().to_string(),
                    c.raw_text().to_string(),
                )
            })
            .collect();
        let data_fields = record
            .children_named("datafield")
            .map(|d| DataField {
                tag: d.attr("tag").unwrap_or_default().to_string(),
                ind1: d.attr("ind1").unwrap_or(" ").to_string(),
                ind2: d.attr("ind2").unwrap_or(" ").to_string(),
                subfields: d
                    .children_named("subfield")
                    .map(|s| (s.attr("code").unwrap_or_default().to_string(), s.text()))
                    .collect(),
            })
            .collect();
        Self {
            leader,
            control_fields,
            data_fields,
            element: record.clone(),
        }
    }

    /// Character at a leader position.
    pub fn leader_char(&self, pos: usize) -> Option<char> {
        self.leader.chars().nth(pos)
    }

    pub fn control(&self, tag: &str) -> Option<&str> {
        self.control_fields
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a DataField> {
        self.data_fields.iter().filter(move |f| f.tag == tag)
    }

    /// Every value of `tag$code`, in record order.
    pub fn subfield_values(&self, tag: &str, code: &str) -> Vec<String> {
        self.fields(tag)
            .flat_map(|f| f.subfield(code).map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    /// Control number from field 001.
    pub fn control_number(&self) -> Option<&str> {
        self.control("001").map(str::trim).filter(|s| !s.is_empty())
    }

    /// Leader/05 `d` marks a deleted record.
    pub fn is_deleted(&self) -> bool {
        self.leader_char(5) == Some('d')
    }

    /// Does this catalog record describe a geospatial resource?
    ///
    /// Leader/05 must be one of `a c d n p`, a 655 genre must mention
    /// `Maps.`, a 949 call number prefix must be a map or disc, and a 985
    /// shelving location must be the map room or GIS.
    pub fn is_geospatial(&self) -> bool {
        if !matches!(self.leader_char(5), Some('a' | 'c' | 'd' | 'n' | 'p')) {
            return false;
        }
        let genre = self
            .subfield_values("655", "a")
            .iter()
            .any(|v| v.contains("Maps."));
        let call_number = self
            .subfield_values("949", "k")
            .iter()
            .any(|v| matches!(v.as_str(), "MAP" | "CDROM" | "DVDROM"));
        let shelving = self
            .subfield_values("985", "aa")
            .iter()
            .any(|v| matches!(v.as_str(), "MAPRM" | "GIS"));
        genre && call_number && shelving
    }

    /// The record as a standalone MARC XML document.
    pub fn to_xml(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}",
            self.element.to_xml()
        )
    }
}

/// Every `<record>` in a parsed export (or the root itself when it is one).
pub fn records(doc: &Element) -> Vec<MarcRecord> {
    doc.select("record")
        .into_iter()
        .map(MarcRecord::from_element)
        .collect()
}
