//! The canonical field table.
//!
//! Every canonical field the normalization engine can produce is declared
//! here exactly once, in schema order. The engine walks [`FIELDS`] to decide
//! which resolvers to ask for; the record model consults it to validate kinds
//! and vocabularies. Adding a field to the canonical schema means adding a row
//! here and, optionally, a resolver in whichever capabilities can supply it.
//!
//! | Kind | JSON shape |
//! |------|-----------|
//! | [`FieldKind::Text`] | string |
//! | [`FieldKind::TextList`] | array of strings |
//! | [`FieldKind::Bool`] | boolean |
//! | [`FieldKind::IntList`] | array of integers |
//! | [`FieldKind::DateTime`] | RFC 3339 string |
//! | [`FieldKind::JsonObject`] | string holding a serialized JSON object |

/// Value shape of a canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    TextList,
    Bool,
    IntList,
    DateTime,
    JsonObject,
}

/// One row of the canonical field table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Closed vocabulary every value (or every list item) must belong to.
    pub vocabulary: Option<&'static [&'static str]>,
}

pub const ACCESS_RIGHTS: &[&str] = &["Public", "Restricted"];
pub const MD_VERSIONS: &[&str] = &["Aardvark"];
pub const RESOURCE_CLASSES: &[&str] = &[
    "Collections",
    "Datasets",
    "Imagery",
    "Maps",
    "Web services",
    "Websites",
    "Other",
];

pub const ID: &str = "id";
pub const TITLE: &str = "dct_title_s";
pub const RESOURCE_CLASS: &str = "gbl_resourceClass_sm";
pub const ACCESS_RIGHTS_FIELD: &str = "dct_accessRights_s";
pub const MD_VERSION: &str = "gbl_mdVersion_s";

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        vocabulary: None,
    }
}

const fn required(
    name: &'static str,
    kind: FieldKind,
    vocabulary: Option<&'static [&'static str]>,
) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
        vocabulary,
    }
}

/// Canonical fields in schema order.
pub const FIELDS: &[FieldSpec] = &[
    required(ACCESS_RIGHTS_FIELD, FieldKind::Text, Some(ACCESS_RIGHTS)),
    required(TITLE, FieldKind::Text, None),
    required(MD_VERSION, FieldKind::Text, Some(MD_VERSIONS)),
    required(RESOURCE_CLASS, FieldKind::TextList, Some(RESOURCE_CLASSES)),
    required(ID, FieldKind::Text, None),
    field("gbl_mdModified_dt", FieldKind::DateTime),
    field("dct_references_s", FieldKind::JsonObject),
    field("dcat_bbox", FieldKind::Text),
    field("dcat_centroid", FieldKind::Text),
    field("dcat_keyword_sm", FieldKind::TextList),
    field("dcat_theme_sm", FieldKind::TextList),
    field("dct_alternative_sm", FieldKind::TextList),
    field("dct_creator_sm", FieldKind::TextList),
    field("dct_description_sm", FieldKind::TextList),
    field("dct_format_s", FieldKind::Text),
    field("dct_identifier_sm", FieldKind::TextList),
    field("dct_isPartOf_sm", FieldKind::TextList),
    field("dct_isReplacedBy_sm", FieldKind::TextList),
    field("dct_issued_s", FieldKind::Text),
    field("dct_isVersionOf_sm", FieldKind::TextList),
    field("dct_language_sm", FieldKind::TextList),
    field("dct_license_sm", FieldKind::TextList),
    field("dct_publisher_sm", FieldKind::TextList),
    field("dct_relation_sm", FieldKind::TextList),
    field("dct_replaces_sm", FieldKind::TextList),
    field("dct_rights_sm", FieldKind::TextList),
    field("dct_rightsHolder_sm", FieldKind::TextList),
    field("dct_source_sm", FieldKind::TextList),
    field("dct_spatial_sm", FieldKind::TextList),
    field("dct_subject_sm", FieldKind::TextList),
    field("dct_temporal_sm", FieldKind::TextList),
    field("gbl_dateRange_drsim", FieldKind::TextList),
    field("gbl_displayNote_sm", FieldKind::TextList),
    field("gbl_fileSize_s", FieldKind::Text),
    field("gbl_georeferenced_b", FieldKind::Bool),
    field("gbl_indexYear_im", FieldKind::IntList),
    field("gbl_resourceType_sm", FieldKind::TextList),
    field("gbl_suppressed_b", FieldKind::Bool),
    field("gbl_wxsIdentifier_s", FieldKind::Text),
    field("locn_geometry", FieldKind::Text),
    field("pcdm_memberOf_sm", FieldKind::TextList),
    field("schema_provider_s", FieldKind::Text),
];

/// Look up a field by name.
pub fn spec_for(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.name == name)
}

/// Names of the mandatory fields, in schema order.
pub fn required_fields() -> impl Iterator<Item = &'static str> {
    FIELDS.iter().filter(|f| f.required).map(|f| f.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn field_names_are_unique() {
        let names: HashSet<_> = FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(names.len(), FIELDS.len());
    }

    #[test]
    fn required_set_is_the_five_mandatory_fields() {
        let req: Vec<_> = required_fields().collect();
        assert_eq!(
            req,
            vec![
                "dct_accessRights_s",
                "dct_title_s",
                "gbl_mdVersion_s",
                "gbl_resourceClass_sm",
                "id"
            ]
        );
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(spec_for("gbl_indexYear_im").unwrap().kind, FieldKind::IntList);
        assert!(spec_for("dc_title_s").is_none());
    }
}
