//! GeoBlacklight Aardvark JSON.
//!
//! Already in the canonical vocabulary, so most fields pass straight through.
//! Only the resource class, format, resource types, date ranges, index
//! years and references get any treatment.

use crate::record::FieldValue;
use crate::resolve::{FieldResult, ResolveContext, Resolver};
use crate::vocab;

use super::{
    embedded_references, embedded_url, external_references, json_bool, json_ints, json_list,
    json_text, some_list, some_text, with_json,
};

/// Define a resolver that copies a same-named field.
macro_rules! passthrough {
    ($name:ident, $field:literal, text) => {
        fn $name(ctx: &ResolveContext<'_>) -> FieldResult {
            with_json(ctx, |m| some_text(json_text(m, $field)))
        }
    };
    ($name:ident, $field:literal, list) => {
        fn $name(ctx: &ResolveContext<'_>) -> FieldResult {
            with_json(ctx, |m| some_list(json_list(m, $field)))
        }
    };
}

passthrough!(access_rights, "dct_accessRights_s", text);
passthrough!(title, "dct_title_s", text);
passthrough!(bbox, "dcat_bbox", text);
passthrough!(geometry, "locn_geometry", text);
passthrough!(centroid, "dcat_centroid", text);
passthrough!(issued, "dct_issued_s", text);
passthrough!(wxs_identifier, "gbl_wxsIdentifier_s", text);
passthrough!(file_size, "gbl_fileSize_s", text);
passthrough!(keywords, "dcat_keyword_sm", list);
passthrough!(alternative_titles, "dct_alternative_sm", list);
passthrough!(creators, "dct_creator_sm", list);
passthrough!(description, "dct_description_sm", list);
passthrough!(identifiers, "dct_identifier_sm", list);
passthrough!(languages, "dct_language_sm", list);
passthrough!(publishers, "dct_publisher_sm", list);
passthrough!(rights, "dct_rights_sm", list);
passthrough!(rights_holders, "dct_rightsHolder_sm", list);
passthrough!(licenses, "dct_license_sm", list);
passthrough!(places, "dct_spatial_sm", list);
passthrough!(subjects, "dct_subject_sm", list);
passthrough!(temporal, "dct_temporal_sm", list);
passthrough!(part_of, "dct_isPartOf_sm", list);
passthrough!(member_of, "pcdm_memberOf_sm", list);
passthrough!(version_of, "dct_isVersionOf_sm", list);
passthrough!(replaces, "dct_replaces_sm", list);
passthrough!(replaced_by, "dct_isReplacedBy_sm", list);
passthrough!(relations, "dct_relation_sm", list);
passthrough!(sources, "dct_source_sm", list);
passthrough!(display_notes, "gbl_displayNote_sm", list);

pub fn resolvers() -> Vec<(&'static str, Resolver)> {
    vec![
        ("dct_accessRights_s", access_rights as Resolver),
        ("dct_title_s", title),
        ("gbl_resourceClass_sm", resource_class),
        ("dcat_bbox", bbox),
        ("locn_geometry", geometry),
        ("dcat_centroid", centroid),
        ("dct_references_s", references),
        ("dct_issued_s", issued),
        ("gbl_wxsIdentifier_s", wxs_identifier),
        ("gbl_fileSize_s", file_size),
        ("gbl_georeferenced_b", georeferenced),
        ("dcat_keyword_sm", keywords),
        ("dct_alternative_sm", alternative_titles),
        ("dct_creator_sm", creators),
        ("dct_description_sm", description),
        ("dct_identifier_sm", identifiers),
        ("dct_language_sm", languages),
        ("dct_publisher_sm", publishers),
        ("dct_rights_sm", rights),
        ("dct_rightsHolder_sm", rights_holders),
        ("dct_license_sm", licenses),
        ("dct_spatial_sm", places),
        ("dct_subject_sm", subjects),
        ("dct_temporal_sm", temporal),
        ("dct_isPartOf_sm", part_of),
        ("pcdm_memberOf_sm", member_of),
        ("dct_isVersionOf_sm", version_of),
        ("dct_replaces_sm", replaces),
        ("dct_isReplacedBy_sm", replaced_by),
        ("dct_relation_sm", relations),
        ("dct_source_sm", sources),
        ("gbl_displayNote_sm", display_notes),
        ("gbl_dateRange_drsim", date_ranges),
        ("gbl_indexYear_im", index_year),
        ("dct_format_s", format),
        ("gbl_resourceType_sm", resource_types),
    ]
}

fn resource_class(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| {
        some_list(vocab::resource_classes_or_other(json_list(m, "gbl_resourceClass_sm")))
    })
}

fn georeferenced(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| Ok(json_bool(m, "gbl_georeferenced_b").map(FieldValue::Bool)))
}

/// A lone range string becomes a one-element list.
fn date_ranges(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_list(json_list(m, "gbl_dateRange_drsim")))
}

fn index_year(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| Ok(Some(FieldValue::IntList(json_ints(m, "gbl_indexYear_im")))))
}

fn format(ctx: &ResolveContext<'_>) -> FieldResult {
    let types = ctx.list_of("gbl_resourceType_sm");
    with_json(ctx, |m| {
        let raw = json_text(m, "dct_format_s");
        Ok(vocab::format_term(raw.as_deref(), &types).map(FieldValue::Text))
    })
}

fn resource_types(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| {
        some_list(vocab::resource_type_terms(json_list(m, "gbl_resourceType_sm")))
    })
}

fn references(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| {
        let embedded = embedded_references(m)?;
        external_references(embedded_url(&embedded), &embedded)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{HarvestEvent, MetadataFormat, Origin, OriginContext, SourceRecord};
    use crate::resolve::{CapabilityRegistry, FieldError, ResolveEnv};
    use chrono::Utc;
    use serde_json::{json, Value};

    fn resolve(record: Value, field: &str) -> FieldResult {
        let src = SourceRecord::new(
            "edu.stanford:bb1",
            Origin::Ogm,
            MetadataFormat::Aardvark,
            HarvestEvent::Created,
            serde_json::to_vec(&record).unwrap(),
            OriginContext::Repository {
                name: "edu.stanford".into(),
                path: "metadata-aardvark/bb1.json".into(),
                commit: None,
                external_url_strategy: None,
            },
        );
        let registry = CapabilityRegistry::new();
        let set = registry.resolvers_for(Origin::Ogm, MetadataFormat::Aardvark);
        let env = ResolveEnv::new("https://cdn.example.org/geo", Utc::now());
        ResolveContext::new(&src, &env, set).value_of(field)
    }

    #[test]
    fn scalar_date_range_becomes_list() {
        let rec = json!({"gbl_dateRange_drsim": "[1890 TO 1900]"});
        assert_eq!(
            resolve(rec, "gbl_dateRange_drsim").unwrap(),
            Some(FieldValue::list(["[1890 TO 1900]"]))
        );
    }

    #[test]
    fn index_years_are_coerced_to_integers() {
        let rec = json!({"gbl_indexYear_im": ["1890", 1891, "n.d."]});
        assert_eq!(
            resolve(rec, "gbl_indexYear_im").unwrap(),
            Some(FieldValue::IntList(vec![1890, 1891]))
        );
    }

    #[test]
    fn resource_class_maps_or_falls_back() {
        let rec = json!({"gbl_resourceClass_sm": ["maps", "Tile"]});
        assert_eq!(
            resolve(rec, "gbl_resourceClass_sm").unwrap(),
            Some(FieldValue::list(["Maps"]))
        );
        let rec = json!({"gbl_resourceClass_sm": ["Tile"]});
        assert_eq!(
            resolve(rec, "gbl_resourceClass_sm").unwrap(),
            Some(FieldValue::list(["Other"]))
        );
    }

    #[test]
    fn references_need_a_landing_page() {
        let rec = json!({"dct_references_s": "{\"http://schema.org/downloadUrl\":\"https://x/y.zip\"}"});
        assert_eq!(resolve(rec, "dct_references_s"), Err(FieldError::NoExternalUrl));

        let rec = json!({"dct_references_s": "{\"http://schema.org/url\":\"https://purl.stanford.edu/bb1\"}"});
        let value = resolve(rec, "dct_references_s").unwrap().unwrap();
        let refs: Value = serde_json::from_str(value.as_text().unwrap()).unwrap();
        assert_eq!(refs, json!({"http://schema.org/url": "https://purl.stanford.edu/bb1"}));
    }
}
