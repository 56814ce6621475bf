//! GeoBlacklight 1.x JSON, crosswalked to Aardvark.
//!
//! | GBL1 | Aardvark |
//! |------|----------|
//! | `dc_rights_s` | `dct_accessRights_s` |
//! | `dc_title_s` | `dct_title_s` |
//! | `dc_type_s` | `gbl_resourceClass_sm` |
//! | `solr_geom` | `dcat_bbox`, `locn_geometry` |
//! | `dc_description_s` | `dct_description_sm` |
//! | `dc_creator_sm` | `dct_creator_sm` |
//! | `dc_format_s` | `dct_format_s` |
//! | `dct_issued_s` | `dct_issued_s` |
//! | `dc_identifier_s` | `dct_identifier_sm` |
//! | `dc_language_sm` / `dc_language_s` | `dct_language_sm` |
//! | `dc_publisher_s` | `dct_publisher_sm` |
//! | `dct_spatial_sm` | `dct_spatial_sm` |
//! | `dc_subject_sm` | `dct_subject_sm` |
//! | `dct_temporal_sm` | `dct_temporal_sm` |
//! | `layer_geom_type_s` | `gbl_resourceType_sm` |
//! | `solr_year_i` | `gbl_indexYear_im` |

use serde_json::{Map, Value};

use crate::record::{ExternalUrlStrategy, FieldValue};
use crate::resolve::{FieldError, FieldResult, ResolveContext, Resolver};
use crate::vocab;

use super::{
    embedded_references, embedded_url, external_references, json_ints, json_list, json_text,
    some_list, some_text, with_json,
};

pub fn resolvers() -> Vec<(&'static str, Resolver)> {
    vec![
        ("dct_accessRights_s", access_rights as Resolver),
        ("dct_title_s", title),
        ("gbl_resourceClass_sm", resource_class),
        ("dcat_bbox", bbox),
        ("locn_geometry", geometry),
        ("dct_references_s", references),
        ("dct_description_sm", description),
        ("dct_creator_sm", creators),
        ("dct_format_s", format),
        ("dct_issued_s", issued),
        ("dct_identifier_sm", identifiers),
        ("dct_language_sm", languages),
        ("dct_publisher_sm", publishers),
        ("dct_spatial_sm", places),
        ("dct_subject_sm", subjects),
        ("dct_temporal_sm", temporal),
        ("gbl_resourceType_sm", resource_types),
        ("gbl_indexYear_im", index_year),
    ]
}

fn access_rights(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| {
        let value = json_text(m, "dc_rights_s").map(|v| match v.trim().to_lowercase().as_str() {
            "public" => "Public".to_string(),
            "restricted" => "Restricted".to_string(),
            _ => v,
        });
        some_text(value)
    })
}

fn title(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_text(json_text(m, "dc_title_s")))
}

fn resource_class(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| {
        some_list(vocab::resource_classes_or_other(json_text(m, "dc_type_s")))
    })
}

fn bbox(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_text(json_text(m, "solr_geom")))
}

fn geometry(ctx: &ResolveContext<'_>) -> FieldResult {
    ctx.value_of("dcat_bbox")
}

/// The landing page, from the repository's strategy or the record's own links.
fn landing_url(
    record: &Map<String, Value>,
    embedded: &Map<String, Value>,
    strategy: Option<&ExternalUrlStrategy>,
) -> Result<Option<String>, FieldError> {
    let Some(strategy) = strategy else {
        return Ok(embedded_url(embedded));
    };
    let field = strategy.gbl1_field.as_deref();
    match strategy.name.as_str() {
        "base_url_and_slug" => {
            let base = strategy.base_url.as_deref().ok_or_else(|| {
                FieldError::Invalid("base_url_and_slug strategy needs base_url".to_string())
            })?;
            let slug = field.and_then(|f| json_text(record, f));
            Ok(slug.map(|s| format!("{}/{}", base.trim_end_matches('/'), s)))
        }
        "field_value" => Ok(field
            .and_then(|f| json_text(record, f))
            .filter(|url| url.starts_with("http"))),
        other => Err(FieldError::Invalid(format!(
            "Alternate URL strategy not recognized: {}",
            other
        ))),
    }
}

fn references(ctx: &ResolveContext<'_>) -> FieldResult {
    let strategy = ctx.repository().and_then(|(_, s)| s);
    with_json(ctx, |m| {
        let embedded = embedded_references(m)?;
        let url = landing_url(m, &embedded, strategy)?;
        external_references(url, &embedded)
    })
}

fn description(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_list(json_list(m, "dc_description_s")))
}

fn creators(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_list(json_list(m, "dc_creator_sm")))
}

fn format(ctx: &ResolveContext<'_>) -> FieldResult {
    let types = ctx.list_of("gbl_resourceType_sm");
    with_json(ctx, |m| {
        let raw = json_text(m, "dc_format_s");
        Ok(vocab::format_term(raw.as_deref(), &types).map(FieldValue::Text))
    })
}

fn issued(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_text(json_text(m, "dct_issued_s")))
}

fn identifiers(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_list(json_list(m, "dc_identifier_s")))
}

fn languages(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| {
        let mut langs = json_list(m, "dc_language_sm");
        if langs.is_empty() {
            langs = json_list(m, "dc_language_s");
        }
        some_list(langs)
    })
}

fn publishers(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_list(json_list(m, "dc_publisher_s")))
}

fn places(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_list(json_list(m, "dct_spatial_sm")))
}

fn subjects(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_list(json_list(m, "dc_subject_sm")))
}

fn temporal(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| some_list(json_list(m, "dct_temporal_sm")))
}

fn resource_types(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| {
        some_list(vocab::resource_type_terms(json_list(m, "layer_geom_type_s")))
    })
}

fn index_year(ctx: &ResolveContext<'_>) -> FieldResult {
    with_json(ctx, |m| {
        let years: Vec<i64> = json_ints(m, "solr_year_i").into_iter().take(1).collect();
        Ok(Some(FieldValue::IntList(years)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{HarvestEvent, MetadataFormat, Origin, OriginContext, SourceRecord};
    use crate::resolve::{CapabilityRegistry, ResolveEnv};
    use chrono::Utc;
    use serde_json::json;

    fn source(record: Value, strategy: Option<ExternalUrlStrategy>) -> SourceRecord {
        SourceRecord::new(
            "edu.nyu:abc",
            Origin::Ogm,
            MetadataFormat::Gbl1,
            HarvestEvent::Created,
            serde_json::to_vec(&record).unwrap(),
            OriginContext::Repository {
                name: "edu.nyu".into(),
                path: "metadata-1.0/abc/geoblacklight.json".into(),
                commit: None,
                external_url_strategy: strategy,
            },
        )
    }

    fn references_of(src: &SourceRecord) -> FieldResult {
        let registry = CapabilityRegistry::new();
        let set = registry.resolvers_for(Origin::Ogm, MetadataFormat::Gbl1);
        let env = ResolveEnv::new("https://cdn.example.org/geo", Utc::now());
        ResolveContext::new(src, &env, set).value_of("dct_references_s")
    }

    fn parsed(result: FieldResult) -> Value {
        let value = result.unwrap().unwrap();
        serde_json::from_str(value.as_text().unwrap()).unwrap()
    }

    fn record() -> Value {
        json!({
            "dc_title_s": "Subway Lines",
            "dc_rights_s": "Public",
            "layer_slug_s": "nyu-2451-34564",
            "dc_identifier_s": "http://hdl.handle.net/2451/34564",
            "dct_references_s": "{\"http://schema.org/url\":\"http://hdl.handle.net/2451/34564\",\"http://schema.org/downloadUrl\":\"https://archive.nyu.edu/34564.zip\"}"
        })
    }

    #[test]
    fn embedded_url_is_used_by_default() {
        let refs = parsed(references_of(&source(record(), None)));
        assert_eq!(refs["http://schema.org/url"], "http://hdl.handle.net/2451/34564");
        assert_eq!(
            refs["http://schema.org/downloadUrl"][0]["url"],
            "https://archive.nyu.edu/34564.zip"
        );
    }

    #[test]
    fn base_url_and_slug_strategy() {
        let strategy = ExternalUrlStrategy {
            name: "base_url_and_slug".into(),
            base_url: Some("https://geo.nyu.edu/catalog/".into()),
            gbl1_field: Some("layer_slug_s".into()),
        };
        let refs = parsed(references_of(&source(record(), Some(strategy))));
        assert_eq!(
            refs["http://schema.org/url"],
            "https://geo.nyu.edu/catalog/nyu-2451-34564"
        );
    }

    #[test]
    fn field_value_strategy_requires_http() {
        let strategy = ExternalUrlStrategy {
            name: "field_value".into(),
            base_url: None,
            gbl1_field: Some("layer_slug_s".into()),
        };
        assert_eq!(
            references_of(&source(record(), Some(strategy))),
            Err(FieldError::NoExternalUrl)
        );

        let strategy = ExternalUrlStrategy {
            name: "field_value".into(),
            base_url: None,
            gbl1_field: Some("dc_identifier_s".into()),
        };
        let refs = parsed(references_of(&source(record(), Some(strategy))));
        assert_eq!(refs["http://schema.org/url"], "http://hdl.handle.net/2451/34564");
    }

    #[test]
    fn unknown_strategy_is_a_field_error() {
        let strategy = ExternalUrlStrategy {
            name: "guess".into(),
            base_url: None,
            gbl1_field: None,
        };
        match references_of(&source(record(), Some(strategy))) {
            Err(FieldError::Invalid(msg)) => {
                assert_eq!(msg, "Alternate URL strategy not recognized: guess")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unmapped_type_falls_back_to_other() {
        let mut rec = record();
        rec["dc_type_s"] = json!("Physical Object");
        let src = source(rec, None);
        let registry = CapabilityRegistry::new();
        let set = registry.resolvers_for(Origin::Ogm, MetadataFormat::Gbl1);
        let env = ResolveEnv::new("https://cdn.example.org/geo", Utc::now());
        let ctx = ResolveContext::new(&src, &env, set);
        assert_eq!(
            ctx.value_of("gbl_resourceClass_sm").unwrap(),
            Some(FieldValue::list(["Other"]))
        );
    }
}
