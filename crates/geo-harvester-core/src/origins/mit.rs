//! Internal GIS file store.

use serde_json::json;

use crate::record::{normalized_metadata_filename, FieldValue};
use crate::resolve::{FieldResult, ResolveContext, Resolver};

pub const SCHEMA_PROVIDER: &str = "GIS Lab, MIT Libraries";
pub const RECORD_PAGE_ROOT: &str = "https://geodata.libraries.mit.edu/record/gismit:";

pub fn resolvers() -> Vec<(&'static str, Resolver)> {
    vec![
        ("dct_references_s", references as Resolver),
        ("schema_provider_s", schema_provider),
    ]
}

/// Links to the mirrored metadata, the data package, and the record page.
///
/// The data package sits under `restricted/` unless access rights resolve to
/// `Public`.
fn references(ctx: &ResolveContext<'_>) -> FieldResult {
    let restricted = !matches!(
        ctx.value_of("dct_accessRights_s"),
        Ok(Some(FieldValue::Text(ref s))) if s == "Public"
    );
    let folder = if restricted { "restricted" } else { "public" };
    let root = &ctx.env.http_cdn_root;
    let id = ctx.source.identifier();

    let refs = json!({
        "http://schema.org/downloadUrl": [
            {
                "label": "Source Metadata",
                "url": format!("{}/public/{}", root, ctx.source.source_filename()),
            },
            {
                "label": "Aardvark Metadata",
                "url": format!("{}/public/{}", root, normalized_metadata_filename(id)),
            },
            {
                "label": "Data",
                "url": format!("{}/{}/{}.zip", root, folder, id),
            },
        ],
        "http://schema.org/url": format!("{}{}", RECORD_PAGE_ROOT, id),
    });
    Ok(Some(FieldValue::text(refs.to_string())))
}

fn schema_provider(_: &ResolveContext<'_>) -> FieldResult {
    Ok(Some(FieldValue::text(SCHEMA_PROVIDER)))
}
