//! Library catalog bulk exports.

use serde_json::json;

use crate::record::FieldValue;
use crate::resolve::{FieldResult, ResolveContext, Resolver};

pub const SCHEMA_PROVIDER: &str = "MIT Libraries";
pub const PRIMO_PERMALINK_ROOT: &str =
    "https://mit.primo.exlibrisgroup.com/permalink/01MIT_INST/jp08pj/alma";

pub fn resolvers() -> Vec<(&'static str, Resolver)> {
    vec![
        ("dct_references_s", references as Resolver),
        ("schema_provider_s", schema_provider),
    ]
}

/// Catalog permalink built from the control number.
fn references(ctx: &ResolveContext<'_>) -> FieldResult {
    let refs = json!({
        "http://schema.org/url": format!("{}{}", PRIMO_PERMALINK_ROOT, ctx.source.identifier()),
    });
    Ok(Some(FieldValue::text(refs.to_string())))
}

fn schema_provider(_: &ResolveContext<'_>) -> FieldResult {
    Ok(Some(FieldValue::text(SCHEMA_PROVIDER)))
}
