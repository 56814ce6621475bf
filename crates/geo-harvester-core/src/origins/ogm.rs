//! OpenGeoMetadata repositories.
//!
//! The provider is the repository name. Landing-page references are
//! format-specific (see `formats::gbl1` and `formats::aardvark`), which read
//! the repository's external URL strategy from the origin context.

use crate::record::FieldValue;
use crate::resolve::{FieldError, FieldResult, ResolveContext, Resolver};

pub fn resolvers() -> Vec<(&'static str, Resolver)> {
    vec![("schema_provider_s", schema_provider as Resolver)]
}

fn schema_provider(ctx: &ResolveContext<'_>) -> FieldResult {
    let (name, _) = ctx
        .repository()
        .ok_or(FieldError::MissingContext("repository"))?;
    Ok(Some(FieldValue::text(name)))
}
