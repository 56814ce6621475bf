//! Origin capabilities.
//!
//! | Layer | Fields |
//! |-------|--------|
//! | shared | `id`, `gbl_mdModified_dt`, `gbl_mdVersion_s`, `dcat_theme_sm`, `gbl_suppressed_b` |
//! | [`mit`] | `dct_references_s`, `schema_provider_s` |
//! | [`ogm`] | `schema_provider_s` |
//! | [`alma`] | `dct_references_s`, `schema_provider_s` |

pub mod alma;
pub mod mit;
pub mod ogm;

use crate::record::{FieldValue, Origin};
use crate::resolve::{FieldResult, ResolveContext, Resolver};
use crate::vocab;

/// Resolvers every origin shares.
pub fn shared_resolvers() -> Vec<(&'static str, Resolver)> {
    vec![
        ("id", id as Resolver),
        ("gbl_mdModified_dt", md_modified),
        ("gbl_mdVersion_s", md_version),
        ("dcat_theme_sm", themes),
        ("gbl_suppressed_b", suppressed),
    ]
}

/// Resolvers contributed by one origin.
pub fn resolvers(origin: Origin) -> Vec<(&'static str, Resolver)> {
    match origin {
        Origin::Mit => mit::resolvers(),
        Origin::Ogm => ogm::resolvers(),
        Origin::Alma => alma::resolvers(),
    }
}

fn id(ctx: &ResolveContext<'_>) -> FieldResult {
    Ok(Some(FieldValue::text(format!(
        "{}:{}",
        ctx.source.origin(),
        ctx.source.identifier()
    ))))
}

fn md_modified(ctx: &ResolveContext<'_>) -> FieldResult {
    Ok(Some(FieldValue::text(ctx.env.harvested_at_rfc3339())))
}

fn md_version(_: &ResolveContext<'_>) -> FieldResult {
    Ok(Some(FieldValue::text("Aardvark")))
}

/// Subjects that double as theme terms.
fn themes(ctx: &ResolveContext<'_>) -> FieldResult {
    let subjects = ctx.list_of("dct_subject_sm");
    Ok(Some(FieldValue::TextList(vocab::themes_from_subjects(&subjects))))
}

fn suppressed(ctx: &ResolveContext<'_>) -> FieldResult {
    Ok(Some(FieldValue::Bool(ctx.source.event().is_deleted())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{HarvestEvent, MetadataFormat, OriginContext, SourceRecord};
    use crate::resolve::{CapabilityRegistry, ResolveEnv};
    use chrono::TimeZone;

    #[test]
    fn shared_fields() {
        let registry = CapabilityRegistry::new();
        let env = ResolveEnv::new(
            "https://cdn.example.org/geo",
            chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
        );
        let source = SourceRecord::new(
            "abc",
            Origin::Alma,
            MetadataFormat::Marc,
            HarvestEvent::Deleted,
            b"<record/>".to_vec(),
            OriginContext::None,
        );
        let set = registry.resolvers_for(Origin::Alma, MetadataFormat::Marc);
        let ctx = ResolveContext::new(&source, &env, set);

        assert_eq!(id(&ctx).unwrap(), Some(FieldValue::text("alma:abc")));
        assert_eq!(
            md_modified(&ctx).unwrap(),
            Some(FieldValue::text("2024-03-01T12:30:00Z"))
        );
        assert_eq!(suppressed(&ctx).unwrap(), Some(FieldValue::Bool(true)));
    }
}
