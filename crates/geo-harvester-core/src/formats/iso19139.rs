//! ISO 19139 (`gmd:MD_Metadata`).
//!
//! Namespaces are ignored; paths use local names only. Most fields live under
//! `identificationInfo/MD_DataIdentification`, abbreviated here as `IDENT`.
//! Code-list elements are read from their text, falling back to the
//! `codeListValue` attribute when the element is empty.

use crate::geometry::Envelope;
use crate::record::FieldValue;
use crate::resolve::{FieldError, FieldResult, ResolveContext, Resolver};
use crate::vocab;
use crate::xml::Element;

use super::{date_range, index_years, some_list, some_text, years_in};

const IDENT: &str = "MD_DataIdentification";

pub fn resolvers() -> Vec<(&'static str, Resolver)> {
    vec![
        ("dct_accessRights_s", access_rights as Resolver),
        ("dct_title_s", title),
        ("dct_alternative_sm", alternative_titles),
        ("gbl_resourceClass_sm", resource_class),
        ("dcat_bbox", bbox),
        ("locn_geometry", geometry),
        ("dcat_keyword_sm", keywords),
        ("dct_description_sm", description),
        ("dct_creator_sm", creators),
        ("dct_publisher_sm", publishers),
        ("dct_issued_s", issued),
        ("dct_identifier_sm", identifiers),
        ("dct_language_sm", languages),
        ("dct_subject_sm", subjects),
        ("dct_spatial_sm", places),
        ("dct_temporal_sm", temporal),
        ("gbl_dateRange_drsim", date_ranges),
        ("gbl_indexYear_im", index_year),
        ("dct_rights_sm", rights),
        ("dct_format_s", format),
        ("gbl_resourceType_sm", resource_types),
    ]
}

fn ident(path: &str) -> String {
    format!("{}/{}", IDENT, path)
}

fn code_value(el: &Element) -> Option<String> {
    let text = el.text();
    if !text.is_empty() {
        return Some(text);
    }
    el.attr("codeListValue")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn code_values(doc: &Element, path: &str) -> Vec<String> {
    doc.select(path).into_iter().filter_map(code_value).collect()
}

fn access_rights(ctx: &ResolveContext<'_>) -> FieldResult {
    let restricted = !ctx
        .xml()?
        .select(&ident("resourceConstraints/*/accessConstraints/MD_RestrictionCode"))
        .is_empty();
    let value = if restricted { "Restricted" } else { "Public" };
    Ok(Some(FieldValue::text(value)))
}

fn title(ctx: &ResolveContext<'_>) -> FieldResult {
    some_text(
        ctx.xml()?
            .select_text(&ident("citation/CI_Citation/title/CharacterString")),
    )
}

fn alternative_titles(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(
        ctx.xml()?
            .select_texts(&ident("citation/CI_Citation/alternateTitle/CharacterString")),
    )
}

fn resource_class(ctx: &ResolveContext<'_>) -> FieldResult {
    let levels = code_values(ctx.xml()?, "MD_Metadata/hierarchyLevel/MD_ScopeCode");
    if levels.is_empty() {
        return Ok(None);
    }
    some_list(
        levels
            .iter()
            .filter_map(|l| vocab::resource_class(l))
            .map(str::to_string)
            .collect(),
    )
}

/// Largest box spanned by every `EX_GeographicBoundingBox`.
fn envelope(doc: &Element) -> Result<Option<Envelope>, FieldError> {
    let coord = |b: &Element, name: &str| -> Result<f64, FieldError> {
        let text = b
            .child(name)
            .and_then(|c| c.child("Decimal"))
            .map(Element::text)
            .ok_or_else(|| FieldError::Invalid(format!("bounding box lacks {}", name)))?;
        text.parse::<f64>()
            .map_err(|_| FieldError::Invalid(format!("{} '{}' is not a number", name, text)))
    };
    let mut env: Option<Envelope> = None;
    for b in doc.select("EX_GeographicBoundingBox") {
        let next = Envelope {
            west: coord(b, "westBoundLongitude")?,
            east: coord(b, "eastBoundLongitude")?,
            north: coord(b, "northBoundLatitude")?,
            south: coord(b, "southBoundLatitude")?,
        };
        env = Some(match env {
            None => next,
            Some(e) => Envelope {
                west: e.west.min(next.west),
                east: e.east.max(next.east),
                north: e.north.max(next.north),
                south: e.south.min(next.south),
            },
        });
    }
    Ok(env)
}

fn bbox(ctx: &ResolveContext<'_>) -> FieldResult {
    Ok(envelope(ctx.xml()?)?.map(|e| FieldValue::text(e.to_wkt())))
}

fn geometry(ctx: &ResolveContext<'_>) -> FieldResult {
    ctx.value_of("dcat_bbox")
}

fn keywords(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(
        ctx.xml()?
            .select_texts(&ident("descriptiveKeywords/MD_Keywords/keyword/CharacterString")),
    )
}

fn description(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(ctx.xml()?.select_texts(&ident("abstract/CharacterString")))
}

/// Organisation names of responsible parties holding `role`.
fn parties_with_role(doc: &Element, role: &str) -> Vec<String> {
    doc.select("CI_ResponsibleParty")
        .into_iter()
        .filter(|party| {
            party
                .select("role/CI_RoleCode")
                .into_iter()
                .filter_map(code_value)
                .any(|r| r.eq_ignore_ascii_case(role))
        })
        .filter_map(|party| party.select_text("CI_ResponsibleParty/organisationName/CharacterString"))
        .collect()
}

fn creators(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(parties_with_role(ctx.xml()?, "originator"))
}

fn publishers(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(parties_with_role(ctx.xml()?, "publisher"))
}

/// Year of the citation's publication date.
fn issued(ctx: &ResolveContext<'_>) -> FieldResult {
    let doc = ctx.xml()?;
    let year = doc
        .select(&ident("citation/CI_Citation/date/CI_Date"))
        .into_iter()
        .filter(|d| {
            d.select("dateType/CI_DateTypeCode")
                .into_iter()
                .filter_map(code_value)
                .any(|t| t == "publication")
        })
        .filter_map(|d| {
            d.select_text("CI_Date/date/Date")
                .or_else(|| d.select_text("CI_Date/date/DateTime"))
        })
        .find_map(|date| years_in(&date).first().copied());
    some_text(year.map(|y| y.to_string()))
}

fn identifiers(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(
        ctx.xml()?
            .select_texts(&ident("citation/CI_Citation/identifier/MD_Identifier/code/CharacterString")),
    )
}

fn languages(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(
        code_values(ctx.xml()?, &ident("language/LanguageCode"))
            .iter()
            .filter_map(|l| vocab::language_code(l))
            .collect(),
    )
}

fn subjects(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(code_values(ctx.xml()?, &ident("topicCategory/MD_TopicCategoryCode")))
}

/// Keyword groups whose `type` code is `keyword_type`.
fn typed_keywords(doc: &Element, keyword_type: &str) -> Vec<String> {
    doc.select(&ident("descriptiveKeywords/MD_Keywords"))
        .into_iter()
        .filter(|group| {
            group
                .select("type/MD_KeywordTypeCode")
                .into_iter()
                .filter_map(code_value)
                .any(|t| t == keyword_type)
        })
        .flat_map(|group| group.select_texts("MD_Keywords/keyword/CharacterString"))
        .collect()
}

fn places(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(typed_keywords(ctx.xml()?, "place"))
}

/// A `timePosition`/`beginPosition`/`endPosition`, or its indeterminate marker.
fn position(el: Option<&Element>) -> Option<String> {
    let el = el?;
    if let Some(marker) = el.attr("indeterminatePosition") {
        return Some(marker.to_string());
    }
    let text = el.text();
    (!text.is_empty()).then_some(text)
}

struct Extents {
    instants: Vec<String>,
    periods: Vec<(Option<String>, Option<String>)>,
}

fn extents(doc: &Element) -> Extents {
    let mut out = Extents {
        instants: Vec::new(),
        periods: Vec::new(),
    };
    for extent in doc.select(&ident("extent/EX_Extent/temporalElement/EX_TemporalExtent/extent")) {
        for instant in extent.children_named("TimeInstant") {
            if let Some(ts) = position(instant.child("timePosition")) {
                out.instants.push(ts);
            }
        }
        for period in extent.children_named("TimePeriod") {
            out.periods.push((
                position(period.child("beginPosition")),
                position(period.child("endPosition")),
            ));
        }
    }
    out
}

fn temporal(ctx: &ResolveContext<'_>) -> FieldResult {
    let ext = extents(ctx.xml()?);
    let mut out = ext.instants;
    out.extend(ext.periods.into_iter().map(|(b, e)| {
        format!("{}-{}", b.unwrap_or_default(), e.unwrap_or_default())
    }));
    some_list(out)
}

/// Periods whose endpoints both carry a year. `now`-style markers are dropped.
fn year_pairs(periods: &[(Option<String>, Option<String>)]) -> Vec<(i64, i64)> {
    periods
        .iter()
        .filter_map(|(b, e)| {
            let b = years_in(b.as_deref()?).first().copied()?;
            let e = years_in(e.as_deref()?).first().copied()?;
            Some((b, e))
        })
        .collect()
}

fn date_ranges(ctx: &ResolveContext<'_>) -> FieldResult {
    let ext = extents(ctx.xml()?);
    some_list(
        year_pairs(&ext.periods)
            .into_iter()
            .map(|(a, b)| date_range(a, b))
            .collect(),
    )
}

fn index_year(ctx: &ResolveContext<'_>) -> FieldResult {
    let ext = extents(ctx.xml()?);
    let singles: Vec<i64> = ext
        .instants
        .iter()
        .filter_map(|s| years_in(s).first().copied())
        .collect();
    Ok(Some(FieldValue::IntList(index_years(
        &singles,
        &year_pairs(&ext.periods),
    ))))
}

fn rights(ctx: &ResolveContext<'_>) -> FieldResult {
    let doc = ctx.xml()?;
    let texts = doc
        .select(&ident("resourceConstraints"))
        .into_iter()
        .flat_map(Element::descendants)
        .filter(|el| el.name == "CharacterString")
        .map(Element::text)
        .filter(|t| !t.is_empty() && t != "None")
        .collect();
    some_list(texts)
}

fn format(ctx: &ResolveContext<'_>) -> FieldResult {
    let name = ctx
        .xml()?
        .select_text("distributionInfo/MD_Distribution/distributionFormat/MD_Format/name/CharacterString");
    let types = ctx.list_of("gbl_resourceType_sm");
    Ok(vocab::format_term(name.as_deref(), &types).map(FieldValue::Text))
}

/// Keywords drawn from the FGDC thesaurus.
fn resource_types(ctx: &ResolveContext<'_>) -> FieldResult {
    let doc = ctx.xml()?;
    let raw: Vec<String> = doc
        .select(&ident("descriptiveKeywords/MD_Keywords"))
        .into_iter()
        .filter(|group| {
            group
                .select_texts("thesaurusName/CI_Citation/title/CharacterString")
                .iter()
                .any(|t| t == "FGDC")
        })
        .flat_map(|group| group.select_texts("MD_Keywords/keyword/CharacterString"))
        .collect();
    some_list(vocab::resource_type_terms(raw))
}
