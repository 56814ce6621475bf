//! FGDC Content Standard for Digital Geospatial Metadata.
//!
//! All paths are relative to any `idinfo`/`distinfo`/`spdoinfo` element,
//! since the select's first step matches descendants.

use crate::geometry::Envelope;
use crate::record::FieldValue;
use crate::resolve::{FieldError, FieldResult, ResolveContext, Resolver};
use crate::vocab;
use crate::xml::Element;

use super::{date_range, index_years, some_list, some_text, years_in};

pub fn resolvers() -> Vec<(&'static str, Resolver)> {
    vec![
        ("dct_accessRights_s", access_rights as Resolver),
        ("dct_title_s", title),
        ("gbl_resourceClass_sm", resource_class),
        ("dcat_bbox", bbox),
        ("locn_geometry", geometry),
        ("dcat_keyword_sm", keywords),
        ("dct_description_sm", description),
        ("dct_creator_sm", creators),
        ("dct_publisher_sm", publishers),
        ("dct_issued_s", issued),
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

fn access_rights(ctx: &ResolveContext<'_>) -> FieldResult {
    let doc = ctx.xml()?;
    let restricted = doc
        .select_text("idinfo/accconst")
        .map(|v| v.to_lowercase().contains("restricted"))
        .unwrap_or(false);
    let value = if restricted { "Restricted" } else { "Public" };
    Ok(Some(FieldValue::text(value)))
}

fn title(ctx: &ResolveContext<'_>) -> FieldResult {
    some_text(ctx.xml()?.select_text("idinfo/citation/citeinfo/title"))
}

fn resource_class(ctx: &ResolveContext<'_>) -> FieldResult {
    let forms = ctx.xml()?.select_texts("idinfo/citation/citeinfo/geoform");
    let mut classes = Vec::new();
    for form in &forms {
        let class = match form.trim().to_lowercase().as_str() {
            "vector digital data" | "tabular digital data" | "raster digital data" => "Datasets",
            "remote-sensing image" | "remote sensing image" => "Imagery",
            "map" | "atlas" => "Maps",
            other => match vocab::resource_class(other) {
                Some(c) => c,
                None => continue,
            },
        };
        classes.push(class.to_string());
    }
    if classes.is_empty() {
        classes.push("Other".to_string());
    }
    some_list(classes)
}

/// Outermost box across every `bounding` element.
pub(crate) fn envelope(doc: &Element) -> Result<Option<Envelope>, FieldError> {
    let boxes = doc.select("idinfo/spdom/bounding");
    if boxes.is_empty() {
        return Ok(None);
    }
    let coord = |b: &Element, name: &str| -> Result<f64, FieldError> {
        let text = b
            .child(name)
            .map(Element::text)
            .ok_or_else(|| FieldError::Invalid(format!("bounding box lacks {}", name)))?;
        text.parse::<f64>()
            .map_err(|_| FieldError::Invalid(format!("{} '{}' is not a number", name, text)))
    };
    let mut env: Option<Envelope> = None;
    for b in boxes {
        let next = Envelope {
            west: coord(b, "westbc")?,
            east: coord(b, "eastbc")?,
            north: coord(b, "northbc")?,
            south: coord(b, "southbc")?,
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
    let doc = ctx.xml()?;
    let mut words = doc.select_texts("idinfo/keywords/theme/themekey");
    words.extend(doc.select_texts("idinfo/keywords/place/placekey"));
    some_list(words)
}

fn description(ctx: &ResolveContext<'_>) -> FieldResult {
    let doc = ctx.xml()?;
    let mut parts = doc.select_texts("idinfo/descript/abstract");
    parts.extend(doc.select_texts("idinfo/descript/purpose"));
    some_list(parts)
}

fn creators(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(ctx.xml()?.select_texts("idinfo/citation/citeinfo/origin"))
}

fn publishers(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(
        ctx.xml()?
            .select_texts("idinfo/citation/citeinfo/pubinfo/publish"),
    )
}

fn issued(ctx: &ResolveContext<'_>) -> FieldResult {
    let value = ctx
        .xml()?
        .select_text("idinfo/citation/citeinfo/pubdate")
        .filter(|d| !d.eq_ignore_ascii_case("unknown"));
    some_text(value)
}

fn subjects(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(ctx.xml()?.select_texts("idinfo/keywords/theme/themekey"))
}

fn places(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(ctx.xml()?.select_texts("idinfo/keywords/place/placekey"))
}

/// Single dates and `begdate`/`enddate` pairs from the time period.
fn periods(doc: &Element) -> (Vec<String>, Vec<(String, String)>) {
    let mut singles = doc.select_texts("idinfo/timeperd/timeinfo/sngdate/caldate");
    singles.extend(doc.select_texts("idinfo/timeperd/timeinfo/mdattim/sngdate/caldate"));
    let ranges = doc
        .select("idinfo/timeperd/timeinfo/rngdates")
        .into_iter()
        .filter_map(|r| {
            let beg = r.child("begdate").map(Element::text)?;
            let end = r.child("enddate").map(Element::text)?;
            Some((beg, end))
        })
        .collect();
    (singles, ranges)
}

fn temporal(ctx: &ResolveContext<'_>) -> FieldResult {
    let (singles, ranges) = periods(ctx.xml()?);
    let mut out = singles;
    out.extend(ranges.into_iter().map(|(b, e)| format!("{}-{}", b, e)));
    some_list(out)
}

fn year_pairs(ranges: &[(String, String)]) -> Vec<(i64, i64)> {
    ranges
        .iter()
        .filter_map(|(b, e)| Some((*years_in(b).first()?, *years_in(e).first()?)))
        .collect()
}

fn date_ranges(ctx: &ResolveContext<'_>) -> FieldResult {
    let (_, ranges) = periods(ctx.xml()?);
    some_list(
        year_pairs(&ranges)
            .into_iter()
            .map(|(a, b)| date_range(a, b))
            .collect(),
    )
}

fn index_year(ctx: &ResolveContext<'_>) -> FieldResult {
    let (singles, ranges) = periods(ctx.xml()?);
    let single_years: Vec<i64> = singles.iter().filter_map(|s| years_in(s).first().copied()).collect();
    let years = index_years(&single_years, &year_pairs(&ranges));
    Ok(Some(FieldValue::IntList(years)))
}

fn rights(ctx: &ResolveContext<'_>) -> FieldResult {
    let doc = ctx.xml()?;
    let mut out = doc.select_texts("idinfo/accconst");
    out.extend(doc.select_texts("idinfo/useconst"));
    some_list(out)
}

fn format(ctx: &ResolveContext<'_>) -> FieldResult {
    let name = ctx
        .xml()?
        .select_text("distinfo/stdorder/digform/digtinfo/formname");
    let types = ctx.list_of("gbl_resourceType_sm");
    Ok(vocab::format_term(name.as_deref(), &types).map(FieldValue::Text))
}

fn resource_types(ctx: &ResolveContext<'_>) -> FieldResult {
    let doc = ctx.xml()?;
    let mut raw = doc.select_texts("spdoinfo/ptvctinf/sdtsterm/sdtstype");
    raw.extend(doc.select_texts("spdoinfo/direct"));
    some_list(vocab::resource_type_terms(raw))
}
