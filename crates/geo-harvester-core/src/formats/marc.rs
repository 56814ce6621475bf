//! MARC XML catalog records.
//!
//! | Field | MARC |
//! |-------|------|
//! | title | 245 `$a $b` |
//! | alternative titles | 246 `$a` |
//! | bounding box | 034 `$d $e $f $g` |
//! | description | 520 `$a` |
//! | creator | 100 `$a`, 110 `$a` |
//! | publisher / issued | 260 or 264 `$b` / `$c` |
//! | subject / spatial | 650 `$a` / 651 `$a` |
//! | language | 008/35-37 |
//! | identifiers | 020 `$a`, 035 `$a` |
//! | index year | 008/07-10 |
//! | format / resource type | 340 `$a`, 300 `$a`, 655 `$a` |

use crate::geometry::Envelope;
use crate::marc::MarcRecord;
use crate::record::FieldValue;
use crate::resolve::{FieldError, FieldResult, ResolveContext, Resolver};
use crate::vocab;

use super::{some_list, some_text, years_in};

pub fn resolvers() -> Vec<(&'static str, Resolver)> {
    vec![
        ("dct_accessRights_s", access_rights as Resolver),
        ("dct_title_s", title),
        ("dct_alternative_sm", alternative_titles),
        ("gbl_resourceClass_sm", resource_class),
        ("dcat_bbox", bbox),
        ("locn_geometry", geometry),
        ("dct_description_sm", description),
        ("dct_creator_sm", creators),
        ("dct_publisher_sm", publishers),
        ("dct_issued_s", issued),
        ("dct_subject_sm", subjects),
        ("dct_spatial_sm", places),
        ("dct_language_sm", languages),
        ("dct_identifier_sm", identifiers),
        ("gbl_indexYear_im", index_year),
        ("dct_format_s", format),
        ("gbl_resourceType_sm", resource_types),
    ]
}

/// Strip ISBD punctuation trailing a subfield.
fn clean(value: &str) -> String {
    value
        .trim()
        .trim_end_matches(|c: char| matches!(c, '/' | ':' | ';' | ',' | '=') || c.is_whitespace())
        .to_string()
}

fn cleaned(values: Vec<String>) -> Vec<String> {
    values.iter().map(|v| clean(v)).collect()
}

fn access_rights(_: &ResolveContext<'_>) -> FieldResult {
    Ok(Some(FieldValue::text("Public")))
}

fn title(ctx: &ResolveContext<'_>) -> FieldResult {
    let rec = ctx.marc()?;
    let title = rec
        .fields("245")
        .next()
        .map(|f| clean(&f.joined(&["a", "b"])))
        .filter(|t| !t.is_empty());
    some_text(title)
}

fn alternative_titles(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(cleaned(ctx.marc()?.subfield_values("246", "a")))
}

/// Remote-sensing images (007/00 `r`) are imagery; everything else is a map.
fn resource_class(ctx: &ResolveContext<'_>) -> FieldResult {
    let rec = ctx.marc()?;
    let class = match rec.control("007").and_then(|v| v.chars().next()) {
        Some('r') => "Imagery",
        _ => "Maps",
    };
    some_list(vec![class.to_string()])
}

/// One 034 coordinate in decimal degrees.
///
/// Accepts `hdddmmss` (hemisphere, degrees, minutes, seconds; short values
/// are right-padded with zeros) and plain or hemisphere-prefixed decimal
/// degrees. West and south are negative.
fn coordinate(raw: &str) -> Result<f64, FieldError> {
    let raw = raw.trim();
    let invalid = || FieldError::Invalid(format!("unreadable 034 coordinate '{}'", raw));
    let mut chars = raw.chars();
    let sign = match chars.next() {
        Some('W' | 'w' | 'S' | 's') => -1.0,
        Some('E' | 'e' | 'N' | 'n') => 1.0,
        _ => return raw.parse::<f64>().map_err(|_| invalid()),
    };
    let rest = chars.as_str();
    if rest.contains('.') {
        return rest.parse::<f64>().map(|v| sign * v).map_err(|_| invalid());
    }
    if rest.is_empty() || rest.len() > 7 || !rest.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let padded = format!("{:0<7}", rest);
    let part = |range: std::ops::Range<usize>| -> Result<f64, FieldError> {
        padded[range].parse::<f64>().map_err(|_| invalid())
    };
    let degrees = part(0..3)? + part(3..5)? / 60.0 + part(5..7)? / 3600.0;
    Ok(sign * (degrees * 1_000_000.0).round() / 1_000_000.0)
}

/// The largest box described by any 034.
fn envelope(rec: &MarcRecord) -> Result<Option<Envelope>, FieldError> {
    let mut best: Option<Envelope> = None;
    for field in rec.fields("034") {
        let value = |code: &str| field.subfield(code).next().map(coordinate).transpose();
        let (Some(west), Some(east), Some(north), Some(south)) =
            (value("d")?, value("e")?, value("f")?, value("g")?)
        else {
            continue;
        };
        let next = Envelope {
            west,
            east,
            north,
            south,
        };
        if best.as_ref().map_or(true, |b| next.area() > b.area()) {
            best = Some(next);
        }
    }
    Ok(best)
}

fn bbox(ctx: &ResolveContext<'_>) -> FieldResult {
    Ok(envelope(ctx.marc()?)?.map(|e| FieldValue::text(e.to_wkt())))
}

/// A degenerate box is written as a point.
fn geometry(ctx: &ResolveContext<'_>) -> FieldResult {
    Ok(envelope(ctx.marc()?)?.map(|e| {
        if e.is_point() {
            FieldValue::text(format!("POINT({} {})", e.west, e.north))
        } else {
            FieldValue::text(e.to_wkt())
        }
    }))
}

fn description(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(ctx.marc()?.subfield_values("520", "a"))
}

fn creators(ctx: &ResolveContext<'_>) -> FieldResult {
    let rec = ctx.marc()?;
    let mut out = rec.subfield_values("100", "a");
    out.extend(rec.subfield_values("110", "a"));
    some_list(cleaned(out))
}

fn imprint(rec: &MarcRecord, code: &str) -> Vec<String> {
    let mut out = rec.subfield_values("260", code);
    out.extend(rec.subfield_values("264", code));
    out
}

fn publishers(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(cleaned(imprint(ctx.marc()?, "b")))
}

fn issued(ctx: &ResolveContext<'_>) -> FieldResult {
    let year = imprint(ctx.marc()?, "c")
        .iter()
        .find_map(|c| years_in(c).first().copied());
    some_text(year.map(|y| y.to_string()))
}

fn subjects(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(cleaned(ctx.marc()?.subfield_values("650", "a")))
}

fn places(ctx: &ResolveContext<'_>) -> FieldResult {
    some_list(cleaned(ctx.marc()?.subfield_values("651", "a")))
}

/// Characters `start..end` of the 008 fixed field.
fn fixed(rec: &MarcRecord, start: usize, end: usize) -> Option<String> {
    let value: String = rec.control("008")?.chars().skip(start).take(end - start).collect();
    (value.chars().count() == end - start).then_some(value)
}

fn languages(ctx: &ResolveContext<'_>) -> FieldResult {
    let code = fixed(ctx.marc()?, 35, 38).and_then(|c| vocab::language_code(&c));
    some_list(code.into_iter().collect())
}

fn identifiers(ctx: &ResolveContext<'_>) -> FieldResult {
    let rec = ctx.marc()?;
    let mut out = rec.subfield_values("020", "a");
    out.extend(rec.subfield_values("035", "a"));
    some_list(out)
}

fn index_year(ctx: &ResolveContext<'_>) -> FieldResult {
    let year = fixed(ctx.marc()?, 7, 11)
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
        .and_then(|y| y.parse::<i64>().ok());
    Ok(Some(FieldValue::IntList(year.into_iter().collect())))
}

fn format(ctx: &ResolveContext<'_>) -> FieldResult {
    let rec = ctx.marc()?;
    let types = ctx.list_of("gbl_resourceType_sm");
    let medium = rec
        .subfield_values("340", "a")
        .into_iter()
        .map(|m| clean(&m))
        .find(|m| vocab::format_term(Some(m.as_str()), &[]).is_some());
    Ok(vocab::format_term(medium.as_deref(), &types).map(FieldValue::Text))
}

fn resource_types(ctx: &ResolveContext<'_>) -> FieldResult {
    let rec = ctx.marc()?;
    let mut raw = rec.subfield_values("655", "a");
    raw.extend(rec.subfield_values("300", "a"));
    let raw: Vec<String> = raw
        .iter()
        .map(|v| v.trim().trim_end_matches('.').to_string())
        .collect();
    some_list(vocab::resource_type_terms(raw))
}
