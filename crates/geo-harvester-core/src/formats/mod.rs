//! Format capabilities.
//!
//! Each submodule contributes the resolvers for one source encoding. XML
//! formats query the parsed [`Element`](crate::xml::Element) tree, JSON
//! formats read the parsed object, MARC reads the [`MarcRecord`](crate::marc::MarcRecord).
//! A format that cannot supply a field simply does not register a resolver
//! for it.

pub mod aardvark;
pub mod fgdc;
pub mod gbl1;
pub mod iso19139;
pub mod marc;

use serde_json::{json, Map, Value};

use crate::record::{FieldValue, MetadataFormat};
use crate::resolve::{FieldError, FieldResult, ResolveContext, Resolver};

pub fn resolvers(format: MetadataFormat) -> Vec<(&'static str, Resolver)> {
    match format {
        MetadataFormat::Fgdc => fgdc::resolvers(),
        MetadataFormat::Iso19139 => iso19139::resolvers(),
        MetadataFormat::Gbl1 => gbl1::resolvers(),
        MetadataFormat::Aardvark => aardvark::resolvers(),
        MetadataFormat::Marc => marc::resolvers(),
    }
}

// ============ value helpers ============

pub(crate) fn some_text(value: Option<String>) -> FieldResult {
    Ok(value.map(FieldValue::Text))
}

pub(crate) fn some_list(values: Vec<String>) -> FieldResult {
    Ok(Some(FieldValue::TextList(values)))
}

/// Years found in `s`, in order.
///
/// A run of exactly four digits is a year; a run of eight (`YYYYMMDD`)
/// contributes its first four.
pub(crate) fn years_in(s: &str) -> Vec<i64> {
    s.split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 4 || run.len() == 8)
        .filter_map(|run| run[..4].parse::<i64>().ok())
        .collect()
}

/// Inclusive year range `[start TO end]` for a pair of years.
pub(crate) fn date_range(start: i64, end: i64) -> String {
    let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
    format!("[{} TO {}]", lo, hi)
}

/// Every year covered by the given ranges and single years, sorted and deduped.
pub(crate) fn index_years(singles: &[i64], ranges: &[(i64, i64)]) -> Vec<i64> {
    let mut years: Vec<i64> = singles.to_vec();
    for &(a, b) in ranges {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        // guard against nonsense spans like 0001-9999
        if hi - lo <= 1000 {
            years.extend(lo..=hi);
        }
    }
    years.sort_unstable();
    years.dedup();
    years
}

// ============ JSON helpers ============

pub(crate) fn json_text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    }
}

pub(crate) fn json_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn json_ints(map: &Map<String, Value>, key: &str) -> Vec<i64> {
    let values: Vec<&Value> = match map.get(key) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    };
    values
        .into_iter()
        .filter_map(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
        .collect()
}

pub(crate) fn json_bool(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// The record's own `dct_references_s`, which may be a JSON string or an object.
pub(crate) fn embedded_references(map: &Map<String, Value>) -> Result<Map<String, Value>, FieldError> {
    match map.get("dct_references_s") {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(obj)) => Ok(obj.clone()),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(obj)) => Ok(obj),
            Ok(_) => Err(FieldError::Invalid(
                "dct_references_s is not a JSON object".to_string(),
            )),
            Err(e) => Err(FieldError::Invalid(format!(
                "dct_references_s is not valid JSON: {}",
                e
            ))),
        },
        Some(_) => Err(FieldError::Invalid(
            "dct_references_s has an unexpected type".to_string(),
        )),
    }
}

const URL_KEY: &str = "http://schema.org/url";
const DOWNLOAD_KEY: &str = "http://schema.org/downloadUrl";

/// Landing page plus a single download link, when there is exactly one.
pub(crate) fn external_references(
    url: Option<String>,
    embedded: &Map<String, Value>,
) -> FieldResult {
    let url = url.filter(|u| !u.trim().is_empty()).ok_or(FieldError::NoExternalUrl)?;
    let mut refs = Map::new();
    refs.insert(URL_KEY.to_string(), Value::String(url));
    // a list of downloads gives no single link to choose
    if let Some(Value::String(download)) = embedded.get(DOWNLOAD_KEY) {
        refs.insert(
            DOWNLOAD_KEY.to_string(),
            json!([{ "label": "Data", "url": download }]),
        );
    }
    Ok(Some(FieldValue::text(Value::Object(refs).to_string())))
}

pub(crate) fn embedded_url(embedded: &Map<String, Value>) -> Option<String> {
    embedded
        .get(URL_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Wrap a JSON-backed resolver body so it gets the parsed object.
pub(crate) fn with_json(
    ctx: &ResolveContext<'_>,
    f: impl FnOnce(&Map<String, Value>) -> FieldResult,
) -> FieldResult {
    f(ctx.json()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_bounded_years() {
        assert_eq!(years_in("1999-2003"), vec![1999, 2003]);
        assert_eq!(years_in("c. 1850?"), vec![1850]);
        assert_eq!(years_in("20230115"), vec![2023]);
        assert_eq!(years_in("123456"), Vec::<i64>::new());
        assert_eq!(years_in("Spring 2004 to 2005"), vec![2004, 2005]);
    }

    #[test]
    fn index_years_expand_ranges() {
        assert_eq!(index_years(&[2010], &[(2003, 2001)]), vec![2001, 2002, 2003, 2010]);
        assert_eq!(index_years(&[], &[(1, 9999)]), Vec::<i64>::new());
    }

    #[test]
    fn single_download_is_kept_list_is_dropped() {
        let mut embedded = Map::new();
        embedded.insert(DOWNLOAD_KEY.into(), Value::String("http://x/data.zip".into()));
        let v = external_references(Some("http://x".into()), &embedded).unwrap().unwrap();
        let parsed: Value = serde_json::from_str(v.as_text().unwrap()).unwrap();
        assert_eq!(parsed[DOWNLOAD_KEY][0]["label"], "Data");

        embedded.insert(DOWNLOAD_KEY.into(), json!(["a", "b"]));
        let v = external_references(Some("http://x".into()), &embedded).unwrap().unwrap();
        let parsed: Value = serde_json::from_str(v.as_text().unwrap()).unwrap();
        assert!(parsed.get(DOWNLOAD_KEY).is_none());
    }

    #[test]
    fn missing_url_is_an_error() {
        assert_eq!(
            external_references(None, &Map::new()),
            Err(FieldError::NoExternalUrl)
        );
    }
}
