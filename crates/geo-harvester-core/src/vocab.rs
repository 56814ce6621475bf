//! Controlled vocabularies and the mappings into them.
//!
//! Source formats describe resource classes, file formats and geometry types
//! in free text. These helpers fold the common variants onto the controlled
//! terms the canonical schema accepts; anything that does not fold is dropped
//! rather than passed through.

/// Controlled `dct_format_s` terms.
pub const FORMAT_TERMS: &[&str] = &[
    "ArcGRID",
    "CD-ROM",
    "DEM",
    "DVD-ROM",
    "Feature Class",
    "Geodatabase",
    "GeoJPEG",
    "GeoJSON",
    "GeoPackage",
    "GeoPDF",
    "GeoTIFF",
    "JPEG",
    "JPEG2000",
    "KML",
    "KMZ",
    "LAS",
    "LAZ",
    "Mixed",
    "MrSID",
    "PDF",
    "PNG",
    "Pulsed",
    "Raster Dataset",
    "Shapefile",
    "SQLite Database",
    "Tabular Data",
    "TIFF",
];

/// Controlled `gbl_resourceType_sm` terms, including the three local
/// additions `Image data`, `Vector data` and `Mixed`.
pub const RESOURCE_TYPE_TERMS: &[&str] = &[
    "Aerial photographs",
    "Aerial views",
    "Aeronautical charts",
    "Atlases",
    "Bird's-eye views",
    "Cadastral maps",
    "Census data",
    "Digital elevation models",
    "Digital maps",
    "Geological maps",
    "Geospatial data",
    "Image data",
    "Index maps",
    "Line data",
    "Manuscript maps",
    "Military maps",
    "Mixed",
    "Nautical charts",
    "Point data",
    "Polygon data",
    "Quadrangle maps",
    "Raster data",
    "Remote-sensing images",
    "Road maps",
    "Table data",
    "Thematic maps",
    "Topographic maps",
    "Tourist maps",
    "Vector data",
    "World maps",
];

/// Terms `dcat_theme_sm` may carry, lower-cased.
pub const THEME_TERMS: &[&str] = &[
    "agriculture",
    "biology",
    "boundaries",
    "climate",
    "economy",
    "elevation",
    "environment",
    "events",
    "geology",
    "health",
    "imagery",
    "inland waters",
    "land cover",
    "location",
    "military",
    "oceans",
    "property",
    "society",
    "structure",
    "transportation",
    "utilities",
];

fn lookup(terms: &[&'static str], value: &str) -> Option<&'static str> {
    terms.iter().copied().find(|t| t.eq_ignore_ascii_case(value))
}

/// Map a free-text resource class onto the controlled vocabulary.
pub fn resource_class(value: &str) -> Option<&'static str> {
    match value.trim().to_lowercase().as_str() {
        "collections" => Some("Collections"),
        "dataset" | "datasets" => Some("Datasets"),
        "imagery" => Some("Imagery"),
        "maps" => Some("Maps"),
        "other" => Some("Other"),
        "web services" => Some("Web services"),
        "websites" => Some("Websites"),
        _ => None,
    }
}

/// Map every value, falling back to `Other` when none of them map.
pub fn resource_classes_or_other<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mapped: Vec<String> = values
        .into_iter()
        .filter_map(|v| resource_class(v.as_ref()))
        .map(str::to_string)
        .collect();
    if mapped.is_empty() {
        vec!["Other".to_string()]
    } else {
        mapped
    }
}

/// Fold a free-text format onto a controlled `dct_format_s` term.
///
/// When nothing matches, vector-ish resource types imply a Shapefile.
pub fn format_term(value: Option<&str>, resource_types: &[String]) -> Option<String> {
    let from_value = value.and_then(|v| {
        let v = v.trim().to_lowercase();
        // more specific variants first
        let folded = if v.contains("shapefile")
            || v == "shp"
            || v == "avshp"
            || v.contains("shp,")
            || v.contains("esri")
            || v.contains("geodatabase")
        {
            "shapefile"
        } else if v.contains("geotiff") {
            "geotiff"
        } else if v.contains("jpeg2000") {
            "jpeg2000"
        } else if v.contains("tiff/jpeg") || v.contains("multiple") {
            "mixed"
        } else if v.contains("tiff") {
            "tiff"
        } else if v.contains("jpeg") || v.contains("jpg") {
            "jpeg"
        } else if v.contains("tabular") {
            "tabular data"
        } else {
            v.as_str()
        };
        lookup(FORMAT_TERMS, folded)
    });

    if let Some(term) = from_value {
        return Some(term.to_string());
    }

    resource_types
        .iter()
        .rev()
        .find(|t| {
            matches!(
                t.as_str(),
                "Polygon data" | "Point data" | "Line data" | "Vector data"
            )
        })
        .map(|_| "Shapefile".to_string())
}

/// Fold free-text geometry/resource types onto controlled terms, deduped.
pub fn resource_type_terms<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let v = value.as_ref().trim().to_lowercase();
        let folded = if v.contains("polygon") {
            "polygon data"
        } else if v.contains("raster") {
            "raster data"
        } else if v.contains("point") {
            "point data"
        } else if v.contains("line") || v.contains("string") {
            "line data"
        } else if v.contains("image") {
            "image data"
        } else if v.contains("vector") {
            "vector data"
        } else if v.contains("mixed") || v.contains("composite") {
            "mixed"
        } else {
            v.as_str()
        };
        if let Some(term) = lookup(RESOURCE_TYPE_TERMS, folded) {
            if !out.iter().any(|o| o == term) {
                out.push(term.to_string());
            }
        }
    }
    out
}

/// Subjects that are also theme terms, title-cased.
pub fn themes_from_subjects(subjects: &[String]) -> Vec<String> {
    subjects
        .iter()
        .filter(|s| THEME_TERMS.contains(&s.trim().to_lowercase().as_str()))
        .map(|s| title_case(s.trim()))
        .collect()
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map an ISO 639-2 code to itself when it looks like one.
pub fn language_code(value: &str) -> Option<String> {
    let v = value.trim().to_lowercase();
    if v.len() == 3 && v.chars().all(|c| c.is_ascii_lowercase()) {
        Some(v)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_class_variants() {
        assert_eq!(resource_class(" Dataset "), Some("Datasets"));
        assert_eq!(resource_class("web services"), Some("Web services"));
        assert_eq!(resource_class("tile"), None);
        assert_eq!(resource_classes_or_other(["tile", "feature"]), vec!["Other"]);
        assert_eq!(resource_classes_or_other(["maps", "tile"]), vec!["Maps"]);
    }

    #[test]
    fn format_variants_fold_to_terms() {
        assert_eq!(format_term(Some("ESRI Shapefile"), &[]).as_deref(), Some("Shapefile"));
        assert_eq!(format_term(Some("avshp"), &[]).as_deref(), Some("Shapefile"));
        assert_eq!(format_term(Some("GeoTIFF 1.0"), &[]).as_deref(), Some("GeoTIFF"));
        assert_eq!(format_term(Some("TIFF/JPEG"), &[]).as_deref(), Some("Mixed"));
        assert_eq!(format_term(Some("jpg"), &[]).as_deref(), Some("JPEG"));
        assert_eq!(format_term(Some("geojson"), &[]).as_deref(), Some("GeoJSON"));
    }

    #[test]
    fn format_falls_back_on_vector_resource_types() {
        let types = vec!["Polygon data".to_string()];
        assert_eq!(format_term(Some("weird"), &types).as_deref(), Some("Shapefile"));
        assert_eq!(format_term(None, &["Raster data".to_string()]), None);
    }

    #[test]
    fn resource_types_fold_and_dedupe() {
        assert_eq!(
            resource_type_terms(["G-polygon", "Polygon", "String", "composite", "nonsense"]),
            vec!["Polygon data", "Line data", "Mixed"]
        );
        assert_eq!(resource_type_terms(["Nautical charts"]), vec!["Nautical charts"]);
    }

    #[test]
    fn themes_are_title_cased_subset() {
        let subjects = vec![
            "inland WATERS".to_string(),
            "roads".to_string(),
            "Boundaries".to_string(),
        ];
        assert_eq!(themes_from_subjects(&subjects), vec!["Inland Waters", "Boundaries"]);
    }
}
