#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Row mapper: turns one joined G-NAF detail row into a [`AddressDetail`].
//!
//! A pure function, no I/O and no network access. Resolves coded fields
//! via [`AuthorityIndex`], composes the single-line (`sla`), short
//! single-line (`ssla`), and multi-line (`mla`) renderings, and builds
//! the geocode bundle from the site- and default-level geocode arrays.
//!
//! Grounded on `geocoder_index::normalize` for the
//! uppercase-and-collapse-whitespace convention applied to every
//! rendered text field, generalized from address normalization for
//! search into address rendering for display.

use addresskit_authority::AuthorityIndex;
use addresskit_models::{
    AddressDetail, AuthorityTable, FlatDetail, Geocode, GeocodeEntry, LevelDetail, NumberDetail,
    Region, StreetDetail, StructuredAddress,
};

/// Errors that reject an entire row rather than degrading gracefully.
///
/// Unlike authority-code resolution (which falls back to the raw code),
/// these indicate a structural problem the mapper cannot render around.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("address {pid}: multi-line address overflowed 4 lines ({line_count})")]
    MlaOverflow { pid: String, line_count: usize },

    #[error("address {pid}: geocode entry carries an attribute the mapper cannot interpret ({detail})")]
    UnknownGeocodeAttribute { pid: String, detail: String },

    #[error("address {pid}: more than one geocode entry marked as default")]
    MultipleDefaultGeocodes { pid: String },
}

/// Raw flat-level fields from the joined detail row.
#[derive(Debug, Clone, Default)]
pub struct RawFlat {
    pub type_code: Option<String>,
    pub prefix: Option<String>,
    pub number: Option<String>,
    pub suffix: Option<String>,
}

/// Raw level-level fields from the joined detail row.
#[derive(Debug, Clone, Default)]
pub struct RawLevel {
    pub type_code: Option<String>,
    pub prefix: Option<String>,
    pub number: Option<String>,
    pub suffix: Option<String>,
}

/// Raw first/last street-number fields from the joined detail row.
#[derive(Debug, Clone, Default)]
pub struct RawNumber {
    pub first_prefix: Option<String>,
    pub first_number: Option<String>,
    pub first_suffix: Option<String>,
    pub last_prefix: Option<String>,
    pub last_number: Option<String>,
    pub last_suffix: Option<String>,
}

/// One raw geocode point, either from the site-level or default-level array.
#[derive(Debug, Clone)]
pub struct RawGeocodePoint {
    pub latitude: f64,
    pub longitude: f64,
    pub reliability_code: String,
    pub type_code: String,
    /// The geocoded-level-type code, `"1"`..`"7"`; coarse to fine.
    pub level_code: String,
}

/// One joined G-NAF address-detail row, ready for mapping.
///
/// Joins (locality name/class, street-locality class, street name/type)
/// are performed upstream by the orchestrator, which streams the
/// G-NAF master files in the dependency order the mapper needs them in;
/// this function performs no lookups of its own beyond the authority
/// tables.
#[derive(Debug, Clone)]
pub struct MapperInput {
    pub pid: String,
    pub building_name: Option<String>,
    pub flat: Option<RawFlat>,
    pub level: Option<RawLevel>,
    pub number: RawNumber,
    pub lot: Option<String>,
    pub street_name: String,
    pub street_type_code: Option<String>,
    pub street_suffix_code: Option<String>,
    pub locality_name: String,
    pub state: Region,
    pub postcode: String,
    pub confidence: Option<i32>,
    pub site_geocodes: Vec<RawGeocodePoint>,
    pub default_geocodes: Vec<RawGeocodePoint>,
    pub enable_geo: bool,
}

/// Maps one joined row into its final, renderable form.
///
/// # Errors
///
/// Returns [`MapError`] when the row's geo bundle or multi-line
/// rendering violates a structural invariant; authority-code misses are
/// non-fatal and fall back to the raw code.
pub fn map_address(input: &MapperInput, authority: &AuthorityIndex) -> Result<AddressDetail, MapError> {
    let flat = input.flat.as_ref().map(|f| build_flat_detail(f, authority));
    let level = input.level.as_ref().map(|l| build_level_detail(l, authority));
    let number = build_number_detail(&input.number);
    let street = build_street_detail(input, authority);

    let structured = StructuredAddress {
        building_name: input.building_name.as_ref().map(|b| upper(b)),
        flat: flat.clone(),
        level: level.clone(),
        number: number.clone(),
        street: street.clone(),
        locality: upper(&input.locality_name),
        state: input.state,
        postcode: input.postcode.clone(),
        lot: input.lot.clone(),
    };

    let level_flat_line = render_level_flat_line(level.as_ref(), flat.as_ref());
    let building_line = structured.building_name.clone();
    let number_street_line = render_number_street_line(&input.lot, &number, &street);
    let locality_line = render_locality_line(&structured);

    let lines: Vec<String> = [level_flat_line, building_line, Some(number_street_line), Some(locality_line)]
        .into_iter()
        .flatten()
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() > 4 {
        return Err(MapError::MlaOverflow {
            pid: input.pid.clone(),
            line_count: lines.len(),
        });
    }

    let sla = lines.join(", ");
    let (ssla_addr_part, ssla_locality_part) =
        render_ssla_parts(input, level.as_ref(), flat.as_ref(), &number, &street, &structured);
    let ssla = format!("{ssla_addr_part}, {ssla_locality_part}");

    let short_lines: Vec<String> = [ssla_addr_part, ssla_locality_part]
        .into_iter()
        .filter(|line| !line.is_empty())
        .collect();

    if short_lines.len() > 4 {
        return Err(MapError::MlaOverflow {
            pid: input.pid.clone(),
            line_count: short_lines.len(),
        });
    }

    let geo = if input.enable_geo {
        Some(build_geocode(input, authority)?)
    } else {
        None
    };

    Ok(AddressDetail {
        pid: input.pid.clone(),
        structured,
        sla,
        ssla,
        mla: lines,
        short_mla: short_lines,
        confidence: input.confidence,
        geo,
    })
}

fn upper(s: &str) -> String {
    s.trim().to_uppercase()
}

fn build_flat_detail(raw: &RawFlat, authority: &AuthorityIndex) -> FlatDetail {
    FlatDetail {
        type_code: raw.type_code.clone(),
        type_name: raw
            .type_code
            .as_ref()
            .map(|c| authority.resolve_or_raw(AuthorityTable::FlatType, c)),
        prefix: raw.prefix.clone(),
        number: raw.number.clone(),
        suffix: raw.suffix.clone(),
    }
}

fn build_level_detail(raw: &RawLevel, authority: &AuthorityIndex) -> LevelDetail {
    LevelDetail {
        type_code: raw.type_code.clone(),
        type_name: raw
            .type_code
            .as_ref()
            .map(|c| authority.resolve_or_raw(AuthorityTable::LevelType, c)),
        number: raw.number.clone(),
        prefix: raw.prefix.clone(),
        suffix: raw.suffix.clone(),
    }
}

fn build_number_detail(raw: &RawNumber) -> NumberDetail {
    NumberDetail {
        first_prefix: raw.first_prefix.clone(),
        first_number: raw.first_number.clone(),
        first_suffix: raw.first_suffix.clone(),
        last_prefix: raw.last_prefix.clone(),
        last_number: raw.last_number.clone(),
        last_suffix: raw.last_suffix.clone(),
    }
}

fn build_street_detail(input: &MapperInput, authority: &AuthorityIndex) -> StreetDetail {
    StreetDetail {
        name: upper(&input.street_name),
        type_code: input.street_type_code.clone(),
        type_name: input
            .street_type_code
            .as_ref()
            .map(|c| authority.resolve_or_raw(AuthorityTable::StreetType, c)),
        suffix_code: input.street_suffix_code.clone(),
        suffix_name: input
            .street_suffix_code
            .as_ref()
            .map(|c| authority.resolve_or_raw(AuthorityTable::StreetSuffix, c)),
    }
}

/// Renders `"{prefix}{number}{suffix}"` for a single number-like value.
fn render_number_piece(prefix: Option<&str>, number: Option<&str>, suffix: Option<&str>) -> Option<String> {
    let number = number?;
    Some(format!(
        "{}{number}{}",
        prefix.unwrap_or(""),
        suffix.unwrap_or("")
    ))
}

/// A street number (or compact range) rendered in full: `"300"` or `"10-12"`.
fn render_number_long(number: &NumberDetail) -> Option<String> {
    let first = render_number_piece(
        number.first_prefix.as_deref(),
        number.first_number.as_deref(),
        number.first_suffix.as_deref(),
    )?;
    match render_number_piece(
        number.last_prefix.as_deref(),
        number.last_number.as_deref(),
        number.last_suffix.as_deref(),
    ) {
        Some(last) => Some(format!("{first}-{last}")),
        None => Some(first),
    }
}

/// Line 1 of the rendering: resolved level type plus flat, in full word form.
fn render_level_flat_line(level: Option<&LevelDetail>, flat: Option<&FlatDetail>) -> Option<String> {
    let level_part = level.and_then(|l| {
        let number = render_number_piece(l.prefix.as_deref(), l.number.as_deref(), l.suffix.as_deref())?;
        let label = l.type_name.clone().unwrap_or_else(|| "LEVEL".to_string());
        Some(format!("{label} {number}"))
    });

    let flat_part = flat.and_then(|f| {
        let number = render_number_piece(f.prefix.as_deref(), f.number.as_deref(), f.suffix.as_deref())?;
        let label = f.type_name.clone().unwrap_or_else(|| "FLAT".to_string());
        Some(format!("{label} {number}"))
    });

    match (level_part, flat_part) {
        (Some(l), Some(f)) => Some(format!("{l} {f}")),
        (Some(l), None) => Some(l),
        (None, Some(f)) => Some(f),
        (None, None) => None,
    }
}

/// Line: lot-or-number plus street name/type/suffix, using the street's
/// raw codes (the conventional abbreviated rendering, e.g. `"AV"` rather
/// than `"AVENUE"`) rather than resolved names.
fn render_number_street_line(lot: &Option<String>, number: &NumberDetail, street: &StreetDetail) -> String {
    let number_part = lot
        .as_ref()
        .map(|l| format!("LOT {l}"))
        .or_else(|| render_number_long(number))
        .unwrap_or_default();

    let mut parts = vec![street.name.clone()];
    if let Some(code) = &street.type_code {
        parts.push(code.to_uppercase());
    }
    if let Some(code) = &street.suffix_code {
        parts.push(code.to_uppercase());
    }
    let street_part = parts.join(" ");

    if number_part.is_empty() {
        street_part
    } else {
        format!("{number_part} {street_part}")
    }
}

fn render_locality_line(structured: &StructuredAddress) -> String {
    format!("{} {} {}", structured.locality, structured.state, structured.postcode)
}

/// The two comma-separated parts of the short single-line rendering:
/// level-or-flat number as a `/`-prefix, compact number range, street —
/// then locality, state, postcode. Drops the building name entirely.
/// Also doubles as the line split for `short_mla`.
fn render_ssla_parts(
    input: &MapperInput,
    level: Option<&LevelDetail>,
    flat: Option<&FlatDetail>,
    number: &NumberDetail,
    street: &StreetDetail,
    structured: &StructuredAddress,
) -> (String, String) {
    let unit_prefix = flat
        .and_then(|f| f.number.clone())
        .or_else(|| level.and_then(|l| l.number.clone()))
        .map(|n| format!("{n}/"))
        .unwrap_or_default();

    let number_part = input
        .lot
        .as_ref()
        .map(|l| format!("LOT {l}"))
        .or_else(|| render_number_long(number))
        .unwrap_or_default();

    let mut street_parts = vec![street.name.clone()];
    if let Some(code) = &street.type_code {
        street_parts.push(code.to_uppercase());
    }
    if let Some(code) = &street.suffix_code {
        street_parts.push(code.to_uppercase());
    }

    let addr_part = format!("{unit_prefix}{number_part} {}", street_parts.join(" "));
    (addr_part, render_locality_line(structured))
}

fn build_geocode(input: &MapperInput, authority: &AuthorityIndex) -> Result<Geocode, MapError> {
    let default_count = input.default_geocodes.len();
    if default_count > 1 {
        return Err(MapError::MultipleDefaultGeocodes { pid: input.pid.clone() });
    }

    let mut entries = Vec::with_capacity(input.site_geocodes.len() + default_count);
    let mut max_level: u8 = 0;

    for (point, is_default) in input
        .site_geocodes
        .iter()
        .map(|p| (p, false))
        .chain(input.default_geocodes.iter().map(|p| (p, true)))
    {
        let level: u8 = point.level_code.parse().map_err(|_| MapError::UnknownGeocodeAttribute {
            pid: input.pid.clone(),
            detail: format!("unparseable geocoded-level-type code {:?}", point.level_code),
        })?;
        max_level = max_level.max(level);

        entries.push(GeocodeEntry {
            latitude: point.latitude,
            longitude: point.longitude,
            is_default,
            reliability_name: authority.resolve_or_raw(AuthorityTable::GeocodeReliability, &point.reliability_code),
            reliability_code: point.reliability_code.clone(),
            type_name: authority.resolve_or_raw(AuthorityTable::GeocodeType, &point.type_code),
            type_code: point.type_code.clone(),
        });
    }

    Ok(Geocode {
        level: max_level,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use addresskit_models::AuthorityTable as Table;
    use std::path::Path;

    async fn authority_with(rows: &[(Table, &str, &str)]) -> AuthorityIndex {
        let tmp = std::env::temp_dir().join(format!(
            "addresskit_mapper_test_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();

        let mut by_table: std::collections::BTreeMap<Table, Vec<(&str, &str)>> = std::collections::BTreeMap::new();
        for (table, code, name) in rows {
            by_table.entry(*table).or_default().push((code, name));
        }

        let mut index = AuthorityIndex::new();
        for (table, entries) in by_table {
            let path = tmp.join(format!("{}.psv", table.as_ref()));
            let mut body = "CODE|NAME\n".to_string();
            for (code, name) in entries {
                body.push_str(&format!("{code}|{name}\n"));
            }
            std::fs::write(&path, body).unwrap();
            index
                .load_table(table, Path::new(&path), addresskit_csv::DEFAULT_CHUNK_BYTES)
                .await
                .unwrap();
        }

        let _ = std::fs::remove_dir_all(&tmp);
        index
    }

    fn barangaroo_input() -> MapperInput {
        MapperInput {
            pid: "GANSW716635811".to_string(),
            building_name: Some("Tower 3".to_string()),
            flat: None,
            level: Some(RawLevel {
                type_code: Some("L".to_string()),
                prefix: None,
                number: Some("25".to_string()),
                suffix: None,
            }),
            number: RawNumber {
                first_prefix: None,
                first_number: Some("300".to_string()),
                first_suffix: None,
                last_prefix: None,
                last_number: None,
                last_suffix: None,
            },
            lot: None,
            street_name: "Barangaroo".to_string(),
            street_type_code: Some("AV".to_string()),
            street_suffix_code: None,
            locality_name: "Barangaroo".to_string(),
            state: Region::Nsw,
            postcode: "2000".to_string(),
            confidence: Some(2),
            site_geocodes: vec![],
            default_geocodes: vec![],
            enable_geo: false,
        }
    }

    #[tokio::test]
    async fn renders_the_worked_example_exactly() {
        let authority = authority_with(&[(Table::LevelType, "L", "LEVEL")]).await;
        let input = barangaroo_input();

        let result = map_address(&input, &authority).unwrap();

        assert_eq!(result.document_id(), "/addresses/GANSW716635811");
        assert_eq!(result.sla, "LEVEL 25, TOWER 3, 300 BARANGAROO AV, BARANGAROO NSW 2000");
        assert_eq!(result.ssla, "25/300 BARANGAROO AV, BARANGAROO NSW 2000");
        assert_eq!(
            result.mla,
            vec![
                "LEVEL 25".to_string(),
                "TOWER 3".to_string(),
                "300 BARANGAROO AV".to_string(),
                "BARANGAROO NSW 2000".to_string(),
            ]
        );
        assert_eq!(
            result.short_mla,
            vec!["25/300 BARANGAROO AV".to_string(), "BARANGAROO NSW 2000".to_string(),]
        );
        assert_eq!(result.confidence, Some(2));
    }

    #[tokio::test]
    async fn unresolved_level_type_falls_back_to_raw_code() {
        let authority = authority_with(&[]).await;
        let input = barangaroo_input();

        let result = map_address(&input, &authority).unwrap();

        assert!(result.sla.starts_with("L 25,"));
    }

    #[tokio::test]
    async fn geocode_level_is_the_finest_rank_across_both_arrays() {
        let authority = authority_with(&[]).await;
        let mut input = barangaroo_input();
        input.enable_geo = true;
        input.site_geocodes = vec![RawGeocodePoint {
            latitude: -33.8,
            longitude: 151.2,
            reliability_code: "1".to_string(),
            type_code: "PC".to_string(),
            level_code: "5".to_string(),
        }];
        input.default_geocodes = vec![RawGeocodePoint {
            latitude: -33.81,
            longitude: 151.21,
            reliability_code: "2".to_string(),
            type_code: "FC".to_string(),
            level_code: "7".to_string(),
        }];

        let result = map_address(&input, &authority).unwrap();
        let geo = result.geo.unwrap();

        assert_eq!(geo.level, 7);
        assert_eq!(geo.entries.len(), 2);
        assert!(!geo.entries[0].is_default);
        assert!(geo.entries[1].is_default);
    }

    #[tokio::test]
    async fn two_default_geocodes_is_a_fatal_error() {
        let authority = authority_with(&[]).await;
        let mut input = barangaroo_input();
        input.enable_geo = true;
        input.default_geocodes = vec![
            RawGeocodePoint {
                latitude: -33.8,
                longitude: 151.2,
                reliability_code: "1".to_string(),
                type_code: "PC".to_string(),
                level_code: "5".to_string(),
            },
            RawGeocodePoint {
                latitude: -33.81,
                longitude: 151.21,
                reliability_code: "1".to_string(),
                type_code: "PC".to_string(),
                level_code: "5".to_string(),
            },
        ];

        let err = map_address(&input, &authority).unwrap_err();
        assert_eq!(err, MapError::MultipleDefaultGeocodes { pid: input.pid.clone() });
    }

    #[tokio::test]
    async fn unparseable_level_code_is_a_fatal_error() {
        let authority = authority_with(&[]).await;
        let mut input = barangaroo_input();
        input.enable_geo = true;
        input.site_geocodes = vec![RawGeocodePoint {
            latitude: -33.8,
            longitude: 151.2,
            reliability_code: "1".to_string(),
            type_code: "PC".to_string(),
            level_code: "not-a-rank".to_string(),
        }];

        let err = map_address(&input, &authority).unwrap_err();
        assert!(matches!(err, MapError::UnknownGeocodeAttribute { .. }));
    }
}
