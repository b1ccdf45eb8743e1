//! Per-region file loading: locality → street-locality → geocode (site,
//! default) → address-detail, in that fixed dependency order.
//!
//! Locality and street-locality are loaded wholesale into in-memory join
//! maps (small relative to address-detail); geocode points are grouped
//! by address-detail pid. Address-detail itself is streamed through
//! [`addresskit_csv`] in chunks, joined against those maps, mapped
//! through [`addresskit_mapper`], and submitted through
//! [`addresskit_index`] — the sole suspension point on this path.

use std::collections::BTreeMap;
use std::path::Path;

use addresskit_authority::AuthorityIndex;
use addresskit_csv::ChunkConfig;
use addresskit_index::{BulkRetryPolicy, SearchBackend};
use addresskit_mapper::{MapperInput, RawFlat, RawGeocodePoint, RawLevel, RawNumber};
use addresskit_models::{AuthorityTable, Locality, ProgressCallback, Region, StreetLocality};
use serde::Deserialize;

use crate::error::IngestError;
use crate::paths;

#[derive(Debug, Deserialize)]
struct LocalityRow {
    #[serde(rename = "LOCALITY_PID")]
    pid: String,
    #[serde(rename = "LOCALITY_NAME")]
    name: String,
    #[serde(rename = "LOCALITY_CLASS_CODE")]
    class_code: String,
}

#[derive(Debug, Deserialize)]
struct StreetLocalityRow {
    #[serde(rename = "STREET_LOCALITY_PID")]
    pid: String,
    #[serde(rename = "STREET_CLASS_CODE")]
    class_code: String,
    #[serde(rename = "STREET_NAME")]
    name: String,
    #[serde(rename = "STREET_TYPE_CODE")]
    type_code: Option<String>,
    #[serde(rename = "STREET_SUFFIX_CODE")]
    suffix_code: Option<String>,
}

/// The street-locality join: the resolved satellite plus the raw name
/// and codes the mapper needs to render the street line.
struct StreetJoin {
    satellite: StreetLocality,
    name: String,
    type_code: Option<String>,
    suffix_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeRow {
    #[serde(rename = "ADDRESS_DETAIL_PID")]
    pid: String,
    #[serde(rename = "LATITUDE")]
    latitude: f64,
    #[serde(rename = "LONGITUDE")]
    longitude: f64,
    #[serde(rename = "GEOCODE_RELIABILITY_CODE")]
    reliability_code: String,
    #[serde(rename = "GEOCODE_TYPE_CODE")]
    type_code: String,
    #[serde(rename = "GEOCODED_LEVEL_TYPE_CODE")]
    level_code: String,
}

#[derive(Debug, Deserialize)]
struct AddressDetailRow {
    #[serde(rename = "ADDRESS_DETAIL_PID")]
    pid: String,
    #[serde(rename = "BUILDING_NAME")]
    building_name: Option<String>,
    #[serde(rename = "FLAT_TYPE_CODE")]
    flat_type_code: Option<String>,
    #[serde(rename = "FLAT_NUMBER_PREFIX")]
    flat_number_prefix: Option<String>,
    #[serde(rename = "FLAT_NUMBER")]
    flat_number: Option<String>,
    #[serde(rename = "FLAT_NUMBER_SUFFIX")]
    flat_number_suffix: Option<String>,
    #[serde(rename = "LEVEL_TYPE_CODE")]
    level_type_code: Option<String>,
    #[serde(rename = "LEVEL_NUMBER_PREFIX")]
    level_number_prefix: Option<String>,
    #[serde(rename = "LEVEL_NUMBER")]
    level_number: Option<String>,
    #[serde(rename = "LEVEL_NUMBER_SUFFIX")]
    level_number_suffix: Option<String>,
    #[serde(rename = "NUMBER_FIRST_PREFIX")]
    number_first_prefix: Option<String>,
    #[serde(rename = "NUMBER_FIRST")]
    number_first: Option<String>,
    #[serde(rename = "NUMBER_FIRST_SUFFIX")]
    number_first_suffix: Option<String>,
    #[serde(rename = "NUMBER_LAST_PREFIX")]
    number_last_prefix: Option<String>,
    #[serde(rename = "NUMBER_LAST")]
    number_last: Option<String>,
    #[serde(rename = "NUMBER_LAST_SUFFIX")]
    number_last_suffix: Option<String>,
    #[serde(rename = "LOT_NUMBER")]
    lot_number: Option<String>,
    #[serde(rename = "STREET_LOCALITY_PID")]
    street_locality_pid: String,
    #[serde(rename = "LOCALITY_PID")]
    locality_pid: String,
    #[serde(rename = "POSTCODE")]
    postcode: Option<String>,
    #[serde(rename = "CONFIDENCE")]
    confidence: Option<i32>,
}

/// One row's expected count from the bundled load summary, keyed by the
/// constituent table name (e.g. `"NSW_ADDRESS_DETAIL"`).
pub async fn read_load_summary(extracted: &Path, chunk_bytes: u64) -> BTreeMap<String, u64> {
    #[derive(Debug, Deserialize)]
    struct SummaryRow {
        #[serde(rename = "TABLE_NAME")]
        table_name: String,
        #[serde(rename = "ROW_COUNT")]
        row_count: u64,
    }

    let path = paths::load_summary_file(extracted);
    let mut counts = BTreeMap::new();
    let config = ChunkConfig::pipe_separated_with_bytes(chunk_bytes);

    match addresskit_csv::drive_path::<SummaryRow, _, _>(&path, &config, "load_summary", |rows| {
        for row in rows {
            counts.insert(row.table_name, row.row_count);
        }
        std::future::ready(())
    })
    .await
    {
        Ok(_) => {}
        Err(e) => log::debug!("no load summary available ({e}), row-count checks skipped"),
    }

    counts
}

async fn load_locality_map(
    extracted: &Path,
    region: Region,
    authority: &AuthorityIndex,
    load_summary: &BTreeMap<String, u64>,
    chunk_bytes: u64,
) -> Result<BTreeMap<String, Locality>, IngestError> {
    let path = paths::standard_file(extracted, region.as_ref(), "LOCALITY");
    let mut map = BTreeMap::new();
    let config = ChunkConfig::pipe_separated_with_bytes(chunk_bytes);

    let summary = addresskit_csv::drive_path::<LocalityRow, _, _>(&path, &config, "locality", |rows| {
        for row in rows {
            let class_name = authority.resolve_or_raw(AuthorityTable::LocalityClass, &row.class_code);
            map.insert(
                row.pid.clone(),
                Locality {
                    pid: row.pid,
                    name: row.name,
                    class_code: row.class_code,
                    class_name,
                },
            );
        }
        std::future::ready(())
    })
    .await?;

    let expected = load_summary.get(&format!("{}_LOCALITY", region.as_ref())).copied();
    addresskit_csv::report_row_count("locality", summary.rows_parsed, expected);

    Ok(map)
}

async fn load_street_locality_map(
    extracted: &Path,
    region: Region,
    authority: &AuthorityIndex,
    load_summary: &BTreeMap<String, u64>,
    chunk_bytes: u64,
) -> Result<BTreeMap<String, StreetJoin>, IngestError> {
    let path = paths::standard_file(extracted, region.as_ref(), "STREET_LOCALITY");
    let mut map = BTreeMap::new();
    let config = ChunkConfig::pipe_separated_with_bytes(chunk_bytes);

    let summary = addresskit_csv::drive_path::<StreetLocalityRow, _, _>(&path, &config, "street_locality", |rows| {
        for row in rows {
            let class_name = authority.resolve_or_raw(AuthorityTable::StreetClass, &row.class_code);
            map.insert(
                row.pid.clone(),
                StreetJoin {
                    satellite: StreetLocality {
                        pid: row.pid,
                        class_code: row.class_code,
                        class_name,
                    },
                    name: row.name,
                    type_code: row.type_code,
                    suffix_code: row.suffix_code,
                },
            );
        }
        std::future::ready(())
    })
    .await?;

    let expected = load_summary.get(&format!("{}_STREET_LOCALITY", region.as_ref())).copied();
    addresskit_csv::report_row_count("street_locality", summary.rows_parsed, expected);

    Ok(map)
}

async fn load_geocode_map(
    extracted: &Path,
    region: Region,
    table: &str,
    load_summary: &BTreeMap<String, u64>,
    chunk_bytes: u64,
) -> Result<BTreeMap<String, Vec<RawGeocodePoint>>, IngestError> {
    let path = paths::standard_file(extracted, region.as_ref(), table);
    let mut map: BTreeMap<String, Vec<RawGeocodePoint>> = BTreeMap::new();
    let config = ChunkConfig::pipe_separated_with_bytes(chunk_bytes);

    let summary = addresskit_csv::drive_path::<GeocodeRow, _, _>(&path, &config, table, |rows| {
        for row in rows {
            map.entry(row.pid).or_default().push(RawGeocodePoint {
                latitude: row.latitude,
                longitude: row.longitude,
                reliability_code: row.reliability_code,
                type_code: row.type_code,
                level_code: row.level_code,
            });
        }
        std::future::ready(())
    })
    .await?;

    let expected = load_summary.get(&format!("{}_{table}", region.as_ref())).copied();
    addresskit_csv::report_row_count(table, summary.rows_parsed, expected);

    Ok(map)
}

/// Loads and submits one region's full `ADDRESS_DETAIL` file, joined
/// against the locality/street-locality/geocode maps already loaded for
/// this region.
///
/// # Errors
///
/// Returns [`IngestError`] if a constituent file cannot be opened or the
/// backend submission is exhausted. Per-row structural mapping errors
/// are logged and the row is skipped, never propagated.
#[allow(clippy::too_many_arguments)]
pub async fn load_address_detail(
    extracted: &Path,
    region: Region,
    authority: &AuthorityIndex,
    backend: &dyn SearchBackend,
    retry_policy: &BulkRetryPolicy,
    progress: &dyn ProgressCallback,
    enable_geo: bool,
    load_summary: &BTreeMap<String, u64>,
    chunk_bytes: u64,
) -> Result<u64, IngestError> {
    let locality = load_locality_map(extracted, region, authority, load_summary, chunk_bytes).await?;
    let street_locality =
        load_street_locality_map(extracted, region, authority, load_summary, chunk_bytes).await?;

    let site_geocodes = if enable_geo {
        load_geocode_map(extracted, region, "ADDRESS_SITE_GEOCODE", load_summary, chunk_bytes).await?
    } else {
        BTreeMap::new()
    };
    let default_geocodes = if enable_geo {
        load_geocode_map(extracted, region, "ADDRESS_DEFAULT_GEOCODE", load_summary, chunk_bytes).await?
    } else {
        BTreeMap::new()
    };

    let path = paths::standard_file(extracted, region.as_ref(), "ADDRESS_DETAIL");
    let config = ChunkConfig::pipe_separated_with_bytes(chunk_bytes);

    let summary = addresskit_csv::drive_path::<AddressDetailRow, _, _>(
        &path,
        &config,
        "address_detail",
        |rows| {
            let locality = &locality;
            let street_locality = &street_locality;
            let site_geocodes = &site_geocodes;
            let default_geocodes = &default_geocodes;
            async move {
                let mut docs = Vec::with_capacity(rows.len());

                for row in rows {
                    let Some(loc) = locality.get(&row.locality_pid) else {
                        log::warn!("address {}: unknown locality pid {}, skipping", row.pid, row.locality_pid);
                        continue;
                    };
                    let Some(street) = street_locality.get(&row.street_locality_pid) else {
                        log::warn!(
                            "address {}: unknown street-locality pid {}, skipping",
                            row.pid,
                            row.street_locality_pid
                        );
                        continue;
                    };

                    let input = MapperInput {
                        pid: row.pid.clone(),
                        building_name: row.building_name,
                        flat: row.flat_type_code.clone().map(|type_code| RawFlat {
                            type_code: Some(type_code),
                            prefix: row.flat_number_prefix.clone(),
                            number: row.flat_number.clone(),
                            suffix: row.flat_number_suffix.clone(),
                        }),
                        level: row.level_type_code.clone().map(|type_code| RawLevel {
                            type_code: Some(type_code),
                            prefix: row.level_number_prefix.clone(),
                            number: row.level_number.clone(),
                            suffix: row.level_number_suffix.clone(),
                        }),
                        number: RawNumber {
                            first_prefix: row.number_first_prefix,
                            first_number: row.number_first,
                            first_suffix: row.number_first_suffix,
                            last_prefix: row.number_last_prefix,
                            last_number: row.number_last,
                            last_suffix: row.number_last_suffix,
                        },
                        lot: row.lot_number,
                        street_name: street.name.clone(),
                        street_type_code: street.type_code.clone(),
                        street_suffix_code: street.suffix_code.clone(),
                        locality_name: loc.name.clone(),
                        state: region,
                        postcode: row.postcode.unwrap_or_default(),
                        confidence: row.confidence,
                        site_geocodes: site_geocodes.get(&row.pid).cloned().unwrap_or_default(),
                        default_geocodes: default_geocodes.get(&row.pid).cloned().unwrap_or_default(),
                        enable_geo,
                    };

                    match addresskit_mapper::map_address(&input, authority) {
                        Ok(detail) => match build_document(&detail) {
                            Ok(body) => docs.push((detail.document_id(), body)),
                            Err(e) => log::error!("address {}: failed to serialize document: {e}", detail.pid),
                        },
                        Err(e) => log::error!("{e}"),
                    }
                }

                if !docs.is_empty()
                    && let Err(e) =
                        addresskit_index::submit_with_retry(backend, &docs, retry_policy, progress).await
                {
                    log::error!("bulk submission abandoned: {e}");
                }
            }
        },
    )
    .await?;

    let expected_rows = load_summary.get(&format!("{}_ADDRESS_DETAIL", region.as_ref())).copied();
    addresskit_csv::report_row_count("address_detail", summary.rows_parsed, expected_rows);
    Ok(summary.rows_parsed)
}

fn build_document(detail: &addresskit_models::AddressDetail) -> Result<serde_json::Value, serde_json::Error> {
    let mut body = serde_json::to_value(detail)?;
    if let Some(confidence) = detail.confidence
        && let Some(structured) = body.get_mut("structured").and_then(serde_json::Value::as_object_mut)
    {
        structured.insert("structured".to_string(), serde_json::json!({ "confidence": confidence }));
    }
    Ok(body)
}
