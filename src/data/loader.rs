use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeListArray, ListArray, StringArray,
};
use arrow::datatypes::DataType;
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{DataCube, MetadataValue};

/// Columns every spaxel row must (or may, for `labels`) carry. Anything
/// else is treated as cube-level metadata.
const CORE_COLUMNS: [&str; 5] = ["spaxel_x", "spaxel_y", "wave", "flux", "labels"];

/// One spaxel row as read from disk.
#[derive(Debug)]
struct SpaxelRecord {
    x: usize,
    y: usize,
    wave: Vec<f64>,
    flux: Vec<f64>,
    labels: Option<Vec<i64>>,
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a spectral cube from a file.  Dispatch by extension.
///
/// Every format stores one spaxel per row:
/// * `spaxel_x`, `spaxel_y` – integer pixel coordinates
/// * `wave`   – rest-frame wavelength axis (identical on every row)
/// * `flux`   – flux samples, same length as `wave`
/// * `labels` – optional per-sample class codes from an upstream classifier
///
/// Supported formats:
/// * `.parquet` – `wave`/`flux`/`labels` as list columns (recommended)
/// * `.json`    – `[{ "spaxel_x": 0, "spaxel_y": 0, "wave": [...], ... }, ...]`
/// * `.csv`     – list columns as semicolon-separated numbers
pub fn load_cube(path: &Path) -> Result<DataCube> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let cube = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }?;

    let (n_wave, height, width) = cube.shape();
    info!(
        "loaded cube {} ({n_wave} wavelengths, {width}x{height} spaxels, labels: {})",
        path.display(),
        cube.has_labels()
    );
    Ok(cube)
}

// ---------------------------------------------------------------------------
// Cube assembly
// ---------------------------------------------------------------------------

/// Place spaxel rows into a `(wavelength, y, x)` cube. Spaxels with no row
/// are NaN-filled; when only some rows carry labels the rest are labelled 0.
fn assemble(
    records: Vec<SpaxelRecord>,
    metadata: BTreeMap<String, MetadataValue>,
) -> Result<DataCube> {
    let Some(first) = records.first() else {
        bail!("file contains no spaxel rows");
    };
    let wave = first.wave.clone();
    let n_wave = wave.len();
    let max_x = records.iter().map(|r| r.x).max().unwrap_or(0);
    let max_y = records.iter().map(|r| r.y).max().unwrap_or(0);
    let with_labels = records.iter().any(|r| r.labels.is_some());

    let size = max_x
        .checked_add(1)
        .zip(max_y.checked_add(1))
        .and_then(|(w, h)| n_wave.checked_mul(h)?.checked_mul(w).map(|n| (w, h, n)));
    let Some((width, height, size)) = size else {
        bail!("spaxel coordinates up to ({max_x}, {max_y}) with {n_wave} wavelengths: cube is too large");
    };
    let mut flux: Vec<f64> = Vec::new();
    flux.try_reserve_exact(size)
        .with_context(|| format!("allocating a {width}x{height}x{n_wave} cube"))?;
    flux.resize(size, f64::NAN);
    let mut labels = with_labels.then(|| vec![0i64; flux.len()]);

    for rec in &records {
        if rec.wave != wave {
            bail!(
                "spaxel ({}, {}): wavelength axis differs from the first row",
                rec.x,
                rec.y
            );
        }
        if rec.flux.len() != n_wave {
            bail!(
                "spaxel ({}, {}): flux has {} values but wave has {n_wave}",
                rec.x,
                rec.y,
                rec.flux.len()
            );
        }
        for (w, &value) in rec.flux.iter().enumerate() {
            flux[(w * height + rec.y) * width + rec.x] = value;
        }
        if let (Some(out), Some(codes)) = (labels.as_mut(), rec.labels.as_ref()) {
            if codes.len() != n_wave {
                bail!(
                    "spaxel ({}, {}): labels have {} values but wave has {n_wave}",
                    rec.x,
                    rec.y,
                    codes.len()
                );
            }
            for (w, &code) in codes.iter().enumerate() {
                out[(w * height + rec.y) * width + rec.x] = code;
            }
        }
    }
    debug!("assembled {} spaxel rows into {width}x{height} cube", records.len());

    let mut cube = DataCube::new(wave, flux, labels, width, height)?;
    cube.metadata = metadata;
    Ok(cube)
}

fn to_coordinate(value: i64, row: usize, col: &str) -> Result<usize> {
    usize::try_from(value).with_context(|| format!("Row {row}: '{col}' is negative ({value})"))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   {
///     "spaxel_x": 0,
///     "spaxel_y": 0,
///     "wave":   [3622.0, 3622.8, ...],
///     "flux":   [0.12,   0.14,  ...],
///     "labels": [0, 0, 3, ...],
///     "plate": 8626
///   },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<DataCube> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let rows = root.as_array().context("Expected top-level JSON array")?;

    let mut records = Vec::with_capacity(rows.len());
    let mut metadata = BTreeMap::new();

    for (i, rec) in rows.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let x = json_index(obj.get("spaxel_x"), i, "spaxel_x")?;
        let y = json_index(obj.get("spaxel_y"), i, "spaxel_y")?;
        let wave = json_array_to_f64(obj.get("wave"), i, "wave")?;
        let flux = json_array_to_f64(obj.get("flux"), i, "flux")?;
        let labels = match obj.get("labels") {
            None | Some(JsonValue::Null) => None,
            some => Some(json_array_to_i64(some, i, "labels")?),
        };

        if i == 0 {
            for (key, val) in obj {
                if !CORE_COLUMNS.contains(&key.as_str()) {
                    metadata.insert(key.clone(), json_to_metadata(val));
                }
            }
        }

        records.push(SpaxelRecord { x, y, wave, flux, labels });
    }

    assemble(records, metadata)
}

fn json_index(val: Option<&JsonValue>, row: usize, col: &str) -> Result<usize> {
    let raw = val
        .and_then(|v| v.as_i64())
        .with_context(|| format!("Row {row}: missing or invalid '{col}'"))?;
    to_coordinate(raw, row, col)
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| match v {
            // Pandas writes NaN as null.
            JsonValue::Null => Ok(f64::NAN),
            v => v
                .as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number")),
        })
        .collect()
}

fn json_array_to_i64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<i64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_i64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not an integer"))
        })
        .collect()
}

fn json_to_metadata(val: &JsonValue) -> MetadataValue {
    match val {
        JsonValue::String(s) => MetadataValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => MetadataValue::Bool(*b),
        JsonValue::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// `wave`, `flux` and `labels` contain semicolon-separated numbers:
///   `"3622.0;3622.8;3623.6"`, `"0.12;0.14;0.11"`, `"0;0;3"`
/// Columns outside the spaxel schema are read from the first row as metadata.
fn load_csv(path: &Path) -> Result<DataCube> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let x_idx = column("spaxel_x").context("CSV missing 'spaxel_x' column")?;
    let y_idx = column("spaxel_y").context("CSV missing 'spaxel_y' column")?;
    let wave_idx = column("wave").context("CSV missing 'wave' column")?;
    let flux_idx = column("flux").context("CSV missing 'flux' column")?;
    let labels_idx = column("labels");

    let mut records = Vec::new();
    let mut metadata = BTreeMap::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let x = field(x_idx)
            .parse::<i64>()
            .with_context(|| format!("CSV row {row_no}: invalid 'spaxel_x'"))?;
        let y = field(y_idx)
            .parse::<i64>()
            .with_context(|| format!("CSV row {row_no}: invalid 'spaxel_y'"))?;
        let wave = parse_semicolon_floats(field(wave_idx), row_no, "wave")?;
        let flux = parse_semicolon_floats(field(flux_idx), row_no, "flux")?;
        let labels = match labels_idx.map(field) {
            None | Some("") => None,
            Some(s) => Some(parse_semicolon_ints(s, row_no, "labels")?),
        };

        if row_no == 0 {
            for (col_idx, value) in record.iter().enumerate() {
                let col_name = &headers[col_idx];
                if !CORE_COLUMNS.contains(&col_name.as_str()) {
                    metadata.insert(col_name.clone(), guess_metadata_type(value));
                }
            }
        }

        records.push(SpaxelRecord {
            x: to_coordinate(x, row_no, "spaxel_x")?,
            y: to_coordinate(y, row_no, "spaxel_y")?,
            wave,
            flux,
            labels,
        });
    }

    assemble(records, metadata)
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn parse_semicolon_ints(s: &str, row: usize, col: &str) -> Result<Vec<i64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<i64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not an integer"))
        })
        .collect()
}

fn guess_metadata_type(s: &str) -> MetadataValue {
    if s.is_empty() {
        return MetadataValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return MetadataValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return MetadataValue::Float(f);
    }
    if s == "true" || s == "false" {
        return MetadataValue::Bool(s == "true");
    }
    MetadataValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing one spaxel per row.
///
/// Expected schema:
/// - `spaxel_x`, `spaxel_y`: Int32 or Int64
/// - `wave`, `flux`: List<Float64|Float32> or LargeList
/// - `labels` (optional): List<Int32|Int64> or LargeList
/// - Any other columns are cube metadata (taken from the first row)
fn load_parquet(path: &Path) -> Result<DataCube> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut records = Vec::new();
    let mut metadata = BTreeMap::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let n_rows = batch.num_rows();

        let index_of = |name: &str| {
            schema
                .index_of(name)
                .map_err(|_| anyhow::anyhow!("Parquet file missing '{name}' column"))
        };
        let x_col = batch.column(index_of("spaxel_x")?);
        let y_col = batch.column(index_of("spaxel_y")?);
        let wave_col = batch.column(index_of("wave")?);
        let flux_col = batch.column(index_of("flux")?);
        let labels_col = schema.index_of("labels").ok().map(|i| batch.column(i));

        let meta_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| !CORE_COLUMNS.contains(&f.name().as_str()))
            .map(|(i, f)| (i, f.name().clone()))
            .collect();

        for row in 0..n_rows {
            let x = extract_integer(x_col, row)
                .with_context(|| format!("Row {row}: failed to read 'spaxel_x'"))?;
            let y = extract_integer(y_col, row)
                .with_context(|| format!("Row {row}: failed to read 'spaxel_y'"))?;
            let wave = extract_f64_list(wave_col, row)
                .with_context(|| format!("Row {row}: failed to read 'wave'"))?;
            let flux = extract_f64_list(flux_col, row)
                .with_context(|| format!("Row {row}: failed to read 'flux'"))?;
            let labels = match labels_col {
                Some(col) if !col.is_null(row) => Some(
                    extract_i64_list(col, row)
                        .with_context(|| format!("Row {row}: failed to read 'labels'"))?,
                ),
                _ => None,
            };

            if records.is_empty() {
                for (col_idx, col_name) in &meta_cols {
                    let value = extract_metadata_value(batch.column(*col_idx), row);
                    metadata.insert(col_name.clone(), value);
                }
            }

            records.push(SpaxelRecord {
                x: to_coordinate(x, row, "spaxel_x")?,
                y: to_coordinate(y, row, "spaxel_y")?,
                wave,
                flux,
                labels,
            });
        }
    }

    assemble(records, metadata)
}

// -- Parquet / Arrow helpers --

/// Return the inner values array of a List or LargeList column at `row`.
fn list_values(col: &Arc<dyn Array>, row: usize) -> Result<Arc<dyn Array>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            Ok(list_arr.value(row))
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            Ok(list_arr.value(row))
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    }
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    let values_array = list_values(col, row)?;

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract a `Vec<i64>` from a List or LargeList column; null codes become 0.
fn extract_i64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<i64>> {
    let values_array = list_values(col, row)?;

    if let Some(i64_arr) = values_array.as_any().downcast_ref::<Int64Array>() {
        Ok(i64_arr.iter().map(|v| v.unwrap_or(0)).collect())
    } else if let Some(i32_arr) = values_array.as_any().downcast_ref::<Int32Array>() {
        Ok(i32_arr.iter().map(|v| v.unwrap_or(0) as i64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Int64 or Int32",
            values_array.data_type()
        )
    }
}

fn extract_integer(col: &Arc<dyn Array>, row: usize) -> Result<i64> {
    if col.is_null(row) {
        bail!("null coordinate");
    }
    if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        Ok(arr.value(row))
    } else if let Some(arr) = col.as_any().downcast_ref::<Int32Array>() {
        Ok(arr.value(row) as i64)
    } else {
        bail!("Expected Int32 or Int64 column, got {:?}", col.data_type())
    }
}

/// Extract a single metadata value from an Arrow column at a given row.
fn extract_metadata_value(col: &Arc<dyn Array>, row: usize) -> MetadataValue {
    if col.is_null(row) {
        return MetadataValue::Null;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|s| MetadataValue::String(s.value(row).to_string()))
            .unwrap_or(MetadataValue::Null),
        DataType::LargeUtf8 => {
            MetadataValue::String(col.as_string::<i64>().value(row).to_string())
        }
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map(|a| MetadataValue::Integer(a.value(row) as i64))
            .unwrap_or(MetadataValue::Null),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| MetadataValue::Integer(a.value(row)))
            .unwrap_or(MetadataValue::Null),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| MetadataValue::Float(a.value(row) as f64))
            .unwrap_or(MetadataValue::Null),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| MetadataValue::Float(a.value(row)))
            .unwrap_or(MetadataValue::Null),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| MetadataValue::Bool(a.value(row)))
            .unwrap_or(MetadataValue::Null),
        _ => MetadataValue::String(format!("{:?}", col.data_type())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn json_rows_become_cube_columns() {
        let file = write_temp(
            ".json",
            r#"[
                {"spaxel_x": 0, "spaxel_y": 0, "wave": [6550.0, 6560.0], "flux": [1.0, 2.0], "labels": [0, 3], "plate": 8626},
                {"spaxel_x": 1, "spaxel_y": 1, "wave": [6550.0, 6560.0], "flux": [3.0, null]}
            ]"#,
        );
        let cube = load_cube(file.path()).unwrap();
        assert_eq!(cube.shape(), (2, 2, 2));
        assert_eq!(cube.flux_column(0, 0).unwrap(), vec![1.0, 2.0]);
        let missing = cube.flux_column(1, 0).unwrap();
        assert!(missing.iter().all(|v| v.is_nan()));
        let last = cube.flux_column(1, 1).unwrap();
        assert_eq!(last[0], 3.0);
        assert!(last[1].is_nan());
        assert_eq!(cube.labels_column(0, 0).unwrap(), Some(vec![0, 3]));
        assert_eq!(cube.labels_column(1, 1).unwrap(), Some(vec![0, 0]));
        assert_eq!(cube.metadata.get("plate"), Some(&MetadataValue::Integer(8626)));
    }

    #[test]
    fn csv_rows_become_cube_columns() {
        let file = write_temp(
            ".csv",
            "spaxel_x,spaxel_y,wave,flux,labels,instrument\n\
             0,0,4000;5000;6560,1;2;3,0;0;4,manga\n\
             1,0,4000;5000;6560,4;5;6,,manga\n",
        );
        let cube = load_cube(file.path()).unwrap();
        assert_eq!(cube.shape(), (3, 1, 2));
        assert_eq!(cube.flux_column(1, 0).unwrap(), vec![4.0, 5.0, 6.0]);
        assert_eq!(cube.labels_column(0, 0).unwrap(), Some(vec![0, 0, 4]));
        assert_eq!(
            cube.metadata.get("instrument"),
            Some(&MetadataValue::String("manga".into()))
        );
    }

    #[test]
    fn mismatched_wavelength_axes_are_rejected() {
        let file = write_temp(
            ".json",
            r#"[
                {"spaxel_x": 0, "spaxel_y": 0, "wave": [1.0, 2.0], "flux": [1.0, 2.0]},
                {"spaxel_x": 1, "spaxel_y": 0, "wave": [1.0, 3.0], "flux": [1.0, 2.0]}
            ]"#,
        );
        let err = load_cube(file.path()).unwrap_err();
        assert!(err.to_string().contains("wavelength axis differs"));
    }

    #[test]
    fn oversized_spaxel_coordinates_are_an_error() {
        let file = write_temp(
            ".json",
            r#"[
                {"spaxel_x": 4611686018427387904, "spaxel_y": 0, "wave": [1.0, 2.0, 3.0, 4.0], "flux": [1.0, 2.0, 3.0, 4.0]}
            ]"#,
        );
        let err = load_cube(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("too large"), "{err:#}");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = write_temp(".fits", "");
        assert!(load_cube(file.path()).is_err());
    }
}
