use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float32Array, Float64Array, Float64Builder,
    LargeListArray, ListArray, ListBuilder, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};

use super::model::{EventRecord, FreqBand, Spectrum, StationRecord};

// ---------------------------------------------------------------------------
// Record encodings
// ---------------------------------------------------------------------------

/// On-disk encoding of an event record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    #[default]
    Json,
    Csv,
    Parquet,
}

impl RecordFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RecordFormat::Json => "json",
            RecordFormat::Csv => "csv",
            RecordFormat::Parquet => "parquet",
        }
    }

    /// Pick the encoding from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "json" => Ok(RecordFormat::Json),
            "csv" => Ok(RecordFormat::Csv),
            "parquet" | "pq" => Ok(RecordFormat::Parquet),
            other => bail!("Unsupported file extension: .{other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read an event record from a file.  Dispatch by extension.
pub fn read_record(path: &Path) -> Result<EventRecord> {
    let format = RecordFormat::from_path(path)?;
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let rows = match format {
        RecordFormat::Json => read_json(std::io::BufReader::new(file))?,
        RecordFormat::Csv => read_csv(std::io::BufReader::new(file))?,
        RecordFormat::Parquet => read_parquet(file)?,
    };

    let mut record = EventRecord::new();
    for row in rows {
        let id = row.station.clone();
        let station = row
            .into_station()
            .with_context(|| format!("station {id}"))?;
        if record.insert(id.clone(), station).is_some() {
            bail!("station {id} appears more than once");
        }
    }
    Ok(record)
}

/// Encode an event record into `writer`.
pub fn write_record<W: Write + Send>(
    writer: W,
    format: RecordFormat,
    record: &EventRecord,
) -> Result<()> {
    let rows: Vec<StationRow> = record
        .stations()
        .map(|(id, st)| StationRow::from_station(id, st))
        .collect();

    match format {
        RecordFormat::Json => write_json(writer, rows),
        RecordFormat::Csv => write_csv(writer, &rows),
        RecordFormat::Parquet => write_parquet(writer, &rows),
    }
}

// ---------------------------------------------------------------------------
// Flat row – the common shape of every encoding
// ---------------------------------------------------------------------------

/// One station as it appears in a file, before validation.
#[derive(Debug, Clone, PartialEq)]
struct StationRow {
    station: String,
    signal_freq: Vec<f64>,
    signal_amp: Vec<f64>,
    noise_freq: Vec<f64>,
    noise_amp: Vec<f64>,
    pass_snr: bool,
    /// Usable bandwidth `[min, max]`; empty or short means "none stored".
    ub_freqs: Vec<f64>,
}

impl StationRow {
    fn from_station(id: &str, st: &StationRecord) -> Self {
        Self {
            station: id.to_string(),
            signal_freq: st.signal.freq().to_vec(),
            signal_amp: st.signal.amp().to_vec(),
            noise_freq: st.noise.freq().to_vec(),
            noise_amp: st.noise.amp().to_vec(),
            pass_snr: st.suitable_for_modeling(),
            ub_freqs: st.stored_bandwidth().to_vec(),
        }
    }

    fn into_station(self) -> Result<StationRecord> {
        let signal = Spectrum::new(self.signal_freq, self.signal_amp).context("signal spectrum")?;
        let noise = Spectrum::new(self.noise_freq, self.noise_amp).context("noise spectrum")?;
        let raw = self.ub_freqs;

        let mut record = StationRecord::new(signal, noise, self.pass_snr, None);
        if self.pass_snr {
            match FreqBand::from_slice(&raw) {
                Some(band) => {
                    if let Err(e) = record.mark_suitable(band) {
                        log::warn!("Station {}: ignoring stored bandwidth: {e}", self.station);
                    }
                }
                None if !raw.is_empty() => {
                    log::warn!(
                        "Station {}: malformed bandwidth {raw:?}, using signal range",
                        self.station
                    );
                }
                None => {}
            }
        }
        Ok(record.with_stored_bandwidth(raw))
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Expected JSON schema:
///
/// ```json
/// {
///   "stations": {
///     "STA1": {
///       "signal": { "freq": [0.01, 0.1, ...], "amp": [3.1e-6, ...] },
///       "noise":  { "freq": [...], "amp": [...] },
///       "pass_snr": true,
///       "ub_freqs": [1.0, 50.0]
///     }
///   }
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
struct JsonEvent {
    stations: BTreeMap<String, JsonStation>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonStation {
    signal: JsonSpectrum,
    noise: JsonSpectrum,
    pass_snr: bool,
    #[serde(default)]
    ub_freqs: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonSpectrum {
    freq: Vec<f64>,
    amp: Vec<f64>,
}

fn read_json<R: Read>(reader: R) -> Result<Vec<StationRow>> {
    let event: JsonEvent = serde_json::from_reader(reader).context("parsing JSON")?;

    Ok(event
        .stations
        .into_iter()
        .map(|(station, js)| StationRow {
            station,
            signal_freq: js.signal.freq,
            signal_amp: js.signal.amp,
            noise_freq: js.noise.freq,
            noise_amp: js.noise.amp,
            pass_snr: js.pass_snr,
            ub_freqs: js.ub_freqs,
        })
        .collect())
}

fn write_json<W: Write>(writer: W, rows: Vec<StationRow>) -> Result<()> {
    let stations = rows
        .into_iter()
        .map(|row| {
            (
                row.station,
                JsonStation {
                    signal: JsonSpectrum {
                        freq: row.signal_freq,
                        amp: row.signal_amp,
                    },
                    noise: JsonSpectrum {
                        freq: row.noise_freq,
                        amp: row.noise_amp,
                    },
                    pass_snr: row.pass_snr,
                    ub_freqs: row.ub_freqs,
                },
            )
        })
        .collect();

    serde_json::to_writer_pretty(writer, &JsonEvent { stations }).context("writing JSON")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

const CSV_HEADER: [&str; 7] = [
    "station",
    "signal_freq",
    "signal_amp",
    "noise_freq",
    "noise_amp",
    "pass_snr",
    "ub_freqs",
];

/// CSV layout: one row per station.
/// Array columns contain semicolon-separated floats:
///   `"0.01;0.1;1.0"`; an empty cell is an empty array.
fn read_csv<R: Read>(reader: R) -> Result<Vec<StationRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let idx = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("CSV missing '{name}' column"))
    };
    let station_idx = idx("station")?;
    let sf_idx = idx("signal_freq")?;
    let sa_idx = idx("signal_amp")?;
    let nf_idx = idx("noise_freq")?;
    let na_idx = idx("noise_amp")?;
    let pass_idx = idx("pass_snr")?;
    let ub_idx = idx("ub_freqs")?;

    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let cell = |i: usize| record.get(i).unwrap_or("");

        rows.push(StationRow {
            station: cell(station_idx).to_string(),
            signal_freq: parse_semicolon_floats(cell(sf_idx), row_no, "signal_freq")?,
            signal_amp: parse_semicolon_floats(cell(sa_idx), row_no, "signal_amp")?,
            noise_freq: parse_semicolon_floats(cell(nf_idx), row_no, "noise_freq")?,
            noise_amp: parse_semicolon_floats(cell(na_idx), row_no, "noise_amp")?,
            pass_snr: parse_bool(cell(pass_idx))
                .with_context(|| format!("Row {row_no}: invalid pass_snr"))?,
            ub_freqs: parse_semicolon_floats(cell(ub_idx), row_no, "ub_freqs")?,
        });
    }

    Ok(rows)
}

fn write_csv<W: Write>(writer: W, rows: &[StationRow]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(CSV_HEADER).context("writing CSV header")?;

    for row in rows {
        writer
            .write_record([
                row.station.clone(),
                join_semicolon_floats(&row.signal_freq),
                join_semicolon_floats(&row.signal_amp),
                join_semicolon_floats(&row.noise_freq),
                join_semicolon_floats(&row.noise_amp),
                row.pass_snr.to_string(),
                join_semicolon_floats(&row.ub_freqs),
            ])
            .with_context(|| format!("writing CSV row for {}", row.station))?;
    }

    writer.flush().context("flushing CSV")?;
    Ok(())
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

fn join_semicolon_floats(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => bail!("'{other}' is not a boolean"),
    }
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Load station rows from a Parquet file.
///
/// Expected schema:
/// - `station`: Utf8 or LargeUtf8
/// - `signal_freq`, `signal_amp`, `noise_freq`, `noise_amp`, `ub_freqs`:
///   List<Float64> or LargeList<Float64> (Float32 items are widened)
/// - `pass_snr`: Boolean
fn read_parquet(file: std::fs::File) -> Result<Vec<StationRow>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;

        let station_col = column(&batch, "station")?;
        let sf_col = column(&batch, "signal_freq")?;
        let sa_col = column(&batch, "signal_amp")?;
        let nf_col = column(&batch, "noise_freq")?;
        let na_col = column(&batch, "noise_amp")?;
        let pass_col = column(&batch, "pass_snr")?;
        let ub_col = column(&batch, "ub_freqs")?;

        let pass = pass_col
            .as_any()
            .downcast_ref::<BooleanArray>()
            .context("'pass_snr' is not a Boolean column")?;

        for row in 0..batch.num_rows() {
            let station = extract_string(station_col, row)
                .with_context(|| format!("Row {row}: failed to read 'station'"))?;
            let list = |c: &ArrayRef, name: &str| {
                extract_f64_list(c, row)
                    .with_context(|| format!("Row {row}: failed to read '{name}'"))
            };

            rows.push(StationRow {
                station,
                signal_freq: list(sf_col, "signal_freq")?,
                signal_amp: list(sa_col, "signal_amp")?,
                noise_freq: list(nf_col, "noise_freq")?,
                noise_amp: list(na_col, "noise_amp")?,
                pass_snr: !pass.is_null(row) && pass.value(row),
                ub_freqs: if ub_col.is_null(row) {
                    Vec::new()
                } else {
                    list(ub_col, "ub_freqs")?
                },
            });
        }
    }

    Ok(rows)
}

fn write_parquet<W: Write + Send>(writer: W, rows: &[StationRow]) -> Result<()> {
    let list_type = DataType::List(Arc::new(Field::new("item", DataType::Float64, true)));
    let schema = Arc::new(Schema::new(vec![
        Field::new("station", DataType::Utf8, false),
        Field::new("signal_freq", list_type.clone(), false),
        Field::new("signal_amp", list_type.clone(), false),
        Field::new("noise_freq", list_type.clone(), false),
        Field::new("noise_amp", list_type.clone(), false),
        Field::new("pass_snr", DataType::Boolean, false),
        Field::new("ub_freqs", list_type, true),
    ]));

    let stations = StringArray::from(rows.iter().map(|r| r.station.as_str()).collect::<Vec<_>>());
    let pass = BooleanArray::from(rows.iter().map(|r| r.pass_snr).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(stations) as ArrayRef,
            build_f64_list(rows.iter().map(|r| r.signal_freq.as_slice())),
            build_f64_list(rows.iter().map(|r| r.signal_amp.as_slice())),
            build_f64_list(rows.iter().map(|r| r.noise_freq.as_slice())),
            build_f64_list(rows.iter().map(|r| r.noise_amp.as_slice())),
            Arc::new(pass),
            build_f64_list(rows.iter().map(|r| r.ub_freqs.as_slice())),
        ],
    )
    .context("building record batch")?;

    let mut writer = ArrowWriter::try_new(writer, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

// -- Parquet / Arrow helpers --

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow::anyhow!("Parquet file missing '{name}' column"))?;
    Ok(batch.column(idx))
}

fn build_f64_list<'a>(rows: impl Iterator<Item = &'a [f64]>) -> ArrayRef {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        let values = builder.values();
        for &v in row {
            values.append_value(v);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &ArrayRef, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

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

fn extract_string(col: &ArrayRef, row: usize) -> Result<String> {
    if col.is_null(row) {
        bail!("null station id");
    }
    match col.data_type() {
        DataType::Utf8 => Ok(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(row).to_string()),
        other => bail!("Expected Utf8 column, got {other:?}"),
    }
}
