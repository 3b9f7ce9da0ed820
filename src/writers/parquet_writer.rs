use crate::error::{ProcessingError, Result};
use crate::models::FitResult;
use crate::utils::constants::{
    COMPRESSION_GZIP, COMPRESSION_LZ4, COMPRESSION_NONE, COMPRESSION_SNAPPY, COMPRESSION_ZSTD,
    DEFAULT_ROW_GROUP_SIZE,
};
use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            COMPRESSION_SNAPPY => Compression::SNAPPY,
            COMPRESSION_GZIP => Compression::GZIP(GzipLevel::default()),
            COMPRESSION_LZ4 => Compression::LZ4,
            COMPRESSION_ZSTD => Compression::ZSTD(ZstdLevel::default()),
            COMPRESSION_NONE => Compression::UNCOMPRESSED,
            _ => {
                return Err(ProcessingError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Write the fit table, good and bad rows alike
    pub fn write_fits(&self, rows: &[FitResult], path: &Path) -> Result<()> {
        let schema = self.create_schema();
        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
        for chunk in rows.chunks(self.row_group_size.max(1)) {
            let batch = self.rows_to_batch(chunk, schema.clone())?;
            writer.write(&batch)?;
        }
        writer.close()?;

        Ok(())
    }

    fn create_schema(&self) -> Arc<Schema> {
        let mut fields = vec![
            Field::new("site", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("country", DataType::Utf8, false),
            Field::new("year", DataType::Int32, false),
            Field::new("latitude", DataType::Float64, false),
            Field::new("longitude", DataType::Float64, false),
            Field::new("PFT", DataType::Utf8, false),
            Field::new("climate_class", DataType::Utf8, false),
        ];
        fields.extend(
            STAT_COLUMNS
                .iter()
                .map(|name| Field::new(*name, DataType::Float64, false)),
        );
        fields.extend([
            Field::new("most_prod_mths", DataType::Utf8, false),
            Field::new("omega", DataType::Float64, false),
            Field::new("gs_method", DataType::Utf8, false),
            Field::new("success", DataType::Boolean, false),
            Field::new("failure_reason", DataType::Utf8, false),
        ]);

        Arc::new(Schema::new(fields))
    }

    fn rows_to_batch(&self, rows: &[FitResult], schema: Arc<Schema>) -> Result<RecordBatch> {
        let strings = |f: fn(&FitResult) -> &str| -> ArrayRef {
            Arc::new(StringArray::from_iter_values(rows.iter().map(f)))
        };
        let floats = |f: fn(&FitResult) -> f64| -> ArrayRef {
            Arc::new(Float64Array::from_iter_values(rows.iter().map(f)))
        };

        let mut columns: Vec<ArrayRef> = vec![
            strings(|r| r.site.as_str()),
            strings(|r| r.name.as_str()),
            strings(|r| r.country.as_str()),
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            floats(|r| r.latitude),
            floats(|r| r.longitude),
            strings(|r| r.pft.as_str()),
            strings(|r| r.climate_class.as_str()),
        ];
        columns.extend(
            rows_stats(rows)
                .into_iter()
                .map(|values| Arc::new(Float64Array::from(values)) as ArrayRef),
        );
        columns.extend([
            strings(|r| r.most_prod_mths.as_str()),
            floats(|r| r.omega),
            strings(|r| r.gs_method.as_str()),
            Arc::new(BooleanArray::from(
                rows.iter().map(|r| r.success).collect::<Vec<_>>(),
            )) as ArrayRef,
            strings(|r| r.failure_reason.as_str()),
        ]);

        Ok(RecordBatch::try_new(schema, columns)?)
    }

    /// Read a fit table written by [`ParquetWriter::write_fits`]
    pub fn read_fits(&self, path: &Path) -> Result<Vec<FitResult>> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch?;
            let site = column::<StringArray>(&batch, "site")?;
            let name = column::<StringArray>(&batch, "name")?;
            let country = column::<StringArray>(&batch, "country")?;
            let year = column::<Int32Array>(&batch, "year")?;
            let latitude = column::<Float64Array>(&batch, "latitude")?;
            let longitude = column::<Float64Array>(&batch, "longitude")?;
            let pft = column::<StringArray>(&batch, "PFT")?;
            let climate_class = column::<StringArray>(&batch, "climate_class")?;
            let stats = STAT_COLUMNS
                .iter()
                .map(|name| column::<Float64Array>(&batch, name))
                .collect::<Result<Vec<_>>>()?;
            let months = column::<StringArray>(&batch, "most_prod_mths")?;
            let omega = column::<Float64Array>(&batch, "omega")?;
            let gs_method = column::<StringArray>(&batch, "gs_method")?;
            let success = column::<BooleanArray>(&batch, "success")?;
            let reason = column::<StringArray>(&batch, "failure_reason")?;

            for i in 0..batch.num_rows() {
                let stat = |k: usize| stats[k].value(i);
                rows.push(FitResult {
                    site: site.value(i).to_string(),
                    name: name.value(i).to_string(),
                    country: country.value(i).to_string(),
                    year: year.value(i),
                    latitude: latitude.value(i),
                    longitude: longitude.value(i),
                    pft: pft.value(i).to_string(),
                    climate_class: climate_class.value(i).to_string(),
                    g0: stat(0),
                    g1: stat(1),
                    g1_se: stat(2),
                    n: stat(3),
                    r2: stat(4),
                    rmse: stat(5),
                    co2: stat(6),
                    global_co2: stat(7),
                    summer_precip: stat(8),
                    summer_gpp_mean: stat(9),
                    summer_gpp_sd: stat(10),
                    et_mean: stat(11),
                    et_sd: stat(12),
                    ebr: stat(13),
                    lai: stat(14),
                    lai_min: stat(15),
                    lai_max: stat(16),
                    most_prod_mths: months.value(i).to_string(),
                    omega: omega.value(i),
                    gs_method: gs_method.value(i).to_string(),
                    success: success.value(i),
                    failure_reason: reason.value(i).to_string(),
                });
            }
        }

        Ok(rows)
    }

    /// Get file statistics
    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let row_groups = metadata.num_row_groups();
        let total_rows = metadata.file_metadata().num_rows();
        let file_size = std::fs::metadata(path)?.len();
        let row_group_sizes = (0..row_groups)
            .map(|i| metadata.row_group(i).num_rows())
            .collect();

        Ok(ParquetFileInfo {
            total_rows,
            row_groups: row_groups as i32,
            row_group_sizes,
            file_size,
            compression: self.compression,
        })
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Fit statistics stored as plain Float64 columns, in schema order
const STAT_COLUMNS: [&str; 17] = [
    "g0",
    "g1",
    "g1_se",
    "n",
    "r2",
    "rmse",
    "CO2",
    "global_CO2",
    "summer_precip",
    "summer_mu_GPP_umol_m2_s",
    "summer_sd_GPP_umol_m2_s",
    "ET_mmol_m2_s",
    "ET_sd_mmol_m2_s",
    "ebr",
    "lai",
    "lai_min",
    "lai_max",
];

fn rows_stats(rows: &[FitResult]) -> Vec<Vec<f64>> {
    let mut columns = vec![Vec::with_capacity(rows.len()); STAT_COLUMNS.len()];
    for r in rows {
        let values = [
            r.g0,
            r.g1,
            r.g1_se,
            r.n,
            r.r2,
            r.rmse,
            r.co2,
            r.global_co2,
            r.summer_precip,
            r.summer_gpp_mean,
            r.summer_gpp_sd,
            r.et_mean,
            r.et_sd,
            r.ebr,
            r.lai,
            r.lai_min,
            r.lai_max,
        ];
        for (column, value) in columns.iter_mut().zip(values) {
            column.push(value);
        }
    }
    columns
}

fn column<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<A>())
        .ok_or_else(|| ProcessingError::InvalidFormat(format!("Invalid {} column", name)))
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
    pub compression: Compression,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} KB\n\
            - Compression: {:?}\n\
            - Avg rows per group: {:.0}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1024.0,
            self.compression,
            self.total_rows as f64 / self.row_groups.max(1) as f64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteIdentity;
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    fn rows() -> Vec<FitResult> {
        let mut good = FitResult::bad(SiteIdentity::unknown("AT-Neu", 2003), "");
        good.g1 = 3.1;
        good.r2 = 0.74;
        good.success = true;
        good.gs_method = "bulk_hypsometric_pressure".to_string();
        vec![good, FitResult::bad(SiteIdentity::unknown("XX-Bad", 2004), "too few samples")]
    }

    #[test]
    fn test_write_and_read_fits() -> Result<()> {
        let writer = ParquetWriter::new();
        let temp_file = NamedTempFile::new()?;

        writer.write_fits(&rows(), temp_file.path())?;
        let back = writer.read_fits(temp_file.path())?;
        assert_eq!(back, rows());

        let info = writer.get_file_info(temp_file.path())?;
        assert_eq!(info.total_rows, 2);
        Ok(())
    }

    #[test]
    fn test_different_compressions() -> Result<()> {
        for compression in ["snappy", "gzip", "lz4", "zstd", "none"] {
            let writer = ParquetWriter::new().with_compression(compression)?;
            let temp_file = NamedTempFile::new()?;
            let result = writer.write_fits(&rows(), temp_file.path());
            assert!(result.is_ok(), "Failed with compression: {}", compression);
        }
        assert!(ParquetWriter::new().with_compression("brotli9").is_err());
        Ok(())
    }

    #[test]
    fn test_row_groups_follow_size() -> Result<()> {
        let writer = ParquetWriter::new().with_row_group_size(1);
        let temp_file = NamedTempFile::new()?;
        writer.write_fits(&rows(), temp_file.path())?;
        assert_eq!(writer.get_file_info(temp_file.path())?.row_groups, 2);
        Ok(())
    }
}
