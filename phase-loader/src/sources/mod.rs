pub mod meter_reading_backfill_file;
pub mod meter_reading_csv_file;

pub use meter_reading_backfill_file::MeterReadingBackfillFileSource;
pub use meter_reading_csv_file::MeterReadingCsvFileSource;
