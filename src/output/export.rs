//! CSV export with a UTF-8 BOM prefix (so legacy spreadsheet tools
//! render CJK columns correctly) under the date-stamped output tree.

use crate::core::ScreenError;
use crate::model::{Batch, StageSnapshot};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const BOM: &[u8] = b"\xEF\xBB\xBF";
const RETENTION_DAYS: i64 = 30;

pub fn date_dir(out_root: &Path, date: NaiveDate) -> PathBuf {
    out_root.join(date.format("%Y%m%d").to_string())
}

/// Writes `rows` as BOM-prefixed CSV, serializing each row with `serde`.
fn write_csv_with_bom<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ScreenError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(BOM)?;
    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct RowRecord<'a> {
    id: &'a str,
    name: &'a str,
    venue: &'static str,
    industry: &'a str,
    price: f64,
    open: f64,
    high: f64,
    low: f64,
    prev_close: f64,
    volume: f64,
    change_pct: f64,
    columns_json: String,
}

fn to_records(batch: &Batch) -> Vec<RowRecord<'_>> {
    batch
        .iter()
        .map(|r| RowRecord {
            id: &r.id,
            name: &r.name,
            venue: r.venue.as_str(),
            industry: &r.industry,
            price: r.price,
            open: r.open,
            high: r.high,
            low: r.low,
            prev_close: r.prev_close,
            volume: r.volume,
            change_pct: r.change_pct,
            columns_json: serde_json::to_string(&r.columns).unwrap_or_default(),
        })
        .collect()
}

pub fn export_final_batch(out_root: &Path, date: NaiveDate, mode: &str, stamp: &str, batch: &Batch) {
    let path = date_dir(out_root, date).join(format!("screener_{mode}_{stamp}.csv"));
    match write_csv_with_bom(&path, &to_records(batch)) {
        Ok(()) => info!(path = %path.display(), rows = batch.len(), "exported final batch"),
        Err(e) => warn!(error = %e, path = %path.display(), "failed to export final batch"),
    }
}

pub fn export_step_snapshots(out_root: &Path, date: NaiveDate, mode: &str, stamp: &str, snapshots: &[StageSnapshot]) {
    let dir = date_dir(out_root, date).join(format!("steps_{mode}_{stamp}"));
    for snap in snapshots {
        let path = dir.join(format!("step_{:02}_{}.csv", snap.step_number, snap.name));
        if let Err(e) = write_csv_with_bom(&path, &to_records(&snap.batch)) {
            warn!(error = %e, path = %path.display(), "failed to export step snapshot");
        }
    }
}

#[derive(Serialize)]
pub struct PoolRecord {
    pub id: String,
    pub name: String,
    pub consecutive_days: u32,
}

pub fn export_bullish_pool(out_root: &Path, date: NaiveDate, rows: &[PoolRecord]) {
    let path = date_dir(out_root, date).join("bullish_pool.csv");
    if let Err(e) = write_csv_with_bom(&path, rows) {
        warn!(error = %e, path = %path.display(), "failed to export bullish pool");
    }
}

#[derive(Serialize)]
pub struct InstitutionalRecord {
    pub id: String,
    pub foreign_consecutive_buy: u32,
    pub trust_consecutive_buy: u32,
    pub foreign_20d_sum: f64,
    pub trust_20d_sum: f64,
}

pub fn export_institutional(out_root: &Path, date: NaiveDate, rows: &[InstitutionalRecord]) {
    let path = date_dir(out_root, date).join("institutional_tracking.csv");
    if let Err(e) = write_csv_with_bom(&path, rows) {
        warn!(error = %e, path = %path.display(), "failed to export institutional tracking");
    }
}

/// Removes date-stamped subdirectories older than [`RETENTION_DAYS`].
pub fn purge_old_runs(out_root: &Path, today: NaiveDate) {
    let Ok(entries) = std::fs::read_dir(out_root) else { return };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else { continue };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Ok(dir_date) = NaiveDate::parse_from_str(name, "%Y%m%d") else { continue };
        if (today - dir_date).num_days() > RETENTION_DAYS {
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                warn!(error = %e, dir = name, "failed to purge old output directory");
            } else {
                info!(dir = name, "purged output directory older than 30 days");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Row, Venue};

    #[test]
    fn writes_bom_prefixed_csv() {
        let dir = std::env::temp_dir().join(format!("export-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let batch: Batch = vec![Row::new("1101", "Taiwan Cement", Venue::Main)];
        export_final_batch(&dir, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "left", "093000", &batch);
        let path = date_dir(&dir, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).join("screener_left_093000.csv");
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], BOM);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn purge_removes_directories_older_than_retention() {
        let dir = std::env::temp_dir().join(format!("export-purge-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("20200101")).unwrap();
        std::fs::create_dir_all(dir.join("20990101")).unwrap();
        purge_old_runs(&dir, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert!(!dir.join("20200101").exists());
        assert!(dir.join("20990101").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
