use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
};

use eyre::{Context, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::fs::{read_dir, read_to_string};
use tracing::debug;

use crate::error::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMode {
    Read,
    Write,
}

impl IoMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IoMode::Read => "read",
            IoMode::Write => "write",
        }
    }
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A number the loader may hand over as JSON number or as a numeral string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeral {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Numeral {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Numeral::Int(x) => Some(*x),
            Numeral::Float(x) => whole(*x),
            Numeral::Text(s) => {
                let s = s.trim();
                s.parse::<u64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole))
            }
        }
    }
}

fn whole(x: f64) -> Option<u64> {
    if x.is_finite() && x >= 0.0 && x.fract() == 0.0 && x <= u64::MAX as f64 {
        Some(x as u64)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawParams {
    pub mode: Option<IoMode>,
    pub blocksize: Option<Numeral>,
    pub device: Option<String>,
    pub device_or_file: Option<String>,
    pub multiplicity: Option<Numeral>,
    pub start_time: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawIostatSample {
    pub time: f64,
    #[serde(default)]
    pub devices: HashMap<String, HashMap<String, f64>>,
}

/// A result record as produced by the loader, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub params: RawParams,
    pub transfer_rate: Option<f64>,
    pub iops: Option<f64>,
    pub response_time: Option<f64>,
    #[serde(default)]
    pub iostat_avg: HashMap<String, f64>,
    #[serde(default)]
    pub iostat_sterr: HashMap<String, f64>,
    #[serde(default)]
    pub iostat_data: Vec<RawIostatSample>,
    pub target_dev: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub mode: IoMode,
    pub block_size: u64,
    pub device: String,
    pub device_or_file: String,
    pub multiplicity: u32,
    pub start_time: Option<f64>,
}

/// Averaged (or standard error of) iostat columns for one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    #[serde(rename = "rkB/s")]
    pub read_kb_per_sec: f64,
    #[serde(rename = "wkB/s")]
    pub write_kb_per_sec: f64,
    #[serde(rename = "r/s")]
    pub reads_per_sec: f64,
    #[serde(rename = "w/s")]
    pub writes_per_sec: f64,
    #[serde(rename = "await")]
    pub await_ms: f64,
    #[serde(rename = "avgqu-sz")]
    pub avg_queue_size: f64,
}

pub const IOSTAT_COLUMNS: [&str; 6] = ["rkB/s", "wkB/s", "r/s", "w/s", "await", "avgqu-sz"];

impl DeviceStats {
    fn from_map(id: &str, section: &str, map: &HashMap<String, f64>) -> Result<Self, ReportError> {
        let get = |column: &str| {
            map.get(column)
                .copied()
                .ok_or_else(|| ReportError::missing(id, format!("{section}.{column}")))
        };
        Ok(DeviceStats {
            read_kb_per_sec: get(IOSTAT_COLUMNS[0])?,
            write_kb_per_sec: get(IOSTAT_COLUMNS[1])?,
            reads_per_sec: get(IOSTAT_COLUMNS[2])?,
            writes_per_sec: get(IOSTAT_COLUMNS[3])?,
            await_ms: get(IOSTAT_COLUMNS[4])?,
            avg_queue_size: get(IOSTAT_COLUMNS[5])?,
        })
    }
}

/// Throughput of the target device at one point of the run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    pub time: f64,
    pub read_kb_per_sec: f64,
    pub write_kb_per_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub id: String,
    pub params: RunParams,
    pub transfer_rate: f64,
    pub iops: f64,
    /// Seconds
    pub response_time: f64,
    pub iostat_avg: DeviceStats,
    pub iostat_stderr: DeviceStats,
    pub trace: Vec<TraceSample>,
    pub target_dev: Option<String>,
}

impl RawResult {
    /// Checks every field the report depends on and builds the typed record
    pub fn validate(self) -> Result<BenchmarkResult, ReportError> {
        let id = self.id;
        let p = self.params;
        let mode = p.mode.ok_or_else(|| ReportError::missing(&id, "mode"))?;
        let block_size = p
            .blocksize
            .as_ref()
            .and_then(Numeral::as_u64)
            .ok_or_else(|| ReportError::missing(&id, "blocksize"))?;
        let device = p
            .device
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ReportError::missing(&id, "device"))?;
        let multiplicity = p
            .multiplicity
            .as_ref()
            .and_then(Numeral::as_u64)
            .and_then(|m| u32::try_from(m).ok())
            .ok_or_else(|| ReportError::missing(&id, "multiplicity"))?;

        let transfer_rate = self
            .transfer_rate
            .ok_or_else(|| ReportError::missing(&id, "transfer_rate"))?;
        let iops = self.iops.ok_or_else(|| ReportError::missing(&id, "iops"))?;
        let response_time = self
            .response_time
            .ok_or_else(|| ReportError::missing(&id, "response_time"))?;
        let iostat_avg = DeviceStats::from_map(&id, "iostat_avg", &self.iostat_avg)?;
        let iostat_stderr = DeviceStats::from_map(&id, "iostat_sterr", &self.iostat_sterr)?;

        let trace = match (&self.target_dev, self.iostat_data.is_empty()) {
            (_, true) => Vec::new(),
            (None, false) => return Err(ReportError::missing(&id, "target_dev")),
            (Some(dev), false) => self
                .iostat_data
                .iter()
                .map(|sample| {
                    let row = sample
                        .devices
                        .get(dev)
                        .ok_or_else(|| ReportError::missing(&id, format!("iostat_data.{dev}")))?;
                    let get = |column: &str| {
                        row.get(column).copied().ok_or_else(|| {
                            ReportError::missing(&id, format!("iostat_data.{dev}.{column}"))
                        })
                    };
                    Ok(TraceSample {
                        time: sample.time,
                        read_kb_per_sec: get("rkB/s")?,
                        write_kb_per_sec: get("wkB/s")?,
                    })
                })
                .collect::<Result<Vec<_>, ReportError>>()?,
        };

        Ok(BenchmarkResult {
            params: RunParams {
                mode,
                block_size,
                device_or_file: p.device_or_file.unwrap_or_else(|| device.clone()),
                device,
                multiplicity,
                start_time: p.start_time,
            },
            id,
            transfer_rate,
            iops,
            response_time,
            iostat_avg,
            iostat_stderr,
            trace,
            target_dev: self.target_dev,
        })
    }
}

/// Every validated result of one report pass
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    results: Vec<BenchmarkResult>,
}

impl ResultStore {
    pub fn new(results: Vec<BenchmarkResult>) -> Self {
        Self { results }
    }

    /// Validates all records, failing on the first malformed one
    pub fn from_raw(raw: Vec<RawResult>) -> Result<Self, ReportError> {
        let results = raw
            .into_iter()
            .map(RawResult::validate)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { results })
    }

    pub fn results(&self) -> &[BenchmarkResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Keeps only the results accepted by `keep`
    pub fn filtered(&self, keep: impl Fn(&BenchmarkResult) -> bool) -> ResultStore {
        ResultStore {
            results: self.results.iter().filter(|x| keep(x)).cloned().collect(),
        }
    }
}

/// Loads results from either a JSON array file, a folder containing
/// `results.json`, or a folder whose `data/<run>/results.json` files hold one
/// record each.
pub async fn load_results(path: &Path) -> Result<ResultStore> {
    let raw = if path.is_file() {
        read_result_array(path).await?
    } else if path.join("results.json").is_file() {
        read_result_array(&path.join("results.json")).await?
    } else {
        read_run_dirs(&path.join("data")).await?
    };
    debug!("Loaded {} raw results from {path:?}", raw.len());
    Ok(ResultStore::from_raw(raw)?)
}

async fn read_result_array(path: &Path) -> Result<Vec<RawResult>> {
    let data = read_to_string(path)
        .await
        .context(format!("Read {path:?}"))?;
    serde_json::from_str(&data).context(format!("Parse {path:?}"))
}

async fn read_run_dirs(data_path: &Path) -> Result<Vec<RawResult>> {
    let mut runs: Vec<(String, PathBuf)> = Vec::new();
    let mut items = read_dir(data_path)
        .await
        .context(format!("Read results folder {data_path:?}"))?;
    while let Some(entry) = items.next_entry().await? {
        let file = entry.path().join("results.json");
        if entry.file_type().await?.is_dir() && file.is_file() {
            runs.push((entry.file_name().to_string_lossy().into_owned(), file));
        }
    }
    runs.sort();

    let loaded = join_all(runs.into_iter().map(|(dir, file)| async move {
        let data = read_to_string(&file).await;
        (dir, file, data)
    }))
    .await;

    loaded
        .into_iter()
        .map(|(dir, file, data)| {
            let data = data.context(format!("Read {file:?}"))?;
            let mut raw: RawResult =
                serde_json::from_str(&data).context(format!("Parse {file:?}"))?;
            if raw.id.is_empty() {
                raw.id = dir;
            }
            Ok(raw)
        })
        .collect()
}
