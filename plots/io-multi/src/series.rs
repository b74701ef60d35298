use common::{
    KB_PER_MB,
    error::ReportError,
    plot::AxisRange,
    result::{BenchmarkResult, DeviceStats, IoMode},
};
use tracing::debug;

use crate::group::Group;

/// Lowest x a log-scale axis is allowed to start at
pub const LOG_AXIS_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    TransferRate,
    Iops,
    ResponseTime,
    QueueDepth,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::TransferRate,
        Metric::Iops,
        Metric::ResponseTime,
        Metric::QueueDepth,
    ];
}

/// A mean and its standard error over repeated runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measured {
    pub value: f64,
    pub error: f64,
}

/// One tabular row, in the units it is plotted in
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub multiplicity: u32,
    pub transfer_rate: f64,
    pub iops: f64,
    /// MB/s
    pub device_transfer: Measured,
    pub device_iops: Measured,
    pub latency: Measured,
    pub queue_depth: Measured,
    /// Seconds, as measured
    pub response_time: f64,
}

impl SeriesRow {
    pub fn from_result(result: &BenchmarkResult) -> Self {
        let mode = result.params.mode;
        let avg = &result.iostat_avg;
        let err = &result.iostat_stderr;
        SeriesRow {
            multiplicity: result.params.multiplicity,
            transfer_rate: result.transfer_rate,
            iops: result.iops,
            device_transfer: Measured {
                value: transfer_kb(avg, mode) / KB_PER_MB,
                error: transfer_kb(err, mode) / KB_PER_MB,
            },
            device_iops: Measured {
                value: operations(avg, mode),
                error: operations(err, mode),
            },
            latency: Measured {
                value: avg.await_ms,
                error: err.await_ms,
            },
            queue_depth: Measured {
                value: avg.avg_queue_size,
                error: err.avg_queue_size,
            },
            response_time: result.response_time,
        }
    }

    /// Plotted value and, where repeated samples exist, its error.
    /// Response time is in milliseconds here.
    pub fn point(&self, metric: Metric) -> (f64, Option<f64>) {
        match metric {
            Metric::TransferRate => (self.device_transfer.value, Some(self.device_transfer.error)),
            Metric::Iops => (self.device_iops.value, Some(self.device_iops.error)),
            Metric::ResponseTime => (self.response_time * 1000.0, None),
            Metric::QueueDepth => (self.queue_depth.value, Some(self.queue_depth.error)),
        }
    }
}

fn transfer_kb(stats: &DeviceStats, mode: IoMode) -> f64 {
    match mode {
        IoMode::Read => stats.read_kb_per_sec,
        IoMode::Write => stats.write_kb_per_sec,
    }
}

fn operations(stats: &DeviceStats, mode: IoMode) -> f64 {
    match mode {
        IoMode::Read => stats.reads_per_sec,
        IoMode::Write => stats.writes_per_sec,
    }
}

/// Smallest and largest multiplicity of a set of runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiplicityRange {
    pub min: u32,
    pub max: u32,
}

impl MultiplicityRange {
    pub fn of(multiplicities: impl IntoIterator<Item = u32>) -> Option<Self> {
        multiplicities.into_iter().fold(None, |acc, m| {
            Some(match acc {
                None => Self { min: m, max: m },
                Some(r) => Self {
                    min: r.min.min(m),
                    max: r.max.max(m),
                },
            })
        })
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// X range of the log-scale charts
    pub fn overview(&self) -> AxisRange {
        AxisRange::new(log_lower_bound(self.min as f64 - 1.0), self.max as f64 + 1.0)
    }

    /// X range of the linear charts, cut off where throughput is expected to
    /// have saturated
    pub fn zoomed(&self, upper: f64) -> AxisRange {
        AxisRange::new(self.min as f64 - 1.0, upper)
    }
}

pub fn check_log_bound(lower: f64) -> Result<f64, ReportError> {
    if lower < LOG_AXIS_FLOOR {
        Err(ReportError::InvalidRange {
            lower,
            floor: LOG_AXIS_FLOOR,
        })
    } else {
        Ok(lower)
    }
}

/// Clamps `lower` to [`LOG_AXIS_FLOOR`]
pub fn log_lower_bound(lower: f64) -> f64 {
    check_log_bound(lower).unwrap_or_else(|err| {
        debug!("{err}, clamping");
        LOG_AXIS_FLOOR
    })
}

/// Everything a group contributes to the table and the charts
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSeries {
    pub title: String,
    /// Device or file the group ran against, for chart titles
    pub label: String,
    pub rows: Vec<SeriesRow>,
    pub range: MultiplicityRange,
}

impl GroupSeries {
    pub fn build(group: &Group<'_>) -> Result<Self, ReportError> {
        let title = group.title();
        let (Some(label), Some(range)) = (
            group.device_label(),
            MultiplicityRange::of(group.results.iter().map(|x| x.params.multiplicity)),
        ) else {
            return Err(ReportError::EmptyGroup { group: title });
        };

        Ok(GroupSeries {
            label: label.to_owned(),
            rows: group
                .results
                .iter()
                .map(|x| SeriesRow::from_result(x))
                .collect(),
            range,
            title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{GroupKey, group_results, tests::result};

    #[test]
    fn read_mode_uses_read_columns() {
        let r = result("a", IoMode::Read, 4096, "sda", 1);
        let row = SeriesRow::from_result(&r);
        assert_eq!(row.device_transfer.value, 2.0);
        assert_eq!(row.device_transfer.error, 0.5);
        assert_eq!(row.device_iops.value, 10.0);
        assert_eq!(row.device_iops.error, 1.0);
    }

    #[test]
    fn write_mode_uses_write_columns() {
        let r = result("a", IoMode::Write, 4096, "sda", 1);
        let row = SeriesRow::from_result(&r);
        assert_eq!(row.device_transfer.value, 4.0);
        assert_eq!(row.device_transfer.error, 1.0);
        assert_eq!(row.device_iops, Measured { value: 20.0, error: 2.0 });
        assert_eq!(row.latency, Measured { value: 1.5, error: 0.1 });
    }

    #[test]
    fn response_time_has_no_error() {
        let row = SeriesRow::from_result(&result("a", IoMode::Read, 4096, "sda", 1));
        assert_eq!(row.point(Metric::ResponseTime), (2.0, None));
        assert_eq!(row.point(Metric::QueueDepth), (1.0, Some(0.25)));
    }

    #[test]
    fn overview_lower_bound_is_floored() {
        let range = MultiplicityRange { min: 1, max: 16 };
        assert_eq!(range.overview(), AxisRange::new(0.5, 17.0));
        let range = MultiplicityRange { min: 4, max: 16 };
        assert_eq!(range.overview(), AxisRange::new(3.0, 17.0));
    }

    #[test]
    fn zoomed_lower_bound_is_not_floored() {
        let range = MultiplicityRange { min: 1, max: 128 };
        assert_eq!(range.zoomed(65.0), AxisRange::new(0.0, 65.0));
    }

    #[test]
    fn degenerate_log_bound_is_reported() {
        assert!(matches!(
            check_log_bound(0.0),
            Err(ReportError::InvalidRange { lower, floor }) if lower == 0.0 && floor == LOG_AXIS_FLOOR
        ));
        assert_eq!(log_lower_bound(-3.0), LOG_AXIS_FLOOR);
        assert_eq!(log_lower_bound(7.0), 7.0);
    }

    #[test]
    fn series_follow_group_order() {
        let results = [8, 1, 4]
            .into_iter()
            .map(|m| result(&format!("r{m}"), IoMode::Read, 4096, "sda", m))
            .collect::<Vec<_>>();
        let groups = group_results(&results);
        let series = GroupSeries::build(&groups[0]).unwrap();
        assert_eq!(series.range, MultiplicityRange { min: 1, max: 8 });
        assert_eq!(series.label, "/dev/sda");
        let queue = series
            .rows
            .iter()
            .map(|row| (row.multiplicity, row.point(Metric::QueueDepth)))
            .collect::<Vec<_>>();
        assert_eq!(
            queue,
            vec![(1, (1.0, Some(0.25))), (4, (4.0, Some(0.25))), (8, (8.0, Some(0.25)))]
        );
    }

    #[test]
    fn empty_group_is_an_error() {
        let group = Group {
            key: GroupKey {
                mode: IoMode::Read,
                block_size: 4096,
                device: "sda".to_owned(),
            },
            results: Vec::new(),
        };
        assert!(matches!(
            GroupSeries::build(&group),
            Err(ReportError::EmptyGroup { group }) if group == "read-4096-sda"
        ));
    }
}
