use std::{
    fs::File,
    io::{self, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use common::{
    error::ReportError,
    plot::{BlockRange, SeriesEntry},
};
use csv::WriterBuilder;
use tracing::{debug, warn};

use crate::series::{GroupSeries, Metric, SeriesRow};

pub const ALL_RESULTS: &str = "allresults.tsv";

/// gnuplot starts a new `index` after two consecutive newlines
const BLOCK_SEPARATOR: &[u8] = b"\n\n";

impl Metric {
    /// Column selector into a block of [`ALL_RESULTS`]
    pub fn using(&self) -> &'static str {
        match self {
            Metric::TransferRate => "1:4:5",
            Metric::Iops => "1:6:7",
            Metric::ResponseTime => "1:($12*1000)",
            Metric::QueueDepth => "1:10:11",
        }
    }
}

impl SeriesRow {
    /// Columns in file order. Response time stays in seconds, the column
    /// selector rescales it.
    pub fn fields(&self) -> [String; 12] {
        let measured = |metric| {
            let (value, error) = self.point(metric);
            (value.to_string(), error.unwrap_or_default().to_string())
        };
        let (transfer, transfer_err) = measured(Metric::TransferRate);
        let (device_iops, device_iops_err) = measured(Metric::Iops);
        let (queue, queue_err) = measured(Metric::QueueDepth);
        [
            self.multiplicity.to_string(),
            self.transfer_rate.to_string(),
            self.iops.to_string(),
            transfer,
            transfer_err,
            device_iops,
            device_iops_err,
            self.latency.value.to_string(),
            self.latency.error.to_string(),
            queue,
            queue_err,
            self.response_time.to_string(),
        ]
    }
}

/// A block that has been written and synced to the shared table
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub index: usize,
    pub title: String,
    pub datafile: PathBuf,
}

impl Block {
    /// A series reading `metric` from this block, without a style yet
    pub fn series(&self, metric: Metric) -> SeriesEntry {
        SeriesEntry {
            title: self.title.clone(),
            datafile: self.datafile.clone(),
            using: metric.using().to_owned(),
            index: BlockRange::single(self.index),
            with: String::new(),
            options: None,
        }
    }
}

/// Storage behind the shared table
pub trait TableSink: Write {
    /// Makes everything written so far durable
    fn sync(&mut self) -> io::Result<()>;
    /// Drops everything after the first `len` bytes and continues writing there
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl TableSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len)).map(|_| ())
    }
}

/// Appends one block per group to the shared table
pub struct TabularWriter<W: TableSink = File> {
    path: PathBuf,
    sink: W,
    /// Length of the table up to the end of the last complete block
    committed: u64,
    next_block: usize,
    /// Set when a failed block could not be rolled back
    broken: bool,
}

impl TabularWriter<File> {
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        let file = File::create(path).map_err(|e| ReportError::write(path, e))?;
        Ok(Self::with_sink(path, file))
    }
}

impl<W: TableSink> TabularWriter<W> {
    pub fn with_sink(path: &Path, sink: W) -> Self {
        Self {
            path: path.to_path_buf(),
            sink,
            committed: 0,
            next_block: 0,
            broken: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn blocks_written(&self) -> usize {
        self.next_block
    }

    /// Writes the rows of `series` followed by a block separator and syncs
    /// the file. The returned [`Block`] is the only way to reference the rows,
    /// so block indices cannot drift from what was written.
    ///
    /// A failed block is cut from the table again and takes no index.
    pub fn write_group(&mut self, series: &GroupSeries) -> Result<Block, ReportError> {
        if self.broken {
            return Err(ReportError::write(
                &self.path,
                io::Error::other("table holds a partial block"),
            ));
        }

        let mut rows = WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(Vec::new());
        for row in &series.rows {
            rows.write_record(row.fields())
                .map_err(|e| ReportError::write(&self.path, e.into()))?;
        }
        let mut bytes = rows
            .into_inner()
            .map_err(|e| ReportError::write(&self.path, e.into_error()))?;
        bytes.extend_from_slice(BLOCK_SEPARATOR);

        if let Err(err) = self
            .sink
            .write_all(&bytes)
            .and_then(|_| self.sink.flush())
            .and_then(|_| self.sink.sync())
        {
            self.rollback();
            return Err(ReportError::write(&self.path, err));
        }
        self.committed += bytes.len() as u64;

        let block = Block {
            index: self.next_block,
            title: series.title.clone(),
            datafile: self.path.clone(),
        };
        self.next_block += 1;
        debug!(
            "Wrote block {} ({} rows) for {}",
            block.index,
            series.rows.len(),
            block.title
        );
        Ok(block)
    }

    fn rollback(&mut self) {
        if let Err(err) = self.sink.truncate(self.committed) {
            warn!(
                "Could not cut partial block from {:?}: {err}",
                self.path
            );
            self.broken = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use common::result::IoMode;

    use super::*;
    use crate::group::{group_results, tests::result};

    #[test]
    fn blocks_are_indexed_in_write_order() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            result("a", IoMode::Read, 4096, "sda", 2),
            result("b", IoMode::Read, 4096, "sda", 1),
            result("c", IoMode::Write, 4096, "sda", 1),
        ];
        let groups = group_results(&results);
        let mut writer = TabularWriter::create(&dir.path().join(ALL_RESULTS)).unwrap();

        let blocks = groups
            .iter()
            .map(|g| writer.write_group(&GroupSeries::build(g).unwrap()).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(writer.blocks_written(), 2);
        assert_eq!(blocks[0].index, 0);
        assert_eq!(blocks[1].index, 1);
        assert_eq!(blocks[1].series(Metric::Iops).index, BlockRange::single(1));

        let data = read_to_string(writer.path()).unwrap();
        let chunks = data
            .split("\n\n\n")
            .filter(|x| !x.is_empty())
            .collect::<Vec<_>>();
        assert_eq!(chunks.len(), 2);
        let first = chunks[0].lines().collect::<Vec<_>>();
        assert_eq!(first.len(), 2);
        assert!(first[0].starts_with("1\t"));
        assert!(first[1].starts_with("2\t"));
    }

    #[test]
    fn rows_have_twelve_tab_separated_columns() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![result("a", IoMode::Read, 4096, "sda", 4)];
        let groups = group_results(&results);
        let mut writer = TabularWriter::create(&dir.path().join(ALL_RESULTS)).unwrap();
        writer
            .write_group(&GroupSeries::build(&groups[0]).unwrap())
            .unwrap();

        let data = read_to_string(writer.path()).unwrap();
        assert!(data.ends_with("\n\n\n"));
        let columns = data.lines().next().unwrap().split('\t').collect::<Vec<_>>();
        assert_eq!(columns.len(), 12);
        assert_eq!(columns[0], "4");
        assert_eq!(columns[3].parse::<f64>().unwrap(), 2.0);
        assert_eq!(columns[11].parse::<f64>().unwrap(), 0.002);
    }

    /// In-memory table that accepts `budget` more bytes, then fails once
    #[derive(Debug, Default)]
    struct FlakySink {
        data: Vec<u8>,
        budget: Option<usize>,
        fail_truncate: bool,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = match self.budget {
                Some(0) => {
                    self.budget = None;
                    return Err(io::Error::other("disk full"));
                }
                Some(left) => {
                    let n = left.min(buf.len());
                    self.budget = Some(left - n);
                    n
                }
                None => buf.len(),
            };
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl TableSink for FlakySink {
        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            if self.fail_truncate {
                return Err(io::Error::other("read-only"));
            }
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    fn three_groups() -> Vec<GroupSeries> {
        let results = vec![
            result("a", IoMode::Read, 4096, "sda", 1),
            result("b", IoMode::Read, 4096, "sdb", 2),
            result("c", IoMode::Write, 4096, "sda", 4),
        ];
        group_results(&results)
            .iter()
            .map(|g| GroupSeries::build(g).unwrap())
            .collect()
    }

    #[test]
    fn failed_group_is_cut_and_later_blocks_stay_aligned() {
        let groups = three_groups();
        let path = Path::new(ALL_RESULTS);
        let mut writer = TabularWriter::with_sink(path, FlakySink::default());

        assert_eq!(writer.write_group(&groups[0]).unwrap().index, 0);
        writer.sink.budget = Some(10);
        let err = writer.write_group(&groups[1]).unwrap_err();
        assert!(matches!(err, ReportError::IoWriteFailure { .. }));
        let block = writer.write_group(&groups[2]).unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.title, "write-4096-sda");
        assert_eq!(writer.blocks_written(), 2);

        let mut expected = TabularWriter::with_sink(path, FlakySink::default());
        expected.write_group(&groups[0]).unwrap();
        expected.write_group(&groups[2]).unwrap();
        assert_eq!(writer.sink.data, expected.sink.data);

        let data = String::from_utf8(writer.sink.data).unwrap();
        let chunks = data
            .split("\n\n\n")
            .filter(|x| !x.is_empty())
            .collect::<Vec<_>>();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].starts_with("4\t"));
    }

    #[test]
    fn table_that_cannot_be_rolled_back_refuses_more_blocks() {
        let groups = three_groups();
        let mut writer = TabularWriter::with_sink(Path::new(ALL_RESULTS), FlakySink::default());
        writer.write_group(&groups[0]).unwrap();

        writer.sink.budget = Some(10);
        writer.sink.fail_truncate = true;
        assert!(writer.write_group(&groups[1]).is_err());
        assert!(matches!(
            writer.write_group(&groups[2]),
            Err(ReportError::IoWriteFailure { .. })
        ));
        assert_eq!(writer.blocks_written(), 1);
    }

    #[test]
    fn unwritable_path_is_a_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = TabularWriter::create(&dir.path().join("missing/allresults.tsv"))
            .err()
            .unwrap();
        assert!(matches!(err, ReportError::IoWriteFailure { .. }));
    }
}
