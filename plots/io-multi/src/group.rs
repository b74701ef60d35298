use std::fmt;

use common::result::{BenchmarkResult, IoMode};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Results sharing a key are statistically comparable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub mode: IoMode,
    pub block_size: u64,
    pub device: String,
}

impl GroupKey {
    pub fn of(result: &BenchmarkResult) -> Self {
        Self {
            mode: result.params.mode,
            block_size: result.params.block_size,
            device: result.params.device.clone(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.mode, self.block_size, self.device)
    }
}

#[derive(Debug, Clone)]
pub struct Group<'a> {
    pub key: GroupKey,
    /// Ascending by multiplicity
    pub results: Vec<&'a BenchmarkResult>,
}

impl Group<'_> {
    pub fn title(&self) -> String {
        self.key.to_string()
    }

    pub fn device_label(&self) -> Option<&str> {
        self.results
            .first()
            .map(|x| x.params.device_or_file.as_str())
    }
}

/// Partitions the results by [`GroupKey`].
///
/// Members are ordered by multiplicity as a number, while the groups
/// themselves are ordered by their joined key as a string, so
/// `read-16384-sda` comes before `read-4096-sda`.
pub fn group_results(results: &[BenchmarkResult]) -> Vec<Group<'_>> {
    results
        .iter()
        .into_group_map_by(|x| GroupKey::of(x))
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by_key(|x| x.params.multiplicity);
            Group {
                key,
                results: members,
            }
        })
        .sorted_by_cached_key(|group| group.title())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use common::result::{DeviceStats, RunParams};

    use super::*;

    pub fn result(id: &str, mode: IoMode, block_size: u64, device: &str, m: u32) -> BenchmarkResult {
        BenchmarkResult {
            id: id.to_owned(),
            params: RunParams {
                mode,
                block_size,
                device: device.to_owned(),
                device_or_file: format!("/dev/{device}"),
                multiplicity: m,
                start_time: Some(0.0),
            },
            transfer_rate: 100.0,
            iops: 25.0,
            response_time: 0.002,
            iostat_avg: DeviceStats {
                read_kb_per_sec: 2048.0,
                write_kb_per_sec: 4096.0,
                reads_per_sec: 10.0,
                writes_per_sec: 20.0,
                await_ms: 1.5,
                avg_queue_size: m as f64,
            },
            iostat_stderr: DeviceStats {
                read_kb_per_sec: 512.0,
                write_kb_per_sec: 1024.0,
                reads_per_sec: 1.0,
                writes_per_sec: 2.0,
                await_ms: 0.1,
                avg_queue_size: 0.25,
            },
            trace: Vec::new(),
            target_dev: None,
        }
    }

    #[test]
    fn groups_partition_the_results() {
        let results = vec![
            result("a", IoMode::Read, 4096, "sda", 1),
            result("b", IoMode::Write, 4096, "sda", 1),
            result("c", IoMode::Read, 4096, "sda", 2),
            result("d", IoMode::Read, 4096, "sdb", 1),
            result("e", IoMode::Read, 8192, "sda", 1),
        ];
        let groups = group_results(&results);

        let mut ids = groups
            .iter()
            .flat_map(|g| g.results.iter().map(|x| x.id.as_str()))
            .collect::<Vec<_>>();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(groups.len(), 4);
        for group in &groups {
            assert!(group.results.iter().all(|x| GroupKey::of(x) == group.key));
        }
    }

    #[test]
    fn members_sort_numerically() {
        let results = [16, 2, 64, 1, 8]
            .into_iter()
            .map(|m| result(&format!("r{m}"), IoMode::Read, 4096, "sda", m))
            .collect::<Vec<_>>();
        let groups = group_results(&results);
        let order = groups[0]
            .results
            .iter()
            .map(|x| x.params.multiplicity)
            .collect::<Vec<_>>();
        assert_eq!(order, vec![1, 2, 8, 16, 64]);
    }

    #[test]
    fn groups_sort_by_joined_key() {
        let results = vec![
            result("w", IoMode::Write, 4096, "sda", 1),
            result("r4", IoMode::Read, 4096, "sda", 1),
            result("r16", IoMode::Read, 16384, "sda", 1),
        ];
        let titles = group_results(&results)
            .iter()
            .map(Group::title)
            .collect::<Vec<_>>();
        assert_eq!(
            titles,
            vec!["read-16384-sda", "read-4096-sda", "write-4096-sda"]
        );
    }

    #[test]
    fn empty_input_has_no_groups() {
        assert!(group_results(&[]).is_empty());
    }
}
