use common::{
    config::Settings,
    plot::{Plot, PlotReport, Renderer, render_specs},
    result::ResultStore,
    util::{ResultLayout, ensure_dirs},
};
use eyre::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod chart;
pub mod group;
pub mod series;
pub mod table;

use chart::{AggregateSeries, GroupEntries, LINEAR_DIR, StyleCounter, aggregate_specs, detail_specs};
use group::group_results;
use series::{GroupSeries, MultiplicityRange};
use table::{ALL_RESULTS, TabularWriter};

/// Throughput, iops, response time and queue length against multiplicity,
/// one detail chart pair per group plus charts comparing every group
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IoMulti {
    /// Prepended to every chart file name
    #[serde(default)]
    pub prefix: String,
    /// Only results whose id matches are plotted
    pub filter: Option<String>,
}

#[async_trait::async_trait]
#[typetag::serde]
impl Plot for IoMulti {
    fn name(&self) -> &'static str {
        "IoMulti"
    }

    async fn plot(
        &self,
        store: &ResultStore,
        layout: &ResultLayout,
        settings: &Settings,
        renderer: &dyn Renderer,
    ) -> Result<PlotReport> {
        let filtered;
        let store = match &self.filter {
            Some(filter) => {
                let r = Regex::new(filter).context(format!("Invalid filter {filter}"))?;
                filtered = store.filtered(|x| r.is_match(&x.id));
                &filtered
            }
            None => store,
        };
        debug!("Got {} results", store.len());

        ensure_dirs(&[layout.shared.clone(), layout.common_file(LINEAR_DIR)]).await?;
        let mut report = build_report(store, layout, &self.prefix, settings.zoom_upper_bound);

        // The table is complete and synced before anything reads it
        if settings.render {
            report.skipped.extend(render_specs(&report.specs, renderer));
        }
        Ok(report)
    }
}

/// Writes the shared table and builds every chart spec for `store`.
///
/// Detail specs come first, in group order, followed by the aggregate specs.
/// A group whose block cannot be built or written is skipped, the remaining
/// groups are still processed.
pub fn build_report(
    store: &ResultStore,
    layout: &ResultLayout,
    prefix: &str,
    zoom_upper: f64,
) -> PlotReport {
    let mut report = PlotReport::default();
    let groups = group_results(store.results());

    let table_path = layout.common_file(ALL_RESULTS);
    let mut writer = match TabularWriter::create(&table_path) {
        Ok(writer) => writer,
        Err(err) => {
            report.skip(ALL_RESULTS, err);
            return report;
        }
    };

    let mut styles = StyleCounter::default();
    let mut aggregate = AggregateSeries::default();
    let mut overall: Option<MultiplicityRange> = None;
    for group in &groups {
        let title = group.title();
        let block = GroupSeries::build(group)
            .and_then(|series| writer.write_group(&series).map(|block| (series, block)));
        let (series, block) = match block {
            Ok(x) => x,
            Err(err) => {
                report.skip(&title, err);
                continue;
            }
        };

        let entries = GroupEntries::new(&block, styles.next_pair());
        report.specs.extend(detail_specs(
            layout,
            prefix,
            &title,
            &series.label,
            &entries,
            &series.range,
            zoom_upper,
        ));
        aggregate.push(&entries);
        overall = Some(match overall {
            Some(range) => range.merge(series.range),
            None => series.range,
        });
    }

    if let Some(range) = overall
        && !aggregate.is_empty()
    {
        report
            .specs
            .extend(aggregate_specs(layout, prefix, &aggregate, &range, zoom_upper));
    }
    debug!(
        "Built {} specs from {} blocks",
        report.specs.len(),
        writer.blocks_written()
    );
    report
}
