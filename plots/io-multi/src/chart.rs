use std::path::PathBuf;

use common::{
    plot::{AxisRange, PlotSpec, SeriesEntry},
    util::ResultLayout,
};

use crate::{
    series::{Metric, MultiplicityRange},
    table::Block,
};

/// Folder of the linear variants, relative to the shared namespace
pub const LINEAR_DIR: &str = "linear-plot";

const XLABEL: &str = "multiplicity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Log-scale x over the whole multiplicity range
    Overview,
    /// Linear x, capped at the zoom upper bound
    Zoomed,
}

impl Scale {
    pub const ALL: [Scale; 2] = [Scale::Overview, Scale::Zoomed];

    fn xrange(&self, range: &MultiplicityRange, zoom_upper: f64) -> AxisRange {
        match self {
            Scale::Overview => range.overview(),
            Scale::Zoomed => range.zoomed(zoom_upper),
        }
    }

    fn path(&self, layout: &ResultLayout, name: &str) -> PathBuf {
        match self {
            Scale::Overview => layout.common_file(name),
            Scale::Zoomed => layout.common_file(LINEAR_DIR).join(name),
        }
    }
}

impl Metric {
    fn file_stem(&self) -> &'static str {
        match self {
            Metric::TransferRate => "transfer-rate",
            Metric::Iops => "iops",
            Metric::ResponseTime => "response-time",
            Metric::QueueDepth => "rq-queue-length",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Metric::TransferRate => "Transfer rate",
            Metric::Iops => "IOPS",
            Metric::ResponseTime => "Response time",
            Metric::QueueDepth => "queue length",
        }
    }

    fn ylabel(&self) -> &'static str {
        match self {
            Metric::TransferRate => "transfer rate [MiB/sec]",
            Metric::Iops => "iops [1/sec]",
            Metric::ResponseTime => "response time [msec]",
            Metric::QueueDepth => "avg. # of request queued",
        }
    }

    fn key(&self, scale: Scale) -> &'static str {
        match (self, scale) {
            (Metric::TransferRate, Scale::Overview) => "set key center right",
            _ => "set key top left",
        }
    }

    fn plot_style(&self) -> &'static str {
        match self {
            Metric::ResponseTime => "points",
            _ => "yerrorbars",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleIndex(pub u32);

impl StyleIndex {
    /// Line type and color both follow the index
    pub fn style(&self, plot_style: &str) -> String {
        format!("{plot_style} lt {0} lc {0}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StylePair {
    pub transfer: StyleIndex,
    pub iops: StyleIndex,
}

/// Hands out two consecutive style indices per group, starting at 1
#[derive(Debug)]
pub struct StyleCounter {
    next: u32,
}

impl Default for StyleCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl StyleCounter {
    pub fn next_pair(&mut self) -> StylePair {
        let transfer = StyleIndex(self.next);
        self.next += 1;
        let iops = StyleIndex(self.next);
        self.next += 1;
        StylePair { transfer, iops }
    }
}

/// The styled series of one group, reused by every chart it appears in
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntries {
    pub transfer: SeriesEntry,
    pub iops: SeriesEntry,
    pub response_time: SeriesEntry,
    pub queue_depth: SeriesEntry,
}

impl GroupEntries {
    pub fn new(block: &Block, styles: StylePair) -> Self {
        let styled = |metric: Metric, index: StyleIndex| {
            let mut entry = block.series(metric);
            entry.with = index.style(metric.plot_style());
            entry
        };
        // Response time and queue length share the iops style
        Self {
            transfer: styled(Metric::TransferRate, styles.transfer),
            iops: styled(Metric::Iops, styles.iops),
            response_time: styled(Metric::ResponseTime, styles.iops),
            queue_depth: styled(Metric::QueueDepth, styles.iops),
        }
    }

    pub fn get(&self, metric: Metric) -> &SeriesEntry {
        match metric {
            Metric::TransferRate => &self.transfer,
            Metric::Iops => &self.iops,
            Metric::ResponseTime => &self.response_time,
            Metric::QueueDepth => &self.queue_depth,
        }
    }
}

/// Series of every group, per metric, in group order
#[derive(Debug, Default, Clone)]
pub struct AggregateSeries {
    pub transfer: Vec<SeriesEntry>,
    pub iops: Vec<SeriesEntry>,
    pub response_time: Vec<SeriesEntry>,
    pub queue_depth: Vec<SeriesEntry>,
}

impl AggregateSeries {
    pub fn push(&mut self, entries: &GroupEntries) {
        for metric in Metric::ALL {
            let entry = entries.get(metric).clone();
            match metric {
                Metric::TransferRate => self.transfer.push(entry),
                Metric::Iops => self.iops.push(entry),
                Metric::ResponseTime => self.response_time.push(entry),
                Metric::QueueDepth => self.queue_depth.push(entry),
            }
        }
    }

    pub fn get(&self, metric: Metric) -> &[SeriesEntry] {
        match metric {
            Metric::TransferRate => &self.transfer,
            Metric::Iops => &self.iops,
            Metric::ResponseTime => &self.response_time,
            Metric::QueueDepth => &self.queue_depth,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transfer.is_empty()
    }
}

/// Scale independent part of a chart
pub struct ChartTemplate {
    pub name: String,
    pub title: String,
    pub ylabel: String,
    pub series: Vec<SeriesEntry>,
    pub key: &'static str,
    pub directives: Vec<String>,
}

/// Builds the `scale` variant of `template`
pub fn chart(
    layout: &ResultLayout,
    template: &ChartTemplate,
    scale: Scale,
    range: &MultiplicityRange,
    zoom_upper: f64,
) -> PlotSpec {
    let mut directives = vec![template.key.to_owned()];
    directives.extend(template.directives.iter().cloned());
    if scale == Scale::Overview {
        directives.push("set logscale x".to_owned());
    }

    PlotSpec {
        output: scale.path(layout, &format!("{}.eps", template.name)),
        gpfile: scale.path(layout, &format!("{}.gp", template.name)),
        title: template.title.clone(),
        xlabel: XLABEL.to_owned(),
        ylabel: template.ylabel.clone(),
        xrange: scale.xrange(range, zoom_upper),
        yrange: AxisRange::from_zero(),
        series: template.series.clone(),
        directives,
    }
}

/// Transfer rate and iops of one group on two y axes, in both scales
pub fn detail_specs(
    layout: &ResultLayout,
    prefix: &str,
    group_title: &str,
    label: &str,
    entries: &GroupEntries,
    range: &MultiplicityRange,
    zoom_upper: f64,
) -> Vec<PlotSpec> {
    let template = ChartTemplate {
        name: format!("{prefix}{group_title}"),
        title: format!("Transfer rate on {label}"),
        ylabel: Metric::TransferRate.ylabel().to_owned(),
        series: vec![
            entries.transfer.clone().with_title("transfer rate"),
            entries
                .iops
                .clone()
                .with_title("iops")
                .with_options("axis x1y2"),
        ],
        key: "set key left top",
        directives: vec![
            "set y2label 'iops [1/sec]'".to_owned(),
            "set y2tics nomirror".to_owned(),
            "set y2range [0:]".to_owned(),
        ],
    };
    Scale::ALL
        .into_iter()
        .map(|scale| chart(layout, &template, scale, range, zoom_upper))
        .collect()
}

/// One chart per metric and scale over every group
pub fn aggregate_specs(
    layout: &ResultLayout,
    prefix: &str,
    aggregate: &AggregateSeries,
    range: &MultiplicityRange,
    zoom_upper: f64,
) -> Vec<PlotSpec> {
    Scale::ALL
        .into_iter()
        .flat_map(|scale| {
            Metric::ALL.into_iter().map(move |metric| {
                let template = ChartTemplate {
                    name: format!("{prefix}{}", metric.file_stem()),
                    title: metric.title().to_owned(),
                    ylabel: metric.ylabel().to_owned(),
                    series: aggregate.get(metric).to_vec(),
                    key: metric.key(scale),
                    directives: Vec::new(),
                };
                chart(layout, &template, scale, range, zoom_upper)
            })
        })
        .collect()
}
