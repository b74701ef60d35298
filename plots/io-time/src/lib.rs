use std::{fs::File, path::Path};

use common::{
    KB_PER_MB,
    config::Settings,
    error::ReportError,
    plot::{AxisRange, BlockRange, Plot, PlotReport, PlotSpec, Renderer, SeriesEntry, render_specs},
    result::{BenchmarkResult, ResultStore},
    util::{ResultLayout, ensure_dirs},
};
use csv::WriterBuilder;
use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ELAPSED: &str = "elapsed time [sec]";

/// Device throughput of each run over elapsed time
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IoStat;

/// Position of every request of each run over elapsed time
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IoTrace;

#[async_trait::async_trait]
#[typetag::serde]
impl Plot for IoStat {
    fn name(&self) -> &'static str {
        "IoStat"
    }

    async fn plot(
        &self,
        store: &ResultStore,
        layout: &ResultLayout,
        settings: &Settings,
        renderer: &dyn Renderer,
    ) -> Result<PlotReport> {
        let traced = store
            .results()
            .iter()
            .filter(|x| !x.trace.is_empty())
            .map(|x| layout.runs.join(&x.id))
            .collect::<Vec<_>>();
        debug!("Got {} runs with a device trace", traced.len());
        ensure_dirs(&traced).await?;

        let mut report = PlotReport::default();
        for run in store.results() {
            match iostat_spec(run, layout) {
                Ok(spec) => report.specs.push(spec),
                Err(err) => report.skip(&run.id, err),
            }
        }
        if settings.render {
            report.skipped.extend(render_specs(&report.specs, renderer));
        }
        Ok(report)
    }
}

#[async_trait::async_trait]
#[typetag::serde]
impl Plot for IoTrace {
    fn name(&self) -> &'static str {
        "IoTrace"
    }

    async fn plot(
        &self,
        store: &ResultStore,
        layout: &ResultLayout,
        settings: &Settings,
        renderer: &dyn Renderer,
    ) -> Result<PlotReport> {
        let mut report = PlotReport::default();
        for run in store.results() {
            match iotrace_spec(run, layout) {
                Ok(spec) => report.specs.push(spec),
                Err(err) => report.skip(&run.id, err),
            }
        }
        if settings.render {
            report.skipped.extend(render_specs(&report.specs, renderer));
        }
        Ok(report)
    }
}

fn start_time(run: &BenchmarkResult) -> Result<f64, ReportError> {
    run.params
        .start_time
        .ok_or_else(|| ReportError::missing(&run.id, "start_time"))
}

/// Writes `iostat.tsv` for `run` and builds the chart reading it
pub fn iostat_spec(run: &BenchmarkResult, layout: &ResultLayout) -> Result<PlotSpec, ReportError> {
    if run.trace.is_empty() {
        return Err(ReportError::missing(&run.id, "iostat_data"));
    }
    let start = start_time(run)?;
    let datafile = layout.result_file(&run.id, "iostat.tsv");
    write_trace(run, start, &datafile)?;

    let series = |title: &str, using: &str| SeriesEntry {
        title: title.to_owned(),
        datafile: datafile.clone(),
        using: using.to_owned(),
        index: BlockRange::single(0),
        with: "lines".to_owned(),
        options: None,
    };
    Ok(PlotSpec {
        output: layout.result_file(&run.id, "iostat.eps"),
        gpfile: layout.result_file(&run.id, "iostat.gp"),
        title: "IO performance".to_owned(),
        xlabel: ELAPSED.to_owned(),
        ylabel: "transfer rate [MB/sec]".to_owned(),
        xrange: AxisRange::from_zero(),
        yrange: AxisRange::from_zero(),
        series: vec![series("read", "1:2"), series("write", "1:3")],
        directives: vec!["set key right top".to_owned()],
    })
}

fn write_trace(run: &BenchmarkResult, start: f64, path: &Path) -> Result<(), ReportError> {
    let file = File::create(path).map_err(|e| ReportError::write(path, e))?;
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(file);
    for sample in &run.trace {
        writer
            .write_record([
                (sample.time - start).to_string(),
                (sample.read_kb_per_sec / KB_PER_MB).to_string(),
                (sample.write_kb_per_sec / KB_PER_MB).to_string(),
            ])
            .map_err(|e| ReportError::write(path, e.into()))?;
    }
    writer.flush().map_err(|e| ReportError::write(path, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| ReportError::write(path, e))
}

/// Chart of the block trace the harness left in the run folder
pub fn iotrace_spec(run: &BenchmarkResult, layout: &ResultLayout) -> Result<PlotSpec, ReportError> {
    let start = start_time(run)?;
    let output = layout.result_file(&run.id, "iotrace.eps");
    let datafile = layout.result_file(&run.id, "iotrace.txt");
    if !datafile.is_file() {
        return Err(ReportError::Render {
            path: output,
            reason: format!("no trace at {datafile:?}"),
        });
    }

    Ok(PlotSpec {
        output,
        gpfile: layout.result_file(&run.id, "iotrace.gp"),
        title: "IO trace".to_owned(),
        xlabel: ELAPSED.to_owned(),
        ylabel: "IO request position [sector]".to_owned(),
        xrange: AxisRange::from_zero(),
        yrange: AxisRange::from_zero(),
        series: vec![SeriesEntry {
            title: "read".to_owned(),
            datafile,
            // Timestamps are in microseconds
            using: format!("($2/10**6-{start}):5"),
            index: BlockRange::single(0),
            with: "points".to_owned(),
            options: None,
        }],
        directives: vec!["set key left top".to_owned()],
    })
}
