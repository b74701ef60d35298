use core::fmt::Debug;
use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use downcast_rs::{Downcast, impl_downcast};
use dyn_clone::{DynClone, clone_trait_object};
use eyre::Result;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{config::Settings, error::ReportError, result::ResultStore, util::ResultLayout};

#[typetag::serde(tag = "type")]
#[async_trait::async_trait]
pub trait Plot: Debug + DynClone + Downcast + Send + Sync {
    /// Name of the plot, for identification in logs and reports
    fn name(&self) -> &'static str;
    /// Builds the chart specs for the loaded results and renders them
    ///
    /// Arguments:
    /// * `store` - Every validated result of this pass
    /// * `layout` - Resolves shared and per-run artifact paths
    /// * `settings` - The settings from config_yaml
    /// * `renderer` - Turns each finished [`PlotSpec`] into an image
    async fn plot(
        &self,
        store: &ResultStore,
        layout: &ResultLayout,
        settings: &Settings,
        renderer: &dyn Renderer,
    ) -> Result<PlotReport>;
}
clone_trait_object!(Plot);
impl_downcast!(Plot);

/// Inclusive range of data blocks a series reads, `start:end` in gnuplot's `index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: usize,
    pub end: usize,
}

impl BlockRange {
    pub fn single(block: usize) -> Self {
        Self {
            start: block,
            end: block,
        }
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Axis bounds, an open end is left to the renderer
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisRange {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl AxisRange {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn from_zero() -> Self {
        Self {
            lower: Some(0.0),
            upper: None,
        }
    }
}

impl fmt::Display for AxisRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |x: Option<f64>| x.map(|x| x.to_string()).unwrap_or_default();
        write!(f, "[{}:{}]", bound(self.lower), bound(self.upper))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub title: String,
    pub datafile: PathBuf,
    /// Column selector, ie. `1:4:5`
    pub using: String,
    pub index: BlockRange,
    /// Render style, ie. `yerrorbars lt 1 lc 1`
    pub with: String,
    pub options: Option<String>,
}

impl SeriesEntry {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    fn to_gnuplot(&self) -> String {
        let mut line = format!(
            "'{}' index {} using {}",
            escape(&self.datafile.display().to_string()),
            self.index,
            self.using
        );
        if let Some(options) = &self.options {
            line.push(' ');
            line.push_str(options);
        }
        line.push_str(&format!(
            " title '{}' with {}",
            escape(&self.title),
            self.with
        ));
        line
    }
}

/// gnuplot single-quoted strings only escape `'`, by doubling it
fn escape(text: &str) -> String {
    text.replace('\'', "''")
}

/// One chart artifact handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSpec {
    pub output: PathBuf,
    pub gpfile: PathBuf,
    pub title: String,
    pub xlabel: String,
    pub ylabel: String,
    pub xrange: AxisRange,
    pub yrange: AxisRange,
    pub series: Vec<SeriesEntry>,
    /// Renderer passthrough lines, ie. `set logscale x`
    pub directives: Vec<String>,
}

impl PlotSpec {
    pub fn to_gnuplot(&self, terminal: &str) -> String {
        let mut script = format!(
            "set terminal {terminal}\nset output '{}'\nset title '{}'\nset xlabel '{}'\nset ylabel '{}'\nset xrange {}\nset yrange {}\n",
            escape(&self.output.display().to_string()),
            escape(&self.title),
            escape(&self.xlabel),
            escape(&self.ylabel),
            self.xrange,
            self.yrange,
        );
        for directive in &self.directives {
            script.push_str(directive);
            script.push('\n');
        }
        let series = self
            .series
            .iter()
            .map(SeriesEntry::to_gnuplot)
            .collect::<Vec<_>>();
        if !series.is_empty() {
            script.push_str("plot ");
            script.push_str(&series.join(", \\\n     "));
            script.push('\n');
        }
        script
    }
}

/// An artifact that could not be produced, and why
#[derive(Debug)]
pub struct Skipped {
    pub artifact: String,
    pub error: ReportError,
}

#[derive(Debug, Default)]
pub struct PlotReport {
    pub specs: Vec<PlotSpec>,
    pub skipped: Vec<Skipped>,
}

impl PlotReport {
    pub fn skip(&mut self, artifact: impl Into<String>, error: ReportError) {
        let artifact = artifact.into();
        warn!("Skipping {artifact}: {error}");
        self.skipped.push(Skipped { artifact, error });
    }

    pub fn merge(&mut self, other: PlotReport) {
        self.specs.extend(other.specs);
        self.skipped.extend(other.skipped);
    }
}

pub trait Renderer: Send + Sync {
    fn render(&self, spec: &PlotSpec) -> Result<(), ReportError>;
}

/// Writes the gnuplot script next to the output and runs gnuplot on it
#[derive(Debug, Clone)]
pub struct Gnuplot {
    pub program: String,
    pub terminal: String,
}

impl Gnuplot {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            program: settings.gnuplot.clone(),
            terminal: settings.terminal.clone(),
        }
    }
}

impl Renderer for Gnuplot {
    fn render(&self, spec: &PlotSpec) -> Result<(), ReportError> {
        for path in [&spec.gpfile, &spec.output] {
            if let Some(parent) = path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent).map_err(|e| ReportError::write(parent, e))?;
            }
        }
        fs::write(&spec.gpfile, spec.to_gnuplot(&self.terminal))
            .map_err(|e| ReportError::write(&spec.gpfile, e))?;

        let output = Command::new(&self.program)
            .arg(&spec.gpfile)
            .output()
            .map_err(|e| ReportError::Render {
                path: spec.output.clone(),
                reason: format!("spawn {}: {e}", self.program),
            })?;
        if !output.status.success() {
            return Err(ReportError::Render {
                path: spec.output.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        debug!("Rendered {:?}", spec.output);
        Ok(())
    }
}

/// Only writes the gnuplot scripts, for `print` and for hosts without gnuplot
#[derive(Debug, Clone)]
pub struct ScriptOnly {
    pub terminal: String,
}

impl Renderer for ScriptOnly {
    fn render(&self, spec: &PlotSpec) -> Result<(), ReportError> {
        if let Some(parent) = spec.gpfile.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| ReportError::write(parent, e))?;
        }
        fs::write(&spec.gpfile, spec.to_gnuplot(&self.terminal))
            .map_err(|e| ReportError::write(&spec.gpfile, e))
    }
}

/// Renders every spec in parallel. One failing chart does not stop the
/// others, every failure is returned in spec order.
pub fn render_specs(specs: &[PlotSpec], renderer: &dyn Renderer) -> Vec<Skipped> {
    specs
        .par_iter()
        .filter_map(|spec| {
            renderer.render(spec).err().map(|error| Skipped {
                artifact: artifact_name(&spec.output),
                error,
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .inspect(|skipped| warn!("Rendering {} failed: {}", skipped.artifact, skipped.error))
        .collect()
}

pub fn artifact_name(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> PlotSpec {
        PlotSpec {
            output: PathBuf::from("out/iops.eps"),
            gpfile: PathBuf::from("out/iops.gp"),
            title: "IOPS".to_owned(),
            xlabel: "multiplicity".to_owned(),
            ylabel: "iops [1/sec]".to_owned(),
            xrange: AxisRange::new(0.5, 17.0),
            yrange: AxisRange::from_zero(),
            series: vec![SeriesEntry {
                title: "read-4096-sda".to_owned(),
                datafile: PathBuf::from("out/allresults.tsv"),
                using: "1:6:7".to_owned(),
                index: BlockRange::single(3),
                with: "yerrorbars lt 2 lc 2".to_owned(),
                options: Some("axis x1y2".to_owned()),
            }],
            directives: vec!["set key top left".to_owned(), "set logscale x".to_owned()],
        }
    }

    #[test]
    fn ranges_format_like_gnuplot() {
        assert_eq!(AxisRange::new(0.5, 17.0).to_string(), "[0.5:17]");
        assert_eq!(AxisRange::from_zero().to_string(), "[0:]");
        assert_eq!(AxisRange::new(-1.0, 65.0).to_string(), "[-1:65]");
        assert_eq!(BlockRange::single(4).to_string(), "4:4");
    }

    #[test]
    fn script_contains_directives_and_series() {
        let script = spec().to_gnuplot("postscript eps enhanced color");
        assert!(script.starts_with("set terminal postscript eps enhanced color\n"));
        assert!(script.contains("set xrange [0.5:17]\n"));
        assert!(script.contains("set key top left\nset logscale x\n"));
        assert!(script.contains(
            "plot 'out/allresults.tsv' index 3:3 using 1:6:7 axis x1y2 title 'read-4096-sda' with yerrorbars lt 2 lc 2\n"
        ));
    }

    #[test]
    fn quotes_in_labels_are_doubled() {
        let mut s = spec();
        s.title = "Transfer rate on /mnt/bob's disk".to_owned();
        s.series[0].title = "read-4096-it's".to_owned();
        let script = s.to_gnuplot("png");
        assert!(script.contains("set title 'Transfer rate on /mnt/bob''s disk'\n"));
        assert!(script.contains(" title 'read-4096-it''s' with "));
    }

    struct FailOn(&'static str);

    impl Renderer for FailOn {
        fn render(&self, spec: &PlotSpec) -> Result<(), ReportError> {
            if spec.title == self.0 {
                Err(ReportError::Render {
                    path: spec.output.clone(),
                    reason: "boom".to_owned(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn render_failures_are_isolated() {
        let mut other = spec();
        other.title = "fine".to_owned();
        let skipped = render_specs(&[spec(), other, spec()], &FailOn("IOPS"));
        assert_eq!(skipped.len(), 2);
        assert!(
            skipped
                .iter()
                .all(|x| matches!(x.error, ReportError::Render { .. }))
        );
    }

    #[test]
    fn script_only_writes_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = spec();
        s.gpfile = dir.path().join("nested/iops.gp");
        ScriptOnly {
            terminal: "png".to_owned(),
        }
        .render(&s)
        .unwrap();
        let script = fs::read_to_string(&s.gpfile).unwrap();
        assert!(script.starts_with("set terminal png\n"));
    }
}
