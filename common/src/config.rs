use serde::{Deserialize, Serialize};

use crate::plot::Plot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    pub plots: Option<Vec<Box<dyn Plot>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Upper x bound of the linear "zoomed" charts
    #[serde(default = "default_zoom_upper_bound")]
    pub zoom_upper_bound: f64,
    /// Invoke the renderer after the specs are built
    #[serde(default = "default_render")]
    pub render: bool,
    #[serde(default = "default_gnuplot")]
    pub gnuplot: String,
    #[serde(default = "default_terminal")]
    pub terminal: String,
}

fn default_zoom_upper_bound() -> f64 {
    65.0
}

fn default_render() -> bool {
    true
}

fn default_gnuplot() -> String {
    "gnuplot".to_owned()
}

fn default_terminal() -> String {
    "postscript eps enhanced color".to_owned()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            zoom_upper_bound: default_zoom_upper_bound(),
            render: default_render(),
            gnuplot: default_gnuplot(),
            terminal: default_terminal(),
        }
    }
}
