pub mod config;
pub mod error;
pub mod plot;
pub mod result;
pub mod util;

/// Conversion from the kB/s reported by iostat to the MB/s plotted
pub const KB_PER_MB: f64 = 1024.0;
