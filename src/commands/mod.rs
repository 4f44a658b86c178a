//! CLI command implementations

pub mod backtest;
pub mod optimize;

/// Parse comma-separated values, skipping entries that do not parse
pub(crate) fn parse_list<T: std::str::FromStr>(s: &str) -> Vec<T> {
    s.split(',')
        .filter_map(|x| x.trim().parse().ok())
        .collect()
}
