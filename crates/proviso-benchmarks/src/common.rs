//! Common utilities for benchmarks

use std::time::Duration;

use criterion::Criterion;
use pprof::criterion::{Output, PProfProfiler};
use proviso_core::{Environment, ProvisoError, ProvisoResult, Requirement};
use proviso_resolver::MemoryIndex;

/// Configure criterion with flamegraph profiling support
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_secs(3))
        .measurement_time(Duration::from_secs(10))
        .sample_size(100)
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
}

/// A layered index: `pkg-{layer}-{i}` depends on every package of the next
/// layer with a lower bound, and each package has `releases` versions.
///
/// The newest release of every package in the last layer requires a
/// Python newer than the benchmark environments, so selection skips one
/// candidate per leaf.
pub fn layered_index(layers: usize, width: usize, releases: usize) -> ProvisoResult<MemoryIndex> {
    let mut index = MemoryIndex::new();
    for layer in 0..layers {
        for i in 0..width {
            let name = package_name(layer, i);
            let deps: Vec<String> = if layer + 1 < layers {
                (0..width).map(|j| format!("{}>=1.0", package_name(layer + 1, j))).collect()
            } else {
                Vec::new()
            };
            let deps: Vec<&str> = deps.iter().map(String::as_str).collect();

            for release in 0..releases {
                index = index.with_package(&name, &format!("1.{}", release), &deps)?;
            }
            if layer + 1 == layers && releases > 1 {
                index = index.with_requires_python(&name, &format!("1.{}", releases - 1), ">=3.99")?;
            }
        }
    }
    Ok(index)
}

/// Root requirements on every package of the first layer
pub fn root_requirements(width: usize) -> ProvisoResult<Vec<Requirement>> {
    (0..width)
        .map(|i| package_name(0, i).parse::<Requirement>().map_err(ProvisoError::from))
        .collect()
}

/// One environment per Python version label
pub fn python_environments(labels: &[&str]) -> ProvisoResult<Vec<Environment>> {
    labels
        .iter()
        .map(|label| Environment::for_python(label).map_err(ProvisoError::from))
        .collect()
}

fn package_name(layer: usize, index: usize) -> String {
    format!("pkg-{}-{}", layer, index)
}
