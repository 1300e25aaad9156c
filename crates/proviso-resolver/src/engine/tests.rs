//! Unit tests for the resolution engine

use super::*;

use crate::error::ErrorKind;
use crate::memory::MemoryIndex;

fn requirements(list: &[&str]) -> Vec<Requirement> {
    list.iter().map(|req| req.parse().unwrap()).collect()
}

fn env(label: &str) -> Environment {
    Environment::for_python(label).unwrap()
}

fn resolver(index: MemoryIndex) -> Resolver<MemoryIndex> {
    Resolver::new(Arc::new(CandidateSupply::new(index)))
}

async fn resolve(index: MemoryIndex, roots: &[&str], label: &str) -> Result<Resolution, ResolutionError> {
    resolver(index).resolve(&requirements(roots), &env(label)).await
}

fn pins(resolution: &Resolution) -> Vec<String> {
    resolution.mapping.values().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_empty_requirements() {
    let resolution = resolve(MemoryIndex::new(), &[], "3.12").await.unwrap();
    assert!(resolution.mapping.is_empty());
    assert!(resolution.criteria.is_empty());
}

#[tokio::test]
async fn test_newest_compatible_versions() {
    let index = MemoryIndex::new()
        .with_package("requests", "1.9.0", &[])
        .unwrap()
        .with_package("requests", "2.0.0", &["urllib3>=1.21.1"])
        .unwrap()
        .with_package("urllib3", "1.20.0", &[])
        .unwrap()
        .with_package("urllib3", "1.25.0", &[])
        .unwrap();

    let resolution = resolve(index, &["requests>=2.0.0"], "3.12").await.unwrap();
    assert_eq!(pins(&resolution), vec!["requests==2.0.0", "urllib3==1.25.0"]);
    assert!(resolution.is_consistent());

    let urllib3 = &resolution.criteria[&Name::new("urllib3").unwrap()];
    assert_eq!(urllib3[0].to_string(), "urllib3>=1.21.1 (from requests==2.0.0)");
}

#[tokio::test]
async fn test_extra_gated_edges() {
    let index = || {
        MemoryIndex::new()
            .with_package("pkg", "1.0", &["cryptography>=1.0; extra == 'security'"])
            .unwrap()
            .with_package("cryptography", "1.0", &[])
            .unwrap()
    };

    let with_extra = resolve(index(), &["pkg[security]"], "3.12").await.unwrap();
    assert_eq!(pins(&with_extra), vec!["cryptography==1.0", "pkg[security]==1.0"]);

    let without = resolve(index(), &["pkg"], "3.12").await.unwrap();
    assert_eq!(pins(&without), vec!["pkg==1.0"]);
}

#[tokio::test]
async fn test_conflicting_candidate_skipped() {
    let index = MemoryIndex::new()
        .with_package("a", "2.0", &["c==1.0"])
        .unwrap()
        .with_package("a", "1.0", &[])
        .unwrap()
        .with_package("b", "1.0", &["c==2.0"])
        .unwrap()
        .with_package("c", "1.0", &[])
        .unwrap()
        .with_package("c", "2.0", &[])
        .unwrap();

    let resolution = resolve(index, &["A>=1.0", "B>=1.0"], "3.12").await.unwrap();
    assert_eq!(pins(&resolution), vec!["a==1.0", "b==1.0", "c==2.0"]);
    assert!(resolution.is_consistent());
}

#[tokio::test]
async fn test_backtracks_earlier_decision() {
    // a 2.0 needs b>=2, whose only release needs d==1, but c pins d==2
    let index = MemoryIndex::new()
        .with_package("a", "2.0", &["b>=2"])
        .unwrap()
        .with_package("a", "1.0", &["b<2"])
        .unwrap()
        .with_package("b", "2.0", &["d==1"])
        .unwrap()
        .with_package("b", "1.0", &[])
        .unwrap()
        .with_package("c", "1.0", &["d==2"])
        .unwrap()
        .with_package("d", "1", &[])
        .unwrap()
        .with_package("d", "2", &[])
        .unwrap();

    let resolution = resolve(index, &["a", "c"], "3.12").await.unwrap();
    assert_eq!(pins(&resolution), vec!["a==1.0", "b==1.0", "c==1.0", "d==2"]);
    assert!(resolution.is_consistent());
    assert!(resolution.rounds > resolution.mapping.len());
}

#[tokio::test]
async fn test_exhausted_explains_conflict() {
    let index = MemoryIndex::new()
        .with_package("a", "1.0", &["c==1.0"])
        .unwrap()
        .with_package("b", "1.0", &["c==2.0"])
        .unwrap()
        .with_package("c", "1.0", &[])
        .unwrap()
        .with_package("c", "2.0", &[])
        .unwrap();

    let error = resolve(index, &["a", "b"], "3.12").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Exhausted);
    match error {
        ResolutionError::Exhausted { name, causes, .. } => {
            assert_eq!(name.as_str(), "c");
            let causes: Vec<String> = causes.iter().map(ToString::to_string).collect();
            assert_eq!(causes, vec!["c==1.0 (from a==1.0)", "c==2.0 (from b==1.0)"]);
        },
        other => panic!("Expected Exhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_package_is_exhausted() {
    let error = resolve(MemoryIndex::new(), &["ghost>=1"], "3.12").await.unwrap_err();
    assert!(error.to_string().contains("ghost>=1 (from root)"));
}

#[tokio::test]
async fn test_unavailable_index_is_fatal() {
    let index = MemoryIndex::new()
        .with_package("app", "1.0", &["down"])
        .unwrap()
        .with_unavailable("down")
        .unwrap();

    let error = resolve(index, &["app"], "3.12").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::SupplyUnavailable);
}

#[tokio::test]
async fn test_round_limit() {
    let index = MemoryIndex::new()
        .with_package("a", "1.0", &[])
        .unwrap()
        .with_package("b", "1.0", &[])
        .unwrap();

    let error = resolver(index)
        .with_max_rounds(1)
        .resolve(&requirements(&["a", "b"]), &env("3.12"))
        .await
        .unwrap_err();
    assert!(matches!(error, ResolutionError::TooComplex { rounds: 1 }));
}

#[tokio::test]
async fn test_requires_python_skips_candidate() {
    let index = || {
        MemoryIndex::new()
            .with_package("pkg", "1.0", &[])
            .unwrap()
            .with_package("pkg", "2.0", &[])
            .unwrap()
            .with_requires_python("pkg", "2.0", ">=3.12")
            .unwrap()
    };

    assert_eq!(pins(&resolve(index(), &["pkg"], "3.10").await.unwrap()), vec!["pkg==1.0"]);
    assert_eq!(pins(&resolve(index(), &["pkg"], "3.12").await.unwrap()), vec!["pkg==2.0"]);
}

#[tokio::test]
async fn test_pin_widened_for_new_extras() {
    let index = MemoryIndex::new()
        .with_package("lib", "1.0", &["speedups; extra == 'fast'"])
        .unwrap()
        .with_package("zapp", "1.0", &["lib[fast]"])
        .unwrap()
        .with_package("speedups", "0.5", &[])
        .unwrap();

    let resolution = resolve(index, &["lib", "zapp"], "3.12").await.unwrap();
    assert_eq!(pins(&resolution), vec!["lib[fast]==1.0", "speedups==0.5", "zapp==1.0"]);
    assert!(resolution.is_consistent());
}

#[tokio::test]
async fn test_prerelease_policy() {
    let index = || {
        MemoryIndex::new()
            .with_package("beta", "1.0", &[])
            .unwrap()
            .with_package("beta", "2.0b1", &[])
            .unwrap()
    };

    assert_eq!(pins(&resolve(index(), &["beta"], "3.12").await.unwrap()), vec!["beta==1.0"]);
    assert_eq!(
        pins(&resolve(index(), &["beta>=2.0b1"], "3.12").await.unwrap()),
        vec!["beta==2.0b1"]
    );
    assert_eq!(
        pins(&resolve(index(), &["beta>1.0"], "3.12").await.unwrap()),
        vec!["beta==2.0b1"]
    );
}

#[tokio::test]
async fn test_markers_filter_edges_per_environment() {
    let index = || {
        MemoryIndex::new()
            .with_package("app", "1.0", &["tomli; python_version < '3.11'"])
            .unwrap()
            .with_package("tomli", "2.0", &[])
            .unwrap()
    };

    assert_eq!(pins(&resolve(index(), &["app"], "3.10").await.unwrap()), vec!["app==1.0", "tomli==2.0"]);
    assert_eq!(pins(&resolve(index(), &["app"], "3.12").await.unwrap()), vec!["app==1.0"]);
    assert!(resolve(index(), &["app; python_version < '3'"], "3.12")
        .await
        .unwrap()
        .mapping
        .is_empty());
}

#[tokio::test]
async fn test_cycles_and_self_dependencies() {
    let index = MemoryIndex::new()
        .with_package("a", "1.0", &["b", "a"])
        .unwrap()
        .with_package("b", "1.0", &["a>=1"])
        .unwrap();

    let resolution = resolve(index, &["a"], "3.12").await.unwrap();
    assert_eq!(pins(&resolution), vec!["a==1.0", "b==1.0"]);
}

#[tokio::test]
async fn test_deterministic() {
    let index = || {
        MemoryIndex::new()
            .with_package("x", "1.0", &["y", "z>=2"])
            .unwrap()
            .with_package("y", "1.0", &["z<3"])
            .unwrap()
            .with_package("z", "2.0", &[])
            .unwrap()
            .with_package("z", "3.0", &[])
            .unwrap()
    };

    let first = resolve(index(), &["x"], "3.12").await.unwrap();
    let second = resolve(index(), &["x"], "3.12").await.unwrap();
    assert_eq!(first.mapping, second.mapping);
    assert_eq!(first.rounds, second.rounds);
    assert_eq!(pins(&first), vec!["x==1.0", "y==1.0", "z==2.0"]);
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    const PACKAGES: [&str; 4] = ["p0", "p1", "p2", "p3"];

    /// One edge: (target package, upper bound flag, bound version)
    type Edge = (usize, bool, u64);

    fn build_index(releases: &[Vec<Vec<Edge>>]) -> MemoryIndex {
        let mut index = MemoryIndex::new();
        for (package, versions) in releases.iter().enumerate() {
            for (offset, edges) in versions.iter().enumerate() {
                let dependencies: Vec<String> = edges
                    .iter()
                    .filter(|(target, ..)| *target != package)
                    .map(|(target, upper, bound)| {
                        let operator = if *upper { "<" } else { ">=" };
                        format!("{}{}{}", PACKAGES[*target], operator, bound)
                    })
                    .collect();
                let dependencies: Vec<&str> = dependencies.iter().map(String::as_str).collect();
                index = index
                    .with_package(PACKAGES[package], &(offset + 1).to_string(), &dependencies)
                    .unwrap();
            }
        }
        index
    }

    fn releases() -> impl Strategy<Value = Vec<Vec<Vec<Edge>>>> {
        let edge = (0usize..4, any::<bool>(), 1u64..4);
        prop::collection::vec(
            prop::collection::vec(prop::collection::vec(edge, 0..3), 1..4),
            4,
        )
    }

    fn run(index: MemoryIndex, roots: &[Requirement]) -> Result<Resolution, ResolutionError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(resolver(index).resolve(roots, &env("3.12")))
    }

    proptest! {
        #[test]
        fn resolution_is_sound(releases in releases(), roots in prop::collection::btree_set(0usize..4, 1..4)) {
            let roots: Vec<Requirement> = roots
                .into_iter()
                .map(|package| PACKAGES[package].parse().unwrap())
                .collect();

            match run(build_index(&releases), &roots) {
                Ok(resolution) => {
                    prop_assert!(resolution.is_consistent());
                    for root in &roots {
                        prop_assert!(resolution.mapping.contains_key(&root.name));
                    }
                    // Every pinned candidate's edges are pinned too
                    for candidate in resolution.mapping.values() {
                        let offset = candidate.version.major() as usize - 1;
                        let package = PACKAGES.iter().position(|p| *p == candidate.name.as_str()).unwrap();
                        for (target, ..) in &releases[package][offset] {
                            if *target != package {
                                let target = Name::new(PACKAGES[*target]).unwrap();
                                prop_assert!(resolution.mapping.contains_key(&target));
                            }
                        }
                    }
                },
                Err(error) => prop_assert_eq!(error.kind(), ErrorKind::Exhausted),
            }
        }

        #[test]
        fn resolution_is_deterministic(releases in releases(), root in 0usize..4) {
            let roots: Vec<Requirement> = vec![PACKAGES[root].parse().unwrap()];
            let first = run(build_index(&releases), &roots).map(|resolution| resolution.mapping);
            let second = run(build_index(&releases), &roots).map(|resolution| resolution.mapping);
            match (first, second) {
                (Ok(first), Ok(second)) => prop_assert_eq!(first, second),
                (Err(first), Err(second)) => prop_assert_eq!(first.to_string(), second.to_string()),
                _ => prop_assert!(false, "outcomes differ"),
            }
        }
    }
}

#[tokio::test]
async fn test_root_listings_fetched_concurrently() {
    let roots = ["alpha", "bravo", "charlie", "delta", "echo"];
    let mut index = MemoryIndex::new();
    for name in roots {
        index = index.with_package(name, "1.0", &[]).unwrap();
    }
    let resolver = resolver(index.with_latency(std::time::Duration::from_millis(20)));

    let resolution = resolver.resolve(&requirements(&roots), &env("3.12")).await.unwrap();
    assert_eq!(resolution.mapping.len(), 5);

    let index = resolver.supply().index();
    assert_eq!(index.list_calls(), 5);
    assert_eq!(index.peak_in_flight(), 5);
}
