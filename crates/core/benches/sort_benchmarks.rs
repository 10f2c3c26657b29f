use std::time::Duration;

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use playsort_core::{Playlist, PlaylistId, SortCriterion, Video, VideoId};

/// Deterministic pseudo-random playlist (LCG so runs are comparable).
fn build_playlist(n: usize) -> Playlist {
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = || {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        seed >> 33
    };

    let videos = (0..n)
        .map(|i| {
            let r = next();
            Video::new(
                VideoId::new(format!("v{i}")),
                format!("title {:06}", r % 100_000),
                "UC-bench",
                Some("en".to_string()),
                Utc.timestamp_opt(1_600_000_000 + (r % 50_000_000) as i64, 0).unwrap(),
                Duration::from_secs(r % 7_200),
            )
        })
        .collect();

    Playlist::new(
        PlaylistId::new("PL-bench"),
        "UC-bench",
        "bench",
        "",
        Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
        videos,
    )
}

fn bench_sorts(c: &mut Criterion) {
    let mut group = c.benchmark_group("playlist_sort");

    for size in [50usize, 500, 5_000] {
        let playlist = build_playlist(size);
        group.throughput(Throughput::Elements(size as u64));

        for criterion in SortCriterion::ALL {
            group.bench_with_input(
                BenchmarkId::new(criterion.as_str(), size),
                &playlist,
                |b, p| b.iter(|| black_box(p.clone().sorted(criterion))),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_sorts);
criterion_main!(benches);
