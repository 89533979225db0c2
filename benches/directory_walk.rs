//! Benchmarks for the directory scanner's throughput, characterizing the
//! `walkdir`-based walk plus ignore-rule filtering that feeds the merger.

use bisync::config::IgnoreConfig;
use bisync::scan::scan;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::hint::black_box;
use tempfile::TempDir;

fn create_flat_directory(file_count: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for i in 0..file_count {
        let path = temp_dir.path().join(format!("file_{i:04}.txt"));
        fs::write(&path, format!("Content {i}").as_bytes()).unwrap();
    }
    temp_dir
}

fn create_nested_directory(depth: usize, files_per_level: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();

    fn create_level(base: &std::path::Path, current_depth: usize, max_depth: usize, files: usize) {
        if current_depth >= max_depth {
            return;
        }
        for i in 0..files {
            let path = base.join(format!("file_{i}.txt"));
            fs::write(&path, format!("Content at depth {current_depth}").as_bytes()).unwrap();
        }
        for i in 0..3 {
            let subdir = base.join(format!("subdir_{i}"));
            fs::create_dir_all(&subdir).unwrap();
            create_level(&subdir, current_depth + 1, max_depth, files);
        }
    }

    create_level(temp_dir.path(), 0, depth, files_per_level);
    temp_dir
}

fn bench_flat_directory_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_directory_scan");
    let ignore = IgnoreConfig::default();

    for (name, count) in [("10_files", 10), ("100_files", 100), ("1000_files", 1000)] {
        let temp_dir = create_flat_directory(count);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &temp_dir, |b, dir| {
            b.iter(|| black_box(scan(dir.path(), &ignore)));
        });
    }

    group.finish();
}

fn bench_nested_directory_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_directory_scan");
    let ignore = IgnoreConfig::default();

    for (name, depth, files_per_level) in [("depth_3", 3, 5), ("depth_5", 5, 3)] {
        let temp_dir = create_nested_directory(depth, files_per_level);
        let total_files = scan(temp_dir.path(), &ignore).len();
        group.throughput(Throughput::Elements(total_files as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &temp_dir, |b, dir| {
            b.iter(|| black_box(scan(dir.path(), &ignore)));
        });
    }

    group.finish();
}

fn bench_scan_with_ignore_rules(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_with_ignore_rules");

    let temp_dir = TempDir::new().unwrap();
    for i in 0..50 {
        fs::write(temp_dir.path().join(format!("file_{i}.txt")), "content").unwrap();
    }
    for i in 0..50 {
        fs::write(temp_dir.path().join(format!("file_{i}.tmp")), "content").unwrap();
    }
    let ignored_dir = temp_dir.path().join("System Volume Information");
    fs::create_dir_all(&ignored_dir).unwrap();
    for i in 0..50 {
        fs::write(ignored_dir.join(format!("ignored_{i}.txt")), "content").unwrap();
    }

    let bare = IgnoreConfig::default();
    let filtered = IgnoreConfig {
        extensions: vec![".tmp".to_owned()],
        directories: vec!["System Volume Information".to_owned()],
        ..IgnoreConfig::default()
    };

    group.bench_function("no_rules", |b| {
        b.iter(|| black_box(scan(temp_dir.path(), &bare)));
    });
    group.bench_function("with_rules", |b| {
        b.iter(|| black_box(scan(temp_dir.path(), &filtered)));
    });

    group.finish();
}

criterion_group!(benches, bench_flat_directory_scan, bench_nested_directory_scan, bench_scan_with_ignore_rules);
criterion_main!(benches);
