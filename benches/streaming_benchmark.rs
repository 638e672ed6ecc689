use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fmt::Write as _;
use tabload::config::{ConvertConfig, GeneratorConfig, LoadConfig, ReaderConfig};
use tabload::store::MemoryStore;
use tabload::{convert, BulkLoader, DatasetGenerator, TableReader};
use tempfile::tempdir;

fn benchmark_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    group.sample_size(10);

    for size in [1_000u64, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = tempdir().unwrap();
            let path = dir.path().join("bench.xlsx");
            let mut generator = DatasetGenerator::seeded(GeneratorConfig::default(), 1).unwrap();
            b.iter(|| {
                generator.generate(size, &path).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    group.sample_size(10);

    for size in [1_000u64, 10_000, 100_000].iter() {
        // Prepare test file
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.xlsx");
        DatasetGenerator::seeded(GeneratorConfig::default(), 2)
            .unwrap()
            .generate(*size, &path)
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut reader = TableReader::open(&path, &ReaderConfig::default()).unwrap();
                for row_result in reader.rows().unwrap() {
                    black_box(row_result.unwrap());
                }
            });
        });
    }

    group.finish();
}

fn benchmark_convert(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let source = dir.path().join("bench.xlsx");
    let destination = dir.path().join("bench.csv");
    DatasetGenerator::seeded(GeneratorConfig::default(), 3)
        .unwrap()
        .generate(50_000, &source)
        .unwrap();

    c.bench_function("convert_50000_rows", |b| {
        b.iter(|| {
            convert(&source, &destination, &ReaderConfig::default(), &ConvertConfig::default()).unwrap()
        });
    });
}

fn benchmark_upload(c: &mut Criterion) {
    let mut input = String::from("studentId,firstName,lastName,dob,class,score\n");
    for id in 1..=100_000u64 {
        writeln!(input, "{},ANNA,SMITH,2004-01-{:02},Class{},{}", id, id % 28 + 1, id % 5 + 1, 55 + id % 21).unwrap();
    }

    c.bench_function("upload_100000_rows_memory", |b| {
        b.iter(|| {
            let loader = BulkLoader::new(MemoryStore::new(), LoadConfig::default());
            black_box(loader.upload(&input).unwrap())
        });
    });
}

criterion_group!(benches, benchmark_generate, benchmark_read, benchmark_convert, benchmark_upload);
criterion_main!(benches);
