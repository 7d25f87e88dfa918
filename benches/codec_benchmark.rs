use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trackcache::codec::{compress, decompress, rle};
use trackcache::models::{LatLng, RawStreams};

/// A two-hour ride at 1 Hz: steady clock, slowly rolling altitude.
fn ride(n: usize) -> RawStreams {
    let time = (0..n as i64).collect();
    let altitude = (0..n)
        .map(|i| 120.0 + 40.0 * ((i as f64) / 600.0).sin())
        .collect();
    let latlng = (0..n)
        .map(|i| LatLng {
            lat: 37.40 + (i as f64) * 0.00003,
            lng: -122.10 + ((i as f64) / 90.0).sin() * 0.002,
        })
        .collect();
    RawStreams {
        time,
        altitude,
        latlng,
    }
}

fn benchmark_rle(c: &mut Criterion) {
    let raw = ride(7200);
    let encoded = rle::encode(&raw.altitude).expect("encode altitude");

    let mut group = c.benchmark_group("rle");
    group.bench_function("encode_altitude", |b| {
        b.iter(|| rle::encode(black_box(&raw.altitude)))
    });
    group.bench_function("encode_time", |b| b.iter(|| rle::encode(black_box(&raw.time))));
    group.bench_function("decode_altitude", |b| {
        b.iter(|| rle::decode(black_box(&encoded)))
    });
    group.finish();
}

fn benchmark_blob(c: &mut Criterion) {
    let raw = ride(7200);
    let blob = compress(&raw).expect("compress ride");

    let mut group = c.benchmark_group("blob");
    group.bench_function("compress", |b| b.iter(|| compress(black_box(&raw))));
    group.bench_function("decompress", |b| b.iter(|| decompress(black_box(&blob))));
    group.finish();
}

criterion_group!(benches, benchmark_rle, benchmark_blob);
criterion_main!(benches);
