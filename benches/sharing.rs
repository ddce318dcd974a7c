use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use num_bigint::BigUint;
use privacy_lab::{config::FieldConfig, sharing::ShamirScheme};
use rand::{rngs::StdRng, SeedableRng};

fn bench_split_reconstruct(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(3);
    // 2^127 - 1
    let scheme = ShamirScheme::new(FieldConfig::default()).unwrap();
    let secret = BigUint::from(0xdead_beef_u64);
    let mut group = c.benchmark_group("shamir");

    for size in 2..=6 {
        let n = 1usize << size;
        let t = n / 2 + 1;
        let shares = scheme.split(&secret, n, t, &mut rng).unwrap();

        group.bench_with_input(BenchmarkId::new("split", n), &(n, t), |b, &(n, t)| {
            b.iter(|| scheme.split(&secret, n, t, &mut rng).unwrap());
        });
        group.bench_with_input(
            BenchmarkId::new("reconstruct", n),
            &shares[..t],
            |b, shares| {
                b.iter(|| scheme.reconstruct(shares).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_split_reconstruct);
criterion_main!(benches);
