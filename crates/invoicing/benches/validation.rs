use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use invoicer_core::Fixed;
use invoicer_invoicing::{validate, BillSundryDraft, ItemDraft};

fn items(count: usize) -> Vec<ItemDraft> {
    (0..count)
        .map(|i| {
            let quantity = Fixed::from_hundredths(100 + i as i64);
            let price = Fixed::from_hundredths(1999);
            let amount: Fixed = quantity
                .mul_exact(price)
                .to_string()
                .parse()
                .unwrap();
            ItemDraft {
                name: format!("item-{i}"),
                quantity,
                price,
                amount,
            }
        })
        .collect()
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");

    let sundries = vec![
        BillSundryDraft {
            name: "Freight".to_string(),
            amount: Fixed::from_units(25),
        },
        BillSundryDraft {
            name: "Discount".to_string(),
            amount: Fixed::from_units(-10),
        },
    ];

    for size in [1usize, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        let drafts = items(*size);
        group.bench_with_input(BenchmarkId::new("items", size), &drafts, |b, drafts| {
            b.iter(|| black_box(validate(drafts, &sundries).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_validate);
criterion_main!(benches);
