use aerotab::codec::{CodecId, get_codec};
use aerotab::registry::CodecRegistry;
use aerotab::{Table, TableDatabase};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Cursor;

fn aero_deck() -> TableDatabase {
    let mach: Vec<f64> = (0..12).map(|k| 0.1 * k as f64).collect();
    let alpha: Vec<f64> = (0..41).map(|k| -20.0 + k as f64).collect();
    let mut db = TableDatabase::new();
    for (n, name) in ["CL", "CD", "CM"].iter().enumerate() {
        let values = (0..mach.len() * alpha.len())
            .map(|k| (k as f64 * 0.001 + n as f64).sin())
            .collect();
        db.put(Table::two_d(*name, ["MACH", "ALPHA"], mach.clone(), alpha.clone(), values).unwrap());
    }
    db
}

fn bench_encode(c: &mut Criterion) {
    let db = aero_deck();
    for id in [CodecId::Nasa, CodecId::Fdhs, CodecId::Post] {
        let codec = get_codec(id);
        c.bench_function(&format!("{}_encode_3x12x41", id.name()), |b| {
            b.iter(|| {
                let mut buf = Vec::new();
                codec.encode(&mut buf, black_box(&db)).unwrap();
                buf
            })
        });
    }
}

fn bench_decode(c: &mut Criterion) {
    let db = aero_deck();
    for id in [CodecId::Nasa, CodecId::Fdhs, CodecId::Post] {
        let codec = get_codec(id);
        let mut bytes = Vec::new();
        codec.encode(&mut bytes, &db).unwrap();
        c.bench_function(&format!("{}_decode_3x12x41", id.name()), |b| {
            b.iter(|| codec.decode(&mut Cursor::new(black_box(&bytes))).unwrap())
        });
    }
}

fn bench_resolve(c: &mut Criterion) {
    let registry = CodecRegistry::builtin();
    let mut bytes = Vec::new();
    get_codec(CodecId::Post).encode(&mut bytes, &aero_deck()).unwrap();

    c.bench_function("resolve_post_deck", |b| {
        b.iter(|| {
            let mut input = Cursor::new(black_box(&bytes));
            registry.resolve(&mut input, "deck.dat").unwrap().into_codec().unwrap().tag()
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_resolve);
criterion_main!(benches);
