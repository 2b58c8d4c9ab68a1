use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vmprobe::{replace_in_sequence, snapshot};
use vmprobe_host::{CodeBody, FrameObject, ObjRef, Slot};

fn frame_with_depth(depth: usize) -> ObjRef {
    let pool = ObjRef::tuple(Vec::new());
    let code = ObjRef::code(CodeBody::new("bench", pool, 4, depth).unwrap());
    let stack: Vec<Slot> = (0..depth)
        .map(|i| (i % 3 != 0).then(|| ObjRef::int(i as i64)))
        .collect();
    ObjRef::frame(FrameObject::new(code, vec![None; 4], stack).unwrap())
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_snapshot");

    for depth in [4usize, 32, 256] {
        let frame = frame_with_depth(depth);
        group.bench_with_input(BenchmarkId::new("depth", depth), &frame, |b, frame| {
            b.iter(|| unsafe { snapshot(black_box(frame)) }.unwrap());
        });
    }

    group.finish();
}

fn bench_replace_in_sequence(c: &mut Criterion) {
    let target = ObjRef::str("target");
    let seq = ObjRef::tuple((0..64).map(|i| if i % 8 == 0 { target.clone() } else { ObjRef::int(i) }));

    c.bench_function("replace_in_sequence_64_self", |b| {
        b.iter(|| unsafe { replace_in_sequence(black_box(&seq), &target, &target) }.unwrap());
    });
}

criterion_group!(benches, bench_snapshot, bench_replace_in_sequence);
criterion_main!(benches);
