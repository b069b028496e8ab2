use criterion::{black_box, criterion_group, criterion_main, Criterion};
use xvizio::{glb, Format, MemorySink, Value, XvizData, XvizFormatWriter};

fn point_cloud_message(points: usize) -> Value {
    let positions: Vec<u8> = (0..points * 12).map(|i| i as u8).collect();
    Value::object([
        ("type", Value::from("xviz/state_update")),
        (
            "data",
            Value::object([
                ("update_type", Value::from("snapshot")),
                ("points", Value::binary(positions)),
            ]),
        ),
    ])
}

fn bench_container(c: &mut Criterion) {
    let message = point_cloud_message(100_000);
    let encoded = glb::encode(&message).unwrap();

    c.bench_function("glb_encode_1_2mb", |b| b.iter(|| glb::encode(black_box(&message))));
    c.bench_function("glb_decode_1_2mb", |b| b.iter(|| glb::decode(black_box(&encoded))));
}

fn bench_detection(c: &mut Criterion) {
    let json = r#"{"type":"xviz/state_update","data":{"updates":[{"timestamp":1.0}]}}"#;
    let glb_bytes = glb::encode(&point_cloud_message(1_000)).unwrap();

    c.bench_function("detect_json_string", |b| b.iter(|| XvizData::new(black_box(json))));
    c.bench_function("detect_glb", |b| b.iter(|| XvizData::new(black_box(glb_bytes.clone()))));
}

fn bench_writer(c: &mut Criterion) {
    let data = XvizData::new(point_cloud_message(1_000)).unwrap();

    c.bench_function("write_100_frames_glb", |b| {
        b.iter(|| {
            let mut writer = XvizFormatWriter::new(MemorySink::new(), Format::BinaryGlb).unwrap();
            for i in 0..100 {
                writer.write_message(i, black_box(&data)).unwrap();
            }
            writer.close().unwrap();
        })
    });
}

criterion_group!(benches, bench_container, bench_detection, bench_writer);
criterion_main!(benches);
