use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use scan_editor::ScanCommand;
use scan_editor::scan::{Comparison, ScanModel};
use scan_editor::undo::UndoLog;
use scan_editor::xml::{decode_str, encode_string};

/// A grid scan: outer loop over y, inner loop over x, one log per point
fn grid_scan(points: usize) -> Vec<ScanCommand> {
    let inner = vec![
        ScanCommand::wait_for("motor_x", Comparison::Equals, 0.0),
        ScanCommand::wait(0.1),
        ScanCommand::log_devices("point", ["motor_x", "motor_y", "detector"]),
    ];
    let mut commands = vec![ScanCommand::comment("Grid scan"), ScanCommand::set("shutter", "open")];
    for row in 0..points {
        commands.push(ScanCommand::move_to("motor_y", row as f64 * 0.5));
        commands.push(ScanCommand::loop_over(
            "motor_x",
            0.0,
            10.0,
            0.25,
            inner.clone(),
        ));
    }
    commands.push(ScanCommand::set("shutter", "closed"));
    commands
}

/// Benchmark encoding (runs on every save and submit)
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for rows in [10, 100, 1000] {
        let commands = grid_scan(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &commands, |b, commands| {
            b.iter(|| black_box(encode_string(commands).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark decoding (runs on every load and fetch)
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for rows in [10, 100, 1000] {
        let xml = encode_string(&grid_scan(rows)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &xml, |b, xml| {
            b.iter(|| black_box(decode_str(xml).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark whole-sequence edits with undo, the only edit primitive
fn bench_edit_undo(c: &mut Criterion) {
    let commands = grid_scan(100);
    c.bench_function("edit_undo_100_rows", |b| {
        b.iter(|| {
            let mut model = ScanModel::with_commands(commands.clone());
            let mut log = UndoLog::new();
            for i in 0..10 {
                let mut next = model.commands().to_vec();
                next.push(ScanCommand::wait(i as f64));
                let old = model.set_commands(next);
                log.record(old, model.commands().to_vec(), "Add wait");
            }
            while log.undo(&mut model).is_some() {}
            black_box(model.len())
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_edit_undo);
criterion_main!(benches);
