//! Benchmarks for command application and SGR serialization.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use kotter::command::TerminalCommand;
use kotter::style::{Color, ColorLayer};
use kotter::text_area::TextArea;

fn command_stream(lines: usize) -> Vec<TerminalCommand> {
    let mut commands = Vec::with_capacity(lines * 4);
    for i in 0..lines {
        commands.push(TerminalCommand::SetColor(
            ColorLayer::Foreground,
            if i % 2 == 0 { Color::Green } else { Color::Red },
        ));
        commands.push(TerminalCommand::Text(format!("line {i}: status ok")));
        commands.push(TerminalCommand::ClearColor(ColorLayer::Foreground));
        commands.push(TerminalCommand::Newline);
    }
    commands
}

fn bench_apply(c: &mut Criterion) {
    let commands = command_stream(200);
    c.bench_function("apply_200_styled_lines", |b| {
        b.iter(|| {
            let mut area = TextArea::new();
            area.apply_all(black_box(&commands));
            black_box(area.num_lines())
        });
    });
}

fn bench_serialize(c: &mut Criterion) {
    let mut area = TextArea::new();
    area.apply_all(&command_stream(200));
    c.bench_function("serialize_200_styled_lines", |b| {
        b.iter(|| black_box(black_box(&area).to_string()));
    });
}

criterion_group!(benches, bench_apply, bench_serialize);
criterion_main!(benches);
