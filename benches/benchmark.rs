use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::atomic::AtomicBool;
use vireo::bus::Bus;
use vireo::consts::ROM_SIZE;
use vireo::cpu::M6502;

fn criterion_benchmark_cpu(c: &mut Criterion) {
    let bus = Bus::new();
    let mut image = vec![0u8; ROM_SIZE];
    // LDX #$FF; DEX; BNE -3; JMP $8000
    image[..8].copy_from_slice(&[0xA2, 0xFF, 0xCA, 0xD0, 0xFD, 0x4C, 0x00, 0x80]);
    image[0x7FFC] = 0x00;
    image[0x7FFD] = 0x80;
    bus.load_rom(&image).unwrap();

    let mut cpu = M6502::new();
    cpu.reset(&bus);
    let running = AtomicBool::new(true);
    c.bench_function("cpu execute", |b| {
        b.iter(|| cpu.execute(&bus, 10_000, &running))
    });
}

criterion_group!(benches, criterion_benchmark_cpu);
criterion_main!(benches);
