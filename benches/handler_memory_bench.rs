use pingbench::handler_memory::HandlerMemory;
use pingbench::ring_types::Op;
use pingbench::session::InFlight;
use std::env;
use std::hint::black_box;
use std::time::Instant;

const DEFAULT_ITERATIONS: usize = 50_000_000;

/// One allocate/release pair per simulated completion, the way a session
/// records each read or write it has in flight.
fn bench(mut memory: HandlerMemory<InFlight>, iterations: usize, label: &str) {
    // Warm up
    for i in 0..10_000u32 {
        let handle = memory.allocate(InFlight { op: Op::Read, len: i });
        black_box(memory.release(handle));
    }

    let start = Instant::now();
    for i in 0..iterations {
        let op = if i % 2 == 0 { Op::Write } else { Op::Read };
        let handle = memory.allocate(InFlight { op, len: i as u32 });
        black_box(&handle);
        black_box(memory.release(handle));
    }
    let elapsed = start.elapsed();

    eprintln!(
        "{:<12} {:>8.2} ns/op  (slot hits {}, heap fallbacks {})",
        label,
        elapsed.as_nanos() as f64 / iterations as f64,
        memory.slot_hits(),
        memory.heap_fallbacks(),
    );
}

fn main() {
    let iterations: usize = env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_ITERATIONS);

    eprintln!("handler memory: {} allocate/release pairs", iterations);
    bench(HandlerMemory::new(), iterations, "slot");
    bench(HandlerMemory::heap_only(), iterations, "heap");
    bench(HandlerMemory::with_capacity(0), iterations, "oversized");
}
