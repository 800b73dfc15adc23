//! Runs without the test harness so that `main` executes on the process's
//! original thread. Bootstrapping there after threads have been spawned must
//! not replace the process's fault handlers under them.

use tessera_rt::stack::os;
use tessera_rt::{BootstrapStack, Flow, Runtime, RuntimeConfig, Value};

fn main() {
    let _ = env_logger::builder().is_test(true).try_init();
    assert!(os::is_initial_thread());

    let runtime = Runtime::new(RuntimeConfig::default().with_bootstrap_stack(BootstrapStack::Probe))
        .expect("default config is valid");
    let (release, gate) = crossbeam::channel::bounded::<()>(0);
    let worker = runtime
        .spawn_with(move || {
            let _ = gate.recv();
            Flow::Return(Value::from_bits(2))
        })
        .unwrap();

    let main = runtime.bootstrap().expect("bootstrap with a live thread");
    assert_eq!(runtime.bootstrap_strategy(), Some(BootstrapStack::Query));
    let extent = main.stack_extent().expect("bootstrap sets the extent");
    let local = 0usize;
    let here = std::hint::black_box(&local) as *const usize as usize;
    assert!(extent.contains(here), "{} does not contain {:#x}", extent, here);

    drop(release);
    worker.join().unwrap();
    assert_eq!(worker.value().and_then(|c| c.value()), Some(Value::from_bits(2)));

    runtime.shutdown();
    println!("bootstrap with live threads: ok ({})", extent);
}
