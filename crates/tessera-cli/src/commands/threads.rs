use crossbeam::channel;
use tessera_gc::collect_stack_summaries;
use tessera_rt::{Flow, Runtime, ThreadObject, Value};

use crate::error::CliError;

/// Prints the registry with `parked` extra threads blocked in their blocks.
pub fn handle_threads(runtime: &Runtime, parked: usize) -> Result<(), CliError> {
    let (release, gate) = channel::unbounded::<()>();
    let (ready, started) = channel::unbounded::<()>();

    let threads: Vec<ThreadObject> = (0..parked)
        .map(|_| {
            let gate = gate.clone();
            let ready = ready.clone();
            runtime.spawn_with(move || {
                let _ = ready.send(());
                let _ = gate.recv();
                Flow::Return(Value::NIL)
            })
        })
        .collect::<Result<_, _>>()?;
    for _ in 0..parked {
        let _ = started.recv();
    }

    let summaries = collect_stack_summaries(runtime);
    println!("{} live thread object(s)", summaries.len());
    for summary in &summaries {
        println!("  {}", summary);
    }

    drop(release);
    for thread in &threads {
        thread.join()?;
    }
    Ok(())
}
