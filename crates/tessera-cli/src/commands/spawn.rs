use tessera_rt::{Flow, Runtime, ThreadObject, Value};

use crate::error::CliError;

/// Spawns `count` threads that each return their index, then joins them in
/// spawn order and reports what each produced.
pub fn handle_spawn(runtime: &Runtime, count: usize) -> Result<(), CliError> {
    let threads: Vec<ThreadObject> = (0..count)
        .map(|index| runtime.spawn_with(move || Flow::Return(Value::from_bits(index))))
        .collect::<Result<_, _>>()?;
    log::info!("Spawned {} thread(s) with {} byte stacks", count, runtime.config().stack_size);

    for thread in &threads {
        thread.join().map_err(|source| CliError::ThreadFailed {
            inspect: thread.inspect(),
            source,
        })?;
        let value = thread.value().and_then(|completion| completion.value());
        let extent = thread
            .stack_extent()
            .map_or_else(|| "-".to_string(), |extent| extent.to_string());
        println!(
            "{} value={} stack={}",
            thread,
            value.map_or(0, Value::to_bits),
            extent
        );
    }
    Ok(())
}
