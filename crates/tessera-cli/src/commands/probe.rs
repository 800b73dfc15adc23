use tessera_rt::stack::os;
use tessera_rt::{BootstrapStack, Runtime};

use crate::error::CliError;

/// Reports the bootstrap thread's stack extent next to the OS-reported bounds.
pub fn handle_probe(runtime: &Runtime) -> Result<(), CliError> {
    let main = runtime.expect_main_thread()?;
    let strategy = match runtime.bootstrap_strategy() {
        Some(BootstrapStack::Probe) => "probe",
        _ => "query",
    };

    match main.stack_extent() {
        Some(extent) => println!("discovered ({}): {}", strategy, extent),
        None => println!("discovered ({}): -", strategy),
    }
    match os::current_thread_bounds() {
        Some(bounds) => {
            println!("os-reported:       {}", bounds);
            if let Some(extent) = main.stack_extent() {
                let unusable = bounds.size().saturating_sub(extent.size());
                println!("not readable:      {} bytes", unusable);
            }
        }
        None => println!("os-reported:       unavailable"),
    }
    Ok(())
}
